//! Guarded console pages. Bodies are placeholders; the guard in front of
//! each route decides who gets here.

use askama::Template;
use axum::response::IntoResponse;

use crate::models::{Role, SignedInUser};

pub struct NavItem {
    pub title: &'static str,
    pub href: &'static str,
    pub admin_only: bool,
}

pub const NAV_ITEMS: &[NavItem] = &[
    NavItem {
        title: "Dashboard",
        href: "/dashboard",
        admin_only: false,
    },
    NavItem {
        title: "Campaigns",
        href: "/campaigns",
        admin_only: false,
    },
    NavItem {
        title: "Panel Management",
        href: "/settings/panels",
        admin_only: true,
    },
    NavItem {
        title: "Panel User Management",
        href: "/settings/panel-users",
        admin_only: true,
    },
    NavItem {
        title: "Panel 3 Credentials",
        href: "/settings/panel3-credentials",
        admin_only: true,
    },
    NavItem {
        title: "SMS API Settings",
        href: "/settings/sms-api",
        admin_only: true,
    },
    NavItem {
        title: "Team Members",
        href: "/team-members",
        admin_only: true,
    },
];

#[derive(Template)]
#[template(path = "section.html")]
pub struct SectionTemplate {
    pub title: &'static str,
    pub summary: &'static str,
    pub current_path: &'static str,
    pub nav: Vec<&'static NavItem>,
    pub email: String,
    pub initials: String,
    pub role_label: &'static str,
}

fn render(user: &SignedInUser, path: &'static str, title: &'static str, summary: &'static str) -> SectionTemplate {
    let role = user.snapshot.effective_role();
    let is_admin = role == Some(Role::Admin);

    SectionTemplate {
        title,
        summary,
        current_path: path,
        nav: NAV_ITEMS
            .iter()
            .filter(|item| is_admin || !item.admin_only)
            .collect(),
        email: user.identity.email.clone(),
        initials: user.identity.initials(),
        role_label: role.map(|r| r.as_str()).unwrap_or("No role"),
    }
}

pub async fn dashboard(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/dashboard", "Dashboard", "Overview of pending and completed campaign reports.")
}

pub async fn campaigns(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/campaigns", "Campaigns", "Campaign reports by panel and status.")
}

pub async fn panels(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/settings/panels", "Panel Management", "Configured panels.")
}

pub async fn panel_users(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/settings/panel-users", "Panel User Management", "Users registered against each panel.")
}

pub async fn panel3_credentials(user: SignedInUser) -> impl IntoResponse {
    render(
        &user,
        "/settings/panel3-credentials",
        "Panel 3 Credentials",
        "Credentials used when executing Panel 2 campaigns.",
    )
}

pub async fn sms_api_settings(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/settings/sms-api", "SMS API Settings", "Credentials for status-change notifications.")
}

pub async fn team_members(user: SignedInUser) -> impl IntoResponse {
    render(&user, "/team-members", "Team Members", "Staff accounts and their roles.")
}
