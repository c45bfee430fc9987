//! Route guard: decides what a navigation to a protected route gets.
//!
//! `evaluate` is a pure function of the snapshot and the route's allow-list.
//! The HTTP side (redirects, interstitial) lives in `middleware::guard`.

use serde::Serialize;

use crate::models::Role;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardOutcome {
    Allow,
    Loading,
    RedirectToSignIn,
    RedirectToDefault,
}

impl GuardOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardOutcome::Allow => "allow",
            GuardOutcome::Loading => "loading",
            GuardOutcome::RedirectToSignIn => "redirect_to_sign_in",
            GuardOutcome::RedirectToDefault => "redirect_to_default",
        }
    }
}

pub fn evaluate(snapshot: &SessionSnapshot, allowed_roles: &[Role]) -> GuardOutcome {
    if snapshot.is_loading {
        return GuardOutcome::Loading;
    }
    if snapshot.identity.is_none() {
        return GuardOutcome::RedirectToSignIn;
    }
    if allowed_roles.is_empty() {
        return GuardOutcome::Allow;
    }
    match snapshot.effective_role() {
        Some(role) if allowed_roles.contains(&role) => GuardOutcome::Allow,
        _ => GuardOutcome::RedirectToDefault,
    }
}

/// Static access rule attached to a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    allowed_roles: Vec<Role>,
}

impl RoutePolicy {
    /// Any signed-in identity.
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: roles.into_iter().collect(),
        }
    }

    pub fn admin_only() -> Self {
        Self::roles([Role::Admin])
    }

    pub fn allowed_roles(&self) -> &[Role] {
        &self.allowed_roles
    }

    pub fn evaluate(&self, snapshot: &SessionSnapshot) -> GuardOutcome {
        evaluate(snapshot, &self.allowed_roles)
    }
}
