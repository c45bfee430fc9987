use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{load_layered, ServerSettings, TelemetrySettings};
use service_core::error::AppError;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub identity_provider: IdentityProviderSettings,
    pub role_store: RoleStoreSettings,
    #[serde(default)]
    pub routes: RouteSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Deserialize, Clone)]
pub struct IdentityProviderSettings {
    /// Base URL of the auth API, e.g. `https://<project>.example.co/auth/v1`.
    pub auth_url: String,
    /// Public API key sent as the `apikey` header.
    pub anon_key: Secret<String>,
}

#[derive(Deserialize, Clone)]
pub struct RoleStoreSettings {
    /// Base URL of the REST data API, e.g. `https://<project>.example.co/rest/v1`.
    pub rest_url: String,
    #[serde(default = "default_role_table")]
    pub table: String,
    /// Key used for both the `apikey` header and the bearer token.
    pub api_key: Secret<String>,
}

fn default_role_table() -> String {
    "team_members".to_string()
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RouteSettings {
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    #[serde(default = "default_landing_path")]
    pub default_path: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            sign_in_path: default_sign_in_path(),
            default_path: default_landing_path(),
        }
    }
}

fn default_sign_in_path() -> String {
    "/login".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

/// Browser session cookie and idle expiry.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionSettings {
    #[serde(default = "default_secure_cookie")]
    pub secure_cookie: bool,
    /// Sessions idle for longer than this are expired and their resolver dropped.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: u32,
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.idle_timeout_minutes) * 60)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secure_cookie: default_secure_cookie(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
        }
    }
}

fn default_secure_cookie() -> bool {
    true
}

fn default_idle_timeout_minutes() -> u32 {
    24 * 60
}

pub fn get_configuration() -> Result<Settings, AppError> {
    let base_path = std::env::current_dir()?;

    // Check if we're already in campaign-console directory or need to navigate to it
    let configuration_directory = if base_path.ends_with("campaign-console") {
        base_path.join("config")
    } else {
        base_path.join("campaign-console").join("config")
    };

    load_layered(&configuration_directory)
}
