pub mod identity_provider;
pub mod metrics;
pub mod role_store;

use thiserror::Error;

pub use identity_provider::{
    HttpIdentityProvider, IdentityEvent, IdentityListeners, IdentityProvider, IdentitySubscription,
};
pub use metrics::ConsoleMetrics;
pub use role_store::{RestRoleStore, RoleStore};

/// Failures talking to the hosted identity provider or data API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl ProviderError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ProviderError::Rejected { status, message }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}
