use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::session::SessionSnapshot;

/// A signed-in identity as issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

impl Identity {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.email.split('@').next().unwrap_or("User")
    }

    pub fn initials(&self) -> String {
        let upper: String = self
            .display_name()
            .chars()
            .take(2)
            .collect::<String>()
            .to_uppercase();
        if upper.is_empty() {
            "U".to_string()
        } else {
            upper
        }
    }
}

/// The snapshot a guarded handler was admitted with.
///
/// The route guard only inserts it on `Allow`, so extraction fails on
/// routes that are not behind the guard.
#[derive(Debug, Clone)]
pub struct SignedInUser {
    pub identity: Identity,
    pub snapshot: Arc<SessionSnapshot>,
}

#[async_trait]
impl<S> FromRequestParts<S> for SignedInUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let snapshot = parts
            .extensions
            .get::<Arc<SessionSnapshot>>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Session snapshot missing from request extensions",
                )
                    .into_response()
            })?;

        let identity = snapshot.identity.clone().ok_or_else(|| {
            (StatusCode::INTERNAL_SERVER_ERROR, "Guarded route without identity").into_response()
        })?;

        Ok(SignedInUser { identity, snapshot })
    }
}
