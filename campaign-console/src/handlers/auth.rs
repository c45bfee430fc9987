use askama::Template;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;
use tower_sessions::Session;
use validator::Validate;

use crate::middleware::guard::redirect;
use crate::services::ProviderError;
use crate::session::SessionError;
use crate::AppState;

/// Upper bound on waiting for a fresh sign-in to reach the snapshot.
const SIGN_IN_APPLIED_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "notice.html")]
pub struct NoticeTemplate {
    pub message: String,
    pub back_href: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

fn login_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        LoginTemplate {
            error: Some(message.to_string()),
        },
    )
        .into_response()
}

fn session_failure(e: SessionError) -> Response {
    AppError::InternalError(e.into()).into_response()
}

/// Sign-in page. A browser that is already signed in is sent to the default view.
pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Response {
    match state.sessions.snapshot(&session).await {
        Ok(snapshot) if snapshot.is_signed_in() => redirect(&headers, &state.routes.default_path),
        Ok(_) => LoginTemplate { error: None }.into_response(),
        Err(e) => session_failure(e),
    }
}

pub async fn login_handler(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(payload): Form<LoginRequest>,
) -> Response {
    if payload.validate().is_err() {
        return login_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Enter a valid email address and password",
        );
    }

    let resolver = match state.sessions.get_or_create(&session).await {
        Ok(resolver) => resolver,
        Err(e) => return session_failure(e),
    };

    match resolver.sign_in(&payload.email, &payload.password).await {
        Ok(identity) => {
            // New session id on privilege change.
            if let Err(e) = session.cycle_id().await {
                return session_failure(e.into());
            }
            if tokio::time::timeout(SIGN_IN_APPLIED_TIMEOUT, resolver.wait_for_identity(identity.id))
                .await
                .is_err()
            {
                tracing::warn!(identity_id = %identity.id, "Sign-in not yet reflected in session snapshot");
            }
            tracing::info!(identity_id = %identity.id, "Staff member signed in");
            redirect(&headers, &state.routes.default_path)
        }
        Err(SessionError::SignIn(ProviderError::Unauthorized(_))) => {
            login_error(StatusCode::UNPROCESSABLE_ENTITY, "Invalid email or password")
        }
        Err(e) => {
            tracing::error!(error = %e, "Sign-in request failed");
            login_error(
                StatusCode::BAD_GATEWAY,
                "Sign-in is unavailable right now, please try again",
            )
        }
    }
}

/// Ask this browser's provider session to sign out. On success the browser
/// session is ended; on failure it is left as it was.
pub async fn logout_handler(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
) -> Response {
    let resolver = match state.sessions.resolver(&session).await {
        Ok(Some(resolver)) => resolver,
        Ok(None) => return redirect(&headers, &state.routes.sign_in_path),
        Err(e) => return session_failure(e),
    };

    match resolver.sign_out().await {
        Ok(()) => match state.sessions.end(&session).await {
            Ok(()) => redirect(&headers, &state.routes.sign_in_path),
            Err(e) => session_failure(e),
        },
        Err(e) => {
            tracing::error!(error = %e, "Sign-out request failed");
            (
                StatusCode::BAD_GATEWAY,
                NoticeTemplate {
                    message: "Sign-out failed, please try again.".to_string(),
                    back_href: state.routes.default_path.clone(),
                },
            )
                .into_response()
        }
    }
}
