use askama::Template;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use prometheus::IntCounterVec;
use service_core::error::AppError;
use tower_sessions::Session;

use crate::config::RouteSettings;
use crate::guard::{GuardOutcome, RoutePolicy};
use crate::session::SessionRegistry;

const HX_REQUEST: &str = "HX-Request";
const HX_REDIRECT: &str = "HX-Redirect";

#[derive(Template)]
#[template(path = "loading.html")]
pub struct LoadingTemplate {
    pub message: &'static str,
}

/// Per-route state for `route_guard`: where browser sessions live, the
/// route's policy and where redirects go.
#[derive(Clone)]
pub struct GuardState {
    sessions: SessionRegistry,
    policy: RoutePolicy,
    routes: RouteSettings,
    outcomes: Option<IntCounterVec>,
}

impl GuardState {
    pub fn new(sessions: SessionRegistry, policy: RoutePolicy, routes: RouteSettings) -> Self {
        Self {
            sessions,
            policy,
            routes,
            outcomes: None,
        }
    }

    pub fn with_outcome_counter(mut self, counter: IntCounterVec) -> Self {
        self.outcomes = Some(counter);
        self
    }

    pub fn with_policy(&self, policy: RoutePolicy) -> Self {
        Self {
            policy,
            ..self.clone()
        }
    }
}

/// Gate a route on the calling browser's session snapshot.
pub async fn route_guard(
    State(guard): State<GuardState>,
    session: Session,
    mut req: Request,
    next: Next,
) -> Response {
    let snapshot = match guard.sessions.snapshot(&session).await {
        Ok(snapshot) => snapshot,
        Err(e) => return AppError::InternalError(e.into()).into_response(),
    };
    let outcome = guard.policy.evaluate(&snapshot);

    if let Some(counter) = &guard.outcomes {
        counter.with_label_values(&[outcome.as_str()]).inc();
    }

    match outcome {
        GuardOutcome::Allow => {
            req.extensions_mut().insert(snapshot);
            next.run(req).await
        }
        GuardOutcome::Loading => loading_response(),
        GuardOutcome::RedirectToSignIn => {
            tracing::debug!(path = %req.uri().path(), "No identity, redirecting to sign-in");
            redirect(req.headers(), &guard.routes.sign_in_path)
        }
        GuardOutcome::RedirectToDefault => {
            tracing::info!(
                path = %req.uri().path(),
                identity_id = ?snapshot.identity.as_ref().map(|i| i.id),
                "Role not permitted, redirecting to default view"
            );
            redirect(req.headers(), &guard.routes.default_path)
        }
    }
}

fn loading_response() -> Response {
    let mut response = LoadingTemplate {
        message: "Checking user permissions.",
    }
    .into_response();
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

/// `303 See Other`, or `HX-Redirect` when the caller sent `HX-Request`.
pub fn redirect(headers: &HeaderMap, to: &str) -> Response {
    if headers.contains_key(HX_REQUEST) {
        if let Ok(value) = HeaderValue::from_str(to) {
            return Response::builder()
                .status(StatusCode::OK)
                .header(HX_REDIRECT, value)
                .body(Body::empty())
                .unwrap_or_else(|_| Redirect::to(to).into_response());
        }
    }
    Redirect::to(to).into_response()
}
