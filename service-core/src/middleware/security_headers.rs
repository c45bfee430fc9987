use axum::{extract::Request, http::header, middleware::Next, response::IntoResponse};

/// Hardening headers for the server-rendered console pages.
pub async fn security_headers_middleware(req: Request, next: Next) -> impl IntoResponse {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        header::HeaderValue::from_static("DENY"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        header::HeaderValue::from_static("same-origin"),
    );
    // Pages are script-free and load only their stylesheet from /static.
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        header::HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'none'; \
             style-src 'self'; \
             img-src 'self' data:; \
             frame-ancestors 'none'",
        ),
    );

    response
}
