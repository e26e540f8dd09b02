/// Request middleware helpers
use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Count every response by method and status
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let response = next.run(request).await;
    crate::metrics::record_http_request(method.as_str(), response.status().as_u16());
    response
}
