//! Small helpers shared by handlers that need to derive a request's
//! origin for base-URL resolution (§4.6, §9).

use axum::http::HeaderMap;

pub fn request_scheme(headers: &HeaderMap) -> &'static str {
    match headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some("https") => "https",
        _ => "http",
    }
}

pub fn request_host(headers: &HeaderMap) -> String {
    headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost")
        .to_string()
}
