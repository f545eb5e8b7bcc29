use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const DEBUG_KEY_HEADER: &str = "X-Debug-Key";

pub fn debug_key_matches(expected: &str, provided: Option<&str>) -> bool {
    match provided {
        Some(provided) if !expected.is_empty() => expected.as_bytes().ct_eq(provided.as_bytes()).into(),
        _ => false,
    }
}

/// Guards operational endpoints such as /metrics behind X-Debug-Key.
pub async fn require_debug_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request.headers().get(DEBUG_KEY_HEADER).and_then(|v| v.to_str().ok());

    if debug_key_matches(&state.config.debug_key, provided) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected debug endpoint access");
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_key_comparison() {
        assert!(debug_key_matches("s3cret", Some("s3cret")));
        assert!(!debug_key_matches("s3cret", Some("s3cre")));
        assert!(!debug_key_matches("s3cret", None));
        assert!(!debug_key_matches("", Some("")));
    }
}
