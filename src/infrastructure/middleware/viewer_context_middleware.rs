// ViewerContext middleware - resolves the caller from request headers and
// injects a request-scoped ViewerContext into the extensions

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::core::UserId;
use crate::infrastructure::viewer::ViewerContext;

/// Header carrying the authenticated account id. Session handling sits in
/// front of this service; it forwards only the resolved id.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Authentication information extracted from request
#[derive(Debug, Clone, PartialEq)]
pub struct AuthInfo {
    pub user_id: Option<UserId>,
    pub request_id: Option<String>,
}

pub async fn viewer_context_middleware(mut request: Request, next: Next) -> Result<Response, StatusCode> {
    let auth_info = extract_auth_from_request(request.headers())?;
    let viewer_context = create_viewer_context(auth_info);
    debug!(
        request_id = %viewer_context.request_id,
        user_id = ?viewer_context.user_id,
        "viewer context attached"
    );

    request.extensions_mut().insert(viewer_context);
    Ok(next.run(request).await)
}

/// A malformed user id is a bad request, a missing one is anonymous.
fn extract_auth_from_request(headers: &HeaderMap) -> Result<AuthInfo, StatusCode> {
    let user_id = match headers.get(USER_ID_HEADER) {
        Some(value) => {
            let raw = value.to_str().map_err(|_| StatusCode::BAD_REQUEST)?;
            let id = raw.trim().parse::<i64>().map_err(|_| StatusCode::BAD_REQUEST)?;
            Some(UserId::new(id))
        }
        None => None,
    };
    let request_id = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(AuthInfo { user_id, request_id })
}

fn create_viewer_context(auth_info: AuthInfo) -> Arc<ViewerContext> {
    let request_id = auth_info
        .request_id
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()));
    Arc::new(ViewerContext {
        user_id: auth_info.user_id,
        request_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_user_id() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("42"));

        let auth_info = extract_auth_from_request(&headers).unwrap();
        assert_eq!(auth_info.user_id, Some(UserId::new(42)));
        assert_eq!(auth_info.request_id, None);
    }

    #[test]
    fn test_extract_auth_anonymous() {
        let auth_info = extract_auth_from_request(&HeaderMap::new()).unwrap();
        let vc = create_viewer_context(auth_info);
        assert!(!vc.is_authenticated());
        assert!(vc.request_id.starts_with("req-"));
    }

    #[test]
    fn test_malformed_user_id_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("alice"));
        assert_eq!(extract_auth_from_request(&headers), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_request_id_is_propagated() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("trace-7"));
        let vc = create_viewer_context(extract_auth_from_request(&headers).unwrap());
        assert_eq!(vc.request_id, "trace-7");
    }
}
