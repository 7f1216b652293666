// ViewerContext extractor - hands handlers the request's viewer

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use std::sync::Arc;

use crate::core::UserId;
use crate::infrastructure::viewer::{CurrentUser, ViewerContext};

/// Cheap-to-clone handle on the request's `ViewerContext`. Derefs to the
/// context and can be passed anywhere a `&dyn CurrentUser` is expected.
#[derive(Debug, Clone)]
pub struct Vc(Arc<ViewerContext>);

impl Vc {
    pub fn new(vc: Arc<ViewerContext>) -> Self {
        Self(vc)
    }

    pub fn arc(self) -> Arc<ViewerContext> {
        self.0
    }
}

impl std::ops::Deref for Vc {
    type Target = ViewerContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl CurrentUser for Vc {
    fn current_user(&self) -> Option<UserId> {
        self.0.user_id
    }
}

// Routes mounted without the middleware see an anonymous viewer.
impl<S> FromRequestParts<S> for Vc
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let vc = parts
            .extensions
            .get::<Arc<ViewerContext>>()
            .cloned()
            .unwrap_or_else(|| Arc::new(ViewerContext::anonymous()));
        Ok(Vc(vc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_vc_deref() {
        let vc = Vc::new(Arc::new(ViewerContext::new(UserId::new(3))));
        assert_eq!(vc.user_id, Some(UserId::new(3)));
        assert_eq!(vc.require_user().unwrap(), UserId::new(3));
        assert_eq!(vc.clone().arc().user_id, Some(UserId::new(3)));
    }

    #[tokio::test]
    async fn test_missing_extension_falls_back_to_anonymous() {
        let (mut parts, _) = Request::new(()).into_parts();
        let vc = Vc::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(!vc.is_authenticated());
    }

    #[tokio::test]
    async fn test_extension_is_used_when_present() {
        let (mut parts, _) = Request::new(()).into_parts();
        parts
            .extensions
            .insert(Arc::new(ViewerContext::new(UserId::new(8))));
        let vc = Vc::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(vc.current_user(), Some(UserId::new(8)));
    }
}
