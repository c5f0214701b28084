//! Authentication gate for inbound HTTP requests.

use std::fmt;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, StatusCode, header};
use tracing::{debug, warn};

use crate::auth::context::IdentityContext;
use crate::auth::verifier::IdentityVerifier;

/// Authentication errors surfaced to clients.
///
/// Messages are generic; verification detail is logged by the
/// gate and never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Authorization header present but not `Bearer <token>`
    MalformedCredential,
    /// Credential was well-formed but did not verify
    VerificationFailed,
    /// Operation requires a verified principal and none was supplied
    Unauthenticated,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCredential => {
                write!(f, "Authorization header format must be Bearer {{token}}")
            }
            Self::VerificationFailed => write!(f, "Invalid authentication token"),
            Self::Unauthenticated => write!(f, "Authentication required"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Split an `Authorization` header value into its bearer token.
///
/// The value must be exactly two space-separated parts and the scheme must
/// equal `bearer` ignoring case.
pub fn parse_bearer(value: &str) -> Result<&str, AuthError> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Ok(token)
        }
        _ => Err(AuthError::MalformedCredential),
    }
}

/// Per-request authentication stage.
///
/// Requests without credentials pass through with an empty context;
/// authorization is decided by the operations that need a principal.
pub struct AuthGate<V> {
    verifier: V,
}

impl<V: IdentityVerifier> AuthGate<V> {
    /// Create a gate around a verifier.
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }

    /// Get reference to the verifier.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Resolve the identity for a request from its headers.
    ///
    /// Makes exactly one verification call when a well-formed credential is
    /// present and none otherwise. An empty header counts as no credential.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<IdentityContext, AuthError> {
        let Some(value) = headers
            .get(header::AUTHORIZATION)
            .filter(|v| !v.as_bytes().is_empty())
        else {
            return Ok(IdentityContext::anonymous());
        };

        let value = value
            .to_str()
            .map_err(|_| AuthError::MalformedCredential)?;
        let token = parse_bearer(value)?;

        match self.verifier.verify(token).await {
            Ok(principal) => {
                debug!(subject = %principal.subject_id(), "Request authenticated");
                Ok(IdentityContext::authenticated(principal))
            }
            Err(e) => {
                warn!("Error verifying token: {}", e);
                Err(AuthError::VerificationFailed)
            }
        }
    }
}

/// Axum middleware that runs the gate and installs the resulting
/// [`IdentityContext`] on the request before forwarding it.
pub async fn authenticate<V: IdentityVerifier>(
    State(gate): State<Arc<AuthGate<V>>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    match gate.authenticate(&parts.headers).await {
        Ok(ctx) => {
            parts.extensions.insert(ctx);
            next.run(Request::from_parts(parts, body)).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::context::{Authenticated, Principal, RequiresPrincipal};
    use crate::auth::verifier::VerificationError;
    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Accepts `good-token`, rejects everything else, counts calls.
    #[derive(Default)]
    struct CountingVerifier {
        calls: AtomicUsize,
    }

    impl CountingVerifier {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn jane() -> Principal {
        Principal::new("uid-jane", Some("jane@example.com".to_string())).unwrap()
    }

    impl IdentityVerifier for CountingVerifier {
        fn verify(
            &self,
            token: &str,
        ) -> impl Future<Output = Result<Principal, VerificationError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if token == "good-token" {
                Ok(jane())
            } else {
                Err(VerificationError::Expired)
            };
            async move { result }
        }
    }

    fn headers(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, authorization.parse().unwrap());
        headers
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc"), Ok("abc"));
        assert_eq!(parse_bearer("bearer abc"), Ok("abc"));
        assert_eq!(parse_bearer("BEARER abc"), Ok("abc"));
    }

    #[test]
    fn test_parse_bearer_malformed() {
        for value in ["Token abc", "Bearer", "Bearer a b", "Bearer  abc", "Bearer ", ""] {
            assert_eq!(
                parse_bearer(value),
                Err(AuthError::MalformedCredential),
                "{value:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_header_passes_through() {
        let gate = AuthGate::new(CountingVerifier::default());

        let ctx = gate.authenticate(&HeaderMap::new()).await.unwrap();
        assert!(!ctx.is_authenticated());
        assert_eq!(gate.verifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_header_is_anonymous() {
        let gate = AuthGate::new(CountingVerifier::default());

        let ctx = gate.authenticate(&headers("")).await.unwrap();
        assert!(!ctx.is_authenticated());
        assert_eq!(gate.verifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_installs_principal() {
        let gate = AuthGate::new(CountingVerifier::default());

        let ctx = gate.authenticate(&headers("Bearer good-token")).await.unwrap();
        assert_eq!(ctx.principal(), Some(&jane()));
        assert_eq!(gate.verifier().calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_header_skips_verifier() {
        let gate = AuthGate::new(CountingVerifier::default());

        for value in ["Token abc", "Bearer", "Bearer a b"] {
            let result = gate.authenticate(&headers(value)).await;
            assert_eq!(result, Err(AuthError::MalformedCredential));
        }
        assert_eq!(gate.verifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_non_utf8_header_is_malformed() {
        let gate = AuthGate::new(CountingVerifier::default());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            http::HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );

        let result = gate.authenticate(&headers).await;
        assert_eq!(result, Err(AuthError::MalformedCredential));
        assert_eq!(gate.verifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_verification_is_rejected() {
        let gate = AuthGate::new(CountingVerifier::default());

        let result = gate.authenticate(&headers("Bearer expired-token")).await;
        assert_eq!(result, Err(AuthError::VerificationFailed));
        assert_eq!(gate.verifier().calls(), 1);
    }

    fn router(gate: Arc<AuthGate<CountingVerifier>>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|ctx: IdentityContext| async move {
                    match ctx.principal() {
                        Some(p) => p.subject_id().to_string(),
                        None => "anonymous".to_string(),
                    }
                }),
            )
            .route(
                "/private",
                get(|Authenticated(p): Authenticated| async move { p.subject_id().to_string() }),
            )
            .layer(axum::middleware::from_fn_with_state(
                gate,
                authenticate::<CountingVerifier>,
            ))
    }

    async fn call(
        gate: &Arc<AuthGate<CountingVerifier>>,
        path: &str,
        authorization: Option<&str>,
    ) -> (StatusCode, String) {
        let mut builder = http::Request::builder().uri(path);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let response = router(gate.clone())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_middleware_anonymous_request() {
        let gate = Arc::new(AuthGate::new(CountingVerifier::default()));

        let (status, body) = call(&gate, "/whoami", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
        assert_eq!(gate.verifier().calls(), 0);
    }

    #[tokio::test]
    async fn test_middleware_authenticated_request() {
        let gate = Arc::new(AuthGate::new(CountingVerifier::default()));

        let (status, body) = call(&gate, "/private", Some("Bearer good-token")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "uid-jane");
        assert_eq!(gate.verifier().calls(), 1);
    }

    #[tokio::test]
    async fn test_middleware_private_route_requires_principal() {
        let gate = Arc::new(AuthGate::new(CountingVerifier::default()));

        let (status, body) = call(&gate, "/private", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Authentication required"));
    }

    #[tokio::test]
    async fn test_middleware_hides_verification_detail() {
        let gate = Arc::new(AuthGate::new(CountingVerifier::default()));

        let (status, body) = call(&gate, "/whoami", Some("Bearer stale")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Invalid authentication token"));
        assert!(!body.contains("expired"));
    }

    #[tokio::test]
    async fn test_middleware_malformed_header() {
        let gate = Arc::new(AuthGate::new(CountingVerifier::default()));

        let (status, _) = call(&gate, "/whoami", Some("Token abc")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(gate.verifier().calls(), 0);
    }
}
