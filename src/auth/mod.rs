//! Authentication and request identity.
//!
//! Bearer ID tokens are verified against the identity provider's published
//! signing keys:
//!
//! - **Gate**: runs once per request, parses `Authorization: Bearer <token>`
//!   and installs an [`IdentityContext`] on the request
//! - **Verifier**: turns a token into a [`Principal`] (subject + email)
//! - **Context**: handlers receive the identity as an extractor argument and
//!   call [`RequiresPrincipal::require_principal`] when they need one
//!
//! ## Security Model
//!
//! - Requests without credentials are forwarded with an empty context
//! - Malformed or unverifiable credentials are rejected with 401 before any
//!   handler runs
//! - Verification failure detail is logged, never returned to the client
//!
//! ## Usage
//!
//! ```ignore
//! let gate = Arc::new(AuthGate::new(JwtVerifier::new(&AuthConfig::firebase("my-project"))?));
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(axum::middleware::from_fn_with_state(gate, authenticate::<JwtVerifier>));
//!
//! async fn me(Authenticated(principal): Authenticated) -> String {
//!     principal.subject_id().to_string()
//! }
//! ```

mod context;
mod gate;
pub mod jwks;
mod verifier;

pub use context::{Authenticated, IdentityContext, Principal, RequiresPrincipal};
pub use gate::{AuthError, AuthGate, authenticate, parse_bearer};
pub use jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksCacheError};
pub use verifier::{
    AuthConfig, FIREBASE_JWKS_URL, IdTokenClaims, IdentityVerifier, JwtVerifier,
    VerificationError,
};
