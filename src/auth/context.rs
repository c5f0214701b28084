//! Request-scoped identity.

use axum::extract::FromRequestParts;
use http::request::Parts;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

use crate::auth::gate::AuthError;
use crate::types::SubjectId;

/// Verified identity derived from a bearer credential.
///
/// Immutable once created. It lives for the duration of one request and is
/// never persisted by this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Provider-issued subject identifier (never empty)
    subject_id: SubjectId,
    /// Email claim, if the provider supplied one
    email: Option<String>,
}

impl Principal {
    /// Create a new principal.
    ///
    /// Returns `None` for an empty subject, which the provider should never
    /// issue and this layer refuses to represent.
    pub fn new(subject_id: impl Into<String>, email: Option<String>) -> Option<Self> {
        let subject_id = subject_id.into();
        if subject_id.is_empty() {
            return None;
        }
        Some(Self {
            subject_id: SubjectId::new(subject_id),
            email,
        })
    }

    /// Get the subject identifier.
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// Get the email if available.
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Identity carried by a single request: zero or one principal.
///
/// The gate installs one of these on every request it forwards. Handlers
/// take it as an extractor argument; nothing looks it up ambiently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityContext {
    principal: Option<Principal>,
}

impl IdentityContext {
    /// Context for a request that carried no credential.
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    /// Context for a request whose credential verified.
    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
        }
    }

    /// Whether a verified principal is present.
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// Capability check for operations that need a verified caller.
///
/// The gate never rejects anonymous requests; each operation that needs an
/// identity asks for one through this trait instead.
pub trait RequiresPrincipal {
    /// The principal, if one was verified.
    fn principal(&self) -> Option<&Principal>;

    /// The principal, or `AuthError::Unauthenticated`.
    fn require_principal(&self) -> Result<&Principal, AuthError> {
        self.principal().ok_or(AuthError::Unauthenticated)
    }
}

impl RequiresPrincipal for IdentityContext {
    fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

impl RequiresPrincipal for Option<Principal> {
    fn principal(&self) -> Option<&Principal> {
        self.as_ref()
    }
}

impl<S> FromRequestParts<S> for IdentityContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Routes mounted without the gate see an empty context.
        Ok(parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extractor for handlers that require a verified principal.
///
/// Rejects with 401 when the request carried no credential.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .unwrap_or_default();
        let principal = ctx.require_principal()?.clone();
        Ok(Authenticated(principal))
    }
}
