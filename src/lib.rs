// Core modules
pub mod api;
pub mod auth;
pub mod db;
pub mod model;
pub mod types;

// Re-export key types and functions
pub use auth::{
    AuthConfig, AuthError, AuthGate, Authenticated, IdentityContext, IdentityVerifier,
    JwtVerifier, Principal, RequiresPrincipal, VerificationError,
};
pub use db::{DatabaseConfig, Store, StoreError, UpdateBuilder, UpdateOutcome, create_pool};
pub use types::{EntityId, SubjectId};

use std::sync::Arc;

use anyhow::Result;
use axum::Router;

/// Build the full HTTP application: pool, store, JWT gate and router.
///
/// No connection is opened here; signing keys are fetched on first use.
pub fn create_app(db_config: &DatabaseConfig, auth_config: &AuthConfig) -> Result<Router> {
    let store = Store::new(create_pool(db_config)?);
    let gate = Arc::new(AuthGate::new(JwtVerifier::new(auth_config)?));
    Ok(api::create_router(store, gate))
}
