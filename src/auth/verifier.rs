//! ID token verification.

use std::fmt;
use std::future::Future;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::context::Principal;
use crate::auth::jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache};

/// JWKS endpoint for Firebase / Google secure-token ID tokens.
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWKS endpoint URL for key fetching
    pub jwks_url: String,
    /// Expected `iss` claim
    pub issuer: Option<String>,
    /// Expected `aud` claim
    pub audience: Option<String>,
    /// JWKS cache TTL in seconds (default: 3600)
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
    /// Whether to serve a stale key set when a refresh fails
    #[serde(default = "default_allow_stale_jwks")]
    pub allow_stale_jwks: bool,
}

fn default_jwks_cache_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_allow_stale_jwks() -> bool {
    true
}

impl AuthConfig {
    /// Config for an arbitrary JWKS-backed issuer.
    pub fn with_jwks(jwks_url: String, issuer: Option<String>, audience: Option<String>) -> Self {
        Self {
            jwks_url,
            issuer,
            audience,
            jwks_cache_seconds: DEFAULT_CACHE_TTL_SECONDS,
            allow_stale_jwks: true,
        }
    }

    /// Config for Firebase ID tokens issued for `project_id`.
    pub fn firebase(project_id: &str) -> Self {
        Self::with_jwks(
            FIREBASE_JWKS_URL.to_string(),
            Some(format!("https://securetoken.google.com/{}", project_id)),
            Some(project_id.to_string()),
        )
    }

    /// Check that the JWKS URL is an absolute http(s) URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.jwks_url)
            .map_err(|e| anyhow::anyhow!("Invalid JWKS URL `{}`: {}", self.jwks_url, e))?;
        if !matches!(url.scheme(), "https" | "http") {
            anyhow::bail!("JWKS URL must use http or https, got `{}`", url.scheme());
        }
        Ok(())
    }
}

/// Why a token failed verification.
///
/// The detail is for logs only and must not be echoed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Token could not be parsed.
    Malformed(String),
    /// Token is past its expiry.
    Expired,
    /// Signature, issuer, audience or subject check failed.
    Rejected(String),
    /// Signing keys could not be obtained.
    Unavailable(String),
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed token: {}", msg),
            Self::Expired => write!(f, "Token expired"),
            Self::Rejected(msg) => write!(f, "Token rejected: {}", msg),
            Self::Unavailable(msg) => write!(f, "Verification unavailable: {}", msg),
        }
    }
}

impl std::error::Error for VerificationError {}

/// Verifies an opaque bearer token and returns the principal it names.
///
/// Every call re-verifies; implementations must not cache results.
pub trait IdentityVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Principal, VerificationError>> + Send;
}

/// Claims read from an ID token.
#[derive(Debug, Deserialize)]
pub struct IdTokenClaims {
    /// Subject (provider user ID)
    pub sub: String,
    /// Email, when the provider includes it
    #[serde(default)]
    pub email: Option<String>,
    /// Every other claim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdTokenClaims {
    /// Reduce the claim set to a principal.
    pub fn into_principal(self) -> Result<Principal, VerificationError> {
        Principal::new(self.sub, self.email)
            .ok_or_else(|| VerificationError::Rejected("empty subject".to_string()))
    }
}

/// RS256 ID token verifier backed by a JWKS endpoint.
pub struct JwtVerifier {
    keys: JwksCache,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier from config.
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let keys = JwksCache::new(
            config.jwks_url.clone(),
            config.jwks_cache_seconds,
            config.allow_stale_jwks,
        )?;

        let mut validation = Validation::new(Algorithm::RS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self { keys, validation })
    }

    async fn verify_token(&self, token: &str) -> Result<Principal, VerificationError> {
        if token.is_empty() {
            return Err(VerificationError::Malformed("empty token".to_string()));
        }

        let header =
            decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(VerificationError::Rejected(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }

        let key = self
            .keys
            .get_key(header.kid.as_deref())
            .await
            .map_err(|e| VerificationError::Unavailable(e.to_string()))?;

        let data = decode::<IdTokenClaims>(token, &key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => VerificationError::Expired,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) => {
                    VerificationError::Malformed(e.to_string())
                }
                _ => VerificationError::Rejected(e.to_string()),
            }
        })?;

        let principal = data.claims.into_principal()?;
        debug!("ID token verified for subject: {}", principal.subject_id());
        Ok(principal)
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(
        &self,
        token: &str,
    ) -> impl Future<Output = Result<Principal, VerificationError>> + Send {
        self.verify_token(token)
    }
}
