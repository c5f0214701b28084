//! Signing-key cache for ID token verification.
//!
//! The identity provider publishes its RSA signing keys as a JWKS document
//! and rotates them slowly. Keys are cached by `kid` and refreshed when the
//! TTL lapses or an unknown `kid` shows up. Verification results themselves
//! are never cached.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum age of a stale key set that may still be served when a refresh
/// fails (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// Minimum age of the cached key set before an unknown `kid` may trigger a
/// refetch.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for a single JWKS fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A single JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (only "RSA" is used)
    pub kty: String,
    /// Key ID, matched against the token header
    pub kid: Option<String>,
    /// Algorithm (e.g., "RS256")
    pub alg: Option<String>,
    /// Key use ("sig" or "enc")
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
}

impl Jwk {
    /// Whether this key can verify RS256 signatures.
    fn is_rsa_signing_key(&self) -> bool {
        self.kty == "RSA"
            && self.key_use.as_deref() != Some("enc")
            && self.alg.as_deref().is_none_or(|alg| alg == "RS256")
    }

    fn to_decoding_key(&self) -> Result<DecodingKey, JwksCacheError> {
        let (Some(n), Some(e)) = (&self.n, &self.e) else {
            return Err(JwksCacheError::ParseError(
                "RSA key is missing 'n' or 'e'".to_string(),
            ));
        };

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| JwksCacheError::ParseError(format!("Invalid RSA components: {}", e)))
    }
}

/// A JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

impl JwksDocument {
    /// Convert every usable signing key into a decoding key, keyed by `kid`.
    ///
    /// Keys without a `kid` are stored under `"default"`.
    fn decoding_keys(&self) -> HashMap<String, DecodingKey> {
        let mut keys = HashMap::new();

        for jwk in &self.keys {
            if !jwk.is_rsa_signing_key() {
                debug!("Skipping non-signing or non-RSA key: {:?}", jwk.kid);
                continue;
            }

            match jwk.to_decoding_key() {
                Ok(key) => {
                    let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                    keys.insert(kid, key);
                }
                Err(e) => warn!("Failed to parse JWK {:?}: {}", jwk.kid, e),
            }
        }

        keys
    }
}

/// Currently cached key set.
struct KeySet {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeySet {
    fn lookup(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(k) => self.keys.get(k).cloned(),
            // Only unambiguous when the provider publishes a single key.
            None if self.keys.len() == 1 => self.keys.values().next().cloned(),
            None => None,
        }
    }
}

/// Thread-safe JWKS cache.
pub struct JwksCache {
    jwks_url: String,
    cache_ttl: Duration,
    allow_stale: bool,
    key_set: RwLock<Option<KeySet>>,
    client: reqwest::Client,
}

impl JwksCache {
    /// Create a new cache for the given endpoint.
    pub fn new(
        jwks_url: String,
        cache_ttl_seconds: u64,
        allow_stale: bool,
    ) -> Result<Self, JwksCacheError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| JwksCacheError::FetchError(e.to_string()))?;

        Ok(Self {
            jwks_url,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            allow_stale,
            key_set: RwLock::new(None),
            client,
        })
    }

    /// Get the decoding key for `kid`, refreshing the key set when it is
    /// expired or does not contain the key.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<DecodingKey, JwksCacheError> {
        {
            let key_set = self.key_set.read().await;
            if let Some(set) = key_set.as_ref() {
                let age = set.fetched_at.elapsed();
                if age <= self.cache_ttl
                    && let Some(key) = set.lookup(kid)
                {
                    return Ok(key);
                }
                // Unknown kids against a fresh set are not worth a refetch.
                if age < MIN_REFRESH_INTERVAL {
                    return set.lookup(kid).ok_or_else(|| missing_key(kid));
                }
            }
        }

        match self.refresh().await {
            Ok(()) => self.cached_key(kid).await.ok_or_else(|| missing_key(kid)),
            Err(e) if self.allow_stale => {
                let key_set = self.key_set.read().await;
                let stale = key_set.as_ref().filter(|set| {
                    set.fetched_at.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS)
                });
                match stale.and_then(|set| set.lookup(kid)) {
                    Some(key) => {
                        warn!("JWKS fetch failed, using stale key set: {}", e);
                        Ok(key)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn cached_key(&self, kid: Option<&str>) -> Option<DecodingKey> {
        self.key_set
            .read()
            .await
            .as_ref()
            .and_then(|set| set.lookup(kid))
    }

    /// Fetch the key set from the endpoint and replace the cache.
    pub async fn refresh(&self) -> Result<(), JwksCacheError> {
        debug!("Fetching JWKS from {}", self.jwks_url);

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| JwksCacheError::FetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JwksCacheError::FetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| JwksCacheError::ParseError(e.to_string()))?;

        self.install(&document).await
    }

    /// Replace the cached key set with the keys of `document`.
    async fn install(&self, document: &JwksDocument) -> Result<(), JwksCacheError> {
        let keys = document.decoding_keys();
        if keys.is_empty() {
            return Err(JwksCacheError::NoValidKeys);
        }

        debug!("Cached {} signing keys", keys.len());
        *self.key_set.write().await = Some(KeySet {
            keys,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

}

fn missing_key(kid: Option<&str>) -> JwksCacheError {
    match kid {
        Some(k) => JwksCacheError::KeyNotFound(k.to_string()),
        None => JwksCacheError::NoKeysAvailable,
    }
}

/// Errors from the signing-key cache.
#[derive(Debug, Clone)]
pub enum JwksCacheError {
    /// Endpoint unreachable or returned a non-success status.
    FetchError(String),
    /// Response was not a usable JWKS document.
    ParseError(String),
    /// Document contained no RSA signing keys.
    NoValidKeys,
    /// No key matches the token's `kid`.
    KeyNotFound(String),
    /// Token has no `kid` and the key set is ambiguous or empty.
    NoKeysAvailable,
}

impl fmt::Display for JwksCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchError(msg) => write!(f, "Failed to fetch JWKS: {}", msg),
            Self::ParseError(msg) => write!(f, "Failed to parse JWKS: {}", msg),
            Self::NoValidKeys => write!(f, "No valid keys found in JWKS"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {}", kid),
            Self::NoKeysAvailable => write!(f, "No keys available in cache"),
        }
    }
}

impl std::error::Error for JwksCacheError {}
