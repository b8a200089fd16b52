//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! Session tokens signed with asymmetric keys (RS256 or ES256) are verified
//! against the identity provider's published key set. Keys are cached by
//! `kid` and refreshed after the TTL; a stale set may be used for a bounded
//! time when the endpoint is unreachable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default cache TTL in seconds (1 hour).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Maximum stale cache age in seconds (24 hours).
pub const MAX_STALE_CACHE_SECONDS: u64 = 86400;

/// A single JSON Web Key from a JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA" or "EC".
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    pub n: Option<String>,
    /// RSA exponent (base64url)
    pub e: Option<String>,
    /// EC curve name, e.g. "P-256"
    pub crv: Option<String>,
    /// EC x coordinate (base64url)
    pub x: Option<String>,
    /// EC y coordinate (base64url)
    pub y: Option<String>,
    /// X.509 certificate chain
    pub x5c: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// A verification key together with the algorithm it is used with.
#[derive(Clone)]
pub struct VerificationKey {
    pub decoding_key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Thread-safe JWKS cache with automatic refresh.
pub struct JwksCache {
    jwks_url: String,
    cache_ttl: Duration,
    allow_stale: bool,
    keys: Arc<RwLock<HashMap<String, VerificationKey>>>,
    last_fetch: Arc<RwLock<Option<Instant>>>,
    client: reqwest::Client,
}

impl JwksCache {
    pub fn new(
        jwks_url: String,
        cache_ttl_seconds: u64,
        allow_stale: bool,
    ) -> Result<Self, JwksCacheError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| JwksCacheError::FetchError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            jwks_url,
            cache_ttl: Duration::from_secs(cache_ttl_seconds),
            allow_stale,
            keys: Arc::new(RwLock::new(HashMap::new())),
            last_fetch: Arc::new(RwLock::new(None)),
            client,
        })
    }

    /// Get a verification key by key ID.
    ///
    /// If `kid` is None, returns the first available key. Fetches from the
    /// endpoint when the cache is stale or the key is unknown.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<VerificationKey, JwksCacheError> {
        let should_refresh = {
            let last_fetch = self.last_fetch.read().await;
            match *last_fetch {
                Some(t) => t.elapsed() > self.cache_ttl,
                None => true,
            }
        };

        if !should_refresh && let Some(key) = self.get_from_cache(kid).await {
            return Ok(key);
        }

        match self.fetch_keys().await {
            Ok(()) => self.get_from_cache(kid).await.ok_or_else(|| match kid {
                Some(k) => JwksCacheError::KeyNotFound(k.to_string()),
                None => JwksCacheError::NoKeysAvailable,
            }),
            Err(e) => {
                if self.allow_stale {
                    let stale_ok = self
                        .last_fetch
                        .read()
                        .await
                        .map(|t| t.elapsed() < Duration::from_secs(MAX_STALE_CACHE_SECONDS))
                        .unwrap_or(false);

                    if stale_ok {
                        warn!("JWKS fetch failed, using stale cache: {}", e);
                        if let Some(key) = self.get_from_cache(kid).await {
                            return Ok(key);
                        }
                    }
                }

                Err(e)
            }
        }
    }

    async fn get_from_cache(&self, kid: Option<&str>) -> Option<VerificationKey> {
        let keys = self.keys.read().await;

        match kid {
            Some(k) => keys.get(k).cloned(),
            None => keys.values().next().cloned(),
        }
    }

    /// Fetch keys from the JWKS endpoint and replace the cache.
    pub async fn fetch_keys(&self) -> Result<(), JwksCacheError> {
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

        let jwks: JwksDocument = response
            .json()
            .await
            .map_err(|e| JwksCacheError::ParseError(e.to_string()))?;

        let new_keys = Self::parse_document(jwks);
        if new_keys.is_empty() {
            return Err(JwksCacheError::NoValidKeys);
        }

        let count = new_keys.len();
        *self.keys.write().await = new_keys;
        *self.last_fetch.write().await = Some(Instant::now());

        debug!("Cached {} JWKS keys", count);
        Ok(())
    }

    /// Convert every usable signing key in a document, keyed by `kid`.
    fn parse_document(jwks: JwksDocument) -> HashMap<String, VerificationKey> {
        let mut keys = HashMap::new();

        for jwk in jwks.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                debug!("Skipping encryption key");
                continue;
            }

            match Self::jwk_to_key(&jwk) {
                Ok(key) => {
                    let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                    keys.insert(kid, key);
                }
                Err(e) => warn!("Failed to parse JWK: {}", e),
            }
        }

        keys
    }

    fn jwk_to_key(jwk: &Jwk) -> Result<VerificationKey, JwksCacheError> {
        match jwk.kty.as_str() {
            "RSA" => {
                // x5c holds standard (not URL-safe) base64 DER
                if let Some(cert) = jwk.x5c.as_ref().and_then(|c| c.first()) {
                    let der = base64::engine::general_purpose::STANDARD
                        .decode(cert)
                        .map_err(|e| JwksCacheError::ParseError(format!("Invalid x5c: {}", e)))?;
                    return Ok(VerificationKey {
                        decoding_key: DecodingKey::from_rsa_der(&der),
                        algorithm: Algorithm::RS256,
                    });
                }

                let (n, e) = jwk.n.as_ref().zip(jwk.e.as_ref()).ok_or_else(|| {
                    JwksCacheError::ParseError("RSA key needs 'n' and 'e'".to_string())
                })?;
                let decoding_key = DecodingKey::from_rsa_components(n, e).map_err(|e| {
                    JwksCacheError::ParseError(format!("Invalid RSA components: {}", e))
                })?;
                Ok(VerificationKey {
                    decoding_key,
                    algorithm: Algorithm::RS256,
                })
            }
            "EC" => {
                if jwk.crv.as_deref().is_some_and(|c| c != "P-256") {
                    return Err(JwksCacheError::ParseError(format!(
                        "Unsupported curve: {:?}",
                        jwk.crv
                    )));
                }
                let (x, y) = jwk.x.as_ref().zip(jwk.y.as_ref()).ok_or_else(|| {
                    JwksCacheError::ParseError("EC key needs 'x' and 'y'".to_string())
                })?;
                let decoding_key = DecodingKey::from_ec_components(x, y).map_err(|e| {
                    JwksCacheError::ParseError(format!("Invalid EC components: {}", e))
                })?;
                Ok(VerificationKey {
                    decoding_key,
                    algorithm: Algorithm::ES256,
                })
            }
            other => Err(JwksCacheError::ParseError(format!(
                "Unsupported key type: {}",
                other
            ))),
        }
    }

    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn clear(&self) {
        self.keys.write().await.clear();
        *self.last_fetch.write().await = None;
    }
}

/// Errors that can occur when working with the JWKS cache.
#[derive(Debug, Clone)]
pub enum JwksCacheError {
    FetchError(String),
    ParseError(String),
    NoValidKeys,
    KeyNotFound(String),
    NoKeysAvailable,
}

impl std::fmt::Display for JwksCacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
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
