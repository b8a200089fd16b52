//! Session resolution: credential in, principal (or nothing) out.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use http::HeaderMap;
use http::header::{AUTHORIZATION, COOKIE};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::auth::jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksCacheError};
use crate::auth::principal::Principal;
use crate::db::{
    Delete, Insert, Predicate, RevokedSessionRecord, Select, Store, StoreFuture, Table,
};
use crate::error::StoreError;
use crate::types::{PrincipalId, RecordKey, SessionDigest};

pub const DEFAULT_SESSION_COOKIE: &str = "edu_sync_session";

/// Clock skew tolerated on `exp`.
pub const TOKEN_LEEWAY_SECONDS: u64 = 60;

/// Token verification settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret for HS256 tokens
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// JWT issuer for validation
    #[serde(default)]
    pub jwt_issuer: Option<String>,
    /// JWT audience for validation; audience is not checked when unset
    #[serde(default)]
    pub jwt_audience: Option<String>,
    /// JWKS endpoint URL for RS256/ES256 keys
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
    #[serde(default = "default_allow_stale_jwks")]
    pub allow_stale_jwks: bool,
    /// Cookie consulted when no bearer token is sent
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

fn default_jwks_cache_seconds() -> u64 {
    DEFAULT_CACHE_TTL_SECONDS
}

fn default_allow_stale_jwks() -> bool {
    true
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
            jwks_url: None,
            jwks_cache_seconds: DEFAULT_CACHE_TTL_SECONDS,
            allow_stale_jwks: true,
            session_cookie: default_session_cookie(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwks_url", &self.jwks_url)
            .field("jwks_cache_seconds", &self.jwks_cache_seconds)
            .field("allow_stale_jwks", &self.allow_stale_jwks)
            .field("session_cookie", &self.session_cookie)
            .finish()
    }
}

impl AuthConfig {
    /// Verify HS256 tokens signed with a shared secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: Some(secret.into()),
            ..Default::default()
        }
    }

    /// Verify asymmetric tokens against a JWKS endpoint.
    pub fn with_jwks(issuer: String, jwks_url: String, audience: Option<String>) -> Self {
        Self {
            jwt_issuer: Some(issuer),
            jwt_audience: audience,
            jwks_url: Some(jwks_url),
            ..Default::default()
        }
    }

    pub fn has_verifier(&self) -> bool {
        self.jwt_secret.as_deref().is_some_and(|s| !s.is_empty()) || self.jwks_url.is_some()
    }
}

/// Errors raised while setting up session verification.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Neither a shared secret nor a JWKS URL was configured.
    NotConfigured,
    Jwks(JwksCacheError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(
                f,
                "No token verifier configured (set a JWT secret or a JWKS URL)"
            ),
            Self::Jwks(e) => write!(f, "JWKS error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

/// JWT claims structure.
#[derive(Debug, Deserialize)]
pub struct JwtClaims {
    /// Subject (principal id)
    pub sub: String,
    pub email: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Resolves session credentials to principals.
///
/// A missing, malformed, expired or revoked credential is `Ok(None)`, never
/// an error; only backing-store failures are errors.
pub trait SessionStore: Send + Sync {
    fn current_principal<'a>(
        &'a self,
        credential: Option<&'a str>,
    ) -> StoreFuture<'a, Option<Principal>>;

    /// Invalidate `credential` so later requests carrying it resolve to no principal.
    fn sign_out<'a>(&'a self, credential: &'a str, principal: &'a Principal) -> StoreFuture<'a, ()>;

    /// Cookie name credentials may arrive in.
    fn session_cookie(&self) -> &str {
        DEFAULT_SESSION_COOKIE
    }
}

/// Verifies signed bearer tokens and tracks sign-outs in the store.
pub struct JwtSessionStore {
    config: AuthConfig,
    jwks_cache: Option<Arc<JwksCache>>,
    store: Arc<dyn Store>,
}

impl JwtSessionStore {
    pub fn new(config: AuthConfig, store: Arc<dyn Store>) -> Result<Self, AuthError> {
        if !config.has_verifier() {
            return Err(AuthError::NotConfigured);
        }

        let jwks_cache = match &config.jwks_url {
            Some(url) => Some(Arc::new(
                JwksCache::new(
                    url.clone(),
                    config.jwks_cache_seconds,
                    config.allow_stale_jwks,
                )
                .map_err(AuthError::Jwks)?,
            )),
            None => None,
        };

        Ok(Self {
            config,
            jwks_cache,
            store,
        })
    }

    /// Check signature, expiry and optional issuer/audience.
    async fn verify(&self, token: &str) -> Option<JwtClaims> {
        let header = match decode_header(token) {
            Ok(header) => header,
            Err(e) => {
                debug!("Invalid token header: {}", e);
                return None;
            }
        };

        // The key decides the algorithm; a token cannot pick a weaker one.
        let (key, algorithm) = match header.alg {
            Algorithm::HS256 => {
                let secret = self.config.jwt_secret.as_deref().filter(|s| !s.is_empty())?;
                (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256)
            }
            Algorithm::RS256 | Algorithm::ES256 => {
                let cache = self.jwks_cache.as_ref()?;
                match cache.get_key(header.kid.as_deref()).await {
                    Ok(key) if key.algorithm == header.alg => (key.decoding_key, key.algorithm),
                    Ok(key) => {
                        debug!(
                            "Token algorithm {:?} does not match key algorithm {:?}",
                            header.alg, key.algorithm
                        );
                        return None;
                    }
                    Err(e) => {
                        warn!("No verification key for token: {}", e);
                        return None;
                    }
                }
            }
            other => {
                debug!("Unsupported token algorithm: {:?}", other);
                return None;
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = TOKEN_LEEWAY_SECONDS;
        if let Some(issuer) = &self.config.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.config.jwt_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        match decode::<JwtClaims>(token, &key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Token rejected: {}", e);
                None
            }
        }
    }

    async fn is_revoked(&self, digest: &SessionDigest) -> Result<bool, StoreError> {
        let rows = self
            .store
            .select(
                Select::from(Table::RevokedSession)
                    .filter(Predicate::eq("digest", digest.as_str()))
                    .limit(1),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    /// Drop revocations of tokens that no longer verify anyway.
    async fn purge_expired_revocations(&self) -> Result<usize, StoreError> {
        let cutoff = Utc::now().timestamp() - TOKEN_LEEWAY_SECONDS as i64;
        let purged = self
            .store
            .delete(Delete {
                table: Table::RevokedSession,
                predicates: vec![
                    Predicate::Present("expires_at"),
                    Predicate::Range {
                        field: "expires_at",
                        min: None,
                        max: Some(cutoff.into()),
                    },
                ],
            })
            .await?;
        Ok(purged.len())
    }
}

impl SessionStore for JwtSessionStore {
    fn current_principal<'a>(
        &'a self,
        credential: Option<&'a str>,
    ) -> StoreFuture<'a, Option<Principal>> {
        Box::pin(async move {
            let Some(token) = credential else {
                return Ok(None);
            };
            let Some(claims) = self.verify(token).await else {
                return Ok(None);
            };
            if claims.sub.trim().is_empty() {
                debug!("Token has an empty subject");
                return Ok(None);
            }
            if self.is_revoked(&credential_digest(token)).await? {
                debug!(subject = %claims.sub, "Token was signed out");
                return Ok(None);
            }

            Ok(Some(Principal::new(
                PrincipalId::new(claims.sub),
                claims.email,
            )))
        })
    }

    fn sign_out<'a>(&'a self, credential: &'a str, principal: &'a Principal) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let digest = credential_digest(credential);
            if self.is_revoked(&digest).await? {
                return Ok(());
            }

            let expires_at = self
                .verify(credential)
                .await
                .and_then(|claims| i64::try_from(claims.exp).ok());
            let record = RevokedSessionRecord {
                id: RecordKey::generate().into_inner(),
                digest: digest.into_inner(),
                principal_id: principal.id().to_string(),
                revoked_at: Utc::now().to_rfc3339(),
                expires_at,
            };
            self.store.insert(Insert::record(&record)?).await?;
            info!(principal = %principal.id(), "Session signed out");

            let purged = self.purge_expired_revocations().await?;
            if purged > 0 {
                debug!(purged, "Purged expired revocations");
            }
            Ok(())
        })
    }

    fn session_cookie(&self) -> &str {
        &self.config.session_cookie
    }
}

/// Session store for demo mode: nobody is ever signed in.
#[derive(Debug, Clone, Default)]
pub struct DemoSessionStore;

impl SessionStore for DemoSessionStore {
    fn current_principal<'a>(
        &'a self,
        credential: Option<&'a str>,
    ) -> StoreFuture<'a, Option<Principal>> {
        if credential.is_some() {
            debug!("Ignoring credential in demo mode");
        }
        Box::pin(async { Ok(None) })
    }

    fn sign_out<'a>(&'a self, _credential: &'a str, _principal: &'a Principal) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Pull the session credential from a request: bearer token first, then the
/// session cookie.
pub fn session_credential<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}

/// Hash a credential for revocation lookups (raw tokens are never stored).
pub fn credential_digest(credential: &str) -> SessionDigest {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    SessionDigest::new(format!("{:x}", hasher.finalize()))
}
