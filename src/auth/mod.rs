//! Caller identity.
//!
//! Session credentials arrive as a bearer token or a session cookie and are
//! verified as JWTs:
//!
//! - **HS256**: shared secret with the identity provider
//! - **RS256 / ES256**: keys fetched from a JWKS endpoint and cached
//!
//! Sign-in happens at the identity provider. Sign-out records the
//! credential's digest so the token stops resolving before it expires.
//! In demo mode no credential ever resolves.

pub mod jwks;
mod principal;
mod role;
mod session;

pub use jwks::{DEFAULT_CACHE_TTL_SECONDS, JwksCache, JwksCacheError};
pub use principal::Principal;
pub use role::{Role, UnknownRole};
pub use session::{
    AuthConfig, AuthError, DEFAULT_SESSION_COOKIE, DemoSessionStore, JwtClaims, JwtSessionStore,
    SessionStore, credential_digest, session_credential,
};
