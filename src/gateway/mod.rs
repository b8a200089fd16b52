//! Request gate shared by every route.
//!
//! `Session Resolver → Role Authorizer → Scoped Executor`. Handlers receive
//! a [`Scoped`] extractor as their first argument, so an unauthenticated or
//! unauthorized request is rejected before any handler code runs.

mod authorizer;
mod executor;
pub mod policy;
mod scope;

use std::marker::PhantomData;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use http::request::Parts;
use tracing::debug;

use crate::auth::{Principal, SessionStore, session_credential};
use crate::config::StatsConfig;
use crate::db::Store;
use crate::error::GatewayError;

pub use authorizer::Authorizer;
pub use executor::ScopedExecutor;
pub use policy::Policy;
pub use scope::{Access, Constraint, Scope, ScopeContext};

/// Shared, read-only application state.
///
/// The backing store is reachable only through the authorizer.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateInner>,
}

struct StateInner {
    sessions: Arc<dyn SessionStore>,
    authorizer: Authorizer,
    backend: &'static str,
    stats: StatsConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, sessions: Arc<dyn SessionStore>, stats: StatsConfig) -> Self {
        Self {
            inner: Arc::new(StateInner {
                sessions,
                backend: store.backend(),
                authorizer: Authorizer::new(store),
                stats,
            }),
        }
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.inner.sessions.as_ref()
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.inner.authorizer
    }

    /// Backend name, `demo` when running without a live store.
    pub fn backend(&self) -> &'static str {
        self.inner.backend
    }

    pub fn stats(&self) -> &StatsConfig {
        &self.inner.stats
    }
}

/// An authenticated caller and the credential it presented.
pub struct Authenticated {
    pub principal: Principal,
    pub credential: String,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let sessions = state.sessions();
        let credential = session_credential(&parts.headers, sessions.session_cookie());

        match sessions.current_principal(credential).await? {
            Some(principal) => Ok(Self {
                principal,
                credential: credential.unwrap_or_default().to_string(),
            }),
            None => {
                debug!(
                    method = %parts.method,
                    path = %parts.uri.path(),
                    "No session principal"
                );
                Err(GatewayError::Unauthenticated)
            }
        }
    }
}

/// Authorized access under policy `P`.
pub struct Scoped<P> {
    executor: ScopedExecutor,
    _policy: PhantomData<P>,
}

impl<P> Scoped<P> {
    pub fn context(&self) -> &ScopeContext {
        self.executor.context()
    }

    pub fn into_inner(self) -> ScopedExecutor {
        self.executor
    }
}

impl<P> std::ops::Deref for Scoped<P> {
    type Target = ScopedExecutor;

    fn deref(&self) -> &ScopedExecutor {
        &self.executor
    }
}

impl<P: Policy> FromRequestParts<AppState> for Scoped<P> {
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated { principal, .. } =
            Authenticated::from_request_parts(parts, state).await?;
        let executor = state.authorizer().authorize(principal, &P::ACCESS).await?;

        Ok(Self {
            executor,
            _policy: PhantomData,
        })
    }
}
