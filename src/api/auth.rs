use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use serde_json::json;

use crate::api::{ApiResult, data};
use crate::gateway::{AppState, Authenticated};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
}

/// The signed-in principal and, if any, its active authority profile.
async fn me(auth: Authenticated, State(state): State<AppState>) -> ApiResult {
    let profile = state
        .authorizer()
        .active_profile(auth.principal.id())
        .await?;

    data(json!({
        "id": auth.principal.id(),
        "email": auth.principal.email(),
        "role": profile.as_ref().map(|p| p.role.as_str()),
        "department": profile.as_ref().and_then(|p| p.department.as_deref()),
    }))
}

async fn logout(auth: Authenticated, State(state): State<AppState>) -> ApiResult {
    state
        .sessions()
        .sign_out(&auth.credential, &auth.principal)
        .await?;

    data(json!({ "signed_out": true }))
}
