use crate::domain::models::ProfileUpdate;
use crate::state::SharedState;
use crate::web::auth::AuthUser;
use crate::web::extract::ApiJson;
use crate::web::ApiError;
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/profile", get(get_profile).post(upsert_profile))
        .with_state(state)
}

async fn get_profile(user: AuthUser, State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let profile = state.vault.get_profile(&user.caller(), user.user_id()).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

async fn upsert_profile(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiJson(mut payload): ApiJson<ProfileUpdate>,
) -> Result<Json<Value>, ApiError> {
    // fall back to the email carried by the token
    if payload.email.is_none() {
        payload.email = user.0.email.clone();
    }
    let profile = state
        .vault
        .upsert_profile(&user.caller(), user.user_id(), payload)
        .await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}
