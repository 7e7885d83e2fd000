use crate::state::SharedState;
use crate::web::auth::AuthUser;
use crate::web::ApiError;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/statistics", get(get_statistics))
        .route("/statistics/refresh", post(refresh_statistics))
        .route("/dashboard", get(dashboard))
        .with_state(state)
}

async fn get_statistics(user: AuthUser, State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let statistics = state
        .vault
        .get_statistics(&user.caller(), Some(user.user_id()))
        .await?;
    Ok(Json(json!({ "success": true, "statistics": statistics })))
}

async fn refresh_statistics(user: AuthUser, State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let statistics = state
        .vault
        .refresh_statistics(&user.caller(), user.user_id())
        .await?;
    Ok(Json(json!({ "success": true, "statistics": statistics })))
}

async fn dashboard(user: AuthUser, State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let dashboard = state.vault.dashboard(&user.caller(), user.user_id()).await?;
    Ok(Json(json!({ "success": true, "dashboard": dashboard })))
}
