use crate::domain::models::{NewResume, ResumeUpdate};
use crate::state::SharedState;
use crate::web::auth::AuthUser;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use crate::web::{ApiError, ListQuery};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Resume metadata for a file that is already stored.
#[derive(Deserialize)]
pub struct ResumePayload {
    pub file_name: String,
    pub file_url: String,
    pub file_size_bytes: Option<i64>,
    pub parsed_json: Option<Value>,
    pub resume_summary: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience_years: Option<i32>,
}

#[derive(Deserialize)]
pub struct UploadPayload {
    pub file_name: String,
    pub content_base64: String,
    /// Output of the resume parser for this file.
    pub parsed_json: Option<Value>,
}

#[derive(Deserialize)]
pub struct SkillQuery {
    pub skill: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/resume", post(create_resume))
        .route("/resumes", get(list_resumes))
        .route("/resumes/upload", post(upload_resume))
        .route("/resumes/search", get(search_resumes))
        .route(
            "/resumes/:id",
            get(get_resume).patch(update_resume).delete(delete_resume),
        )
        .with_state(state)
}

async fn create_resume(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<ResumePayload>,
) -> Result<Json<Value>, ApiError> {
    // owner always comes from the token
    let new = NewResume {
        user_id: user.user_id(),
        file_name: payload.file_name,
        file_url: payload.file_url,
        file_size_bytes: payload.file_size_bytes,
        parsed_json: payload.parsed_json,
        resume_summary: payload.resume_summary,
        skills: payload.skills,
        experience_years: payload.experience_years,
    };
    let resume = state.vault.create_resume(&user.caller(), new).await?;
    Ok(Json(json!({ "success": true, "resume": resume })))
}

async fn upload_resume(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<UploadPayload>,
) -> Result<Json<Value>, ApiError> {
    let content = general_purpose::STANDARD
        .decode(payload.content_base64.trim())
        .map_err(|_| ApiError::BadRequest("file content is not valid base64".to_string()))?;
    let size = i64::try_from(content.len()).unwrap_or(i64::MAX);

    let file_url = state
        .blobs
        .put(user.user_id(), &payload.file_name, content)
        .await?;

    let new = NewResume {
        user_id: user.user_id(),
        file_name: payload.file_name,
        file_url: file_url.clone(),
        file_size_bytes: Some(size),
        parsed_json: payload.parsed_json,
        resume_summary: None,
        skills: None,
        experience_years: None,
    };
    let resume = match state.vault.create_resume(&user.caller(), new).await {
        Ok(resume) => resume,
        Err(err) => {
            if let Err(cleanup) = state.blobs.delete(&file_url).await {
                tracing::warn!("Failed to remove orphaned upload {}: {}", file_url, cleanup);
            }
            return Err(err.into());
        }
    };

    Ok(Json(json!({
        "success": true,
        "resume_id": resume.id,
        "file_url": resume.file_url,
        "parsed_data": resume.parsed_json,
        "resume": resume,
    })))
}

async fn list_resumes(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let resumes = state
        .vault
        .list_resumes(&user.caller(), Some(user.user_id()), query.page())
        .await?;
    Ok(Json(json!({ "success": true, "resumes": resumes })))
}

async fn search_resumes(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<SkillQuery>,
) -> Result<Json<Value>, ApiError> {
    let resumes = state
        .vault
        .find_resumes_by_skill(&user.caller(), Some(user.user_id()), &query.skill)
        .await?;
    Ok(Json(json!({ "success": true, "resumes": resumes })))
}

async fn get_resume(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let resume = state.vault.get_resume(&user.caller(), id).await?;
    Ok(Json(json!({ "success": true, "resume": resume })))
}

async fn update_resume(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ResumeUpdate>,
) -> Result<Json<Value>, ApiError> {
    let resume = state.vault.update_resume(&user.caller(), id, payload).await?;
    Ok(Json(json!({ "success": true, "resume": resume })))
}

async fn delete_resume(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let resume = state.vault.delete_resume(&user.caller(), id).await?;
    if let Err(e) = state.blobs.delete(&resume.file_url).await {
        tracing::warn!("Resume {} deleted but its file was not: {}", id, e);
    }
    Ok(Json(json!({ "success": true, "resume_id": id })))
}
