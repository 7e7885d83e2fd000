use crate::domain::models::{
    AnswerFilter, InterviewMode, InterviewType, NewAnswer, NewSession, PerformanceTier,
};
use crate::state::SharedState;
use crate::web::auth::AuthUser;
use crate::web::extract::{ApiJson, ApiPath, ApiQuery};
use crate::web::{ApiError, ListQuery};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Final snapshot of a finished interview.
#[derive(Deserialize)]
pub struct CompleteSessionPayload {
    pub resume_id: Option<Uuid>,
    pub target_role: String,
    pub experience_level: String,
    pub interview_type: InterviewType,
    pub mode: InterviewMode,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub skipped_questions: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub average_score: Option<f64>,
    pub performance_tier: Option<PerformanceTier>,
    pub overall_feedback: Option<Value>,
    pub topics_covered: Option<Vec<String>>,
    #[serde(default)]
    pub answers: Vec<NewAnswer>,
}

#[derive(Deserialize)]
pub struct AnswersPayload {
    pub answers: Vec<NewAnswer>,
}

#[derive(Deserialize)]
pub struct TopicQuery {
    pub topic: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/complete", post(complete_session))
        .route("/sessions/search", get(search_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/answers", post(add_answers))
        .route("/answers", get(find_answers))
        .with_state(state)
}

async fn complete_session(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<CompleteSessionPayload>,
) -> Result<Json<Value>, ApiError> {
    let new = NewSession {
        user_id: user.user_id(),
        resume_id: payload.resume_id,
        target_role: payload.target_role,
        experience_level: payload.experience_level,
        interview_type: payload.interview_type,
        mode: payload.mode,
        total_questions: payload.total_questions,
        answered_questions: payload.answered_questions,
        skipped_questions: payload.skipped_questions,
        completed_at: payload.completed_at,
        duration_seconds: payload.duration_seconds,
        average_score: payload.average_score,
        performance_tier: payload.performance_tier,
        overall_feedback: payload.overall_feedback,
        topics_covered: payload.topics_covered,
    };
    let detail = state
        .vault
        .complete_session(&user.caller(), new, payload.answers)
        .await?;
    Ok(Json(json!({
        "success": true,
        "session_id": detail.session.id,
        "session": detail.session,
        "answers": detail.answers,
    })))
}

async fn list_sessions(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state
        .vault
        .list_sessions(&user.caller(), Some(user.user_id()), query.page())
        .await?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

async fn search_sessions(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<TopicQuery>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state
        .vault
        .find_sessions_by_topic(&user.caller(), Some(user.user_id()), &query.topic)
        .await?;
    Ok(Json(json!({ "success": true, "sessions": sessions })))
}

async fn get_session(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.vault.get_session_detail(&user.caller(), id).await?;
    Ok(Json(json!({
        "success": true,
        "session": detail.session,
        "answers": detail.answers,
    })))
}

async fn delete_session(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.vault.delete_session(&user.caller(), id).await?;
    Ok(Json(json!({ "success": true, "session_id": id })))
}

async fn add_answers(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AnswersPayload>,
) -> Result<Json<Value>, ApiError> {
    let answers = state
        .vault
        .insert_answers(&user.caller(), id, payload.answers)
        .await?;
    Ok(Json(json!({ "success": true, "count": answers.len(), "answers": answers })))
}

async fn find_answers(
    user: AuthUser,
    State(state): State<SharedState>,
    ApiQuery(filter): ApiQuery<AnswerFilter>,
) -> Result<Json<Value>, ApiError> {
    let answers = state
        .vault
        .find_answers(&user.caller(), Some(user.user_id()), &filter)
        .await?;
    Ok(Json(json!({ "success": true, "answers": answers })))
}
