use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "interview_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Technical,
    Behavioral,
    Mixed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "interview_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterviewMode {
    Conversational,
    Standard,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[sqlx(type_name = "question_difficulty", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "performance_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

/// Verified caller identity as issued by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub file_size_bytes: Option<i64>,
    pub parsed_json: Value,
    pub resume_summary: Option<String>,
    pub skills: Vec<String>,
    pub experience_years: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewResume {
    pub user_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub file_size_bytes: Option<i64>,
    pub parsed_json: Option<Value>,
    pub resume_summary: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience_years: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResumeUpdate {
    pub file_name: Option<String>,
    pub resume_summary: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience_years: Option<i32>,
    pub parsed_json: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub target_role: String,
    pub experience_level: String,
    pub interview_type: InterviewType,
    pub mode: InterviewMode,
    pub total_questions: i32,
    pub answered_questions: i32,
    pub skipped_questions: i32,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: Option<i32>,
    pub average_score: Option<f64>,
    pub performance_tier: Option<PerformanceTier>,
    pub overall_feedback: Option<Value>,
    pub topics_covered: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Final snapshot of a finished interview, handed over by the live-session store.
#[derive(Clone, Debug, Deserialize)]
pub struct NewSession {
    pub user_id: Uuid,
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
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct InterviewAnswer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub question_number: i32,
    pub question_text: String,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub answer_text: String,
    pub is_skipped: bool,
    pub word_count: i32,
    pub duration_seconds: Option<i32>,
    pub score: Option<f64>,
    pub evaluation_summary: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewAnswer {
    pub question_number: i32,
    pub question_text: String,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub answer_text: String,
    #[serde(default)]
    pub is_skipped: bool,
    pub duration_seconds: Option<i32>,
    pub score: Option<f64>,
    pub evaluation_summary: Option<Value>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AnswerFilter {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub is_skipped: Option<bool>,
}

impl AnswerFilter {
    pub fn matches(&self, answer: &InterviewAnswer) -> bool {
        self.category
            .as_ref()
            .map_or(true, |c| answer.category.as_ref() == Some(c))
            && self.difficulty.map_or(true, |d| answer.difficulty == Some(d))
            && self.is_skipped.map_or(true, |s| answer.is_skipped == s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, FromRow, PartialEq)]
pub struct InterviewStatistics {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total_interviews: i64,
    pub total_questions_answered: i64,
    pub average_overall_score: Option<f64>,
    pub most_common_role: Option<String>,
    pub strongest_category: Option<String>,
    pub weakest_category: Option<String>,
    pub total_time_spent_seconds: i64,
    pub last_interview_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionDetail {
    pub session: InterviewSession,
    pub answers: Vec<InterviewAnswer>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Dashboard {
    pub statistics: Option<InterviewStatistics>,
    pub recent_sessions: Vec<InterviewSession>,
    pub resumes: Vec<Resume>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 1000;

    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }

    pub fn first(limit: i64) -> Self {
        Self::new(limit, 0)
    }

    pub fn all() -> Self {
        Self {
            limit: i64::MAX,
            offset: 0,
        }
    }

    pub(crate) fn bounds(&self) -> (usize, usize) {
        let offset = usize::try_from(self.offset).unwrap_or(0);
        let limit = usize::try_from(self.limit).unwrap_or(usize::MAX);
        (offset, limit)
    }
}
