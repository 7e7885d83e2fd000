//! Postgres storage engine.
//!
//! Each call runs in its own transaction that first publishes the caller through
//! `set_request_context`, so the row-level-security policies from the migrations apply on top
//! of the checks done in `Vault`.

use crate::access::{Caller, EntityKind, Operation};
use crate::domain::models::{
    AnswerFilter, Identity, InterviewAnswer, InterviewSession, InterviewStatistics, Page, Resume,
    UserProfile,
};
use crate::domain::statistics;
use crate::error::{StoreError, StoreResult};
use crate::store::StorageEngine;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, full_name, email, avatar_url, created_at, updated_at";

const RESUME_COLUMNS: &str = "id, user_id, file_name, file_url, file_size_bytes, parsed_json, \
     resume_summary, skills, experience_years, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, user_id, resume_id, target_role, experience_level, \
     interview_type, mode, total_questions, answered_questions, skipped_questions, completed_at, \
     duration_seconds, average_score, performance_tier, overall_feedback, topics_covered, created_at";

const ANSWER_COLUMNS: &str = "id, session_id, question_number, question_text, category, \
     difficulty, answer_text, is_skipped, word_count, duration_seconds, score, \
     evaluation_summary, created_at";

const STATISTICS_COLUMNS: &str = "id, user_id, total_interviews, total_questions_answered, \
     average_overall_score, most_common_role, strongest_category, weakest_category, \
     total_time_spent_seconds, last_interview_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, caller: &Caller) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_request_context($1, $2)")
            .bind(caller.user_id())
            .bind(caller.is_service())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn insert_answer_rows(
        tx: &mut Transaction<'static, Postgres>,
        answers: &[InterviewAnswer],
    ) -> StoreResult<()> {
        if answers.is_empty() {
            return Ok(());
        }
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO interview_answers ({}) ", ANSWER_COLUMNS));
        builder.push_values(answers, |mut row, answer| {
            row.push_bind(answer.id)
                .push_bind(answer.session_id)
                .push_bind(answer.question_number)
                .push_bind(answer.question_text.clone())
                .push_bind(answer.category.clone())
                .push_bind(answer.difficulty)
                .push_bind(answer.answer_text.clone())
                .push_bind(answer.is_skipped)
                .push_bind(answer.word_count)
                .push_bind(answer.duration_seconds)
                .push_bind(answer.score)
                .push_bind(answer.evaluation_summary.clone())
                .push_bind(answer.created_at);
        });
        builder.build().execute(&mut **tx).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageEngine for PgStore {
    async fn register_user(&self, caller: &Caller, identity: &Identity) -> StoreResult<()> {
        let mut tx = self.begin(caller).await?;
        sqlx::query(
            r#"
            INSERT INTO app_users (id, email)
            VALUES ($1, $2)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(identity.user_id)
        .bind(&identity.email)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_user(&self, caller: &Caller, user_id: Uuid) -> StoreResult<bool> {
        caller.require_service(Operation::Delete, EntityKind::User)?;
        let mut tx = self.begin(caller).await?;
        let result = sqlx::query("DELETE FROM app_users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn owner_of(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<Uuid>> {
        let sql = match kind {
            EntityKind::User | EntityKind::Profile => "SELECT id FROM app_users WHERE id = $1",
            EntityKind::Resume => "SELECT user_id FROM resumes WHERE id = $1",
            EntityKind::Session => "SELECT user_id FROM interview_sessions WHERE id = $1",
            EntityKind::Answer => {
                r#"
                SELECT s.user_id
                FROM interview_answers a
                JOIN interview_sessions s ON s.id = a.session_id
                WHERE a.id = $1
                "#
            }
            EntityKind::Statistics => "SELECT user_id FROM interview_statistics WHERE id = $1",
        };
        let mut tx = self.begin(&Caller::service()).await?;
        let owner = sqlx::query_scalar::<_, Uuid>(sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(owner)
    }

    async fn upsert_profile(&self, caller: &Caller, profile: &UserProfile) -> StoreResult<UserProfile> {
        let mut tx = self.begin(caller).await?;
        let stored = sqlx::query_as::<_, UserProfile>(&format!(
            r#"
            INSERT INTO user_profiles ({cols})
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name,
                email = EXCLUDED.email,
                avatar_url = EXCLUDED.avatar_url,
                updated_at = EXCLUDED.updated_at
            RETURNING {cols}
            "#,
            cols = PROFILE_COLUMNS
        ))
        .bind(profile.id)
        .bind(&profile.full_name)
        .bind(&profile.email)
        .bind(&profile.avatar_url)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_profile(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        let mut tx = self.begin(caller).await?;
        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {} FROM user_profiles WHERE id = $1",
            PROFILE_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(profile)
    }

    async fn insert_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<()> {
        let mut tx = self.begin(caller).await?;
        sqlx::query(&format!(
            r#"
            INSERT INTO resumes ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
            RESUME_COLUMNS
        ))
        .bind(resume.id)
        .bind(resume.user_id)
        .bind(&resume.file_name)
        .bind(&resume.file_url)
        .bind(resume.file_size_bytes)
        .bind(&resume.parsed_json)
        .bind(&resume.resume_summary)
        .bind(&resume.skills)
        .bind(resume.experience_years)
        .bind(resume.created_at)
        .bind(resume.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        tracing::debug!("Resume {} stored for user {}", resume.id, resume.user_id);
        Ok(())
    }

    async fn get_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<Resume>> {
        let mut tx = self.begin(caller).await?;
        let resume = sqlx::query_as::<_, Resume>(&format!("SELECT {} FROM resumes WHERE id = $1", RESUME_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(resume)
    }

    async fn list_resumes(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<Resume>> {
        let mut tx = self.begin(caller).await?;
        let resumes = sqlx::query_as::<_, Resume>(&format!(
            r#"
            SELECT {}
            FROM resumes
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            RESUME_COLUMNS
        ))
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(resumes)
    }

    async fn resumes_with_skill(&self, caller: &Caller, user_id: Uuid, skill: &str) -> StoreResult<Vec<Resume>> {
        let mut tx = self.begin(caller).await?;
        let resumes = sqlx::query_as::<_, Resume>(&format!(
            r#"
            SELECT {}
            FROM resumes
            WHERE user_id = $1 AND skills @> ARRAY[$2]::TEXT[]
            ORDER BY created_at DESC
            "#,
            RESUME_COLUMNS
        ))
        .bind(user_id)
        .bind(skill)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(resumes)
    }

    async fn update_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<bool> {
        let mut tx = self.begin(caller).await?;
        let result = sqlx::query(
            r#"
            UPDATE resumes
            SET file_name = $2,
                parsed_json = $3,
                resume_summary = $4,
                skills = $5,
                experience_years = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(resume.id)
        .bind(&resume.file_name)
        .bind(&resume.parsed_json)
        .bind(&resume.resume_summary)
        .bind(&resume.skills)
        .bind(resume.experience_years)
        .bind(resume.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.begin(caller).await?;
        let result = sqlx::query("DELETE FROM resumes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_session(
        &self,
        caller: &Caller,
        session: &InterviewSession,
        answers: &[InterviewAnswer],
    ) -> StoreResult<()> {
        let mut tx = self.begin(caller).await?;
        sqlx::query(&format!(
            r#"
            INSERT INTO interview_sessions ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
            SESSION_COLUMNS
        ))
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.resume_id)
        .bind(&session.target_role)
        .bind(&session.experience_level)
        .bind(session.interview_type)
        .bind(session.mode)
        .bind(session.total_questions)
        .bind(session.answered_questions)
        .bind(session.skipped_questions)
        .bind(session.completed_at)
        .bind(session.duration_seconds)
        .bind(session.average_score)
        .bind(session.performance_tier)
        .bind(&session.overall_feedback)
        .bind(&session.topics_covered)
        .bind(session.created_at)
        .execute(&mut *tx)
        .await?;

        // dropping tx on error rolls the session back with the batch
        Self::insert_answer_rows(&mut tx, answers).await?;
        tx.commit().await?;
        tracing::debug!(
            "Session {} stored with {} answers for user {}",
            session.id,
            answers.len(),
            session.user_id
        );
        Ok(())
    }

    async fn get_session(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<InterviewSession>> {
        let mut tx = self.begin(caller).await?;
        let session = sqlx::query_as::<_, InterviewSession>(&format!(
            "SELECT {} FROM interview_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(session)
    }

    async fn list_sessions(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<InterviewSession>> {
        let mut tx = self.begin(caller).await?;
        let sessions = fetch_user_sessions(&mut tx, user_id, page).await?;
        tx.commit().await?;
        Ok(sessions)
    }

    async fn sessions_with_topic(
        &self,
        caller: &Caller,
        user_id: Uuid,
        topic: &str,
    ) -> StoreResult<Vec<InterviewSession>> {
        let mut tx = self.begin(caller).await?;
        let sessions = sqlx::query_as::<_, InterviewSession>(&format!(
            r#"
            SELECT {}
            FROM interview_sessions
            WHERE user_id = $1 AND topics_covered @> ARRAY[$2]::TEXT[]
            ORDER BY completed_at DESC
            "#,
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(topic)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(sessions)
    }

    async fn delete_session(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.begin(caller).await?;
        let result = sqlx::query("DELETE FROM interview_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_answers(&self, caller: &Caller, session_id: Uuid, answers: &[InterviewAnswer]) -> StoreResult<()> {
        let mut tx = self.begin(caller).await?;
        // lock the parent so concurrent batches for one session serialize
        let locked = sqlx::query_scalar::<_, Uuid>("SELECT id FROM interview_sessions WHERE id = $1 FOR UPDATE")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::Referential("session"));
        }
        Self::insert_answer_rows(&mut tx, answers).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_answers(&self, caller: &Caller, session_id: Uuid) -> StoreResult<Vec<InterviewAnswer>> {
        let mut tx = self.begin(caller).await?;
        let answers = sqlx::query_as::<_, InterviewAnswer>(&format!(
            r#"
            SELECT {}
            FROM interview_answers
            WHERE session_id = $1
            ORDER BY question_number ASC
            "#,
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(answers)
    }

    async fn find_answers(
        &self,
        caller: &Caller,
        user_id: Uuid,
        filter: &AnswerFilter,
    ) -> StoreResult<Vec<InterviewAnswer>> {
        let mut tx = self.begin(caller).await?;
        let answers = fetch_user_answers(&mut tx, user_id, filter).await?;
        tx.commit().await?;
        Ok(answers)
    }

    async fn rebuild_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
        caller.require_service(Operation::Update, EntityKind::Statistics)?;
        let mut tx = self.begin(caller).await?;
        // one rebuild per user at a time, released at commit
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::TEXT, 0))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let sessions = fetch_user_sessions(&mut tx, user_id, Page::all()).await?;
        let answers = fetch_user_answers(&mut tx, user_id, &AnswerFilter::default()).await?;
        let existing = fetch_statistics(&mut tx, user_id).await?;
        let stored = match statistics::rebuild(user_id, &sessions, &answers, existing.as_ref(), Utc::now()) {
            Some(row) => Some(upsert_statistics_row(&mut tx, &row).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(stored)
    }

    async fn get_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
        let mut tx = self.begin(caller).await?;
        let stats = fetch_statistics(&mut tx, user_id).await?;
        tx.commit().await?;
        Ok(stats)
    }
}

async fn fetch_user_sessions(
    conn: &mut PgConnection,
    user_id: Uuid,
    page: Page,
) -> StoreResult<Vec<InterviewSession>> {
    let sessions = sqlx::query_as::<_, InterviewSession>(&format!(
        r#"
        SELECT {}
        FROM interview_sessions
        WHERE user_id = $1
        ORDER BY completed_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
        SESSION_COLUMNS
    ))
    .bind(user_id)
    .bind(page.limit)
    .bind(page.offset)
    .fetch_all(conn)
    .await?;
    Ok(sessions)
}

async fn fetch_user_answers(
    conn: &mut PgConnection,
    user_id: Uuid,
    filter: &AnswerFilter,
) -> StoreResult<Vec<InterviewAnswer>> {
    let answers = sqlx::query_as::<_, InterviewAnswer>(
        r#"
        SELECT a.id, a.session_id, a.question_number, a.question_text, a.category,
               a.difficulty, a.answer_text, a.is_skipped, a.word_count, a.duration_seconds,
               a.score, a.evaluation_summary, a.created_at
        FROM interview_answers a
        JOIN interview_sessions s ON s.id = a.session_id
        WHERE s.user_id = $1
          AND ($2::TEXT IS NULL OR a.category = $2)
          AND ($3::question_difficulty IS NULL OR a.difficulty = $3)
          AND ($4::BOOLEAN IS NULL OR a.is_skipped = $4)
        ORDER BY s.completed_at DESC, a.question_number ASC
        "#,
    )
    .bind(user_id)
    .bind(&filter.category)
    .bind(filter.difficulty)
    .bind(filter.is_skipped)
    .fetch_all(conn)
    .await?;
    Ok(answers)
}

async fn fetch_statistics(conn: &mut PgConnection, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
    let stats = sqlx::query_as::<_, InterviewStatistics>(&format!(
        "SELECT {} FROM interview_statistics WHERE user_id = $1",
        STATISTICS_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(stats)
}

async fn upsert_statistics_row(
    conn: &mut PgConnection,
    stats: &InterviewStatistics,
) -> StoreResult<InterviewStatistics> {
    let stored = sqlx::query_as::<_, InterviewStatistics>(&format!(
        r#"
        INSERT INTO interview_statistics ({cols})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (user_id) DO UPDATE
        SET total_interviews = EXCLUDED.total_interviews,
            total_questions_answered = EXCLUDED.total_questions_answered,
            average_overall_score = EXCLUDED.average_overall_score,
            most_common_role = EXCLUDED.most_common_role,
            strongest_category = EXCLUDED.strongest_category,
            weakest_category = EXCLUDED.weakest_category,
            total_time_spent_seconds = EXCLUDED.total_time_spent_seconds,
            last_interview_at = EXCLUDED.last_interview_at,
            updated_at = EXCLUDED.updated_at
        RETURNING {cols}
        "#,
        cols = STATISTICS_COLUMNS
    ))
    .bind(stats.id)
    .bind(stats.user_id)
    .bind(stats.total_interviews)
    .bind(stats.total_questions_answered)
    .bind(stats.average_overall_score)
    .bind(&stats.most_common_role)
    .bind(&stats.strongest_category)
    .bind(&stats.weakest_category)
    .bind(stats.total_time_spent_seconds)
    .bind(stats.last_interview_at)
    .bind(stats.created_at)
    .bind(stats.updated_at)
    .fetch_one(conn)
    .await?;
    Ok(stored)
}
