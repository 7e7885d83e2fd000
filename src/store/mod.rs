pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::access::{Caller, EntityKind};
use crate::domain::models::{
    AnswerFilter, Identity, InterviewAnswer, InterviewSession, InterviewStatistics, Page, Resume,
    UserProfile,
};
use crate::error::StoreResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence port. Engines enforce primary keys, uniqueness, foreign keys, cascades and
/// ownership natively where they can; `Vault` re-checks ownership on top of every engine.
///
/// Rows arrive fully built (ids and timestamps assigned by the caller).
#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn register_user(&self, caller: &Caller, identity: &Identity) -> StoreResult<()>;
    /// Removes the user and everything owned by it. Returns false if the user was unknown.
    async fn delete_user(&self, caller: &Caller, user_id: Uuid) -> StoreResult<bool>;

    /// Privileged owner lookup used to tell "not yours" apart from "does not exist".
    async fn owner_of(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<Uuid>>;

    async fn upsert_profile(&self, caller: &Caller, profile: &UserProfile) -> StoreResult<UserProfile>;
    async fn get_profile(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<UserProfile>>;

    async fn insert_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<()>;
    async fn get_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<Resume>>;
    /// Newest first.
    async fn list_resumes(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<Resume>>;
    async fn resumes_with_skill(&self, caller: &Caller, user_id: Uuid, skill: &str) -> StoreResult<Vec<Resume>>;
    async fn update_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<bool>;
    /// Sessions that referenced the resume keep existing with `resume_id` cleared.
    async fn delete_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<bool>;

    /// Session and its answers become visible together or not at all.
    async fn insert_session(
        &self,
        caller: &Caller,
        session: &InterviewSession,
        answers: &[InterviewAnswer],
    ) -> StoreResult<()>;
    async fn get_session(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<InterviewSession>>;
    /// Most recently completed first.
    async fn list_sessions(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<InterviewSession>>;
    async fn sessions_with_topic(
        &self,
        caller: &Caller,
        user_id: Uuid,
        topic: &str,
    ) -> StoreResult<Vec<InterviewSession>>;
    async fn delete_session(&self, caller: &Caller, id: Uuid) -> StoreResult<bool>;

    /// All-or-nothing batch for an existing session.
    async fn insert_answers(&self, caller: &Caller, session_id: Uuid, answers: &[InterviewAnswer]) -> StoreResult<()>;
    /// Ordered by question number.
    async fn list_answers(&self, caller: &Caller, session_id: Uuid) -> StoreResult<Vec<InterviewAnswer>>;
    async fn find_answers(
        &self,
        caller: &Caller,
        user_id: Uuid,
        filter: &AnswerFilter,
    ) -> StoreResult<Vec<InterviewAnswer>>;

    /// Recomputes the user's rollup from its sessions and answers and upserts it on `user_id`.
    /// Rebuilds for the same user are serialized, so the last one to finish saw every session
    /// committed before it started. Service callers only.
    async fn rebuild_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>>;
    async fn get_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>>;
}
