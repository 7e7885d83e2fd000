//! Access-controlled entry point to the interview store.
//!
//! Every operation takes the `Caller` and checks ownership before the engine is touched;
//! results are filtered again on the way out. Rows owned by someone else read as missing,
//! while writes aimed at them fail with an authorization error.

use crate::access::{listing_owner, retain_visible, row_visible, Caller, EntityKind, Operation};
use crate::domain::models::{
    AnswerFilter, Dashboard, Identity, InterviewAnswer, InterviewSession, InterviewStatistics,
    NewAnswer, NewResume, NewSession, Page, ProfileUpdate, Resume, ResumeUpdate, SessionDetail,
    UserProfile,
};
use crate::domain::validation;
use crate::error::{StoreError, StoreResult};
use crate::store::StorageEngine;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

const DASHBOARD_ITEMS: i64 = 5;

#[derive(Clone)]
pub struct Vault {
    engine: Arc<dyn StorageEngine>,
}

impl Vault {
    pub fn new(engine: Arc<dyn StorageEngine>) -> Self {
        Self { engine }
    }

    /// Owner of an existing row. Missing rows are `NotFound`, rows of other users
    /// `Authorization`.
    async fn authorize_target(
        &self,
        caller: &Caller,
        op: Operation,
        kind: EntityKind,
        id: Uuid,
    ) -> StoreResult<Uuid> {
        let owner = self
            .engine
            .owner_of(kind, id)
            .await?
            .ok_or(StoreError::NotFound(kind.label()))?;
        caller.authorize(op, kind, owner)?;
        Ok(owner)
    }

    async fn ensure_registered(&self, caller: &Caller) -> StoreResult<()> {
        if let Caller::User(identity) = caller {
            self.engine.register_user(caller, identity).await?;
        }
        Ok(())
    }

    /// Statistics maintenance after a write. Failures leave the rollup stale until the next
    /// refresh and never reach the caller.
    async fn refresh_quietly(&self, user_id: Uuid) {
        match self.engine.rebuild_statistics(&Caller::service(), user_id).await {
            Ok(_) => tracing::debug!(%user_id, "statistics refreshed"),
            Err(err) => tracing::warn!(%user_id, error = %err, "statistics refresh failed"),
        }
    }

    // ============================================
    // Users
    // ============================================

    /// Mirrors an identity from the identity provider. Idempotent.
    pub async fn register_identity(&self, identity: &Identity) -> StoreResult<()> {
        self.engine
            .register_user(&Caller::user(identity.clone()), identity)
            .await
    }

    /// Removes the user and everything it owns.
    pub async fn purge_user(&self, caller: &Caller, user_id: Uuid) -> StoreResult<()> {
        caller.require_service(Operation::Delete, EntityKind::User)?;
        if !self.engine.delete_user(caller, user_id).await? {
            return Err(StoreError::NotFound("user"));
        }
        tracing::info!(%user_id, "user purged");
        Ok(())
    }

    // ============================================
    // Profiles
    // ============================================

    pub async fn upsert_profile(
        &self,
        caller: &Caller,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> StoreResult<UserProfile> {
        caller.authorize(Operation::Update, EntityKind::Profile, user_id)?;
        self.ensure_registered(caller).await?;
        let existing = self.engine.get_profile(caller, user_id).await?;
        let profile = validation::prepare_profile(user_id, update, existing, Utc::now())?;
        let stored = self.engine.upsert_profile(caller, &profile).await?;
        tracing::info!(%user_id, "profile saved");
        Ok(stored)
    }

    pub async fn get_profile(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        if !caller.can_access(user_id) {
            return Ok(None);
        }
        let profile = self.engine.get_profile(caller, user_id).await?;
        Ok(profile.filter(|p| row_visible(caller, p, None)))
    }

    // ============================================
    // Resumes
    // ============================================

    pub async fn create_resume(&self, caller: &Caller, new: NewResume) -> StoreResult<Resume> {
        caller.authorize(Operation::Insert, EntityKind::Resume, new.user_id)?;
        let resume = validation::prepare_resume(new, Utc::now())?;
        self.ensure_registered(caller).await?;
        self.engine.insert_resume(caller, &resume).await?;
        tracing::info!(
            resume_id = %resume.id,
            user_id = %resume.user_id,
            skills = resume.skills.len(),
            "resume stored"
        );
        Ok(resume)
    }

    pub async fn get_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Resume> {
        self.engine
            .get_resume(caller, id)
            .await?
            .filter(|r| row_visible(caller, r, None))
            .ok_or(StoreError::NotFound("resume"))
    }

    /// Newest first. User callers only ever list their own rows.
    pub async fn list_resumes(&self, caller: &Caller, owner: Option<Uuid>, page: Page) -> StoreResult<Vec<Resume>> {
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(Vec::new());
        };
        let rows = self.engine.list_resumes(caller, owner, page).await?;
        Ok(retain_visible(caller, rows))
    }

    pub async fn find_resumes_by_skill(
        &self,
        caller: &Caller,
        owner: Option<Uuid>,
        skill: &str,
    ) -> StoreResult<Vec<Resume>> {
        let skill = skill.trim();
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(Vec::new());
        };
        if skill.is_empty() {
            return Err(StoreError::validation("skill must not be empty"));
        }
        let rows = self.engine.resumes_with_skill(caller, owner, skill).await?;
        Ok(retain_visible(caller, rows))
    }

    pub async fn update_resume(&self, caller: &Caller, id: Uuid, update: ResumeUpdate) -> StoreResult<Resume> {
        self.authorize_target(caller, Operation::Update, EntityKind::Resume, id)
            .await?;
        let current = self.get_resume(caller, id).await?;
        let updated = validation::apply_resume_update(current, update, Utc::now())?;
        if !self.engine.update_resume(caller, &updated).await? {
            return Err(StoreError::NotFound("resume"));
        }
        tracing::info!(resume_id = %id, "resume updated");
        Ok(updated)
    }

    /// Returns the removed row so the caller can drop the stored file.
    pub async fn delete_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Resume> {
        self.authorize_target(caller, Operation::Delete, EntityKind::Resume, id)
            .await?;
        let resume = self.get_resume(caller, id).await?;
        if !self.engine.delete_resume(caller, id).await? {
            return Err(StoreError::NotFound("resume"));
        }
        tracing::info!(resume_id = %id, "resume deleted");
        Ok(resume)
    }

    // ============================================
    // Sessions
    // ============================================

    /// Persists a finished interview and its answers in one step, then refreshes the owner's
    /// statistics.
    pub async fn complete_session(
        &self,
        caller: &Caller,
        new: NewSession,
        answers: Vec<NewAnswer>,
    ) -> StoreResult<SessionDetail> {
        let owner = new.user_id;
        caller.authorize(Operation::Insert, EntityKind::Session, owner)?;

        let now = Utc::now();
        let session = validation::prepare_session(new, &answers, now)?;
        let mut answers = validation::prepare_answers(&session, &BTreeSet::new(), answers, now)?;

        if let Some(resume_id) = session.resume_id {
            match self.engine.owner_of(EntityKind::Resume, resume_id).await? {
                None => return Err(StoreError::Referential("resume")),
                Some(resume_owner) if resume_owner != owner => {
                    tracing::warn!(
                        caller = %caller,
                        %resume_id,
                        "session references a resume of another user"
                    );
                    return Err(StoreError::authorization(
                        "session references a resume owned by another user",
                    ));
                }
                Some(_) => {}
            }
        }

        self.ensure_registered(caller).await?;
        self.engine.insert_session(caller, &session, &answers).await?;
        tracing::info!(
            session_id = %session.id,
            user_id = %owner,
            answers = answers.len(),
            "interview session completed"
        );

        self.refresh_quietly(owner).await;

        answers.sort_by_key(|a| a.question_number);
        Ok(SessionDetail { session, answers })
    }

    pub async fn get_session(&self, caller: &Caller, id: Uuid) -> StoreResult<InterviewSession> {
        self.engine
            .get_session(caller, id)
            .await?
            .filter(|s| row_visible(caller, s, None))
            .ok_or(StoreError::NotFound("session"))
    }

    pub async fn get_session_detail(&self, caller: &Caller, id: Uuid) -> StoreResult<SessionDetail> {
        let session = self.get_session(caller, id).await?;
        let answers = self.list_answers(caller, id).await?;
        Ok(SessionDetail { session, answers })
    }

    /// Most recently completed first.
    pub async fn list_sessions(
        &self,
        caller: &Caller,
        owner: Option<Uuid>,
        page: Page,
    ) -> StoreResult<Vec<InterviewSession>> {
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(Vec::new());
        };
        let rows = self.engine.list_sessions(caller, owner, page).await?;
        Ok(retain_visible(caller, rows))
    }

    pub async fn find_sessions_by_topic(
        &self,
        caller: &Caller,
        owner: Option<Uuid>,
        topic: &str,
    ) -> StoreResult<Vec<InterviewSession>> {
        let topic = topic.trim();
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(Vec::new());
        };
        if topic.is_empty() {
            return Err(StoreError::validation("topic must not be empty"));
        }
        let rows = self.engine.sessions_with_topic(caller, owner, topic).await?;
        Ok(retain_visible(caller, rows))
    }

    /// Removes the session with its answers and refreshes the owner's statistics.
    pub async fn delete_session(&self, caller: &Caller, id: Uuid) -> StoreResult<()> {
        let owner = self
            .authorize_target(caller, Operation::Delete, EntityKind::Session, id)
            .await?;
        if !self.engine.delete_session(caller, id).await? {
            return Err(StoreError::NotFound("session"));
        }
        tracing::info!(session_id = %id, "interview session deleted");
        self.refresh_quietly(owner).await;
        Ok(())
    }

    // ============================================
    // Answers
    // ============================================

    /// Appends an all-or-nothing batch to an existing session.
    pub async fn insert_answers(
        &self,
        caller: &Caller,
        session_id: Uuid,
        batch: Vec<NewAnswer>,
    ) -> StoreResult<Vec<InterviewAnswer>> {
        let owner = self
            .engine
            .owner_of(EntityKind::Session, session_id)
            .await?
            .ok_or(StoreError::NotFound("session"))?;
        caller.authorize(Operation::Insert, EntityKind::Answer, owner)?;

        let session = self.get_session(caller, session_id).await?;
        let existing: BTreeSet<i32> = self
            .engine
            .list_answers(caller, session_id)
            .await?
            .iter()
            .map(|a| a.question_number)
            .collect();
        let prepared = validation::prepare_answers(&session, &existing, batch, Utc::now())?;
        if prepared.is_empty() {
            return Ok(prepared);
        }

        self.engine
            .insert_answers(caller, session_id, &prepared)
            .await?;
        tracing::info!(%session_id, count = prepared.len(), "answers stored");

        // answer scores feed the category extremes
        self.refresh_quietly(owner).await;
        Ok(prepared)
    }

    /// Ordered by question number; empty when the session is not visible to the caller.
    pub async fn list_answers(&self, caller: &Caller, session_id: Uuid) -> StoreResult<Vec<InterviewAnswer>> {
        let owner = match self.engine.get_session(caller, session_id).await? {
            Some(session) if row_visible(caller, &session, None) => session.user_id,
            _ => return Ok(Vec::new()),
        };
        let answers = self.engine.list_answers(caller, session_id).await?;
        Ok(answers
            .into_iter()
            .filter(|a| a.session_id == session_id && row_visible(caller, a, Some(owner)))
            .collect())
    }

    pub async fn find_answers(
        &self,
        caller: &Caller,
        owner: Option<Uuid>,
        filter: &AnswerFilter,
    ) -> StoreResult<Vec<InterviewAnswer>> {
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(Vec::new());
        };
        let answers = self.engine.find_answers(caller, owner, filter).await?;

        let mut session_owners: HashMap<Uuid, Option<Uuid>> = HashMap::new();
        for answer in &answers {
            if !session_owners.contains_key(&answer.session_id) {
                let resolved = self.engine.owner_of(EntityKind::Session, answer.session_id).await?;
                session_owners.insert(answer.session_id, resolved);
            }
        }
        Ok(answers
            .into_iter()
            .filter(|a| {
                let resolved = session_owners.get(&a.session_id).copied().flatten();
                resolved == Some(owner) && row_visible(caller, a, resolved) && filter.matches(a)
            })
            .collect())
    }

    // ============================================
    // Statistics
    // ============================================

    pub async fn get_statistics(
        &self,
        caller: &Caller,
        owner: Option<Uuid>,
    ) -> StoreResult<Option<InterviewStatistics>> {
        let Some(owner) = listing_owner(caller, owner) else {
            return Ok(None);
        };
        let stats = self.engine.get_statistics(caller, owner).await?;
        Ok(stats.filter(|s| row_visible(caller, s, None)))
    }

    /// On-demand rebuild. Unlike the refresh after a write, failures are returned.
    pub async fn refresh_statistics(
        &self,
        caller: &Caller,
        user_id: Uuid,
    ) -> StoreResult<Option<InterviewStatistics>> {
        caller.authorize(Operation::Update, EntityKind::Statistics, user_id)?;
        let stats = self
            .engine
            .rebuild_statistics(&Caller::service(), user_id)
            .await?;
        tracing::info!(%user_id, present = stats.is_some(), "statistics rebuilt on demand");
        Ok(stats)
    }

    pub async fn dashboard(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Dashboard> {
        let owner = Some(user_id);
        Ok(Dashboard {
            statistics: self.get_statistics(caller, owner).await?,
            recent_sessions: self
                .list_sessions(caller, owner, Page::first(DASHBOARD_ITEMS))
                .await?,
            resumes: self
                .list_resumes(caller, owner, Page::first(DASHBOARD_ITEMS))
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::fixtures::{new_answer, new_resume, new_session, skipped_answer};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn vault() -> Vault {
        Vault::new(Arc::new(MemoryStore::new()))
    }

    fn user() -> Caller {
        Caller::user(Identity {
            user_id: Uuid::new_v4(),
            email: Some("candidate@example.com".to_string()),
        })
    }

    fn uid(caller: &Caller) -> Uuid {
        caller.user_id().unwrap()
    }

    #[tokio::test]
    async fn test_resume_session_and_answer_flow() {
        let vault = vault();
        let u = user();

        let resume = vault
            .create_resume(&u, new_resume(uid(&u), "cv.pdf", 50_000))
            .await
            .unwrap();
        assert_eq!(resume.user_id, uid(&u));
        assert_eq!(resume.file_size_bytes, Some(50_000));

        let mut session = new_session(uid(&u), 5, 4, 1);
        session.resume_id = Some(resume.id);
        let detail = vault.complete_session(&u, session, vec![]).await.unwrap();

        let stats = vault.get_statistics(&u, None).await.unwrap().unwrap();
        assert_eq!(stats.total_interviews, 1);
        assert_eq!(stats.total_questions_answered, 4);

        let batch = vec![
            new_answer(1, "databases", Some(8.0)),
            new_answer(2, "databases", Some(7.0)),
            new_answer(3, "system design", Some(5.0)),
            new_answer(4, "behavioral", Some(6.0)),
            skipped_answer(5, "behavioral"),
        ];
        let stored = vault
            .insert_answers(&u, detail.session.id, batch)
            .await
            .unwrap();
        assert_eq!(stored.len(), 5);

        let err = vault
            .insert_answers(&u, detail.session.id, vec![new_answer(5, "behavioral", Some(9.0))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let answers = vault.list_answers(&u, detail.session.id).await.unwrap();
        assert_eq!(answers.len(), 5);
        assert!(answers[4].is_skipped);
        assert_eq!(answers[4].word_count, 0);
        assert_eq!(
            answers.iter().map(|a| a.question_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let stats = vault.get_statistics(&u, None).await.unwrap().unwrap();
        assert_eq!(stats.strongest_category.as_deref(), Some("databases"));
        assert_eq!(stats.weakest_category.as_deref(), Some("system design"));
    }

    #[tokio::test]
    async fn test_session_with_answers_is_atomic() {
        let vault = vault();
        let u = user();
        let answers = vec![new_answer(1, "rust", Some(6.0)), new_answer(1, "rust", Some(7.0))];

        let err = vault
            .complete_session(&u, new_session(uid(&u), 3, 2, 0), answers)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(vault.list_sessions(&u, None, Page::first(10)).await.unwrap().is_empty());
        assert!(vault.get_statistics(&u, None).await.unwrap().is_none());

        let detail = vault
            .complete_session(
                &u,
                new_session(uid(&u), 3, 2, 1),
                vec![
                    new_answer(2, "rust", Some(6.0)),
                    new_answer(1, "sql", Some(8.0)),
                    skipped_answer(3, "rust"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(detail.session.topics_covered, vec!["rust".to_string(), "sql".to_string()]);
        assert_eq!(detail.answers[0].question_number, 1);
        let fetched = vault.get_session_detail(&u, detail.session.id).await.unwrap();
        assert_eq!(fetched.answers, detail.answers);
    }

    #[tokio::test]
    async fn test_ownership_isolation_randomized() {
        let vault = vault();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let users: Vec<Caller> = (0..6).map(|_| user()).collect();

        let mut resumes = Vec::new();
        let mut sessions = Vec::new();
        for u in &users {
            let resume = vault
                .create_resume(u, new_resume(uid(u), "cv.pdf", rng.gen_range(1_000..90_000)))
                .await
                .unwrap();
            let total = rng.gen_range(2..8);
            let detail = vault
                .complete_session(
                    u,
                    new_session(uid(u), total, 1, 0),
                    vec![new_answer(1, "rust", Some(rng.gen_range(0.0..10.0)))],
                )
                .await
                .unwrap();
            resumes.push(resume);
            sessions.push(detail.session);
        }

        for _ in 0..60 {
            let a = rng.gen_range(0..users.len());
            let mut b = rng.gen_range(0..users.len());
            if a == b {
                b = (b + 1) % users.len();
            }
            let (caller, victim) = (&users[a], uid(&users[b]));

            let err = vault.get_resume(caller, resumes[b].id).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
            let err = vault.get_session(caller, sessions[b].id).await.unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
            assert!(vault.list_answers(caller, sessions[b].id).await.unwrap().is_empty());
            assert!(vault
                .list_resumes(caller, Some(victim), Page::first(50))
                .await
                .unwrap()
                .is_empty());
            assert!(vault
                .list_sessions(caller, Some(victim), Page::first(50))
                .await
                .unwrap()
                .is_empty());
            assert!(vault
                .find_resumes_by_skill(caller, Some(victim), "Rust")
                .await
                .unwrap()
                .is_empty());
            assert!(vault
                .find_answers(caller, Some(victim), &AnswerFilter::default())
                .await
                .unwrap()
                .is_empty());
            assert!(vault.get_statistics(caller, Some(victim)).await.unwrap().is_none());
            assert!(vault.get_profile(caller, victim).await.unwrap().is_none());

            let err = vault
                .update_resume(caller, resumes[b].id, ResumeUpdate::default())
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Authorization(_)));
            let err = vault.delete_session(caller, sessions[b].id).await.unwrap_err();
            assert!(matches!(err, StoreError::Authorization(_)));
            let err = vault
                .insert_answers(caller, sessions[b].id, vec![new_answer(2, "rust", None)])
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Authorization(_)));
            let err = vault
                .create_resume(caller, new_resume(victim, "cv.pdf", 10))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Authorization(_)));
            let err = vault.refresh_statistics(caller, victim).await.unwrap_err();
            assert!(matches!(err, StoreError::Authorization(_)));
        }

        for (i, u) in users.iter().enumerate() {
            assert_eq!(vault.get_resume(u, resumes[i].id).await.unwrap(), resumes[i]);
            assert_eq!(vault.list_answers(u, sessions[i].id).await.unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_session_resume_checks() {
        let vault = vault();
        let (u, other) = (user(), user());
        let foreign = vault
            .create_resume(&other, new_resume(uid(&other), "other.pdf", 10))
            .await
            .unwrap();

        let mut session = new_session(uid(&u), 2, 1, 0);
        session.resume_id = Some(foreign.id);
        let err = vault.complete_session(&u, session, vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::Authorization(_)));

        let mut session = new_session(uid(&u), 2, 1, 0);
        session.resume_id = Some(Uuid::new_v4());
        let err = vault.complete_session(&u, session, vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::Referential("resume")));
    }

    #[tokio::test]
    async fn test_missing_targets_are_not_found() {
        let vault = vault();
        let u = user();
        let err = vault
            .update_resume(&u, Uuid::new_v4(), ResumeUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("resume")));
        let err = vault.delete_session(&u, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("session")));
        let err = vault
            .insert_answers(&u, Uuid::new_v4(), vec![new_answer(1, "x", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("session")));
    }

    #[tokio::test]
    async fn test_deleting_resume_keeps_sessions() {
        let vault = vault();
        let u = user();
        let resume = vault
            .create_resume(&u, new_resume(uid(&u), "cv.pdf", 10))
            .await
            .unwrap();
        let mut session = new_session(uid(&u), 2, 2, 0);
        session.resume_id = Some(resume.id);
        let detail = vault.complete_session(&u, session, vec![]).await.unwrap();

        let removed = vault.delete_resume(&u, resume.id).await.unwrap();
        assert_eq!(removed.id, resume.id);
        let session = vault.get_session(&u, detail.session.id).await.unwrap();
        assert_eq!(session.resume_id, None);
        assert!(vault.find_resumes_by_skill(&u, None, "Rust").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_follow_session_deletes() {
        let vault = vault();
        let u = user();
        let first = vault
            .complete_session(&u, new_session(uid(&u), 4, 3, 0), vec![])
            .await
            .unwrap();
        vault
            .complete_session(&u, new_session(uid(&u), 4, 2, 1), vec![])
            .await
            .unwrap();
        let stats = vault.get_statistics(&u, None).await.unwrap().unwrap();
        assert_eq!(stats.total_interviews, 2);
        assert_eq!(stats.total_questions_answered, 5);

        vault.delete_session(&u, first.session.id).await.unwrap();
        let after = vault.get_statistics(&u, None).await.unwrap().unwrap();
        assert_eq!(after.id, stats.id);
        assert_eq!(after.total_interviews, 1);
        assert_eq!(after.total_questions_answered, 2);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let vault = vault();
        let u = user();
        assert!(vault.refresh_statistics(&u, uid(&u)).await.unwrap().is_none());

        vault
            .complete_session(
                &u,
                new_session(uid(&u), 3, 2, 0),
                vec![new_answer(1, "sql", Some(4.0)), new_answer(2, "rust", Some(9.0))],
            )
            .await
            .unwrap();
        let once = vault.refresh_statistics(&u, uid(&u)).await.unwrap().unwrap();
        let twice = vault.refresh_statistics(&u, uid(&u)).await.unwrap().unwrap();
        assert_eq!(
            InterviewStatistics {
                updated_at: once.updated_at,
                ..twice.clone()
            },
            once
        );
        assert_eq!(twice.strongest_category.as_deref(), Some("rust"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_completions_keep_every_update() {
        let vault = vault();
        let u = user();

        let mut tasks = tokio::task::JoinSet::new();
        for answered in 1..=8 {
            let vault = vault.clone();
            let u = u.clone();
            tasks.spawn(async move {
                vault
                    .complete_session(&u, new_session(uid(&u), 10, answered, 0), vec![])
                    .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let stats = vault.get_statistics(&u, None).await.unwrap().unwrap();
        assert_eq!(stats.total_interviews, 8);
        assert_eq!(stats.total_questions_answered, (1..=8).sum::<i64>());
    }

    #[tokio::test]
    async fn test_profile_upsert_merges_and_stays_private() {
        let vault = vault();
        let u = user();
        let other = user();

        let first = vault
            .upsert_profile(
                &u,
                uid(&u),
                ProfileUpdate {
                    full_name: Some("Ada".to_string()),
                    email: Some("ada@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = vault
            .upsert_profile(
                &u,
                uid(&u),
                ProfileUpdate {
                    avatar_url: Some("https://img.example.com/ada.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.full_name.as_deref(), Some("Ada"));
        assert_eq!(second.email.as_deref(), Some("ada@example.com"));
        assert_eq!(second.created_at, first.created_at);

        assert!(vault.get_profile(&other, uid(&u)).await.unwrap().is_none());
        let err = vault
            .upsert_profile(&other, uid(&u), ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Authorization(_)));
        assert_eq!(vault.get_profile(&u, uid(&u)).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_purge_user_requires_service() {
        let vault = vault();
        let u = user();
        let resume = vault
            .create_resume(&u, new_resume(uid(&u), "cv.pdf", 10))
            .await
            .unwrap();
        vault
            .upsert_profile(
                &u,
                uid(&u),
                ProfileUpdate {
                    full_name: Some("Ada".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        vault
            .complete_session(&u, new_session(uid(&u), 1, 1, 0), vec![])
            .await
            .unwrap();

        let err = vault.purge_user(&u, uid(&u)).await.unwrap_err();
        assert!(matches!(err, StoreError::Authorization(_)));

        let service = Caller::service();
        vault.purge_user(&service, uid(&u)).await.unwrap();
        assert!(vault.get_resume(&service, resume.id).await.is_err());
        assert!(vault.get_profile(&service, uid(&u)).await.unwrap().is_none());
        assert!(vault.get_statistics(&service, Some(uid(&u))).await.unwrap().is_none());
        assert!(matches!(
            vault.purge_user(&service, uid(&u)).await.unwrap_err(),
            StoreError::NotFound("user")
        ));
    }

    #[tokio::test]
    async fn test_dashboard_shows_latest_five() {
        let vault = vault();
        let u = user();
        for _ in 0..7 {
            vault
                .complete_session(&u, new_session(uid(&u), 2, 1, 0), vec![])
                .await
                .unwrap();
        }
        let dashboard = vault.dashboard(&u, uid(&u)).await.unwrap();
        assert_eq!(dashboard.recent_sessions.len(), 5);
        assert!(dashboard.resumes.is_empty());
        assert_eq!(dashboard.statistics.unwrap().total_interviews, 7);
    }

    /// Memory engine with injected faults.
    #[derive(Default)]
    struct Faulty {
        inner: MemoryStore,
        broken_statistics: bool,
        /// Appended to every `find_answers` result.
        stray_answers: std::sync::Mutex<Vec<InterviewAnswer>>,
    }

    #[async_trait]
    impl StorageEngine for Faulty {
        async fn register_user(&self, caller: &Caller, identity: &Identity) -> StoreResult<()> {
            self.inner.register_user(caller, identity).await
        }
        async fn delete_user(&self, caller: &Caller, user_id: Uuid) -> StoreResult<bool> {
            self.inner.delete_user(caller, user_id).await
        }
        async fn owner_of(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<Uuid>> {
            self.inner.owner_of(kind, id).await
        }
        async fn upsert_profile(&self, caller: &Caller, profile: &UserProfile) -> StoreResult<UserProfile> {
            self.inner.upsert_profile(caller, profile).await
        }
        async fn get_profile(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
            self.inner.get_profile(caller, user_id).await
        }
        async fn insert_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<()> {
            self.inner.insert_resume(caller, resume).await
        }
        async fn get_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<Resume>> {
            self.inner.get_resume(caller, id).await
        }
        async fn list_resumes(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<Resume>> {
            self.inner.list_resumes(caller, user_id, page).await
        }
        async fn resumes_with_skill(&self, caller: &Caller, user_id: Uuid, skill: &str) -> StoreResult<Vec<Resume>> {
            self.inner.resumes_with_skill(caller, user_id, skill).await
        }
        async fn update_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<bool> {
            self.inner.update_resume(caller, resume).await
        }
        async fn delete_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_resume(caller, id).await
        }
        async fn insert_session(
            &self,
            caller: &Caller,
            session: &InterviewSession,
            answers: &[InterviewAnswer],
        ) -> StoreResult<()> {
            self.inner.insert_session(caller, session, answers).await
        }
        async fn get_session(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<InterviewSession>> {
            self.inner.get_session(caller, id).await
        }
        async fn list_sessions(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<InterviewSession>> {
            self.inner.list_sessions(caller, user_id, page).await
        }
        async fn sessions_with_topic(
            &self,
            caller: &Caller,
            user_id: Uuid,
            topic: &str,
        ) -> StoreResult<Vec<InterviewSession>> {
            self.inner.sessions_with_topic(caller, user_id, topic).await
        }
        async fn delete_session(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
            self.inner.delete_session(caller, id).await
        }
        async fn insert_answers(&self, caller: &Caller, session_id: Uuid, answers: &[InterviewAnswer]) -> StoreResult<()> {
            self.inner.insert_answers(caller, session_id, answers).await
        }
        async fn list_answers(&self, caller: &Caller, session_id: Uuid) -> StoreResult<Vec<InterviewAnswer>> {
            self.inner.list_answers(caller, session_id).await
        }
        async fn find_answers(
            &self,
            caller: &Caller,
            user_id: Uuid,
            filter: &AnswerFilter,
        ) -> StoreResult<Vec<InterviewAnswer>> {
            let mut rows = self.inner.find_answers(caller, user_id, filter).await?;
            rows.extend(self.stray_answers.lock().unwrap().iter().cloned());
            Ok(rows)
        }
        async fn rebuild_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
            if self.broken_statistics {
                return Err(StoreError::TransientStorage("statistics table locked".to_string()));
            }
            self.inner.rebuild_statistics(caller, user_id).await
        }
        async fn get_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
            self.inner.get_statistics(caller, user_id).await
        }
    }

    #[tokio::test]
    async fn test_statistics_failure_does_not_fail_completion() {
        let vault = Vault::new(Arc::new(Faulty {
            broken_statistics: true,
            ..Default::default()
        }));
        let u = user();
        let detail = vault
            .complete_session(&u, new_session(uid(&u), 2, 2, 0), vec![new_answer(1, "sql", Some(5.0))])
            .await
            .unwrap();

        assert_eq!(vault.get_session(&u, detail.session.id).await.unwrap(), detail.session);
        assert_eq!(vault.list_answers(&u, detail.session.id).await.unwrap().len(), 1);
        assert!(vault.get_statistics(&u, None).await.unwrap().is_none());

        let err = vault.refresh_statistics(&u, uid(&u)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_found_answers_are_rechecked_for_ownership() {
        let engine = Arc::new(Faulty::default());
        let vault = Vault::new(engine.clone());
        let owner = user();
        let other = user();
        let mine = vault
            .complete_session(&owner, new_session(uid(&owner), 2, 1, 0), vec![new_answer(1, "sql", Some(7.0))])
            .await
            .unwrap();
        let foreign = vault
            .complete_session(&other, new_session(uid(&other), 2, 1, 0), vec![new_answer(1, "sql", Some(3.0))])
            .await
            .unwrap();

        let mut orphan = foreign.answers[0].clone();
        orphan.id = Uuid::new_v4();
        orphan.session_id = Uuid::new_v4();
        {
            let mut stray = engine.stray_answers.lock().unwrap();
            stray.extend(foreign.answers.iter().cloned());
            stray.push(orphan);
        }

        let found = vault
            .find_answers(&owner, None, &AnswerFilter::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].score, Some(7.0));

        let all = vault
            .find_answers(&Caller::service(), Some(uid(&owner)), &AnswerFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, mine.answers[0].id);
    }
}
