//! In-process storage engine.
//!
//! All tables sit behind one lock, so every call is a single atomic step. Secondary indexes are
//! ordered sets keyed by owner first, which keeps per-user listings, recency scans and
//! skill/topic containment lookups logarithmic in table size.

use crate::access::{Caller, EntityKind, Operation};
use crate::domain::models::{
    AnswerFilter, Identity, InterviewAnswer, InterviewSession, InterviewStatistics, Page, Resume,
    UserProfile,
};
use crate::domain::statistics;
use crate::error::{StoreError, StoreResult};
use crate::store::StorageEngine;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound::Included;
use tokio::sync::RwLock;
use uuid::Uuid;

const MAX_ID: Uuid = Uuid::from_u128(u128::MAX);

type RecencyKey = (Uuid, DateTime<Utc>, Uuid);
type TagKey = (Uuid, String, Uuid);

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, Identity>,
    profiles: HashMap<Uuid, UserProfile>,
    resumes: HashMap<Uuid, Resume>,
    resumes_by_user: BTreeSet<RecencyKey>,
    resumes_by_skill: BTreeSet<TagKey>,
    sessions: HashMap<Uuid, InterviewSession>,
    sessions_by_user: BTreeSet<RecencyKey>,
    sessions_by_topic: BTreeSet<TagKey>,
    sessions_by_resume: BTreeSet<(Uuid, Uuid)>,
    answers: HashMap<Uuid, InterviewAnswer>,
    answers_by_session: BTreeMap<(Uuid, i32), Uuid>,
    statistics: HashMap<Uuid, InterviewStatistics>,
}

fn recency_range(owner: Uuid) -> (std::ops::Bound<RecencyKey>, std::ops::Bound<RecencyKey>) {
    (
        Included((owner, DateTime::<Utc>::MIN_UTC, Uuid::nil())),
        Included((owner, DateTime::<Utc>::MAX_UTC, MAX_ID)),
    )
}

fn tag_range(owner: Uuid, tag: &str) -> (std::ops::Bound<TagKey>, std::ops::Bound<TagKey>) {
    (
        Included((owner, tag.to_string(), Uuid::nil())),
        Included((owner, tag.to_string(), MAX_ID)),
    )
}

fn check_write(caller: &Caller, kind: EntityKind, op: Operation, owner: Uuid) -> StoreResult<()> {
    caller.authorize(op, kind, owner)
}

impl Tables {
    fn require_user(&self, user_id: Uuid) -> StoreResult<()> {
        if self.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StoreError::Referential("user"))
        }
    }

    fn session_owner(&self, session_id: Uuid) -> Option<Uuid> {
        self.sessions.get(&session_id).map(|s| s.user_id)
    }

    fn index_resume(&mut self, resume: &Resume) {
        self.resumes_by_user
            .insert((resume.user_id, resume.created_at, resume.id));
        for skill in &resume.skills {
            self.resumes_by_skill
                .insert((resume.user_id, skill.clone(), resume.id));
        }
    }

    fn unindex_resume(&mut self, resume: &Resume) {
        self.resumes_by_user
            .remove(&(resume.user_id, resume.created_at, resume.id));
        for skill in &resume.skills {
            self.resumes_by_skill
                .remove(&(resume.user_id, skill.clone(), resume.id));
        }
    }

    fn index_session(&mut self, session: &InterviewSession) {
        self.sessions_by_user
            .insert((session.user_id, session.completed_at, session.id));
        for topic in &session.topics_covered {
            self.sessions_by_topic
                .insert((session.user_id, topic.clone(), session.id));
        }
        if let Some(resume_id) = session.resume_id {
            self.sessions_by_resume.insert((resume_id, session.id));
        }
    }

    fn remove_resume(&mut self, id: Uuid) -> bool {
        let Some(resume) = self.resumes.remove(&id) else {
            return false;
        };
        self.unindex_resume(&resume);

        let referencing: Vec<Uuid> = self
            .sessions_by_resume
            .range((id, Uuid::nil())..=(id, MAX_ID))
            .map(|(_, session_id)| *session_id)
            .collect();
        for session_id in referencing {
            self.sessions_by_resume.remove(&(id, session_id));
            if let Some(session) = self.sessions.get_mut(&session_id) {
                session.resume_id = None;
            }
        }
        true
    }

    fn remove_session(&mut self, id: Uuid) -> bool {
        let Some(session) = self.sessions.remove(&id) else {
            return false;
        };
        self.sessions_by_user
            .remove(&(session.user_id, session.completed_at, session.id));
        for topic in &session.topics_covered {
            self.sessions_by_topic
                .remove(&(session.user_id, topic.clone(), session.id));
        }
        if let Some(resume_id) = session.resume_id {
            self.sessions_by_resume.remove(&(resume_id, session.id));
        }

        let answer_keys: Vec<(Uuid, i32)> = self
            .answers_by_session
            .range((id, i32::MIN)..=(id, i32::MAX))
            .map(|(key, _)| *key)
            .collect();
        for key in answer_keys {
            if let Some(answer_id) = self.answers_by_session.remove(&key) {
                self.answers.remove(&answer_id);
            }
        }
        true
    }

    fn check_answer_batch(&self, session_id: Uuid, answers: &[InterviewAnswer]) -> StoreResult<()> {
        let mut seen = BTreeSet::new();
        for answer in answers {
            if answer.session_id != session_id {
                return Err(StoreError::validation("answer batch spans several sessions"));
            }
            if self.answers.contains_key(&answer.id) {
                return Err(StoreError::validation(format!("answer {} already exists", answer.id)));
            }
            let key = (session_id, answer.question_number);
            if self.answers_by_session.contains_key(&key) || !seen.insert(answer.question_number) {
                return Err(StoreError::validation(format!(
                    "duplicate question number {} in session {}",
                    answer.question_number, session_id
                )));
            }
        }
        Ok(())
    }

    fn store_answers(&mut self, answers: &[InterviewAnswer]) {
        for answer in answers {
            self.answers_by_session
                .insert((answer.session_id, answer.question_number), answer.id);
            self.answers.insert(answer.id, answer.clone());
        }
    }

    fn session_answers(&self, session_id: Uuid) -> impl Iterator<Item = &InterviewAnswer> + '_ {
        self.answers_by_session
            .range((session_id, i32::MIN)..=(session_id, i32::MAX))
            .filter_map(|(_, answer_id)| self.answers.get(answer_id))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageEngine for MemoryStore {
    async fn register_user(&self, caller: &Caller, identity: &Identity) -> StoreResult<()> {
        check_write(caller, EntityKind::User, Operation::Insert, identity.user_id)?;
        let mut tables = self.tables.write().await;
        tables
            .users
            .entry(identity.user_id)
            .or_insert_with(|| identity.clone());
        Ok(())
    }

    async fn delete_user(&self, caller: &Caller, user_id: Uuid) -> StoreResult<bool> {
        caller.require_service(Operation::Delete, EntityKind::User)?;
        let mut tables = self.tables.write().await;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        tables.profiles.remove(&user_id);
        tables.statistics.remove(&user_id);

        let session_ids: Vec<Uuid> = tables
            .sessions_by_user
            .range(recency_range(user_id))
            .map(|(_, _, id)| *id)
            .collect();
        for id in session_ids {
            tables.remove_session(id);
        }
        let resume_ids: Vec<Uuid> = tables
            .resumes_by_user
            .range(recency_range(user_id))
            .map(|(_, _, id)| *id)
            .collect();
        for id in resume_ids {
            tables.remove_resume(id);
        }
        Ok(true)
    }

    async fn owner_of(&self, kind: EntityKind, id: Uuid) -> StoreResult<Option<Uuid>> {
        let tables = self.tables.read().await;
        let owner = match kind {
            EntityKind::User | EntityKind::Profile => tables.users.get(&id).map(|u| u.user_id),
            EntityKind::Resume => tables.resumes.get(&id).map(|r| r.user_id),
            EntityKind::Session => tables.session_owner(id),
            EntityKind::Answer => tables
                .answers
                .get(&id)
                .and_then(|a| tables.session_owner(a.session_id)),
            EntityKind::Statistics => tables
                .statistics
                .values()
                .find(|s| s.id == id)
                .map(|s| s.user_id),
        };
        Ok(owner)
    }

    async fn upsert_profile(&self, caller: &Caller, profile: &UserProfile) -> StoreResult<UserProfile> {
        check_write(caller, EntityKind::Profile, Operation::Update, profile.id)?;
        let mut tables = self.tables.write().await;
        tables.require_user(profile.id)?;
        let stored = match tables.profiles.get(&profile.id) {
            Some(existing) => UserProfile {
                created_at: existing.created_at,
                ..profile.clone()
            },
            None => profile.clone(),
        };
        tables.profiles.insert(profile.id, stored.clone());
        Ok(stored)
    }

    async fn get_profile(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<UserProfile>> {
        if !caller.can_access(user_id) {
            return Ok(None);
        }
        let tables = self.tables.read().await;
        Ok(tables.profiles.get(&user_id).cloned())
    }

    async fn insert_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<()> {
        check_write(caller, EntityKind::Resume, Operation::Insert, resume.user_id)?;
        let mut tables = self.tables.write().await;
        tables.require_user(resume.user_id)?;
        if tables.resumes.contains_key(&resume.id) {
            return Err(StoreError::validation(format!("resume {} already exists", resume.id)));
        }
        tables.index_resume(resume);
        tables.resumes.insert(resume.id, resume.clone());
        Ok(())
    }

    async fn get_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<Resume>> {
        let tables = self.tables.read().await;
        Ok(tables
            .resumes
            .get(&id)
            .filter(|r| caller.can_access(r.user_id))
            .cloned())
    }

    async fn list_resumes(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<Resume>> {
        if !caller.can_access(user_id) {
            return Ok(Vec::new());
        }
        let (offset, limit) = page.bounds();
        let tables = self.tables.read().await;
        Ok(tables
            .resumes_by_user
            .range(recency_range(user_id))
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|(_, _, id)| tables.resumes.get(id).cloned())
            .collect())
    }

    async fn resumes_with_skill(&self, caller: &Caller, user_id: Uuid, skill: &str) -> StoreResult<Vec<Resume>> {
        if !caller.can_access(user_id) {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        let mut found: Vec<Resume> = tables
            .resumes_by_skill
            .range(tag_range(user_id, skill))
            .filter_map(|(_, _, id)| tables.resumes.get(id).cloned())
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_resume(&self, caller: &Caller, resume: &Resume) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(existing) = tables.resumes.get(&resume.id).cloned() else {
            return Ok(false);
        };
        if !caller.can_access(existing.user_id) {
            return Ok(false);
        }
        check_write(caller, EntityKind::Resume, Operation::Update, resume.user_id)?;
        tables.unindex_resume(&existing);
        let updated = Resume {
            user_id: existing.user_id,
            created_at: existing.created_at,
            ..resume.clone()
        };
        tables.index_resume(&updated);
        tables.resumes.insert(updated.id, updated);
        Ok(true)
    }

    async fn delete_resume(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.resumes.get(&id).map(|r| r.user_id) {
            Some(owner) if caller.can_access(owner) => Ok(tables.remove_resume(id)),
            _ => Ok(false),
        }
    }

    async fn insert_session(
        &self,
        caller: &Caller,
        session: &InterviewSession,
        answers: &[InterviewAnswer],
    ) -> StoreResult<()> {
        check_write(caller, EntityKind::Session, Operation::Insert, session.user_id)?;
        let mut tables = self.tables.write().await;
        tables.require_user(session.user_id)?;
        if tables.sessions.contains_key(&session.id) {
            return Err(StoreError::validation(format!("session {} already exists", session.id)));
        }
        if let Some(resume_id) = session.resume_id {
            if !tables.resumes.contains_key(&resume_id) {
                return Err(StoreError::Referential("resume"));
            }
        }
        let accounted = i64::from(session.answered_questions) + i64::from(session.skipped_questions);
        if accounted > i64::from(session.total_questions) {
            return Err(StoreError::validation("question counts exceed total"));
        }
        tables.check_answer_batch(session.id, answers)?;

        tables.index_session(session);
        tables.sessions.insert(session.id, session.clone());
        tables.store_answers(answers);
        Ok(())
    }

    async fn get_session(&self, caller: &Caller, id: Uuid) -> StoreResult<Option<InterviewSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(&id)
            .filter(|s| caller.can_access(s.user_id))
            .cloned())
    }

    async fn list_sessions(&self, caller: &Caller, user_id: Uuid, page: Page) -> StoreResult<Vec<InterviewSession>> {
        if !caller.can_access(user_id) {
            return Ok(Vec::new());
        }
        let (offset, limit) = page.bounds();
        let tables = self.tables.read().await;
        Ok(tables
            .sessions_by_user
            .range(recency_range(user_id))
            .rev()
            .skip(offset)
            .take(limit)
            .filter_map(|(_, _, id)| tables.sessions.get(id).cloned())
            .collect())
    }

    async fn sessions_with_topic(
        &self,
        caller: &Caller,
        user_id: Uuid,
        topic: &str,
    ) -> StoreResult<Vec<InterviewSession>> {
        if !caller.can_access(user_id) {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        let mut found: Vec<InterviewSession> = tables
            .sessions_by_topic
            .range(tag_range(user_id, topic))
            .filter_map(|(_, _, id)| tables.sessions.get(id).cloned())
            .collect();
        found.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(found)
    }

    async fn delete_session(&self, caller: &Caller, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.session_owner(id) {
            Some(owner) if caller.can_access(owner) => Ok(tables.remove_session(id)),
            _ => Ok(false),
        }
    }

    async fn insert_answers(&self, caller: &Caller, session_id: Uuid, answers: &[InterviewAnswer]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let owner = tables
            .session_owner(session_id)
            .ok_or(StoreError::Referential("session"))?;
        check_write(caller, EntityKind::Answer, Operation::Insert, owner)?;
        tables.check_answer_batch(session_id, answers)?;
        tables.store_answers(answers);
        Ok(())
    }

    async fn list_answers(&self, caller: &Caller, session_id: Uuid) -> StoreResult<Vec<InterviewAnswer>> {
        let tables = self.tables.read().await;
        match tables.session_owner(session_id) {
            Some(owner) if caller.can_access(owner) => Ok(tables.session_answers(session_id).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn find_answers(
        &self,
        caller: &Caller,
        user_id: Uuid,
        filter: &AnswerFilter,
    ) -> StoreResult<Vec<InterviewAnswer>> {
        if !caller.can_access(user_id) {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        let mut found = Vec::new();
        for (_, _, session_id) in tables.sessions_by_user.range(recency_range(user_id)).rev() {
            found.extend(
                tables
                    .session_answers(*session_id)
                    .filter(|a| filter.matches(a))
                    .cloned(),
            );
        }
        Ok(found)
    }

    async fn rebuild_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
        caller.require_service(Operation::Update, EntityKind::Statistics)?;
        let mut tables = self.tables.write().await;
        let sessions: Vec<InterviewSession> = tables
            .sessions_by_user
            .range(recency_range(user_id))
            .filter_map(|(_, _, id)| tables.sessions.get(id).cloned())
            .collect();
        let answers: Vec<InterviewAnswer> = sessions
            .iter()
            .flat_map(|s| tables.session_answers(s.id).cloned())
            .collect();
        let rebuilt = statistics::rebuild(
            user_id,
            &sessions,
            &answers,
            tables.statistics.get(&user_id),
            Utc::now(),
        );
        if let Some(row) = &rebuilt {
            tables.statistics.insert(user_id, row.clone());
        }
        Ok(rebuilt)
    }

    async fn get_statistics(&self, caller: &Caller, user_id: Uuid) -> StoreResult<Option<InterviewStatistics>> {
        if !caller.can_access(user_id) {
            return Ok(None);
        }
        let tables = self.tables.read().await;
        Ok(tables.statistics.get(&user_id).cloned())
    }
}
