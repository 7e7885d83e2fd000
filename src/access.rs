//! Row-ownership access control.
//!
//! Every owned row resolves to an owning user, either through a field on the row itself or
//! through its parent session. A user caller may touch a row only when that owner is the caller;
//! the service caller bypasses the check and has to be constructed explicitly.

use crate::domain::models::{
    Identity, InterviewAnswer, InterviewSession, InterviewStatistics, Resume, UserProfile,
};
use crate::error::{StoreError, StoreResult};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Caller {
    User(Identity),
    Service(ServiceToken),
}

/// Proof of service mode. Only `Caller::service` can mint one, so a service caller can never
/// be deserialized or built from request data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceToken(());

impl Caller {
    pub fn user(identity: Identity) -> Self {
        Caller::User(identity)
    }

    /// Trusted backend-internal access. Never derive this from anything a client sent.
    pub fn service() -> Self {
        Caller::Service(ServiceToken(()))
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Caller::User(identity) => Some(identity.user_id),
            Caller::Service(_) => None,
        }
    }

    pub fn is_service(&self) -> bool {
        matches!(self, Caller::Service(_))
    }

    pub fn can_access(&self, owner: Uuid) -> bool {
        match self {
            Caller::User(identity) => identity.user_id == owner,
            Caller::Service(_) => true,
        }
    }

    pub fn authorize(&self, op: Operation, kind: EntityKind, owner: Uuid) -> StoreResult<()> {
        if self.can_access(owner) {
            return Ok(());
        }
        tracing::warn!(
            caller = %self,
            ?op,
            entity = kind.table(),
            %owner,
            "ownership check rejected write"
        );
        Err(StoreError::authorization(format!(
            "{:?} on {} owned by another user",
            op,
            kind.table()
        )))
    }

    pub fn require_service(&self, op: Operation, kind: EntityKind) -> StoreResult<()> {
        if self.is_service() {
            Ok(())
        } else {
            Err(StoreError::authorization(format!(
                "{:?} on {} requires service access",
                op,
                kind.table()
            )))
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caller::User(identity) => write!(f, "user:{}", identity.user_id),
            Caller::Service(_) => f.write_str("service"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Profile,
    Resume,
    Session,
    Answer,
    Statistics,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::User => "app_users",
            EntityKind::Profile => "user_profiles",
            EntityKind::Resume => "resumes",
            EntityKind::Session => "interview_sessions",
            EntityKind::Answer => "interview_answers",
            EntityKind::Statistics => "interview_statistics",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Profile => "profile",
            EntityKind::Resume => "resume",
            EntityKind::Session => "session",
            EntityKind::Answer => "answer",
            EntityKind::Statistics => "statistics",
        }
    }
}

/// Where the owning user of a row is found.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Direct(Uuid),
    ThroughSession(Uuid),
}

pub trait Owned {
    const KIND: EntityKind;

    fn ownership(&self) -> Ownership;
}

impl Owned for UserProfile {
    const KIND: EntityKind = EntityKind::Profile;

    fn ownership(&self) -> Ownership {
        Ownership::Direct(self.id)
    }
}

impl Owned for Resume {
    const KIND: EntityKind = EntityKind::Resume;

    fn ownership(&self) -> Ownership {
        Ownership::Direct(self.user_id)
    }
}

impl Owned for InterviewSession {
    const KIND: EntityKind = EntityKind::Session;

    fn ownership(&self) -> Ownership {
        Ownership::Direct(self.user_id)
    }
}

impl Owned for InterviewAnswer {
    const KIND: EntityKind = EntityKind::Answer;

    fn ownership(&self) -> Ownership {
        Ownership::ThroughSession(self.session_id)
    }
}

impl Owned for InterviewStatistics {
    const KIND: EntityKind = EntityKind::Statistics;

    fn ownership(&self) -> Ownership {
        Ownership::Direct(self.user_id)
    }
}

/// Checks a row whose owner is carried on the row. For rows owned through a session the
/// owner has to be resolved first; `resolved_owner` supplies it.
pub fn row_visible<T: Owned>(caller: &Caller, row: &T, resolved_owner: Option<Uuid>) -> bool {
    let visible = match row.ownership() {
        Ownership::Direct(owner) => caller.can_access(owner),
        Ownership::ThroughSession(_) => resolved_owner.map_or(caller.is_service(), |o| caller.can_access(o)),
    };
    if !visible {
        tracing::debug!(caller = %caller, entity = T::KIND.label(), "row hidden from caller");
    }
    visible
}

/// Drops the rows the caller may not see. Direct ownership only.
pub fn retain_visible<T: Owned>(caller: &Caller, rows: Vec<T>) -> Vec<T> {
    rows.into_iter().filter(|row| row_visible(caller, row, None)).collect()
}

/// Owner used to scope a listing: user callers always list their own rows.
pub fn listing_owner(caller: &Caller, requested: Option<Uuid>) -> Option<Uuid> {
    match (caller, requested) {
        (Caller::User(identity), Some(owner)) if owner != identity.user_id => None,
        (Caller::User(identity), _) => Some(identity.user_id),
        (Caller::Service(_), requested) => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn identity(user_id: Uuid) -> Identity {
        Identity {
            user_id,
            email: Some("candidate@example.com".to_string()),
        }
    }

    fn statistics(user_id: Uuid) -> InterviewStatistics {
        InterviewStatistics {
            id: Uuid::new_v4(),
            user_id,
            total_interviews: 1,
            total_questions_answered: 1,
            average_overall_score: None,
            most_common_role: None,
            strongest_category: None,
            weakest_category: None,
            total_time_spent_seconds: 0,
            last_interview_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_owner_matches() {
        let owner = Uuid::new_v4();
        let caller = Caller::user(identity(owner));
        assert!(caller.can_access(owner));
        assert!(!caller.can_access(Uuid::new_v4()));
        assert!(caller.authorize(Operation::Insert, EntityKind::Resume, owner).is_ok());
    }

    #[test]
    fn test_foreign_write_is_authorization_error() {
        let caller = Caller::user(identity(Uuid::new_v4()));
        let err = caller
            .authorize(Operation::Update, EntityKind::Session, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, StoreError::Authorization(_)));
    }

    #[test]
    fn test_service_bypasses() {
        let caller = Caller::service();
        assert!(caller.can_access(Uuid::new_v4()));
        assert!(caller.require_service(Operation::Delete, EntityKind::User).is_ok());
        let user = Caller::user(identity(Uuid::new_v4()));
        assert!(user.require_service(Operation::Delete, EntityKind::User).is_err());
    }

    #[test]
    fn test_retain_visible() {
        let me = Uuid::new_v4();
        let caller = Caller::user(identity(me));
        let rows = vec![statistics(me), statistics(Uuid::new_v4())];
        let visible = retain_visible(&caller, rows);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].user_id, me);
    }

    #[test]
    fn test_listing_owner() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let caller = Caller::user(identity(me));
        assert_eq!(listing_owner(&caller, None), Some(me));
        assert_eq!(listing_owner(&caller, Some(me)), Some(me));
        assert_eq!(listing_owner(&caller, Some(other)), None);
        assert_eq!(listing_owner(&Caller::service(), Some(other)), Some(other));
        assert_eq!(listing_owner(&Caller::service(), None), None);
    }
}
