//! Per-user rollup of completed interviews.
//!
//! Always recomputed from the full set of the user's sessions and answers, so running it
//! twice over the same rows produces the same values.

use crate::domain::models::{InterviewAnswer, InterviewSession, InterviewStatistics};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub struct StatisticsSnapshot {
    pub user_id: Uuid,
    pub total_interviews: i64,
    pub total_questions_answered: i64,
    pub average_overall_score: Option<f64>,
    pub most_common_role: Option<String>,
    pub strongest_category: Option<String>,
    pub weakest_category: Option<String>,
    pub total_time_spent_seconds: i64,
    pub last_interview_at: Option<DateTime<Utc>>,
}

impl StatisticsSnapshot {
    /// Rollup of a user whose sessions were all removed.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            total_interviews: 0,
            total_questions_answered: 0,
            average_overall_score: None,
            most_common_role: None,
            strongest_category: None,
            weakest_category: None,
            total_time_spent_seconds: 0,
            last_interview_at: None,
        }
    }

    /// Row to upsert; identity and creation time survive from the existing row.
    pub fn into_row(self, existing: Option<&InterviewStatistics>, now: DateTime<Utc>) -> InterviewStatistics {
        InterviewStatistics {
            id: existing.map(|s| s.id).unwrap_or_else(Uuid::new_v4),
            user_id: self.user_id,
            total_interviews: self.total_interviews,
            total_questions_answered: self.total_questions_answered,
            average_overall_score: self.average_overall_score,
            most_common_role: self.most_common_role,
            strongest_category: self.strongest_category,
            weakest_category: self.weakest_category,
            total_time_spent_seconds: self.total_time_spent_seconds,
            last_interview_at: self.last_interview_at,
            created_at: existing.map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        }
    }
}

/// Returns `None` when the user has no completed sessions.
pub fn compute(
    user_id: Uuid,
    sessions: &[InterviewSession],
    answers: &[InterviewAnswer],
) -> Option<StatisticsSnapshot> {
    let sessions: Vec<&InterviewSession> = sessions.iter().filter(|s| s.user_id == user_id).collect();
    if sessions.is_empty() {
        return None;
    }

    let total_interviews = sessions.len() as i64;
    let total_questions_answered = sessions.iter().map(|s| i64::from(s.answered_questions)).sum();
    let total_time_spent_seconds = sessions
        .iter()
        .filter_map(|s| s.duration_seconds)
        .map(i64::from)
        .sum();
    let last_interview_at = sessions.iter().map(|s| s.completed_at).max();
    let average_overall_score = mean(sessions.iter().filter_map(|s| s.average_score));

    let session_ids: std::collections::HashSet<Uuid> = sessions.iter().map(|s| s.id).collect();
    let owned_answers: Vec<&InterviewAnswer> = answers
        .iter()
        .filter(|a| session_ids.contains(&a.session_id))
        .collect();
    let (strongest_category, weakest_category) = category_extremes(&owned_answers);

    Some(StatisticsSnapshot {
        user_id,
        total_interviews,
        total_questions_answered,
        average_overall_score,
        most_common_role: most_common_role(&sessions),
        strongest_category,
        weakest_category,
        total_time_spent_seconds,
        last_interview_at,
    })
}

/// Row to store for `user_id`, or `None` while the user has never completed a session.
/// An existing row is kept (zeroed) rather than dropped once its sessions are gone.
pub fn rebuild(
    user_id: Uuid,
    sessions: &[InterviewSession],
    answers: &[InterviewAnswer],
    existing: Option<&InterviewStatistics>,
    now: DateTime<Utc>,
) -> Option<InterviewStatistics> {
    match (compute(user_id, sessions, answers), existing) {
        (Some(snapshot), existing) => Some(snapshot.into_row(existing, now)),
        (None, Some(existing)) => Some(StatisticsSnapshot::empty(user_id).into_row(Some(existing), now)),
        (None, None) => None,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}

/// Mode of `target_role`; ties go to the role practised most recently.
fn most_common_role(sessions: &[&InterviewSession]) -> Option<String> {
    let mut counts: BTreeMap<&str, (usize, DateTime<Utc>)> = BTreeMap::new();
    for session in sessions {
        let role = session.target_role.trim();
        if role.is_empty() {
            continue;
        }
        let entry = counts.entry(role).or_insert((0, session.completed_at));
        entry.0 += 1;
        entry.1 = entry.1.max(session.completed_at);
    }
    counts
        .into_iter()
        .max_by(|(role_a, a), (role_b, b)| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(role_b.cmp(role_a))
        })
        .map(|(role, _)| role.to_string())
}

/// Highest and lowest mean answer score per category, over scored answers only.
/// Equal means resolve to the alphabetically first category.
fn category_extremes(answers: &[&InterviewAnswer]) -> (Option<String>, Option<String>) {
    let mut totals: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for answer in answers {
        let (Some(category), Some(score)) = (answer.category.as_deref(), answer.score) else {
            continue;
        };
        let entry = totals.entry(category).or_insert((0.0, 0));
        entry.0 += score;
        entry.1 += 1;
    }

    let means: Vec<(&str, f64)> = totals
        .into_iter()
        .map(|(category, (sum, count))| (category, sum / f64::from(count)))
        .collect();

    let mut strongest: Option<(&str, f64)> = None;
    let mut weakest: Option<(&str, f64)> = None;
    for (category, avg) in means {
        if strongest.map_or(true, |(_, best)| avg > best) {
            strongest = Some((category, avg));
        }
        if weakest.map_or(true, |(_, worst)| avg < worst) {
            weakest = Some((category, avg));
        }
    }

    (
        strongest.map(|(c, _)| c.to_string()),
        weakest.map(|(c, _)| c.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{InterviewMode, InterviewType};
    use chrono::Duration;

    fn session(user_id: Uuid, role: &str, answered: i32, score: Option<f64>, minutes_ago: i64) -> InterviewSession {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        InterviewSession {
            id: Uuid::new_v4(),
            user_id,
            resume_id: None,
            target_role: role.to_string(),
            experience_level: "mid".to_string(),
            interview_type: InterviewType::Mixed,
            mode: InterviewMode::Standard,
            total_questions: answered + 1,
            answered_questions: answered,
            skipped_questions: 1,
            completed_at: at,
            duration_seconds: Some(300),
            average_score: score,
            performance_tier: None,
            overall_feedback: None,
            topics_covered: vec![],
            created_at: at,
        }
    }

    fn answer(session_id: Uuid, number: i32, category: &str, score: Option<f64>) -> InterviewAnswer {
        InterviewAnswer {
            id: Uuid::new_v4(),
            session_id,
            question_number: number,
            question_text: "q".to_string(),
            category: Some(category.to_string()),
            difficulty: None,
            answer_text: "a".to_string(),
            is_skipped: score.is_none(),
            word_count: 1,
            duration_seconds: None,
            score,
            evaluation_summary: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_sessions_no_statistics() {
        assert!(compute(Uuid::new_v4(), &[], &[]).is_none());
    }

    #[test]
    fn test_rollup() {
        let user = Uuid::new_v4();
        let s1 = session(user, "Backend Engineer", 4, Some(7.0), 30);
        let s2 = session(user, "Data Engineer", 3, None, 20);
        let s3 = session(user, "Backend Engineer", 5, Some(9.0), 10);
        let answers = vec![
            answer(s1.id, 1, "databases", Some(8.0)),
            answer(s1.id, 2, "behavioral", Some(4.0)),
            answer(s3.id, 1, "databases", Some(9.0)),
            answer(s3.id, 2, "system design", Some(6.0)),
            answer(s3.id, 3, "behavioral", None),
        ];
        let last = s3.completed_at;

        let stats = compute(user, &[s1, s2, s3], &answers).unwrap();
        assert_eq!(stats.total_interviews, 3);
        assert_eq!(stats.total_questions_answered, 12);
        assert_eq!(stats.average_overall_score, Some(8.0));
        assert_eq!(stats.most_common_role.as_deref(), Some("Backend Engineer"));
        assert_eq!(stats.strongest_category.as_deref(), Some("databases"));
        assert_eq!(stats.weakest_category.as_deref(), Some("behavioral"));
        assert_eq!(stats.total_time_spent_seconds, 900);
        assert_eq!(stats.last_interview_at, Some(last));
    }

    #[test]
    fn test_role_tie_prefers_recent() {
        let user = Uuid::new_v4();
        let sessions = vec![
            session(user, "Data Engineer", 1, None, 50),
            session(user, "Frontend Engineer", 1, None, 5),
        ];
        let stats = compute(user, &sessions, &[]).unwrap();
        assert_eq!(stats.most_common_role.as_deref(), Some("Frontend Engineer"));
        assert_eq!(stats.strongest_category, None);
    }

    #[test]
    fn test_other_users_sessions_ignored() {
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let sessions = vec![session(user, "QA", 2, Some(5.0), 1), session(other, "SRE", 9, Some(1.0), 2)];
        let stats = compute(user, &sessions, &[]).unwrap();
        assert_eq!(stats.total_interviews, 1);
        assert_eq!(stats.total_questions_answered, 2);
    }

    #[test]
    fn test_recompute_is_deterministic() {
        let user = Uuid::new_v4();
        let s1 = session(user, "QA", 2, Some(5.0), 3);
        let answers = vec![answer(s1.id, 1, "x", Some(5.0)), answer(s1.id, 2, "y", Some(5.0))];
        let sessions = vec![s1];
        let first = compute(user, &sessions, &answers).unwrap();
        let second = compute(user, &sessions, &answers).unwrap();
        assert_eq!(first, second);
        // equal means: alphabetical first wins both ways
        assert_eq!(first.strongest_category.as_deref(), Some("x"));
        assert_eq!(first.weakest_category.as_deref(), Some("x"));

        let row = first.clone().into_row(None, Utc::now());
        assert_eq!(row.total_interviews, first.total_interviews);
        assert_eq!(row.total_questions_answered, first.total_questions_answered);
        assert_eq!(row.strongest_category, first.strongest_category);
        assert_eq!(row.created_at, row.updated_at);
    }

    #[test]
    fn test_rebuild_zeroes_existing_row() {
        let user = Uuid::new_v4();
        let sessions = vec![session(user, "QA", 2, Some(5.0), 3)];
        assert!(rebuild(user, &[], &[], None, Utc::now()).is_none());

        let row = rebuild(user, &sessions, &[], None, Utc::now()).unwrap();
        assert_eq!(row.total_interviews, 1);

        let zeroed = rebuild(user, &[], &[], Some(&row), Utc::now()).unwrap();
        assert_eq!(zeroed.id, row.id);
        assert_eq!(zeroed.created_at, row.created_at);
        assert_eq!(zeroed.total_interviews, 0);
        assert_eq!(zeroed.last_interview_at, None);
    }
}
