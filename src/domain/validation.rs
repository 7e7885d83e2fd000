//! Payload checks and derived fields, applied before anything reaches a storage engine.

use crate::domain::models::{
    InterviewAnswer, InterviewSession, NewAnswer, NewResume, NewSession, PerformanceTier, ProfileUpdate,
    Resume, ResumeUpdate, UserProfile,
};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

pub const MAX_SKILLS: usize = 20;
pub const MAX_SCORE: f64 = 10.0;

pub fn word_count(text: &str) -> i32 {
    i32::try_from(text.split_whitespace().count()).unwrap_or(i32::MAX)
}

pub fn tier_for_score(score: f64) -> PerformanceTier {
    if score >= 8.0 {
        PerformanceTier::Excellent
    } else if score >= 6.0 {
        PerformanceTier::Good
    } else if score >= 4.0 {
        PerformanceTier::Average
    } else {
        PerformanceTier::NeedsImprovement
    }
}

fn require_text(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_score(field: &str, score: Option<f64>) -> StoreResult<()> {
    match score {
        Some(s) if !s.is_finite() || !(0.0..=MAX_SCORE).contains(&s) => Err(StoreError::validation(format!(
            "{} must be between 0 and {}",
            field, MAX_SCORE
        ))),
        _ => Ok(()),
    }
}

fn check_non_negative(field: &str, value: Option<i64>) -> StoreResult<()> {
    match value {
        Some(v) if v < 0 => Err(StoreError::validation(format!("{} must not be negative", field))),
        _ => Ok(()),
    }
}

/// Trimmed, de-duplicated (first occurrence wins), empty entries dropped.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

fn normalize_skills(skills: Vec<String>) -> Vec<String> {
    let mut skills = normalize_tags(skills);
    skills.truncate(MAX_SKILLS);
    skills
}

fn skills_from_document(doc: &Value) -> Vec<String> {
    doc.get("skills")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn experience_from_document(doc: &Value) -> i32 {
    doc.get("experience")
        .and_then(Value::as_array)
        .map(|entries| i32::try_from(entries.len()).unwrap_or(i32::MAX))
        .unwrap_or(0)
}

fn summary_for(doc: &Value, skill_count: usize, experience_years: i32) -> String {
    let name = doc.get("name").and_then(Value::as_str).unwrap_or("Unknown");
    format!(
        "{} - {} skills, {} years experience",
        name, skill_count, experience_years
    )
}

pub fn prepare_profile(
    user_id: Uuid,
    update: ProfileUpdate,
    existing: Option<UserProfile>,
    now: DateTime<Utc>,
) -> StoreResult<UserProfile> {
    if let Some(email) = &update.email {
        if !email.contains('@') {
            return Err(StoreError::validation("email is malformed"));
        }
    }
    let profile = match existing {
        Some(mut profile) => {
            if update.full_name.is_some() {
                profile.full_name = update.full_name;
            }
            if update.email.is_some() {
                profile.email = update.email;
            }
            if update.avatar_url.is_some() {
                profile.avatar_url = update.avatar_url;
            }
            profile.updated_at = now;
            profile
        }
        None => UserProfile {
            id: user_id,
            full_name: update.full_name,
            email: update.email,
            avatar_url: update.avatar_url,
            created_at: now,
            updated_at: now,
        },
    };
    Ok(profile)
}

pub fn prepare_resume(new: NewResume, now: DateTime<Utc>) -> StoreResult<Resume> {
    require_text("file_name", &new.file_name)?;
    require_text("file_url", &new.file_url)?;
    check_non_negative("file_size_bytes", new.file_size_bytes)?;
    check_non_negative("experience_years", new.experience_years.map(i64::from))?;

    let parsed_json = new.parsed_json.unwrap_or_else(|| json!({}));
    let skills = normalize_skills(new.skills.unwrap_or_else(|| skills_from_document(&parsed_json)));
    let experience_years = new
        .experience_years
        .unwrap_or_else(|| experience_from_document(&parsed_json));
    let resume_summary = new
        .resume_summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| summary_for(&parsed_json, skills.len(), experience_years));

    Ok(Resume {
        id: Uuid::new_v4(),
        user_id: new.user_id,
        file_name: new.file_name,
        file_url: new.file_url,
        file_size_bytes: new.file_size_bytes,
        parsed_json,
        resume_summary: Some(resume_summary),
        skills,
        experience_years: Some(experience_years),
        created_at: now,
        updated_at: now,
    })
}

pub fn apply_resume_update(mut resume: Resume, update: ResumeUpdate, now: DateTime<Utc>) -> StoreResult<Resume> {
    if let Some(file_name) = update.file_name {
        require_text("file_name", &file_name)?;
        resume.file_name = file_name;
    }
    if let Some(years) = update.experience_years {
        check_non_negative("experience_years", Some(i64::from(years)))?;
        resume.experience_years = Some(years);
    }
    if let Some(skills) = update.skills {
        resume.skills = normalize_skills(skills);
    }
    if let Some(summary) = update.resume_summary {
        resume.resume_summary = Some(summary);
    }
    if let Some(doc) = update.parsed_json {
        resume.parsed_json = doc;
    }
    resume.updated_at = now;
    Ok(resume)
}

pub fn prepare_session(new: NewSession, answers: &[NewAnswer], now: DateTime<Utc>) -> StoreResult<InterviewSession> {
    require_text("target_role", &new.target_role)?;
    require_text("experience_level", &new.experience_level)?;
    if new.total_questions < 0 || new.answered_questions < 0 || new.skipped_questions < 0 {
        return Err(StoreError::validation("question counts must not be negative"));
    }
    let accounted = i64::from(new.answered_questions) + i64::from(new.skipped_questions);
    if accounted > i64::from(new.total_questions) {
        return Err(StoreError::validation(format!(
            "answered ({}) + skipped ({}) exceeds total questions ({})",
            new.answered_questions, new.skipped_questions, new.total_questions
        )));
    }
    check_non_negative("duration_seconds", new.duration_seconds.map(i64::from))?;
    check_score("average_score", new.average_score)?;

    let topics_covered = match new.topics_covered {
        Some(topics) => normalize_tags(topics),
        None => normalize_tags(answers.iter().filter_map(|a| a.category.clone()).collect()),
    };
    let performance_tier = new
        .performance_tier
        .or_else(|| new.average_score.map(tier_for_score));

    Ok(InterviewSession {
        id: Uuid::new_v4(),
        user_id: new.user_id,
        resume_id: new.resume_id,
        target_role: new.target_role,
        experience_level: new.experience_level,
        interview_type: new.interview_type,
        mode: new.mode,
        total_questions: new.total_questions,
        answered_questions: new.answered_questions,
        skipped_questions: new.skipped_questions,
        completed_at: new.completed_at.unwrap_or(now),
        duration_seconds: new.duration_seconds,
        average_score: new.average_score,
        performance_tier,
        overall_feedback: new.overall_feedback,
        topics_covered,
        created_at: now,
    })
}

/// Validates an answer batch against its session and the question numbers already stored.
/// Fails as a whole: one bad row rejects the batch.
pub fn prepare_answers(
    session: &InterviewSession,
    existing_numbers: &BTreeSet<i32>,
    batch: Vec<NewAnswer>,
    now: DateTime<Utc>,
) -> StoreResult<Vec<InterviewAnswer>> {
    let mut taken = existing_numbers.clone();
    let mut prepared = Vec::with_capacity(batch.len());

    for answer in batch {
        let number = answer.question_number;
        if number < 1 || number > session.total_questions {
            return Err(StoreError::validation(format!(
                "question number {} outside 1..={}",
                number, session.total_questions
            )));
        }
        if !taken.insert(number) {
            return Err(StoreError::validation(format!(
                "duplicate question number {} in session {}",
                number, session.id
            )));
        }
        require_text("question_text", &answer.question_text)?;
        check_score("score", answer.score)?;
        check_non_negative("duration_seconds", answer.duration_seconds.map(i64::from))?;

        let word_count = if answer.is_skipped { 0 } else { word_count(&answer.answer_text) };
        prepared.push(InterviewAnswer {
            id: Uuid::new_v4(),
            session_id: session.id,
            question_number: number,
            question_text: answer.question_text,
            category: answer.category,
            difficulty: answer.difficulty,
            answer_text: answer.answer_text,
            is_skipped: answer.is_skipped,
            word_count,
            duration_seconds: answer.duration_seconds,
            score: answer.score,
            evaluation_summary: answer.evaluation_summary,
            created_at: now,
        });
    }

    Ok(prepared)
}
