pub mod store;

use crate::catalog::WorkType;
use crate::db::round2;
use crate::error::{DomainResult, Violations};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

text_enum! {
    pub enum SessionType {
        Morning => "morning",
        Afternoon => "afternoon",
        FullDay => "full_day",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockCompletion {
    #[serde(default)]
    pub block_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExerciseCompletion {
    #[serde(default)]
    pub exercise_id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "workType")]
    pub work_type: Option<WorkType>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttendeeDraft {
    pub student_id: i64,
    #[serde(default)]
    pub participation_minutes: i64,
    #[serde(default = "full_session_default")]
    pub completed_full_session: bool,
    #[serde(default)]
    pub performance_notes: Vec<String>,
}

fn full_session_default() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionDraft {
    pub routine_id: i64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_duration: i64,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub morning_session: bool,
    #[serde(default)]
    pub afternoon_session: bool,
    #[serde(default)]
    pub is_full_day_complete: bool,
    #[serde(default)]
    pub block_completions: Vec<BlockCompletion>,
    #[serde(default)]
    pub exercise_completions: Vec<ExerciseCompletion>,
    #[serde(default)]
    pub attendees: Vec<AttendeeDraft>,
}

/// Amendable fields of a recorded completion. Routine and attendees are fixed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionPatch {
    pub actual_duration: Option<i64>,
    pub rating: Option<u8>,
    pub notes: Option<Vec<String>>,
    pub block_completions: Option<Vec<BlockCompletion>>,
    pub exercise_completions: Option<Vec<ExerciseCompletion>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionFilter {
    #[serde(default)]
    pub routine_id: Option<i64>,
    #[serde(default)]
    pub student_id: Option<i64>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session: Option<SessionType>,
    #[serde(default)]
    pub min_rating: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Attendee {
    pub id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub participation_minutes: i64,
    pub participation_percentage: f64,
    pub performance_notes: Vec<String>,
    pub completed_full_session: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub id: i64,
    pub routine_id: i64,
    pub routine_name: String,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub planned_duration: f64,
    pub actual_duration: i64,
    pub duration_difference: f64,
    pub efficiency_percentage: f64,
    pub notes: Vec<String>,
    pub rating: Option<u8>,
    pub morning_session: bool,
    pub afternoon_session: bool,
    pub is_full_day_complete: bool,
    pub block_completions: Vec<BlockCompletion>,
    pub exercise_completions: Vec<ExerciseCompletion>,
    pub completed_by: i64,
    pub attendees: Vec<Attendee>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub fn duration_difference(planned: f64, actual: i64) -> f64 {
    actual as f64 - planned
}

pub fn efficiency_percentage(planned: f64, actual: i64) -> f64 {
    if planned == 0.0 {
        return 100.0;
    }

    round2(actual as f64 / planned * 100.0)
}

pub fn participation_percentage(participation_minutes: i64, actual_duration: i64) -> f64 {
    if actual_duration == 0 {
        return 100.0;
    }

    round2(participation_minutes as f64 / actual_duration as f64 * 100.0)
}

fn check_rating(violations: &mut Violations, field: &str, rating: Option<u8>) {
    if let Some(rating) = rating {
        violations.check(
            (1..=5).contains(&rating),
            field,
            "rating must be between 1 and 5",
        );
    }
}

fn check_exercise_completions(violations: &mut Violations, entries: &[ExerciseCompletion]) {
    for (index, entry) in entries.iter().enumerate() {
        check_rating(
            violations,
            &format!("exercise_completions.{index}.rating"),
            entry.rating,
        );
    }
}

pub fn validate_draft(draft: &CompletionDraft) -> DomainResult<()> {
    let mut violations = Violations::new();

    violations.check(
        draft.actual_duration >= 1,
        "actual_duration",
        "actual duration must be at least 1 minute",
    );
    check_rating(&mut violations, "rating", draft.rating);
    check_exercise_completions(&mut violations, &draft.exercise_completions);
    violations.check(
        !draft.attendees.is_empty(),
        "attendees",
        "at least one attendee is required",
    );

    let mut seen = HashSet::new();
    for (index, attendee) in draft.attendees.iter().enumerate() {
        violations.check(
            seen.insert(attendee.student_id),
            format!("attendees.{index}.student_id"),
            format!("student {} is listed more than once", attendee.student_id),
        );
        violations.check(
            attendee.participation_minutes >= 0,
            format!("attendees.{index}.participation_minutes"),
            "participation minutes cannot be negative",
        );
    }

    violations.into_result("Completion is invalid")
}

pub fn validate_patch(patch: &CompletionPatch) -> DomainResult<()> {
    let mut violations = Violations::new();

    if let Some(actual_duration) = patch.actual_duration {
        violations.check(
            actual_duration >= 1,
            "actual_duration",
            "actual duration must be at least 1 minute",
        );
    }
    check_rating(&mut violations, "rating", patch.rating);
    if let Some(entries) = &patch.exercise_completions {
        check_exercise_completions(&mut violations, entries);
    }

    violations.into_result("Completion update is invalid")
}
