pub mod store;

use crate::catalog::copy_name;
use crate::error::{DomainResult, Violations};
use crate::recorder::CompletionDraft;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

pub const MAX_PARTICIPANTS: i64 = 50;

text_enum! {
    pub enum ClassStatus {
        Planned => "planned",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum ClassType {
        Morning => "morning",
        Afternoon => "afternoon",
        Evening => "evening",
        Custom => "custom",
    }
}

impl Default for ClassType {
    fn default() -> Self {
        ClassType::Custom
    }
}

impl ClassStatus {
    pub fn can_start(self) -> bool {
        self == ClassStatus::Planned
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, ClassStatus::Planned | ClassStatus::InProgress)
    }

    pub fn can_complete(self) -> bool {
        self != ClassStatus::Completed
    }

    pub fn can_edit(self) -> bool {
        self == ClassStatus::Planned
    }

    pub fn can_delete(self) -> bool {
        self != ClassStatus::Completed
    }
}

/// Wall-clock times travel as `HH:MM`.
mod clock_time {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
    }

    pub fn optional<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| parse(&raw))
            .transpose()
    }

    fn parse<E: Error>(raw: &str) -> Result<NaiveTime, E> {
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .map_err(|_| E::custom(format!("expected HH:MM, got {raw}")))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedClass {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    pub duration: i64,
    pub routine_id: Option<i64>,
    pub class_type: ClassType,
    pub max_participants: Option<i64>,
    pub target_students: Vec<i64>,
    pub notes: Vec<String>,
    pub status: ClassStatus,
    pub routine_completion_id: Option<i64>,
    pub created_by: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PlannedClass {
    /// The class may start from `lead_minutes` before its start time until it ends.
    pub fn start_window(&self, lead_minutes: i64) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.date.and_time(self.start_time) - Duration::minutes(lead_minutes),
            self.date.and_time(self.end_time),
        )
    }

    pub fn can_be_started(&self, now: NaiveDateTime, lead_minutes: i64) -> bool {
        let (opens, closes) = self.start_window(lead_minutes);
        self.status.can_start() && now.date() == self.date && opens <= now && now <= closes
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub routine_id: Option<i64>,
    #[serde(default)]
    pub class_type: ClassType,
    #[serde(default)]
    pub max_participants: Option<i64>,
    #[serde(default)]
    pub target_students: Vec<i64>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Partial update of a planned class; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "clock_time::optional")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "clock_time::optional")]
    pub end_time: Option<NaiveTime>,
    pub routine_id: Option<i64>,
    pub class_type: Option<ClassType>,
    pub max_participants: Option<i64>,
    pub target_students: Option<Vec<i64>>,
    pub notes: Option<Vec<String>>,
}

impl ClassPatch {
    pub fn apply(&self, current: &PlannedClass) -> ClassDraft {
        ClassDraft {
            title: self.title.clone().unwrap_or_else(|| current.title.clone()),
            description: self.description.clone().or_else(|| current.description.clone()),
            date: self.date.unwrap_or(current.date),
            start_time: self.start_time.unwrap_or(current.start_time),
            end_time: self.end_time.unwrap_or(current.end_time),
            routine_id: self.routine_id.or(current.routine_id),
            class_type: self.class_type.unwrap_or(current.class_type),
            max_participants: self.max_participants.or(current.max_participants),
            target_students: self
                .target_students
                .clone()
                .unwrap_or_else(|| current.target_students.clone()),
            notes: self.notes.clone().unwrap_or_else(|| current.notes.clone()),
        }
    }
}

/// A copy of a class on another date, optionally retimed or renamed.
#[derive(Debug, Clone, Deserialize)]
pub struct DuplicateClass {
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "clock_time::optional")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "clock_time::optional")]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub title: Option<String>,
}

impl DuplicateClass {
    pub fn apply(&self, source: &PlannedClass) -> ClassDraft {
        ClassDraft {
            title: copy_name(&source.title, self.title.as_deref()),
            description: source.description.clone(),
            date: self.date,
            start_time: self.start_time.unwrap_or(source.start_time),
            end_time: self.end_time.unwrap_or(source.end_time),
            routine_id: source.routine_id,
            class_type: source.class_type,
            max_participants: source.max_participants,
            target_students: source.target_students.clone(),
            notes: source.notes.clone(),
        }
    }
}

/// Completing a class either links an existing completion or records a new one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteClass {
    #[serde(default)]
    pub routine_completion_id: Option<i64>,
    #[serde(default)]
    pub completion: Option<CompletionDraft>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassFilter {
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<ClassStatus>,
}

pub fn class_duration(start_time: NaiveTime, end_time: NaiveTime) -> i64 {
    (end_time - start_time).num_minutes()
}

pub fn validate_draft(draft: &ClassDraft, today: NaiveDate) -> DomainResult<()> {
    let mut violations = Violations::new();

    let title = draft.title.trim().chars().count();
    violations.check(title > 0, "title", "title is required");
    violations.check(title <= 255, "title", "title must be at most 255 characters");
    violations.check(draft.date >= today, "date", "date cannot be in the past");
    violations.check(
        draft.end_time > draft.start_time,
        "end_time",
        "end time must be after the start time",
    );
    if let Some(max) = draft.max_participants {
        violations.check(
            (1..=MAX_PARTICIPANTS).contains(&max),
            "max_participants",
            format!("max participants must be between 1 and {MAX_PARTICIPANTS}"),
        );
    }

    violations.into_result("Planned class is invalid")
}
