pub mod store;

use crate::access::{Governed, Visibility};
use crate::catalog::{Difficulty, TimerSpec, check_name, check_timers};
use crate::db::CategoryRef;
use crate::error::{DomainResult, Violations};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

pub const DEFAULT_BLOCK_COLOR: &str = "#3B82F6";
pub const MAX_REPEAT_IN_DAYS: i64 = 365;

static BLOCK_COLOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid block color pattern"));

text_enum! {
    pub enum Level {
        Principiante => "principiante",
        Intermedio => "intermedio",
        Avanzado => "avanzado",
    }
}

impl Default for Level {
    fn default() -> Self {
        Level::Intermedio
    }
}

text_enum! {
    pub enum Weekday {
        Monday => "monday",
        Tuesday => "tuesday",
        Wednesday => "wednesday",
        Thursday => "thursday",
        Friday => "friday",
        Saturday => "saturday",
        Sunday => "sunday",
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub objective: Option<String>,
    pub total_duration: f64,
    pub difficulty: Difficulty,
    pub level: Level,
    pub tags: Vec<String>,
    pub materials: Vec<String>,
    pub protection: Vec<String>,
    pub is_template: bool,
    pub is_favorite: bool,
    pub visibility: Visibility,
    pub is_active: bool,
    pub repeat_in_days: i64,
    pub scheduled_days: Vec<Weekday>,
    pub trainer_notes: Option<String>,
    pub created_by: i64,
    pub usage_count: i64,
    pub average_rating: Option<f64>,
    pub categories: Vec<CategoryRef>,
    pub blocks: Vec<RoutineBlock>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Governed for Routine {
    fn owner_id(&self) -> i64 {
        self.created_by
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutineBlock {
    pub id: i64,
    pub routine_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub notes: Option<String>,
    pub sort_order: i64,
    pub duration: f64,
    pub exercises: Vec<BlockExercise>,
}

/// An exercise as used inside one block, with its per-use overrides.
#[derive(Debug, Clone, Serialize)]
pub struct BlockExercise {
    pub id: i64,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub sort_order: i64,
    pub duration_override: Option<i64>,
    pub notes: Vec<String>,
    pub custom_timers: Option<Vec<TimerSpec>>,
    pub exercise_duration: f64,
    pub effective_duration: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutineDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub protection: Vec<String>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub repeat_in_days: i64,
    #[serde(default)]
    pub scheduled_days: Vec<Weekday>,
    #[serde(default)]
    pub trainer_notes: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub blocks: Vec<BlockDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_block_color")]
    pub color: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub exercises: Vec<InstanceDraft>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceDraft {
    pub exercise_id: i64,
    #[serde(default)]
    pub duration_override: Option<i64>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub custom_timers: Option<Vec<TimerSpec>>,
}

fn default_block_color() -> String {
    DEFAULT_BLOCK_COLOR.to_string()
}

/// Metadata changes for an existing routine. Structure goes through `replace_blocks`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutinePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub objective: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub level: Option<Level>,
    pub tags: Option<Vec<String>>,
    pub materials: Option<Vec<String>>,
    pub protection: Option<Vec<String>>,
    pub is_template: Option<bool>,
    pub visibility: Option<Visibility>,
    pub repeat_in_days: Option<i64>,
    pub scheduled_days: Option<Vec<Weekday>>,
    pub trainer_notes: Option<String>,
    pub category_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutineFilter {
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub level: Option<Level>,
    #[serde(default)]
    pub favorites: bool,
    #[serde(default)]
    pub templates: bool,
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReadiness {
    pub routine_id: i64,
    pub repeat_in_days: i64,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub ready: bool,
}

pub fn instance_duration(duration_override: Option<i64>, exercise_duration: f64) -> f64 {
    duration_override
        .map(|minutes| minutes as f64)
        .unwrap_or(exercise_duration)
}

/// Sums cached block durations; block durations must already be current.
pub fn calculate_total_duration(blocks: &[RoutineBlock]) -> f64 {
    blocks.iter().map(|block| block.duration).sum()
}

pub fn next_eligible_at(
    repeat_in_days: i64,
    last_completed_at: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if repeat_in_days <= 0 {
        return None;
    }

    last_completed_at.map(|completed_at| completed_at + Duration::days(repeat_in_days))
}

pub fn is_ready_for_scheduling(
    repeat_in_days: i64,
    last_completed_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    if repeat_in_days <= 0 {
        return false;
    }

    match next_eligible_at(repeat_in_days, last_completed_at) {
        Some(eligible_at) => eligible_at < now,
        None => true,
    }
}

pub fn validate_draft(draft: &RoutineDraft) -> DomainResult<()> {
    let mut violations = Violations::new();

    check_name(&mut violations, "name", &draft.name);
    check_repeat(&mut violations, draft.repeat_in_days);
    check_blocks(&mut violations, &draft.blocks);

    violations.into_result("Routine is invalid")
}

pub fn validate_blocks(blocks: &[BlockDraft]) -> DomainResult<()> {
    let mut violations = Violations::new();
    check_blocks(&mut violations, blocks);

    let mut seen = HashSet::new();
    for (index, block) in blocks.iter().enumerate() {
        if let Some(id) = block.id {
            violations.check(
                seen.insert(id),
                format!("blocks.{index}.id"),
                format!("block {id} appears more than once"),
            );
        }
    }

    violations.into_result("Routine blocks are invalid")
}

pub fn validate_patch(patch: &RoutinePatch) -> DomainResult<()> {
    let mut violations = Violations::new();

    if let Some(name) = &patch.name {
        check_name(&mut violations, "name", name);
    }
    if let Some(repeat_in_days) = patch.repeat_in_days {
        check_repeat(&mut violations, repeat_in_days);
    }

    violations.into_result("Routine update is invalid")
}

fn check_repeat(violations: &mut Violations, repeat_in_days: i64) {
    violations.check(
        (0..=MAX_REPEAT_IN_DAYS).contains(&repeat_in_days),
        "repeat_in_days",
        format!("repeat_in_days must be between 0 and {MAX_REPEAT_IN_DAYS}"),
    );
}

fn check_blocks(violations: &mut Violations, blocks: &[BlockDraft]) {
    violations.check(!blocks.is_empty(), "blocks", "at least one block is required");

    for (index, block) in blocks.iter().enumerate() {
        let field = format!("blocks.{index}");
        check_name(violations, &format!("{field}.name"), &block.name);
        violations.check(
            BLOCK_COLOR.is_match(&block.color),
            format!("{field}.color"),
            "color must be a hex value like #3B82F6",
        );
        violations.check(
            !block.exercises.is_empty(),
            format!("{field}.exercises"),
            "each block needs at least one exercise",
        );

        let mut seen = HashSet::new();
        for (position, instance) in block.exercises.iter().enumerate() {
            let instance_field = format!("{field}.exercises.{position}");
            violations.check(
                seen.insert(instance.exercise_id),
                format!("{instance_field}.exercise_id"),
                format!(
                    "exercise {} is already part of this block",
                    instance.exercise_id
                ),
            );
            if let Some(minutes) = instance.duration_override {
                violations.check(
                    minutes >= 1,
                    format!("{instance_field}.duration_override"),
                    "duration override must be at least 1 minute",
                );
            }
            if let Some(timers) = &instance.custom_timers {
                check_timers(violations, &format!("{instance_field}.custom_timers"), timers);
            }
        }
    }
}
