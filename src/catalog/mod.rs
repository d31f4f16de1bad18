pub mod store;

use crate::access::{Governed, Visibility};
use crate::db::CategoryRef;
use crate::error::{DomainResult, Violations};
use serde::{Deserialize, Serialize};

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_FLAT_DURATION: i64 = 300;
const COPY_SUFFIX: &str = " (Copy)";

text_enum! {
    pub enum Intensity {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

text_enum! {
    pub enum WorkType {
        Strength => "strength",
        Coordination => "coordination",
        Reaction => "reaction",
        Technique => "technique",
        Cardio => "cardio",
        Flexibility => "flexibility",
        Sparring => "sparring",
        Conditioning => "conditioning",
    }
}

text_enum! {
    pub enum Difficulty {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Intensity::Medium
    }
}

impl Default for WorkType {
    fn default() -> Self {
        WorkType::Technique
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Intermediate
    }
}

/// One segment of a multi-timer program. Durations are minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSpec {
    pub name: String,
    pub duration: f64,
    pub repetitions: u32,
    #[serde(default, alias = "restBetween")]
    pub rest_between: f64,
}

impl TimerSpec {
    pub fn total_minutes(&self) -> f64 {
        let repetitions = f64::from(self.repetitions);
        self.duration * repetitions + self.rest_between * (repetitions - 1.0).max(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub duration: i64,
    pub effective_duration: f64,
    pub intensity: Intensity,
    pub work_type: WorkType,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub materials: Vec<String>,
    pub protection: Vec<String>,
    pub instructions: Vec<String>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub is_multi_timer: bool,
    pub timers: Vec<TimerSpec>,
    pub is_template: bool,
    pub is_active: bool,
    pub visibility: Visibility,
    pub created_by: i64,
    pub usage_count: i64,
    pub average_rating: Option<f64>,
    pub categories: Vec<CategoryRef>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Governed for Exercise {
    fn owner_id(&self) -> i64 {
        self.created_by
    }

    fn visibility(&self) -> Visibility {
        self.visibility
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration: i64,
    #[serde(default)]
    pub intensity: Intensity,
    #[serde(default)]
    pub work_type: WorkType,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub protection: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_multi_timer: bool,
    #[serde(default)]
    pub timers: Vec<TimerSpec>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub category_ids: Vec<i64>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub duration: Option<i64>,
    pub intensity: Option<Intensity>,
    pub work_type: Option<WorkType>,
    pub difficulty: Option<Difficulty>,
    pub tags: Option<Vec<String>>,
    pub materials: Option<Vec<String>>,
    pub protection: Option<Vec<String>>,
    pub instructions: Option<Vec<String>>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub is_multi_timer: Option<bool>,
    pub timers: Option<Vec<TimerSpec>>,
    pub is_template: Option<bool>,
    pub visibility: Option<Visibility>,
    pub category_ids: Option<Vec<i64>>,
}

impl ExercisePatch {
    /// The draft the exercise would have after this patch, validated like a new one.
    pub fn apply(&self, current: &Exercise) -> ExerciseDraft {
        ExerciseDraft {
            name: self.name.clone().unwrap_or_else(|| current.name.clone()),
            description: self.description.clone().or_else(|| current.description.clone()),
            duration: self.duration.unwrap_or(current.duration),
            intensity: self.intensity.unwrap_or(current.intensity),
            work_type: self.work_type.unwrap_or(current.work_type),
            difficulty: self.difficulty.unwrap_or(current.difficulty),
            tags: self.tags.clone().unwrap_or_else(|| current.tags.clone()),
            materials: self.materials.clone().unwrap_or_else(|| current.materials.clone()),
            protection: self.protection.clone().unwrap_or_else(|| current.protection.clone()),
            instructions: self
                .instructions
                .clone()
                .unwrap_or_else(|| current.instructions.clone()),
            video_url: self.video_url.clone().or_else(|| current.video_url.clone()),
            image_url: self.image_url.clone().or_else(|| current.image_url.clone()),
            is_multi_timer: self.is_multi_timer.unwrap_or(current.is_multi_timer),
            timers: self.timers.clone().unwrap_or_else(|| current.timers.clone()),
            is_template: self.is_template.unwrap_or(current.is_template),
            visibility: self.visibility.unwrap_or(current.visibility),
            category_ids: self.category_ids.clone().unwrap_or_else(|| {
                current.categories.iter().map(|category| category.id).collect()
            }),
        }
    }

    pub fn changes_duration(&self) -> bool {
        self.duration.is_some() || self.is_multi_timer.is_some() || self.timers.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloneOverrides {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExerciseFilter {
    #[serde(default)]
    pub work_type: Option<WorkType>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

/// Minutes an exercise contributes to a block when no override is set.
pub fn effective_duration(is_multi_timer: bool, flat_duration: i64, timers: &[TimerSpec]) -> f64 {
    if is_multi_timer {
        timers.iter().map(TimerSpec::total_minutes).sum()
    } else {
        flat_duration as f64
    }
}

/// Weighted running mean: the prior usage count stands in for the sample count.
pub fn next_average_rating(previous: Option<f64>, usage_count: i64, rating: u8) -> f64 {
    let (average, samples) = match previous {
        Some(average) => (average, usage_count.max(0) as f64),
        None => (0.0, usage_count.max(1) as f64),
    };

    let next = (average * samples + f64::from(rating)) / (samples + 1.0);
    crate::db::round2(next.clamp(1.0, 5.0))
}

pub fn copy_name(original: &str, requested: Option<&str>) -> String {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{original}{COPY_SUFFIX}"),
    }
}

pub(crate) fn check_name(violations: &mut Violations, field: &str, name: &str) {
    let length = name.trim().chars().count();
    violations.check(length > 0, field, "name is required");
    violations.check(
        length <= MAX_NAME_LEN,
        field,
        format!("name must be at most {MAX_NAME_LEN} characters"),
    );
}

pub(crate) fn check_timers(violations: &mut Violations, prefix: &str, timers: &[TimerSpec]) {
    for (index, timer) in timers.iter().enumerate() {
        let field = format!("{prefix}.{index}");
        violations.check(
            !timer.name.trim().is_empty(),
            format!("{field}.name"),
            "timer name is required",
        );
        violations.check(
            timer.duration.is_finite() && timer.duration > 0.0,
            format!("{field}.duration"),
            "timer duration must be greater than zero",
        );
        violations.check(
            timer.repetitions >= 1,
            format!("{field}.repetitions"),
            "repetitions must be at least 1",
        );
        violations.check(
            timer.rest_between.is_finite() && timer.rest_between >= 0.0,
            format!("{field}.rest_between"),
            "rest between repetitions cannot be negative",
        );
    }
}

pub fn validate_draft(draft: &ExerciseDraft) -> DomainResult<()> {
    let mut violations = Violations::new();

    check_name(&mut violations, "name", &draft.name);
    violations.check(
        (1..=MAX_FLAT_DURATION).contains(&draft.duration),
        "duration",
        format!("duration must be between 1 and {MAX_FLAT_DURATION} minutes"),
    );
    if draft.is_multi_timer {
        violations.check(
            !draft.timers.is_empty(),
            "timers",
            "a multi-timer exercise needs at least one timer",
        );
    }
    check_timers(&mut violations, "timers", &draft.timers);

    violations.into_result("Exercise is invalid")
}

#[cfg(test)]
mod tests {
    use super::{
        ExerciseDraft, TimerSpec, copy_name, effective_duration, next_average_rating,
        validate_draft,
    };

    fn timer(duration: f64, repetitions: u32, rest_between: f64) -> TimerSpec {
        TimerSpec {
            name: "round".to_string(),
            duration,
            repetitions,
            rest_between,
        }
    }

    #[test]
    fn multi_timer_duration_counts_rest_between_repetitions() {
        let timers = vec![timer(1.0, 3, 0.5)];
        assert_eq!(effective_duration(true, 10, &timers), 4.0);
    }

    #[test]
    fn fractional_rest_accumulates_across_timers() {
        let timers = vec![timer(1.0, 3, 0.25), timer(2.0, 2, 0.25), timer(0.5, 1, 3.0)];
        assert_eq!(effective_duration(true, 1, &timers), 3.5 + 4.25 + 0.5);
    }

    #[test]
    fn flat_duration_ignores_timers() {
        let timers = vec![timer(1.0, 3, 0.5)];
        assert_eq!(effective_duration(false, 12, &timers), 12.0);
    }

    #[test]
    fn zero_repetitions_are_rejected_at_validation() {
        let draft = ExerciseDraft {
            name: "Combos".to_string(),
            duration: 5,
            is_multi_timer: true,
            timers: vec![timer(1.0, 0, 0.0)],
            ..ExerciseDraft::default()
        };

        let error = validate_draft(&draft).expect_err("degenerate timer");
        let fields = error.fields().expect("field map");
        assert!(fields.contains_key("timers.0.repetitions"));
    }

    #[test]
    fn multi_timer_needs_a_timer() {
        let draft = ExerciseDraft {
            name: "Rounds".to_string(),
            duration: 9,
            is_multi_timer: true,
            ..ExerciseDraft::default()
        };

        assert!(validate_draft(&draft).is_err());
    }

    #[test]
    fn incremental_rating_uses_prior_usage_as_sample_count() {
        assert_eq!(next_average_rating(Some(4.5), 2, 3), 4.0);
        assert_eq!(next_average_rating(None, 0, 5), 2.5);
        assert_eq!(next_average_rating(None, 3, 4), 1.0);
        assert_eq!(next_average_rating(Some(4.0), 0, 2), 2.0);
    }

    #[test]
    fn copies_are_suffixed_unless_named() {
        assert_eq!(copy_name("Jab drill", None), "Jab drill (Copy)");
        assert_eq!(copy_name("Jab drill", Some("  ")), "Jab drill (Copy)");
        assert_eq!(copy_name("Jab drill", Some("Cross drill")), "Cross drill");
    }
}
