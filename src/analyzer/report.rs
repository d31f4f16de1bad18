use crate::recorder::ExerciseCompletion;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Clone)]
pub struct CatalogFact {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
    pub average_rating: Option<f64>,
    pub labels: Vec<(&'static str, String)>,
}

#[derive(Debug, Clone)]
pub struct CompletionFact {
    pub id: i64,
    pub routine_id: i64,
    pub category_name: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub planned_duration: f64,
    pub actual_duration: i64,
    pub rating: Option<u8>,
    pub morning_session: bool,
    pub afternoon_session: bool,
    pub is_full_day_complete: bool,
    pub exercise_completions: Vec<ExerciseCompletion>,
}

#[derive(Debug, Clone)]
pub struct AttendanceFact {
    pub completion_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub participation_minutes: i64,
    pub completed_full_session: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowStats {
    pub sessions: usize,
    pub minutes: i64,
    pub unique_students: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopularItem {
    pub id: i64,
    pub name: String,
    pub usage_count: i64,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Overview {
    pub active_routines: usize,
    pub active_exercises: usize,
    pub routines_by_difficulty: BTreeMap<String, usize>,
    pub routines_by_level: BTreeMap<String, usize>,
    pub exercises_by_work_type: BTreeMap<String, usize>,
    pub exercises_by_difficulty: BTreeMap<String, usize>,
    pub exercises_by_intensity: BTreeMap<String, usize>,
    pub completions_by_category: BTreeMap<String, usize>,
    pub today: WindowStats,
    pub this_week: WindowStats,
    pub this_month: WindowStats,
    pub popular_routines: Vec<PopularItem>,
    pub popular_exercises: Vec<PopularItem>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionSummary {
    pub sessions: usize,
    pub total_minutes: i64,
    pub average_duration: f64,
    pub average_rating: Option<f64>,
    pub unique_routines: usize,
    pub unique_students: usize,
    pub morning_sessions: usize,
    pub afternoon_sessions: usize,
    pub full_day_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub sessions: usize,
    pub minutes: i64,
    pub students: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStat {
    pub name: String,
    pub sessions: usize,
    pub minutes: i64,
    pub average_efficiency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentParticipation {
    pub student_id: i64,
    pub name: String,
    pub sessions: usize,
    pub minutes: i64,
    pub full_sessions: usize,
    pub consistency_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompletionAnalytics {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub summary: CompletionSummary,
    pub daily: Vec<DailyStat>,
    pub work_type_minutes: BTreeMap<String, f64>,
    pub categories: Vec<CategoryStat>,
    pub students: Vec<StudentParticipation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyProgress {
    pub week_start: NaiveDate,
    pub sessions: usize,
    pub minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryMinutes {
    pub sessions: usize,
    pub minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentReport {
    pub student_id: i64,
    pub student_name: String,
    pub sessions: usize,
    pub total_participation_minutes: i64,
    pub average_participation_percentage: f64,
    pub full_sessions: usize,
    pub consistency_rate: f64,
    pub weekly: Vec<WeeklyProgress>,
    pub categories: BTreeMap<String, CategoryMinutes>,
}

pub fn consistency_rate(full_sessions: usize, sessions: usize) -> f64 {
    if sessions == 0 {
        return 0.0;
    }

    round1(full_sessions as f64 / sessions as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn category_label(name: Option<&str>) -> String {
    name.unwrap_or(UNCATEGORIZED).to_string()
}

fn count_by(facts: &[CatalogFact], label: &str) -> BTreeMap<String, usize> {
    facts.iter().fold(BTreeMap::new(), |mut acc, fact| {
        if let Some((_, value)) = fact.labels.iter().find(|(key, _)| *key == label) {
            *acc.entry(value.clone()).or_insert(0) += 1;
        }
        acc
    })
}

fn top_n_popular(facts: &[CatalogFact], limit: usize) -> Vec<PopularItem> {
    let mut ranked = facts.iter().collect::<Vec<_>>();
    ranked.sort_by(|left, right| {
        right
            .usage_count
            .cmp(&left.usage_count)
            .then_with(|| {
                right
                    .average_rating
                    .unwrap_or_default()
                    .total_cmp(&left.average_rating.unwrap_or_default())
            })
            .then_with(|| left.name.cmp(&right.name))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|fact| PopularItem {
            id: fact.id,
            name: fact.name.clone(),
            usage_count: fact.usage_count,
            average_rating: fact.average_rating,
        })
        .collect()
}

fn window_stats<'a>(
    completions: impl Iterator<Item = &'a CompletionFact>,
    attendance: &HashMap<i64, Vec<&AttendanceFact>>,
) -> WindowStats {
    let (sessions, minutes, students) = completions.fold(
        (0_usize, 0_i64, HashSet::new()),
        |(sessions, minutes, mut students), completion| {
            students.extend(
                attendance
                    .get(&completion.id)
                    .into_iter()
                    .flatten()
                    .map(|fact| fact.student_id),
            );
            (sessions + 1, minutes + completion.actual_duration.max(0), students)
        },
    );

    WindowStats {
        sessions,
        minutes,
        unique_students: students.len(),
    }
}

fn attendance_by_completion(attendance: &[AttendanceFact]) -> HashMap<i64, Vec<&AttendanceFact>> {
    attendance.iter().fold(HashMap::new(), |mut acc, fact| {
        acc.entry(fact.completion_id).or_insert_with(Vec::new).push(fact);
        acc
    })
}

pub fn build_overview(
    now: DateTime<Utc>,
    routines: &[CatalogFact],
    exercises: &[CatalogFact],
    completions: &[CompletionFact],
    attendance: &[AttendanceFact],
    popular_limit: usize,
) -> Overview {
    let today = now.date_naive();
    let monday = week_start(today);
    let by_completion = attendance_by_completion(attendance);

    let completions_by_category = completions.iter().fold(BTreeMap::new(), |mut acc, completion| {
        *acc.entry(category_label(completion.category_name.as_deref()))
            .or_insert(0) += 1;
        acc
    });

    let day_of = |completion: &&CompletionFact| completion.completed_at.date_naive();

    Overview {
        active_routines: routines.len(),
        active_exercises: exercises.len(),
        routines_by_difficulty: count_by(routines, "difficulty"),
        routines_by_level: count_by(routines, "level"),
        exercises_by_work_type: count_by(exercises, "work_type"),
        exercises_by_difficulty: count_by(exercises, "difficulty"),
        exercises_by_intensity: count_by(exercises, "intensity"),
        completions_by_category,
        today: window_stats(
            completions.iter().filter(|completion| day_of(completion) == today),
            &by_completion,
        ),
        this_week: window_stats(
            completions
                .iter()
                .filter(|completion| (monday..=today).contains(&day_of(completion))),
            &by_completion,
        ),
        this_month: window_stats(
            completions.iter().filter(|completion| {
                let day = day_of(completion);
                day.year() == today.year() && day.month() == today.month() && day <= today
            }),
            &by_completion,
        ),
        popular_routines: top_n_popular(routines, popular_limit),
        popular_exercises: top_n_popular(exercises, popular_limit),
    }
}

pub fn build_completion_analytics(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    completions: &[CompletionFact],
    attendance: &[AttendanceFact],
) -> CompletionAnalytics {
    let by_completion = attendance_by_completion(attendance);
    let sessions = completions.len();
    let total_minutes = completions
        .iter()
        .map(|completion| completion.actual_duration.max(0))
        .sum::<i64>();
    let ratings = completions
        .iter()
        .filter_map(|completion| completion.rating)
        .map(f64::from)
        .collect::<Vec<_>>();

    let summary = CompletionSummary {
        sessions,
        total_minutes,
        average_duration: if sessions == 0 {
            0.0
        } else {
            round1(total_minutes as f64 / sessions as f64)
        },
        average_rating: (!ratings.is_empty())
            .then(|| crate::db::round2(ratings.iter().sum::<f64>() / ratings.len() as f64)),
        unique_routines: completions
            .iter()
            .map(|completion| completion.routine_id)
            .collect::<HashSet<_>>()
            .len(),
        unique_students: attendance
            .iter()
            .map(|fact| fact.student_id)
            .collect::<HashSet<_>>()
            .len(),
        morning_sessions: completions.iter().filter(|c| c.morning_session).count(),
        afternoon_sessions: completions.iter().filter(|c| c.afternoon_session).count(),
        full_day_sessions: completions.iter().filter(|c| c.is_full_day_complete).count(),
    };

    let daily = completions
        .iter()
        .fold(BTreeMap::new(), |mut acc, completion| {
            let entry = acc
                .entry(completion.completed_at.date_naive())
                .or_insert((0_usize, 0_i64, HashSet::new()));
            entry.0 += 1;
            entry.1 += completion.actual_duration.max(0);
            entry.2.extend(
                by_completion
                    .get(&completion.id)
                    .into_iter()
                    .flatten()
                    .map(|fact| fact.student_id),
            );
            acc
        })
        .into_iter()
        .map(|(date, (sessions, minutes, students))| DailyStat {
            date,
            sessions,
            minutes,
            students: students.len(),
        })
        .collect();

    let work_type_minutes = completions
        .iter()
        .flat_map(|completion| completion.exercise_completions.iter())
        .fold(BTreeMap::new(), |mut acc, entry| {
            if let (Some(work_type), Some(duration)) = (entry.work_type, entry.duration) {
                *acc.entry(work_type.to_string()).or_insert(0.0) += duration.max(0.0);
            }
            acc
        });

    let categories = completions
        .iter()
        .fold(BTreeMap::new(), |mut acc, completion| {
            let entry = acc
                .entry(category_label(completion.category_name.as_deref()))
                .or_insert((0_usize, 0_i64, 0.0_f64));
            entry.0 += 1;
            entry.1 += completion.actual_duration.max(0);
            entry.2 += crate::recorder::efficiency_percentage(
                completion.planned_duration,
                completion.actual_duration,
            );
            acc
        })
        .into_iter()
        .map(|(name, (sessions, minutes, efficiency))| CategoryStat {
            name,
            sessions,
            minutes,
            average_efficiency: round1(efficiency / sessions as f64),
        })
        .collect();

    let mut students = attendance
        .iter()
        .fold(BTreeMap::new(), |mut acc, fact| {
            let entry = acc
                .entry(fact.student_id)
                .or_insert_with(|| (fact.student_name.clone(), 0_usize, 0_i64, 0_usize));
            entry.1 += 1;
            entry.2 += fact.participation_minutes.max(0);
            entry.3 += usize::from(fact.completed_full_session);
            acc
        })
        .into_iter()
        .map(
            |(student_id, (name, sessions, minutes, full_sessions))| StudentParticipation {
                student_id,
                name,
                sessions,
                minutes,
                full_sessions,
                consistency_rate: consistency_rate(full_sessions, sessions),
            },
        )
        .collect::<Vec<_>>();
    students.sort_by(|left, right| {
        right
            .minutes
            .cmp(&left.minutes)
            .then_with(|| left.name.cmp(&right.name))
    });

    CompletionAnalytics {
        from,
        to,
        summary,
        daily,
        work_type_minutes,
        categories,
        students,
    }
}

/// `attendance` holds only the student's rows; `completions` the sessions they attended.
pub fn build_student_report(
    student_id: i64,
    student_name: &str,
    completions: &[CompletionFact],
    attendance: &[AttendanceFact],
) -> StudentReport {
    let by_id = completions
        .iter()
        .map(|completion| (completion.id, completion))
        .collect::<HashMap<_, _>>();
    let rows = attendance
        .iter()
        .filter_map(|fact| by_id.get(&fact.completion_id).map(|completion| (fact, *completion)))
        .collect::<Vec<_>>();

    let sessions = rows.len();
    let full_sessions = rows
        .iter()
        .filter(|(fact, _)| fact.completed_full_session)
        .count();
    let total_participation_minutes = rows
        .iter()
        .map(|(fact, _)| fact.participation_minutes.max(0))
        .sum::<i64>();
    let average_participation_percentage = if sessions == 0 {
        0.0
    } else {
        let sum = rows
            .iter()
            .map(|(fact, completion)| {
                crate::recorder::participation_percentage(
                    fact.participation_minutes,
                    completion.actual_duration,
                )
            })
            .sum::<f64>();
        round1(sum / sessions as f64)
    };

    let weekly = rows
        .iter()
        .fold(BTreeMap::new(), |mut acc, (fact, completion)| {
            let entry = acc
                .entry(week_start(completion.completed_at.date_naive()))
                .or_insert((0_usize, 0_i64));
            entry.0 += 1;
            entry.1 += fact.participation_minutes.max(0);
            acc
        })
        .into_iter()
        .map(|(week_start, (sessions, minutes))| WeeklyProgress {
            week_start,
            sessions,
            minutes,
        })
        .collect();

    let categories = rows
        .iter()
        .fold(BTreeMap::new(), |mut acc, (fact, completion)| {
            let entry: &mut CategoryMinutes = acc
                .entry(category_label(completion.category_name.as_deref()))
                .or_default();
            entry.sessions += 1;
            entry.minutes += fact.participation_minutes.max(0);
            acc
        });

    StudentReport {
        student_id,
        student_name: student_name.to_string(),
        sessions,
        total_participation_minutes,
        average_participation_percentage,
        full_sessions,
        consistency_rate: consistency_rate(full_sessions, sessions),
        weekly,
        categories,
    }
}
