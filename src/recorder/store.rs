use super::{
    Attendee, Completion, CompletionDraft, CompletionFilter, CompletionPatch, SessionType,
    duration_difference, efficiency_percentage, participation_percentage, validate_draft,
    validate_patch,
};
use crate::access::{Actor, Role, can_amend_completion, require_elevated};
use crate::catalog::store::{exercise_exists, increment_exercise_usage, rate_exercise};
use crate::composer::store::visible_routine;
use crate::db::{Database, json_column, non_students, round2, to_json, utc_from_timestamp};
use crate::error::{AcademyError, DomainResult, Violations};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

const COMPLETION_COLUMNS: &str = "id, routine_id, routine_name, category_id, category_name,
    completed_at, planned_duration, actual_duration, notes, rating, morning_session,
    afternoon_session, is_full_day_complete, block_completions, exercise_completions,
    completed_by, created_at, updated_at";

impl Database {
    /// Records a finished session and updates the statistics it feeds, all or nothing.
    pub fn record_completion(
        &mut self,
        actor: &Actor,
        draft: &CompletionDraft,
        now: DateTime<Utc>,
    ) -> DomainResult<Completion> {
        let completion = self.write(|tx| insert_completion(tx, actor, draft, now))?;

        info!(
            completion_id = completion.id,
            routine_id = completion.routine_id,
            attendees = completion.attendees.len(),
            actual_duration = completion.actual_duration,
            "completion recorded"
        );
        Ok(completion)
    }

    pub fn completion(&self, actor: &Actor, id: i64) -> DomainResult<Completion> {
        let completion = require_completion(self.conn(), id)?;
        let attended = completion
            .attendees
            .iter()
            .any(|attendee| attendee.student_id == actor.id);

        if actor.is_elevated() || attended {
            Ok(completion)
        } else {
            Err(AcademyError::not_found(format!("Completion {id}")))
        }
    }

    pub fn list_completions(
        &self,
        actor: &Actor,
        filter: &CompletionFilter,
        limit: usize,
    ) -> DomainResult<Vec<Completion>> {
        let student_id = match actor.role {
            Role::Student => Some(actor.id),
            _ => filter.student_id,
        };

        let mut statement = self.conn().prepare(
            "SELECT rc.id FROM routine_completions rc
             WHERE (?1 IS NULL OR rc.routine_id = ?1)
               AND (?2 IS NULL OR EXISTS (
                    SELECT 1 FROM routine_completion_attendees a
                    WHERE a.routine_completion_id = rc.id AND a.student_id = ?2))
               AND (?3 IS NULL OR rc.completed_at >= ?3)
               AND (?4 IS NULL OR rc.completed_at <= ?4)
               AND (?5 IS NULL
                    OR (?5 = 'morning' AND rc.morning_session = 1)
                    OR (?5 = 'afternoon' AND rc.afternoon_session = 1)
                    OR (?5 = 'full_day' AND rc.is_full_day_complete = 1))
               AND (?6 IS NULL OR rc.rating >= ?6)
             ORDER BY rc.completed_at DESC, rc.id DESC
             LIMIT ?7",
        )?;

        let ids = statement
            .query_map(
                params![
                    filter.routine_id,
                    student_id,
                    filter.from.map(|from| from.timestamp()),
                    filter.to.map(|to| to.timestamp()),
                    filter.session.map(SessionType::as_str),
                    filter.min_rating,
                    limit as i64,
                ],
                |row| row.get::<_, i64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|id| require_completion(self.conn(), id))
            .collect()
    }

    pub fn update_completion(
        &mut self,
        actor: &Actor,
        id: i64,
        patch: &CompletionPatch,
    ) -> DomainResult<Completion> {
        validate_patch(patch)?;

        let completion = self.write(|tx| {
            let current = amendable_completion(tx, actor, id)?;
            if let Some(entries) = &patch.exercise_completions {
                check_detail_exercises(tx, entries)?;
            }

            tx.execute(
                "UPDATE routine_completions
                 SET actual_duration = ?2, rating = ?3, notes = ?4, block_completions = ?5,
                     exercise_completions = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patch.actual_duration.unwrap_or(current.actual_duration),
                    patch.rating.or(current.rating),
                    to_json(patch.notes.as_ref().unwrap_or(&current.notes))?,
                    to_json(
                        patch
                            .block_completions
                            .as_ref()
                            .unwrap_or(&current.block_completions)
                    )?,
                    to_json(
                        patch
                            .exercise_completions
                            .as_ref()
                            .unwrap_or(&current.exercise_completions)
                    )?,
                    Utc::now().timestamp(),
                ],
            )?;

            if patch.rating.is_some() {
                recompute_routine_rating(tx, current.routine_id)?;
            }

            require_completion(tx, id)
        })?;

        info!(completion_id = id, "completion updated");
        Ok(completion)
    }

    pub fn delete_completion(&mut self, actor: &Actor, id: i64) -> DomainResult<()> {
        let routine_id = self.write(|tx| {
            let current = amendable_completion(tx, actor, id)?;
            tx.execute("DELETE FROM routine_completions WHERE id = ?1", params![id])?;
            recompute_routine_rating(tx, current.routine_id)?;
            Ok(current.routine_id)
        })?;

        info!(completion_id = id, routine_id, "completion deleted");
        Ok(())
    }
}

/// Inserts a completion with its attendees and applies the statistic updates.
///
/// Runs on the caller's transaction so a planned class can complete and record in
/// one unit of work.
pub(crate) fn insert_completion(
    conn: &Connection,
    actor: &Actor,
    draft: &CompletionDraft,
    now: DateTime<Utc>,
) -> DomainResult<Completion> {
    require_elevated(actor, "record completions")?;
    validate_draft(draft)?;

    let student_ids = draft
        .attendees
        .iter()
        .map(|attendee| attendee.student_id)
        .collect::<Vec<_>>();
    let offenders = non_students(conn, &student_ids)?;
    if !offenders.is_empty() {
        let mut violations = Violations::new();
        violations.add(
            "attendees",
            format!("not active student accounts: {offenders:?}"),
        );
        violations.into_result("Completion attendees are invalid")?;
    }
    check_detail_exercises(conn, &draft.exercise_completions)?;

    let routine = visible_routine(conn, actor, draft.routine_id)?;
    let category = routine.categories.first();
    let completed_at = draft.completed_at.unwrap_or(now);
    let timestamp = now.timestamp();

    conn.execute(
        "INSERT INTO routine_completions (
            routine_id, routine_name, category_id, category_name, completed_at,
            planned_duration, actual_duration, notes, rating, morning_session,
            afternoon_session, is_full_day_complete, block_completions,
            exercise_completions, completed_by, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)",
        params![
            routine.id,
            routine.name,
            category.map(|category| category.id),
            category.map(|category| category.name.as_str()),
            completed_at.timestamp(),
            routine.total_duration,
            draft.actual_duration,
            to_json(&draft.notes)?,
            draft.rating,
            draft.morning_session,
            draft.afternoon_session,
            draft.is_full_day_complete,
            to_json(&draft.block_completions)?,
            to_json(&draft.exercise_completions)?,
            actor.id,
            timestamp,
        ],
    )?;
    let completion_id = conn.last_insert_rowid();

    let mut statement = conn.prepare_cached(
        "INSERT INTO routine_completion_attendees (
            routine_completion_id, student_id, participation_minutes, performance_notes,
            completed_full_session, created_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for attendee in &draft.attendees {
        statement.execute(params![
            completion_id,
            attendee.student_id,
            attendee.participation_minutes,
            to_json(&attendee.performance_notes)?,
            attendee.completed_full_session,
            timestamp,
        ])?;
    }

    conn.execute(
        "UPDATE routines SET usage_count = usage_count + 1, updated_at = ?2 WHERE id = ?1",
        params![routine.id, timestamp],
    )?;
    if draft.rating.is_some() {
        recompute_routine_rating(conn, routine.id)?;
    }

    for entry in &draft.exercise_completions {
        let Some(exercise_id) = entry.exercise_id else {
            continue;
        };
        if let Some(rating) = entry.rating {
            rate_exercise(conn, exercise_id, rating)?;
        }
        increment_exercise_usage(conn, exercise_id)?;
    }

    require_completion(conn, completion_id)
}

fn check_detail_exercises(
    conn: &Connection,
    entries: &[super::ExerciseCompletion],
) -> DomainResult<()> {
    let mut violations = Violations::new();

    for (index, entry) in entries.iter().enumerate() {
        if let Some(exercise_id) = entry.exercise_id {
            violations.check(
                exercise_exists(conn, exercise_id)?,
                format!("exercise_completions.{index}.exercise_id"),
                format!("exercise {exercise_id} does not exist"),
            );
        }
    }

    violations.into_result("Completion references unknown exercises")
}

/// Plain mean over every rated completion of the routine; `NULL` when none are rated.
pub(crate) fn recompute_routine_rating(conn: &Connection, routine_id: i64) -> DomainResult<Option<f64>> {
    let average: Option<f64> = conn.query_row(
        "SELECT AVG(rating) FROM routine_completions WHERE routine_id = ?1 AND rating IS NOT NULL",
        params![routine_id],
        |row| row.get(0),
    )?;
    let average = average.map(round2);

    conn.execute(
        "UPDATE routines SET average_rating = ?2 WHERE id = ?1",
        params![routine_id, average],
    )?;

    Ok(average)
}

fn map_completion(row: &Row<'_>) -> rusqlite::Result<Completion> {
    let planned_duration: f64 = row.get(6)?;
    let actual_duration: i64 = row.get(7)?;

    Ok(Completion {
        id: row.get(0)?,
        routine_id: row.get(1)?,
        routine_name: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        completed_at: utc_from_timestamp(row.get(5)?),
        planned_duration,
        actual_duration,
        duration_difference: duration_difference(planned_duration, actual_duration),
        efficiency_percentage: efficiency_percentage(planned_duration, actual_duration),
        notes: json_column(row, 8)?,
        rating: row.get(9)?,
        morning_session: row.get(10)?,
        afternoon_session: row.get(11)?,
        is_full_day_complete: row.get(12)?,
        block_completions: json_column(row, 13)?,
        exercise_completions: json_column(row, 14)?,
        completed_by: row.get(15)?,
        attendees: Vec::new(),
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}

fn load_attendees(conn: &Connection, completion: &Completion) -> DomainResult<Vec<Attendee>> {
    let mut statement = conn.prepare_cached(
        "SELECT a.id, a.student_id, u.name, a.participation_minutes, a.performance_notes,
                a.completed_full_session
         FROM routine_completion_attendees a
         JOIN users u ON u.id = a.student_id
         WHERE a.routine_completion_id = ?1
         ORDER BY a.id ASC",
    )?;

    let rows = statement
        .query_map(params![completion.id], |row| {
            let participation_minutes: i64 = row.get(3)?;
            Ok(Attendee {
                id: row.get(0)?,
                student_id: row.get(1)?,
                student_name: row.get(2)?,
                participation_minutes,
                participation_percentage: participation_percentage(
                    participation_minutes,
                    completion.actual_duration,
                ),
                performance_notes: json_column(row, 4)?,
                completed_full_session: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(crate) fn load_completion(conn: &Connection, id: i64) -> DomainResult<Option<Completion>> {
    let completion = conn
        .query_row(
            &format!("SELECT {COMPLETION_COLUMNS} FROM routine_completions WHERE id = ?1"),
            params![id],
            map_completion,
        )
        .optional()?;

    let Some(mut completion) = completion else {
        return Ok(None);
    };
    completion.attendees = load_attendees(conn, &completion)?;

    Ok(Some(completion))
}

fn require_completion(conn: &Connection, id: i64) -> DomainResult<Completion> {
    load_completion(conn, id)?.ok_or_else(|| AcademyError::not_found(format!("Completion {id}")))
}

fn amendable_completion(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<Completion> {
    let completion = require_completion(conn, id)?;
    if !can_amend_completion(completion.completed_by, actor) {
        return Err(AcademyError::permission(
            "Only admins or the recording trainer can change a completion",
        ));
    }

    Ok(completion)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::super::{AttendeeDraft, CompletionDraft};

    pub fn attendee(student_id: i64, minutes: i64) -> AttendeeDraft {
        AttendeeDraft {
            student_id,
            participation_minutes: minutes,
            completed_full_session: true,
            performance_notes: Vec::new(),
        }
    }

    pub fn draft(routine_id: i64, actual_duration: i64, students: &[i64]) -> CompletionDraft {
        CompletionDraft {
            routine_id,
            actual_duration,
            attendees: students
                .iter()
                .map(|student_id| attendee(*student_id, actual_duration))
                .collect(),
            ..CompletionDraft::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::draft;
    use crate::access::{Actor, Role};
    use crate::catalog::store::fixtures::flat;
    use crate::composer::store::fixtures::ten_and_fifteen;
    use crate::db::Database;
    use crate::db::fixtures::{account, database};
    use crate::error::AcademyError;
    use crate::recorder::{CompletionFilter, CompletionPatch, ExerciseCompletion};
    use chrono::{Duration, Utc};

    struct Academy {
        database: Database,
        coach: Actor,
        students: Vec<Actor>,
        routine_id: i64,
    }

    fn academy() -> Academy {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let students = ["Ana", "Bea", "Caro"]
            .iter()
            .map(|name| account(&database, name, Role::Student))
            .collect();
        let routine_id = ten_and_fifteen(&mut database, &coach);

        Academy {
            database,
            coach,
            students,
            routine_id,
        }
    }

    fn ids(students: &[Actor]) -> Vec<i64> {
        students.iter().map(|student| student.id).collect()
    }

    #[test]
    fn recording_snapshots_the_routine_and_derives_metrics() {
        let mut academy = academy();
        let category = academy.database.insert_category("Boxing").expect("category");
        academy
            .database
            .update_routine(
                &academy.coach,
                academy.routine_id,
                &crate::composer::RoutinePatch {
                    category_ids: Some(vec![category.id]),
                    ..Default::default()
                },
            )
            .expect("categorised");

        let completion = academy
            .database
            .record_completion(
                &academy.coach,
                &draft(academy.routine_id, 30, &ids(&academy.students[..1])),
                Utc::now(),
            )
            .expect("recorded");

        assert_eq!(completion.planned_duration, 25.0);
        assert_eq!(completion.duration_difference, 5.0);
        assert_eq!(completion.efficiency_percentage, 120.0);
        assert_eq!(completion.routine_name, "Fundamentals");
        assert_eq!(completion.category_name.as_deref(), Some("Boxing"));
        assert_eq!(completion.attendees[0].participation_percentage, 100.0);

        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.usage_count, 1);

        academy
            .database
            .update_routine(
                &academy.coach,
                academy.routine_id,
                &crate::composer::RoutinePatch {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
            )
            .expect("renamed");
        let stored = academy
            .database
            .completion(&academy.coach, completion.id)
            .expect("stored");
        assert_eq!(stored.routine_name, "Fundamentals");
    }

    #[test]
    fn one_non_student_rolls_back_everything() {
        let mut academy = academy();
        let exercise_id = flat(&mut academy.database, &academy.coach, "Mitts", 5);
        let before = academy.database.counts().expect("counts");
        let mut attendees = ids(&academy.students);
        attendees.push(academy.coach.id);
        let mut session = draft(academy.routine_id, 30, &attendees);
        session.exercise_completions = vec![ExerciseCompletion {
            exercise_id: Some(exercise_id),
            completed: true,
            rating: Some(5),
            ..ExerciseCompletion::default()
        }];

        let error = academy
            .database
            .record_completion(&academy.coach, &session, Utc::now())
            .expect_err("trainer is not a student");

        assert!(matches!(error, AcademyError::Validation { .. }));
        assert!(error.to_string().contains("attendees"));
        let after = academy.database.counts().expect("counts");
        assert_eq!(before.completions, after.completions);
        let attendee_rows: i64 = academy
            .database
            .conn()
            .query_row("SELECT COUNT(*) FROM routine_completion_attendees", [], |row| row.get(0))
            .expect("count");
        assert_eq!(attendee_rows, 0);
        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.usage_count, 0);
        let exercise = academy
            .database
            .exercise(&academy.coach, exercise_id)
            .expect("exercise");
        assert_eq!(exercise.usage_count, 0);
        assert_eq!(exercise.average_rating, None);
    }

    #[test]
    fn concurrent_recorders_never_lose_updates() {
        const WORKERS: u8 = 4;
        const SESSIONS: usize = 10;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ringside.db");
        let (coach, student, routine_id, exercise_id) = {
            let mut database = Database::open(&path).expect("database");
            let coach = account(&database, "Coach", Role::Trainer);
            let student = account(&database, "Ana", Role::Student);
            let routine_id = ten_and_fifteen(&mut database, &coach);
            let exercise_id = flat(&mut database, &coach, "Mitts", 5);
            (coach, student, routine_id, exercise_id)
        };

        let workers: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut database = Database::open(&path).expect("database");
                    for _ in 0..SESSIONS {
                        let mut session = draft(routine_id, 25, &[student.id]);
                        session.rating = Some(worker + 2);
                        session.exercise_completions = vec![ExerciseCompletion {
                            exercise_id: Some(exercise_id),
                            completed: true,
                            ..ExerciseCompletion::default()
                        }];
                        database
                            .record_completion(&coach, &session, Utc::now())
                            .expect("recorded");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker finished");
        }

        let database = Database::open(&path).expect("database");
        let total = i64::from(WORKERS) * SESSIONS as i64;
        assert_eq!(database.counts().expect("counts").completions, total);
        let routine = database.routine(&coach, routine_id).expect("routine");
        assert_eq!(routine.usage_count, total);
        // ratings 2, 3, 4 and 5 in equal numbers
        assert_eq!(routine.average_rating, Some(3.5));
        let exercise = database.exercise(&coach, exercise_id).expect("exercise");
        assert_eq!(exercise.usage_count, total);
    }

    #[test]
    fn unknown_detail_exercise_rolls_back_everything() {
        let mut academy = academy();
        let mut session = draft(academy.routine_id, 30, &ids(&academy.students));
        session.exercise_completions = vec![ExerciseCompletion {
            exercise_id: Some(999),
            completed: true,
            ..ExerciseCompletion::default()
        }];

        assert!(
            academy
                .database
                .record_completion(&academy.coach, &session, Utc::now())
                .is_err()
        );
        assert_eq!(academy.database.counts().expect("counts").completions, 0);
    }

    #[test]
    fn duplicate_attendees_are_rejected_wholesale() {
        let mut academy = academy();
        let student = academy.students[0].id;

        let error = academy
            .database
            .record_completion(
                &academy.coach,
                &draft(academy.routine_id, 30, &[student, student]),
                Utc::now(),
            )
            .expect_err("duplicate");
        assert!(matches!(error, AcademyError::Validation { .. }));
        assert_eq!(academy.database.counts().expect("counts").completions, 0);
    }

    #[test]
    fn students_cannot_record_sessions() {
        let mut academy = academy();
        let student = academy.students[0];

        let error = academy
            .database
            .record_completion(
                &student,
                &draft(academy.routine_id, 30, &[student.id]),
                Utc::now(),
            )
            .expect_err("student");
        assert!(matches!(error, AcademyError::Permission(_)));
    }

    #[test]
    fn routine_average_is_recomputed_over_all_ratings() {
        let mut academy = academy();
        let students = ids(&academy.students[..1]);
        let mut recorded = Vec::new();

        for rating in [4, 5, 3] {
            let mut session = draft(academy.routine_id, 25, &students);
            session.rating = Some(rating);
            recorded.push(
                academy
                    .database
                    .record_completion(&academy.coach, &session, Utc::now())
                    .expect("recorded"),
            );
        }

        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.average_rating, Some(4.0));
        assert_eq!(routine.usage_count, 3);

        academy
            .database
            .delete_completion(&academy.coach, recorded[2].id)
            .expect("deleted");
        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.average_rating, Some(4.5));
    }

    #[test]
    fn exercise_average_is_incremental_and_survives_deletion() {
        let mut academy = academy();
        let exercise_id = flat(&mut academy.database, &academy.coach, "Mitts", 5);
        let students = ids(&academy.students[..1]);
        let mut recorded = Vec::new();

        for rating in [4, 5, 3] {
            let mut session = draft(academy.routine_id, 25, &students);
            session.exercise_completions = vec![ExerciseCompletion {
                exercise_id: Some(exercise_id),
                completed: true,
                rating: Some(rating),
                ..ExerciseCompletion::default()
            }];
            recorded.push(
                academy
                    .database
                    .record_completion(&academy.coach, &session, Utc::now())
                    .expect("recorded"),
            );
        }

        let exercise = academy
            .database
            .exercise(&academy.coach, exercise_id)
            .expect("exercise");
        assert_eq!(exercise.usage_count, 3);
        // 4 -> (0*1+4)/2 = 2.0, 5 -> (2*1+5)/2 = 3.5, 3 -> (3.5*2+3)/3 = 3.33
        assert_eq!(exercise.average_rating, Some(3.33));

        academy
            .database
            .delete_completion(&academy.coach, recorded[2].id)
            .expect("deleted");
        let exercise = academy
            .database
            .exercise(&academy.coach, exercise_id)
            .expect("exercise");
        assert_eq!(exercise.average_rating, Some(3.33));
    }

    #[test]
    fn only_admins_or_the_recorder_amend_completions() {
        let mut academy = academy();
        let other = account(&academy.database, "Other", Role::Trainer);
        let admin = account(&academy.database, "Admin", Role::Admin);
        let completion = academy
            .database
            .record_completion(
                &academy.coach,
                &draft(academy.routine_id, 30, &ids(&academy.students)),
                Utc::now(),
            )
            .expect("recorded");

        let patch = CompletionPatch {
            rating: Some(5),
            ..CompletionPatch::default()
        };
        let error = academy
            .database
            .update_completion(&other, completion.id, &patch)
            .expect_err("not the recorder");
        assert!(matches!(error, AcademyError::Permission(_)));

        let updated = academy
            .database
            .update_completion(&admin, completion.id, &patch)
            .expect("admin amends");
        assert_eq!(updated.rating, Some(5));
        assert_eq!(updated.attendees.len(), 3);
        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.average_rating, Some(5.0));
    }

    #[test]
    fn deleting_a_completion_cascades_attendees() {
        let mut academy = academy();
        let completion = academy
            .database
            .record_completion(
                &academy.coach,
                &draft(academy.routine_id, 30, &ids(&academy.students)),
                Utc::now(),
            )
            .expect("recorded");

        academy
            .database
            .delete_completion(&academy.coach, completion.id)
            .expect("deleted");

        let attendee_rows: i64 = academy
            .database
            .conn()
            .query_row("SELECT COUNT(*) FROM routine_completion_attendees", [], |row| row.get(0))
            .expect("count");
        assert_eq!(attendee_rows, 0);
        let routine = academy
            .database
            .routine(&academy.coach, academy.routine_id)
            .expect("routine");
        assert_eq!(routine.average_rating, None);
    }

    #[test]
    fn students_only_list_their_own_sessions() {
        let mut academy = academy();
        let now = Utc::now();
        let (ana, bea) = (academy.students[0], academy.students[1]);
        academy
            .database
            .record_completion(&academy.coach, &draft(academy.routine_id, 30, &[ana.id]), now)
            .expect("recorded");
        let mut morning = draft(academy.routine_id, 20, &[bea.id]);
        morning.morning_session = true;
        morning.completed_at = Some(now - Duration::hours(2));
        academy
            .database
            .record_completion(&academy.coach, &morning, now)
            .expect("recorded");

        let all = academy
            .database
            .list_completions(&academy.coach, &CompletionFilter::default(), 50)
            .expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].actual_duration, 30);

        let own = academy
            .database
            .list_completions(&ana, &CompletionFilter::default(), 50)
            .expect("list");
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].attendees[0].student_id, ana.id);

        let morning_only = CompletionFilter {
            session: Some(crate::recorder::SessionType::Morning),
            ..CompletionFilter::default()
        };
        let listed = academy
            .database
            .list_completions(&academy.coach, &morning_only, 50)
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].actual_duration, 20);

        let error = academy
            .database
            .completion(&bea, all[0].id)
            .expect_err("not an attendee");
        assert!(matches!(error, AcademyError::NotFound(_)));
    }
}
