use super::{
    CloneOverrides, Exercise, ExerciseDraft, ExerciseFilter, ExercisePatch, copy_name,
    effective_duration, next_average_rating, validate_draft,
};
use crate::access::{Actor, Governed, require_elevated};
use crate::composer::store::recompute_routines_using;
use crate::db::{
    CategoryLink, Database, json_column, linked_categories, replace_category_links, to_json,
    unknown_categories,
};
use crate::error::{AcademyError, DomainResult};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

const EXERCISE_COLUMNS: &str = "id, name, description, duration, intensity, work_type, difficulty,
    tags, materials, protection, instructions, video_url, image_url, is_multi_timer, timers,
    is_template, is_active, visibility, created_by, usage_count, average_rating, created_at,
    updated_at";

impl Database {
    pub fn create_exercise(&mut self, actor: &Actor, draft: &ExerciseDraft) -> DomainResult<Exercise> {
        require_elevated(actor, "create exercises")?;
        validate_draft(draft)?;

        let exercise = self.write(|tx| {
            check_categories(tx, &draft.category_ids)?;
            let id = insert_exercise(tx, draft, actor.id)?;
            replace_category_links(tx, CategoryLink::Exercise, id, &draft.category_ids)?;
            load_exercise(tx, id)?.ok_or_else(|| AcademyError::not_found(format!("Exercise {id}")))
        })?;

        info!(exercise_id = exercise.id, actor_id = actor.id, "exercise created");
        Ok(exercise)
    }

    pub fn exercise(&self, actor: &Actor, id: i64) -> DomainResult<Exercise> {
        visible_exercise(self.conn(), actor, id)
    }

    pub fn list_exercises(
        &self,
        actor: &Actor,
        filter: &ExerciseFilter,
        limit: usize,
    ) -> DomainResult<Vec<Exercise>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| format!("%{}%", text.to_lowercase()));

        let sql = format!(
            "SELECT {EXERCISE_COLUMNS} FROM exercises
             WHERE (visibility = 'public' OR created_by = ?1 OR (visibility = 'shared' AND ?2))
               AND (?3 OR is_active = 1)
               AND (?4 IS NULL OR work_type = ?4)
               AND (?5 IS NULL OR difficulty = ?5)
               AND (?6 IS NULL OR intensity = ?6)
               AND (?7 IS NULL OR lower(name) LIKE ?7 OR lower(coalesce(description, '')) LIKE ?7)
             ORDER BY name ASC, id ASC
             LIMIT ?8"
        );

        let mut statement = self.conn().prepare(&sql)?;
        let mut exercises = statement
            .query_map(
                params![
                    actor.id,
                    actor.is_elevated(),
                    filter.include_inactive,
                    filter.work_type,
                    filter.difficulty,
                    filter.intensity,
                    search,
                    limit as i64,
                ],
                map_exercise,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        for exercise in &mut exercises {
            exercise.categories =
                linked_categories(self.conn(), CategoryLink::Exercise, exercise.id)?;
        }

        Ok(exercises)
    }

    pub fn clone_exercise(
        &mut self,
        actor: &Actor,
        id: i64,
        overrides: &CloneOverrides,
    ) -> DomainResult<Exercise> {
        require_elevated(actor, "clone exercises")?;
        let source = visible_exercise(self.conn(), actor, id)?;

        let draft = ExerciseDraft {
            name: copy_name(&source.name, overrides.name.as_deref()),
            description: source.description.clone(),
            duration: source.duration,
            intensity: source.intensity,
            work_type: source.work_type,
            difficulty: source.difficulty,
            tags: source.tags.clone(),
            materials: source.materials.clone(),
            protection: source.protection.clone(),
            instructions: source.instructions.clone(),
            video_url: source.video_url.clone(),
            image_url: source.image_url.clone(),
            is_multi_timer: source.is_multi_timer,
            timers: source.timers.clone(),
            is_template: false,
            visibility: overrides.visibility.unwrap_or(source.visibility),
            category_ids: source.categories.iter().map(|category| category.id).collect(),
        };
        validate_draft(&draft)?;

        let clone = self.write(|tx| {
            let clone_id = insert_exercise(tx, &draft, actor.id)?;
            replace_category_links(tx, CategoryLink::Exercise, clone_id, &draft.category_ids)?;
            load_exercise(tx, clone_id)?
                .ok_or_else(|| AcademyError::not_found(format!("Exercise {clone_id}")))
        })?;

        info!(source_id = id, exercise_id = clone.id, "exercise cloned");
        Ok(clone)
    }

    /// Applies a partial update. Duration changes are pushed into the cached block
    /// and routine totals of every routine using the exercise.
    pub fn update_exercise(
        &mut self,
        actor: &Actor,
        id: i64,
        patch: &ExercisePatch,
    ) -> DomainResult<Exercise> {
        let (exercise, routines) = self.write(|tx| {
            let current = modifiable_exercise(tx, actor, id)?;
            let draft = patch.apply(&current);
            validate_draft(&draft)?;

            tx.execute(
                "UPDATE exercises SET
                    name = ?2, description = ?3, duration = ?4, intensity = ?5, work_type = ?6,
                    difficulty = ?7, tags = ?8, materials = ?9, protection = ?10,
                    instructions = ?11, video_url = ?12, image_url = ?13, is_multi_timer = ?14,
                    timers = ?15, is_template = ?16, visibility = ?17, updated_at = ?18
                 WHERE id = ?1",
                params![
                    id,
                    draft.name.trim(),
                    draft.description,
                    draft.duration,
                    draft.intensity,
                    draft.work_type,
                    draft.difficulty,
                    to_json(&draft.tags)?,
                    to_json(&draft.materials)?,
                    to_json(&draft.protection)?,
                    to_json(&draft.instructions)?,
                    draft.video_url,
                    draft.image_url,
                    draft.is_multi_timer,
                    to_json(&draft.timers)?,
                    draft.is_template,
                    draft.visibility,
                    Utc::now().timestamp(),
                ],
            )?;

            if let Some(category_ids) = &patch.category_ids {
                check_categories(tx, category_ids)?;
                replace_category_links(tx, CategoryLink::Exercise, id, category_ids)?;
            }

            let routines = if patch.changes_duration() {
                recompute_routines_using(tx, id)?
            } else {
                0
            };

            let exercise = load_exercise(tx, id)?
                .ok_or_else(|| AcademyError::not_found(format!("Exercise {id}")))?;
            Ok((exercise, routines))
        })?;

        info!(exercise_id = id, routines_recomputed = routines, "exercise updated");
        Ok(exercise)
    }

    pub fn toggle_exercise_active(&mut self, actor: &Actor, id: i64) -> DomainResult<Exercise> {
        let exercise = self.write(|tx| {
            modifiable_exercise(tx, actor, id)?;
            tx.execute(
                "UPDATE exercises SET is_active = 1 - is_active, updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().timestamp()],
            )?;
            load_exercise(tx, id)?.ok_or_else(|| AcademyError::not_found(format!("Exercise {id}")))
        })?;

        info!(exercise_id = id, is_active = exercise.is_active, "exercise active flag toggled");
        Ok(exercise)
    }

    pub fn delete_exercise(&mut self, actor: &Actor, id: i64) -> DomainResult<()> {
        self.write(|tx| {
            modifiable_exercise(tx, actor, id)?;
            let references: i64 = tx.query_row(
                "SELECT COUNT(*) FROM routine_block_exercises WHERE exercise_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if references > 0 {
                return Err(AcademyError::conflict(format!(
                    "Exercise {id} is used by {references} routine block(s); deactivate it instead"
                )));
            }

            tx.execute("DELETE FROM exercises WHERE id = ?1", params![id])?;
            Ok(())
        })?;

        info!(exercise_id = id, "exercise deleted");
        Ok(())
    }
}

pub(crate) fn check_categories(conn: &Connection, category_ids: &[i64]) -> DomainResult<()> {
    let unknown = unknown_categories(conn, category_ids)?;
    if unknown.is_empty() {
        return Ok(());
    }

    Err(AcademyError::validation(format!(
        "Unknown category ids: {unknown:?}"
    )))
}

fn insert_exercise(conn: &Connection, draft: &ExerciseDraft, owner_id: i64) -> DomainResult<i64> {
    let now = Utc::now().timestamp();

    conn.execute(
        "INSERT INTO exercises (
            name, description, duration, intensity, work_type, difficulty,
            tags, materials, protection, instructions, video_url, image_url,
            is_multi_timer, timers, is_template, is_active, visibility, created_by,
            usage_count, average_rating, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 1, ?16, ?17, 0, NULL, ?18, ?18)",
        params![
            draft.name.trim(),
            draft.description,
            draft.duration,
            draft.intensity,
            draft.work_type,
            draft.difficulty,
            to_json(&draft.tags)?,
            to_json(&draft.materials)?,
            to_json(&draft.protection)?,
            to_json(&draft.instructions)?,
            draft.video_url,
            draft.image_url,
            draft.is_multi_timer,
            to_json(&draft.timers)?,
            draft.is_template,
            draft.visibility,
            owner_id,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn map_exercise(row: &Row<'_>) -> rusqlite::Result<Exercise> {
    let duration: i64 = row.get(3)?;
    let is_multi_timer: bool = row.get(13)?;
    let timers: Vec<super::TimerSpec> = json_column(row, 14)?;

    Ok(Exercise {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        duration,
        effective_duration: effective_duration(is_multi_timer, duration, &timers),
        intensity: row.get(4)?,
        work_type: row.get(5)?,
        difficulty: row.get(6)?,
        tags: json_column(row, 7)?,
        materials: json_column(row, 8)?,
        protection: json_column(row, 9)?,
        instructions: json_column(row, 10)?,
        video_url: row.get(11)?,
        image_url: row.get(12)?,
        is_multi_timer,
        timers,
        is_template: row.get(15)?,
        is_active: row.get(16)?,
        visibility: row.get(17)?,
        created_by: row.get(18)?,
        usage_count: row.get(19)?,
        average_rating: row.get(20)?,
        categories: Vec::new(),
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

pub(crate) fn load_exercise(conn: &Connection, id: i64) -> DomainResult<Option<Exercise>> {
    let exercise = conn
        .query_row(
            &format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = ?1"),
            params![id],
            map_exercise,
        )
        .optional()?;

    match exercise {
        Some(mut exercise) => {
            exercise.categories = linked_categories(conn, CategoryLink::Exercise, id)?;
            Ok(Some(exercise))
        }
        None => Ok(None),
    }
}

/// Hidden exercises are reported as missing so their existence does not leak.
fn visible_exercise(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<Exercise> {
    load_exercise(conn, id)?
        .filter(|exercise| exercise.visible_to(actor))
        .ok_or_else(|| AcademyError::not_found(format!("Exercise {id}")))
}

fn modifiable_exercise(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<Exercise> {
    let exercise = visible_exercise(conn, actor, id)?;
    if !exercise.modifiable_by(actor) {
        return Err(AcademyError::permission(format!(
            "You cannot modify exercise {id}"
        )));
    }

    Ok(exercise)
}

pub(crate) fn exercise_exists(conn: &Connection, id: i64) -> DomainResult<bool> {
    let mut statement = conn.prepare_cached("SELECT 1 FROM exercises WHERE id = ?1")?;
    Ok(statement.exists(params![id])?)
}

pub(crate) fn increment_exercise_usage(conn: &Connection, id: i64) -> DomainResult<()> {
    let changed = conn.execute(
        "UPDATE exercises SET usage_count = usage_count + 1, updated_at = ?2 WHERE id = ?1",
        params![id, Utc::now().timestamp()],
    )?;
    if changed == 0 {
        return Err(AcademyError::not_found(format!("Exercise {id}")));
    }

    Ok(())
}

/// Folds one rating into the running average using the current usage count.
pub(crate) fn rate_exercise(conn: &Connection, id: i64, rating: u8) -> DomainResult<f64> {
    let (average, usage_count): (Option<f64>, i64) = conn
        .query_row(
            "SELECT average_rating, usage_count FROM exercises WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| AcademyError::not_found(format!("Exercise {id}")))?;

    let next = next_average_rating(average, usage_count, rating);
    conn.execute(
        "UPDATE exercises SET average_rating = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, next, Utc::now().timestamp()],
    )?;

    Ok(next)
}


#[cfg(test)]
mod tests {
    use super::fixtures::{flat, timed};
    use super::{increment_exercise_usage, rate_exercise};
    use crate::access::{Role, Visibility};
    use crate::catalog::{
        CloneOverrides, ExerciseDraft, ExerciseFilter, ExercisePatch, TimerSpec, WorkType,
    };
    use crate::composer::store::fixtures::ten_and_fifteen;
    use crate::db::fixtures::{account, database};
    use crate::error::AcademyError;

    #[test]
    fn create_stores_timers_and_categories() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let category = database.insert_category("Boxing").expect("category");

        let draft = ExerciseDraft {
            name: "Shadow rounds".to_string(),
            duration: 10,
            is_multi_timer: true,
            timers: vec![TimerSpec {
                name: "round".to_string(),
                duration: 1.0,
                repetitions: 3,
                rest_between: 0.5,
            }],
            category_ids: vec![category.id],
            ..ExerciseDraft::default()
        };
        let exercise = database.create_exercise(&coach, &draft).expect("created");

        assert_eq!(exercise.effective_duration, 4.0);
        assert_eq!(exercise.usage_count, 0);
        assert_eq!(exercise.average_rating, None);
        assert_eq!(exercise.categories, vec![category]);
    }

    #[test]
    fn students_cannot_create_exercises() {
        let mut database = database();
        let student = account(&database, "Ana", Role::Student);
        let draft = ExerciseDraft {
            name: "Skipping".to_string(),
            duration: 5,
            ..ExerciseDraft::default()
        };

        let error = database.create_exercise(&student, &draft).expect_err("student");
        assert!(matches!(error, AcademyError::Permission(_)));
    }

    #[test]
    fn unknown_category_rolls_back_the_insert() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let draft = ExerciseDraft {
            name: "Skipping".to_string(),
            duration: 5,
            category_ids: vec![42],
            ..ExerciseDraft::default()
        };

        assert!(database.create_exercise(&coach, &draft).is_err());
        assert_eq!(database.counts().expect("counts").exercises, 0);
    }

    #[test]
    fn private_exercises_are_hidden_from_other_trainers() {
        let mut database = database();
        let owner = account(&database, "Coach", Role::Trainer);
        let other = account(&database, "Other", Role::Trainer);
        let draft = ExerciseDraft {
            name: "Secret drill".to_string(),
            duration: 5,
            visibility: Visibility::Private,
            ..ExerciseDraft::default()
        };
        let id = database.create_exercise(&owner, &draft).expect("created").id;

        let error = database.exercise(&other, id).expect_err("hidden");
        assert!(matches!(error, AcademyError::NotFound(_)));
        let listed = database
            .list_exercises(&other, &ExerciseFilter::default(), 50)
            .expect("list");
        assert!(listed.is_empty());
    }

    #[test]
    fn list_filters_by_work_type_and_search() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        flat(&mut database, &coach, "Jab drill", 5);
        let draft = ExerciseDraft {
            name: "Burpees".to_string(),
            duration: 5,
            work_type: WorkType::Cardio,
            visibility: Visibility::Public,
            ..ExerciseDraft::default()
        };
        database.create_exercise(&coach, &draft).expect("created");

        let cardio = ExerciseFilter {
            work_type: Some(WorkType::Cardio),
            ..ExerciseFilter::default()
        };
        let listed = database.list_exercises(&coach, &cardio, 50).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Burpees");

        let search = ExerciseFilter {
            search: Some("JAB".to_string()),
            ..ExerciseFilter::default()
        };
        let listed = database.list_exercises(&coach, &search, 50).expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Jab drill");
    }

    #[test]
    fn clone_resets_statistics_and_reassigns_owner() {
        let mut database = database();
        let owner = account(&database, "Coach", Role::Trainer);
        let other = account(&database, "Other", Role::Trainer);
        let category = database.insert_category("Boxing").expect("category");
        let draft = ExerciseDraft {
            name: "Slip line".to_string(),
            duration: 8,
            is_template: true,
            visibility: Visibility::Shared,
            category_ids: vec![category.id],
            ..ExerciseDraft::default()
        };
        let source = database.create_exercise(&owner, &draft).expect("created");
        increment_exercise_usage(database.conn(), source.id).expect("usage");
        rate_exercise(database.conn(), source.id, 5).expect("rated");

        let clone = database
            .clone_exercise(&other, source.id, &CloneOverrides::default())
            .expect("cloned");

        assert_eq!(clone.name, "Slip line (Copy)");
        assert_eq!(clone.created_by, other.id);
        assert_eq!(clone.usage_count, 0);
        assert_eq!(clone.average_rating, None);
        assert!(!clone.is_template);
        assert_eq!(clone.visibility, Visibility::Shared);
        assert_eq!(clone.categories, vec![category]);
    }

    #[test]
    fn rating_folds_into_running_average() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = flat(&mut database, &coach, "Pads", 10);
        for _ in 0..2 {
            increment_exercise_usage(database.conn(), id).expect("usage");
        }
        database
            .conn()
            .execute("UPDATE exercises SET average_rating = 4.5 WHERE id = ?1", [id])
            .expect("seed rating");

        assert_eq!(rate_exercise(database.conn(), id, 3).expect("rated"), 4.0);
    }

    #[test]
    fn referenced_exercises_cannot_be_deleted_but_can_be_deactivated() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = timed(
            &mut database,
            &coach,
            "Bag rounds",
            vec![TimerSpec {
                name: "round".to_string(),
                duration: 3.0,
                repetitions: 2,
                rest_between: 1.0,
            }],
        );
        let conn = database.conn();
        conn.execute(
            "INSERT INTO routines (name, created_by, created_at, updated_at) VALUES ('R', ?1, 0, 0)",
            [coach.id],
        )
        .expect("routine");
        let routine_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO routine_blocks (routine_id, name, sort_order, created_at, updated_at) VALUES (?1, 'B', 1, 0, 0)",
            [routine_id],
        )
        .expect("block");
        let block_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO routine_block_exercises (routine_block_id, exercise_id, sort_order) VALUES (?1, ?2, 1)",
            [block_id, id],
        )
        .expect("instance");

        let error = database.delete_exercise(&coach, id).expect_err("referenced");
        assert!(matches!(error, AcademyError::Conflict(_)));

        let deactivated = database.toggle_exercise_active(&coach, id).expect("deactivated");
        assert!(!deactivated.is_active);
        let reactivated = database.toggle_exercise_active(&coach, id).expect("reactivated");
        assert!(reactivated.is_active);
    }

    #[test]
    fn inactive_exercises_leave_the_default_listing() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = flat(&mut database, &coach, "Rope", 5);

        database.toggle_exercise_active(&coach, id).expect("deactivated");
        let listed = database
            .list_exercises(&coach, &ExerciseFilter::default(), 50)
            .expect("list");
        assert!(listed.is_empty());

        let everything = ExerciseFilter {
            include_inactive: true,
            ..ExerciseFilter::default()
        };
        let listed = database.list_exercises(&coach, &everything, 50).expect("list");
        assert_eq!(listed.len(), 1);

        let other = account(&database, "Ana", Role::Student);
        let error = database
            .toggle_exercise_active(&other, id)
            .expect_err("student");
        assert!(matches!(error, AcademyError::Permission(_)));
    }

    #[test]
    fn duration_updates_flow_into_routine_totals() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let routine_id = ten_and_fifteen(&mut database, &coach);
        let routine = database.routine(&coach, routine_id).expect("routine");
        let jab = routine.blocks[0].exercises[0].exercise_id;

        let patch = ExercisePatch {
            duration: Some(20),
            ..ExercisePatch::default()
        };
        let updated = database.update_exercise(&coach, jab, &patch).expect("updated");
        assert_eq!(updated.effective_duration, 20.0);

        let routine = database.routine(&coach, routine_id).expect("routine");
        assert_eq!(routine.blocks[0].duration, 20.0);
        assert_eq!(routine.total_duration, 35.0);

        let timers = ExercisePatch {
            is_multi_timer: Some(true),
            timers: Some(vec![TimerSpec {
                name: "round".to_string(),
                duration: 1.0,
                repetitions: 3,
                rest_between: 0.5,
            }]),
            ..ExercisePatch::default()
        };
        database.update_exercise(&coach, jab, &timers).expect("timed");

        let routine = database.routine(&coach, routine_id).expect("routine");
        assert_eq!(routine.blocks[0].duration, 4.0);
        assert_eq!(routine.total_duration, 19.0);
        let block_sum = routine.blocks.iter().map(|block| block.duration).sum::<f64>();
        assert_eq!(routine.total_duration, block_sum);
    }

    #[test]
    fn invalid_updates_change_nothing() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let routine_id = ten_and_fifteen(&mut database, &coach);
        let jab = database.routine(&coach, routine_id).expect("routine").blocks[0].exercises[0]
            .exercise_id;

        let patch = ExercisePatch {
            name: Some("Double jab".to_string()),
            is_multi_timer: Some(true),
            ..ExercisePatch::default()
        };
        let error = database.update_exercise(&coach, jab, &patch).expect_err("no timers");
        assert!(error.fields().expect("field map").contains_key("timers"));

        let unchanged = database.exercise(&coach, jab).expect("exercise");
        assert_eq!(unchanged.name, "Jab");
        assert!(!unchanged.is_multi_timer);
        let routine = database.routine(&coach, routine_id).expect("routine");
        assert_eq!(routine.total_duration, 25.0);
    }

    #[test]
    fn update_syncs_categories() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let boxing = database.insert_category("Boxing").expect("category");
        let id = flat(&mut database, &coach, "Slip line", 8);

        let patch = ExercisePatch {
            category_ids: Some(vec![boxing.id]),
            ..ExercisePatch::default()
        };
        let updated = database.update_exercise(&coach, id, &patch).expect("updated");
        assert_eq!(updated.categories, vec![boxing]);
        assert_eq!(updated.duration, 8);

        let unknown = ExercisePatch {
            category_ids: Some(vec![404]),
            ..ExercisePatch::default()
        };
        assert!(database.update_exercise(&coach, id, &unknown).is_err());
        assert_eq!(
            database.exercise(&coach, id).expect("exercise").categories.len(),
            1
        );
    }

    #[test]
    fn malformed_stored_lists_are_storage_errors() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = flat(&mut database, &coach, "Rope", 5);
        database
            .conn()
            .execute("UPDATE exercises SET tags = 'not json' WHERE id = ?1", [id])
            .expect("corrupted");

        let error = database.exercise(&coach, id).expect_err("unreadable");
        assert_eq!(error.kind(), "storage_error");
        assert!(!error.is_retryable());
    }

    #[test]
    fn unreferenced_exercise_is_deleted() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = flat(&mut database, &coach, "Rope", 5);

        database.delete_exercise(&coach, id).expect("deleted");
        assert!(matches!(
            database.exercise(&coach, id),
            Err(AcademyError::NotFound(_))
        ));
    }
}
