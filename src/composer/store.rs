use super::{
    BlockDraft, BlockExercise, InstanceDraft, Routine, RoutineBlock, RoutineDraft, RoutineFilter,
    RoutinePatch, ScheduleReadiness, calculate_total_duration, instance_duration,
    is_ready_for_scheduling, next_eligible_at, validate_blocks, validate_draft, validate_patch,
};
use crate::access::{Actor, Governed, require_elevated};
use crate::catalog::store::{check_categories, exercise_exists};
use crate::catalog::{CloneOverrides, TimerSpec, copy_name, effective_duration};
use crate::db::{
    CategoryLink, Database, json_column, linked_categories, optional_json_column,
    replace_category_links, to_json, utc_from_timestamp,
};
use crate::error::{AcademyError, DomainResult, Violations};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{HashMap, HashSet};
use tracing::info;

const ROUTINE_COLUMNS: &str = "id, name, description, objective, total_duration, difficulty, level,
    tags, materials, protection, is_template, is_favorite, visibility, is_active, repeat_in_days,
    scheduled_days, trainer_notes, created_by, usage_count, average_rating, created_at, updated_at";

impl Database {
    pub fn create_routine(&mut self, actor: &Actor, draft: &RoutineDraft) -> DomainResult<Routine> {
        require_elevated(actor, "create routines")?;
        validate_draft(draft)?;

        let routine = self.write(|tx| {
            check_categories(tx, &draft.category_ids)?;
            check_exercises(tx, &draft.blocks)?;

            let routine_id = insert_routine(tx, draft, actor.id)?;
            replace_category_links(tx, CategoryLink::Routine, routine_id, &draft.category_ids)?;
            for (index, block) in draft.blocks.iter().enumerate() {
                let block_id = insert_block(tx, routine_id, position(index), block)?;
                sync_instances(tx, block_id, &block.exercises)?;
            }
            recompute_durations(tx, routine_id)?;

            require_routine(tx, routine_id)
        })?;

        info!(
            routine_id = routine.id,
            blocks = routine.blocks.len(),
            total_duration = routine.total_duration,
            "routine created"
        );
        Ok(routine)
    }

    pub fn routine(&self, actor: &Actor, id: i64) -> DomainResult<Routine> {
        visible_routine(self.conn(), actor, id)
    }

    pub fn list_routines(
        &self,
        actor: &Actor,
        filter: &RoutineFilter,
        limit: usize,
    ) -> DomainResult<Vec<Routine>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(|text| format!("%{}%", text.to_lowercase()));

        let mut statement = self.conn().prepare(
            "SELECT id FROM routines
             WHERE is_active = 1
               AND (visibility = 'public' OR created_by = ?1 OR (visibility = 'shared' AND ?2))
               AND (?3 IS NULL OR difficulty = ?3)
               AND (?4 IS NULL OR level = ?4)
               AND (?5 = 0 OR is_favorite = 1)
               AND (?6 = 0 OR is_template = 1)
               AND (?7 IS NULL OR lower(name) LIKE ?7 OR lower(coalesce(description, '')) LIKE ?7)
             ORDER BY is_favorite DESC, name ASC, id ASC
             LIMIT ?8",
        )?;

        let ids = statement
            .query_map(
                params![
                    actor.id,
                    actor.is_elevated(),
                    filter.difficulty,
                    filter.level,
                    filter.favorites,
                    filter.templates,
                    search,
                    limit as i64,
                ],
                |row| row.get::<_, i64>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|id| require_routine(self.conn(), id))
            .collect()
    }

    pub fn update_routine(
        &mut self,
        actor: &Actor,
        id: i64,
        patch: &RoutinePatch,
    ) -> DomainResult<Routine> {
        validate_patch(patch)?;

        let routine = self.write(|tx| {
            let current = modifiable_routine(tx, actor, id)?;

            let name = patch
                .name
                .as_deref()
                .map(str::trim)
                .unwrap_or(&current.name);
            tx.execute(
                "UPDATE routines SET
                    name = ?2, description = ?3, objective = ?4, difficulty = ?5, level = ?6,
                    tags = ?7, materials = ?8, protection = ?9, is_template = ?10,
                    visibility = ?11, repeat_in_days = ?12, scheduled_days = ?13,
                    trainer_notes = ?14, updated_at = ?15
                 WHERE id = ?1",
                params![
                    id,
                    name,
                    patch.description.as_ref().or(current.description.as_ref()),
                    patch.objective.as_ref().or(current.objective.as_ref()),
                    patch.difficulty.unwrap_or(current.difficulty),
                    patch.level.unwrap_or(current.level),
                    to_json(patch.tags.as_ref().unwrap_or(&current.tags))?,
                    to_json(patch.materials.as_ref().unwrap_or(&current.materials))?,
                    to_json(patch.protection.as_ref().unwrap_or(&current.protection))?,
                    patch.is_template.unwrap_or(current.is_template),
                    patch.visibility.unwrap_or(current.visibility),
                    patch.repeat_in_days.unwrap_or(current.repeat_in_days),
                    to_json(patch.scheduled_days.as_ref().unwrap_or(&current.scheduled_days))?,
                    patch.trainer_notes.as_ref().or(current.trainer_notes.as_ref()),
                    Utc::now().timestamp(),
                ],
            )?;

            if let Some(category_ids) = &patch.category_ids {
                check_categories(tx, category_ids)?;
                replace_category_links(tx, CategoryLink::Routine, id, category_ids)?;
            }

            require_routine(tx, id)
        })?;

        info!(routine_id = id, "routine updated");
        Ok(routine)
    }

    /// Reconciles the block list of a routine against `blocks`, in list order.
    ///
    /// Existing blocks missing from the list are deleted with their exercises. Blocks
    /// carrying an id are updated in place, the rest are inserted. Positions are
    /// re-derived from the list, and each block's exercise set is synced by exercise id.
    pub fn replace_blocks(
        &mut self,
        actor: &Actor,
        id: i64,
        blocks: &[BlockDraft],
    ) -> DomainResult<Routine> {
        validate_blocks(blocks)?;

        let routine = self.write(|tx| {
            let current = modifiable_routine(tx, actor, id)?;
            let existing = current
                .blocks
                .iter()
                .map(|block| block.id)
                .collect::<HashSet<_>>();

            let mut violations = Violations::new();
            for (index, block) in blocks.iter().enumerate() {
                if let Some(block_id) = block.id {
                    violations.check(
                        existing.contains(&block_id),
                        format!("blocks.{index}.id"),
                        format!("block {block_id} does not belong to routine {id}"),
                    );
                }
            }
            violations.into_result("Routine blocks are invalid")?;
            check_exercises(tx, blocks)?;

            let kept = blocks.iter().filter_map(|block| block.id).collect::<HashSet<_>>();
            for orphan in existing.difference(&kept) {
                tx.execute("DELETE FROM routine_blocks WHERE id = ?1", params![orphan])?;
            }

            tx.execute(
                "UPDATE routine_blocks SET sort_order = -id WHERE routine_id = ?1",
                params![id],
            )?;
            for (index, block) in blocks.iter().enumerate() {
                let block_id = match block.id {
                    Some(block_id) => {
                        update_block(tx, block_id, position(index), block)?;
                        block_id
                    }
                    None => insert_block(tx, id, position(index), block)?,
                };
                sync_instances(tx, block_id, &block.exercises)?;
            }

            recompute_durations(tx, id)?;
            tx.execute(
                "UPDATE routines SET updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().timestamp()],
            )?;

            require_routine(tx, id)
        })?;

        info!(
            routine_id = id,
            blocks = routine.blocks.len(),
            total_duration = routine.total_duration,
            "routine blocks replaced"
        );
        Ok(routine)
    }

    pub fn clone_routine(
        &mut self,
        actor: &Actor,
        id: i64,
        overrides: &CloneOverrides,
    ) -> DomainResult<Routine> {
        require_elevated(actor, "clone routines")?;

        let clone = self.write(|tx| {
            let source = visible_routine(tx, actor, id)?;
            let draft = RoutineDraft {
                name: copy_name(&source.name, overrides.name.as_deref()),
                description: source.description.clone(),
                objective: source.objective.clone(),
                difficulty: source.difficulty,
                level: source.level,
                tags: source.tags.clone(),
                materials: source.materials.clone(),
                protection: source.protection.clone(),
                is_template: false,
                visibility: overrides.visibility.unwrap_or(source.visibility),
                repeat_in_days: source.repeat_in_days,
                scheduled_days: source.scheduled_days.clone(),
                trainer_notes: source.trainer_notes.clone(),
                category_ids: source.categories.iter().map(|category| category.id).collect(),
                blocks: source.blocks.iter().map(block_draft).collect(),
            };
            validate_draft(&draft)?;

            let clone_id = insert_routine(tx, &draft, actor.id)?;
            replace_category_links(tx, CategoryLink::Routine, clone_id, &draft.category_ids)?;
            for (index, block) in draft.blocks.iter().enumerate() {
                let block_id = insert_block(tx, clone_id, position(index), block)?;
                sync_instances(tx, block_id, &block.exercises)?;
            }
            recompute_durations(tx, clone_id)?;

            require_routine(tx, clone_id)
        })?;

        info!(source_id = id, routine_id = clone.id, "routine cloned");
        Ok(clone)
    }

    pub fn delete_routine(&mut self, actor: &Actor, id: i64) -> DomainResult<()> {
        self.write(|tx| {
            modifiable_routine(tx, actor, id)?;

            let completions: i64 = tx.query_row(
                "SELECT COUNT(*) FROM routine_completions WHERE routine_id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if completions > 0 {
                return Err(AcademyError::conflict(format!(
                    "Routine {id} has {completions} recorded completion(s) and cannot be deleted"
                )));
            }

            tx.execute("DELETE FROM routines WHERE id = ?1", params![id])?;
            Ok(())
        })?;

        info!(routine_id = id, "routine deleted");
        Ok(())
    }

    pub fn toggle_favorite(&mut self, actor: &Actor, id: i64) -> DomainResult<Routine> {
        self.toggle_flag(actor, id, "is_favorite")
    }

    pub fn toggle_active(&mut self, actor: &Actor, id: i64) -> DomainResult<Routine> {
        self.toggle_flag(actor, id, "is_active")
    }

    fn toggle_flag(&mut self, actor: &Actor, id: i64, column: &str) -> DomainResult<Routine> {
        let routine = self.write(|tx| {
            modifiable_routine(tx, actor, id)?;
            tx.execute(
                &format!(
                    "UPDATE routines SET {column} = 1 - {column}, updated_at = ?2 WHERE id = ?1"
                ),
                params![id, Utc::now().timestamp()],
            )?;
            require_routine(tx, id)
        })?;

        info!(routine_id = id, flag = column, "routine flag toggled");
        Ok(routine)
    }

    pub fn schedule_readiness(
        &self,
        actor: &Actor,
        id: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<ScheduleReadiness> {
        let routine = visible_routine(self.conn(), actor, id)?;
        let last_completed_at = last_completed_at(self.conn(), id)?;

        Ok(ScheduleReadiness {
            routine_id: id,
            repeat_in_days: routine.repeat_in_days,
            last_completed_at,
            next_eligible_at: next_eligible_at(routine.repeat_in_days, last_completed_at),
            ready: is_ready_for_scheduling(routine.repeat_in_days, last_completed_at, now),
        })
    }
}

fn position(index: usize) -> i64 {
    index as i64 + 1
}

fn block_draft(block: &RoutineBlock) -> BlockDraft {
    BlockDraft {
        id: None,
        name: block.name.clone(),
        description: block.description.clone(),
        color: block.color.clone(),
        notes: block.notes.clone(),
        exercises: block
            .exercises
            .iter()
            .map(|instance| InstanceDraft {
                exercise_id: instance.exercise_id,
                duration_override: instance.duration_override,
                notes: instance.notes.clone(),
                custom_timers: instance.custom_timers.clone(),
            })
            .collect(),
    }
}

fn check_exercises(conn: &Connection, blocks: &[BlockDraft]) -> DomainResult<()> {
    let mut violations = Violations::new();

    for (index, block) in blocks.iter().enumerate() {
        for (position, instance) in block.exercises.iter().enumerate() {
            violations.check(
                exercise_exists(conn, instance.exercise_id)?,
                format!("blocks.{index}.exercises.{position}.exercise_id"),
                format!("exercise {} does not exist", instance.exercise_id),
            );
        }
    }

    violations.into_result("Routine references unknown exercises")
}

fn insert_routine(conn: &Connection, draft: &RoutineDraft, owner_id: i64) -> DomainResult<i64> {
    let now = Utc::now().timestamp();

    conn.execute(
        "INSERT INTO routines (
            name, description, objective, total_duration, difficulty, level, tags, materials,
            protection, is_template, is_favorite, visibility, is_active, repeat_in_days,
            scheduled_days, trainer_notes, created_by, usage_count, average_rating,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, 1, ?11, ?12, ?13, ?14, 0, NULL, ?15, ?15)",
        params![
            draft.name.trim(),
            draft.description,
            draft.objective,
            draft.difficulty,
            draft.level,
            to_json(&draft.tags)?,
            to_json(&draft.materials)?,
            to_json(&draft.protection)?,
            draft.is_template,
            draft.visibility,
            draft.repeat_in_days,
            to_json(&draft.scheduled_days)?,
            draft.trainer_notes,
            owner_id,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn insert_block(
    conn: &Connection,
    routine_id: i64,
    sort_order: i64,
    block: &BlockDraft,
) -> DomainResult<i64> {
    let now = Utc::now().timestamp();

    conn.execute(
        "INSERT INTO routine_blocks (
            routine_id, name, description, color, notes, sort_order, duration, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?7)",
        params![
            routine_id,
            block.name.trim(),
            block.description,
            block.color,
            block.notes,
            sort_order,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

fn update_block(
    conn: &Connection,
    block_id: i64,
    sort_order: i64,
    block: &BlockDraft,
) -> DomainResult<()> {
    conn.execute(
        "UPDATE routine_blocks
         SET name = ?2, description = ?3, color = ?4, notes = ?5, sort_order = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            block_id,
            block.name.trim(),
            block.description,
            block.color,
            block.notes,
            sort_order,
            Utc::now().timestamp(),
        ],
    )?;

    Ok(())
}

/// Makes the block's exercise rows match `instances`, keyed by exercise id.
fn sync_instances(conn: &Connection, block_id: i64, instances: &[InstanceDraft]) -> DomainResult<()> {
    let existing = {
        let mut statement = conn.prepare_cached(
            "SELECT exercise_id, id FROM routine_block_exercises WHERE routine_block_id = ?1",
        )?;
        statement
            .query_map(params![block_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?
    };

    let incoming = instances
        .iter()
        .map(|instance| instance.exercise_id)
        .collect::<HashSet<_>>();
    for (exercise_id, row_id) in &existing {
        if !incoming.contains(exercise_id) {
            conn.execute(
                "DELETE FROM routine_block_exercises WHERE id = ?1",
                params![row_id],
            )?;
        }
    }

    conn.execute(
        "UPDATE routine_block_exercises SET sort_order = -id WHERE routine_block_id = ?1",
        params![block_id],
    )?;

    for (index, instance) in instances.iter().enumerate() {
        let notes = to_json(&instance.notes)?;
        let custom_timers = instance
            .custom_timers
            .as_ref()
            .map(to_json)
            .transpose()?;

        match existing.get(&instance.exercise_id) {
            Some(row_id) => {
                conn.execute(
                    "UPDATE routine_block_exercises
                     SET sort_order = ?2, duration_override = ?3, notes = ?4, custom_timers = ?5
                     WHERE id = ?1",
                    params![
                        row_id,
                        position(index),
                        instance.duration_override,
                        notes,
                        custom_timers,
                    ],
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO routine_block_exercises (
                        routine_block_id, exercise_id, sort_order, duration_override, notes, custom_timers
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        block_id,
                        instance.exercise_id,
                        position(index),
                        instance.duration_override,
                        notes,
                        custom_timers,
                    ],
                )?;
            }
        }
    }

    Ok(())
}

/// Recomputes every block duration of a routine, then the routine total from them.
fn recompute_durations(conn: &Connection, routine_id: i64) -> DomainResult<f64> {
    let mut blocks = load_blocks(conn, routine_id)?;

    for block in &mut blocks {
        block.duration = block
            .exercises
            .iter()
            .map(|instance| instance.effective_duration)
            .sum();
        conn.execute(
            "UPDATE routine_blocks SET duration = ?2 WHERE id = ?1",
            params![block.id, block.duration],
        )?;
    }

    let total = calculate_total_duration(&blocks);
    conn.execute(
        "UPDATE routines SET total_duration = ?2 WHERE id = ?1",
        params![routine_id, total],
    )?;

    Ok(total)
}

/// Refreshes the cached durations of every routine with a block using `exercise_id`.
pub(crate) fn recompute_routines_using(conn: &Connection, exercise_id: i64) -> DomainResult<usize> {
    let routine_ids = {
        let mut statement = conn.prepare_cached(
            "SELECT DISTINCT rb.routine_id
             FROM routine_block_exercises rbe
             JOIN routine_blocks rb ON rb.id = rbe.routine_block_id
             WHERE rbe.exercise_id = ?1",
        )?;
        statement
            .query_map(params![exercise_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?
    };

    for routine_id in &routine_ids {
        recompute_durations(conn, *routine_id)?;
    }

    Ok(routine_ids.len())
}

fn map_routine(row: &Row<'_>) -> rusqlite::Result<Routine> {
    Ok(Routine {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        objective: row.get(3)?,
        total_duration: row.get(4)?,
        difficulty: row.get(5)?,
        level: row.get(6)?,
        tags: json_column(row, 7)?,
        materials: json_column(row, 8)?,
        protection: json_column(row, 9)?,
        is_template: row.get(10)?,
        is_favorite: row.get(11)?,
        visibility: row.get(12)?,
        is_active: row.get(13)?,
        repeat_in_days: row.get(14)?,
        scheduled_days: json_column(row, 15)?,
        trainer_notes: row.get(16)?,
        created_by: row.get(17)?,
        usage_count: row.get(18)?,
        average_rating: row.get(19)?,
        categories: Vec::new(),
        blocks: Vec::new(),
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

fn load_blocks(conn: &Connection, routine_id: i64) -> DomainResult<Vec<RoutineBlock>> {
    let mut statement = conn.prepare_cached(
        "SELECT id, routine_id, name, description, color, notes, sort_order, duration
         FROM routine_blocks
         WHERE routine_id = ?1
         ORDER BY sort_order ASC",
    )?;

    let mut blocks = statement
        .query_map(params![routine_id], |row| {
            Ok(RoutineBlock {
                id: row.get(0)?,
                routine_id: row.get(1)?,
                name: row.get(2)?,
                description: row.get(3)?,
                color: row.get(4)?,
                notes: row.get(5)?,
                sort_order: row.get(6)?,
                duration: row.get(7)?,
                exercises: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for block in &mut blocks {
        block.exercises = load_instances(conn, block.id)?;
    }

    Ok(blocks)
}

fn load_instances(conn: &Connection, block_id: i64) -> DomainResult<Vec<BlockExercise>> {
    let mut statement = conn.prepare_cached(
        "SELECT rbe.id, rbe.exercise_id, e.name, rbe.sort_order, rbe.duration_override,
                rbe.notes, rbe.custom_timers, e.duration, e.is_multi_timer, e.timers
         FROM routine_block_exercises rbe
         JOIN exercises e ON e.id = rbe.exercise_id
         WHERE rbe.routine_block_id = ?1
         ORDER BY rbe.sort_order ASC",
    )?;

    let rows = statement
        .query_map(params![block_id], |row| {
            let duration_override: Option<i64> = row.get(4)?;
            let timers: Vec<TimerSpec> = json_column(row, 9)?;
            let exercise_duration = effective_duration(row.get(8)?, row.get(7)?, &timers);

            Ok(BlockExercise {
                id: row.get(0)?,
                exercise_id: row.get(1)?,
                exercise_name: row.get(2)?,
                sort_order: row.get(3)?,
                duration_override,
                notes: json_column(row, 5)?,
                custom_timers: optional_json_column(row, 6)?,
                exercise_duration,
                effective_duration: instance_duration(duration_override, exercise_duration),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub(crate) fn load_routine(conn: &Connection, id: i64) -> DomainResult<Option<Routine>> {
    let routine = conn
        .query_row(
            &format!("SELECT {ROUTINE_COLUMNS} FROM routines WHERE id = ?1"),
            params![id],
            map_routine,
        )
        .optional()?;

    let Some(mut routine) = routine else {
        return Ok(None);
    };
    routine.categories = linked_categories(conn, CategoryLink::Routine, id)?;
    routine.blocks = load_blocks(conn, id)?;

    Ok(Some(routine))
}

fn require_routine(conn: &Connection, id: i64) -> DomainResult<Routine> {
    load_routine(conn, id)?.ok_or_else(|| AcademyError::not_found(format!("Routine {id}")))
}

/// Hidden routines are reported as missing so their existence does not leak.
pub(crate) fn visible_routine(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<Routine> {
    load_routine(conn, id)?
        .filter(|routine| routine.visible_to(actor))
        .ok_or_else(|| AcademyError::not_found(format!("Routine {id}")))
}

fn modifiable_routine(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<Routine> {
    let routine = visible_routine(conn, actor, id)?;
    if !routine.modifiable_by(actor) {
        return Err(AcademyError::permission(format!(
            "You cannot modify routine {id}"
        )));
    }

    Ok(routine)
}

fn last_completed_at(conn: &Connection, routine_id: i64) -> DomainResult<Option<DateTime<Utc>>> {
    let timestamp: Option<i64> = conn.query_row(
        "SELECT MAX(completed_at) FROM routine_completions WHERE routine_id = ?1",
        params![routine_id],
        |row| row.get(0),
    )?;

    Ok(timestamp.map(utc_from_timestamp))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::super::{BlockDraft, InstanceDraft, RoutineDraft};
    use crate::access::{Actor, Visibility};
    use crate::db::Database;

    pub fn instance(exercise_id: i64) -> InstanceDraft {
        InstanceDraft {
            exercise_id,
            duration_override: None,
            notes: Vec::new(),
            custom_timers: None,
        }
    }

    pub fn block(name: &str, exercises: Vec<InstanceDraft>) -> BlockDraft {
        BlockDraft {
            id: None,
            name: name.to_string(),
            description: None,
            color: "#3B82F6".to_string(),
            notes: None,
            exercises,
        }
    }

    pub fn draft(name: &str, blocks: Vec<BlockDraft>) -> RoutineDraft {
        RoutineDraft {
            name: name.to_string(),
            visibility: Visibility::Shared,
            blocks,
            ..RoutineDraft::default()
        }
    }

    /// A routine with two blocks lasting 10 and 15 minutes.
    pub fn ten_and_fifteen(database: &mut Database, actor: &Actor) -> i64 {
        let jab = crate::catalog::store::fixtures::flat(database, actor, "Jab", 10);
        let pads = crate::catalog::store::fixtures::flat(database, actor, "Pads", 6);
        let rope = crate::catalog::store::fixtures::flat(database, actor, "Rope", 9);

        let routine = draft(
            "Fundamentals",
            vec![
                block("Warm-up", vec![instance(jab)]),
                block("Main", vec![instance(pads), instance(rope)]),
            ],
        );
        database
            .create_routine(actor, &routine)
            .expect("routine created")
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{block, draft, instance, ten_and_fifteen};
    use crate::access::Role;
    use crate::catalog::store::fixtures::{flat, timed};
    use crate::catalog::{CloneOverrides, TimerSpec};
    use crate::composer::{BlockDraft, Routine, RoutinePatch, calculate_total_duration};
    use crate::db::fixtures::{account, database};
    use crate::error::AcademyError;
    use chrono::{Duration, Utc};

    fn assert_aggregates(routine: &Routine) {
        for block in &routine.blocks {
            let sum = block
                .exercises
                .iter()
                .map(|instance| instance.effective_duration)
                .sum::<f64>();
            assert_eq!(block.duration, sum, "block {} duration", block.name);
        }
        assert_eq!(routine.total_duration, calculate_total_duration(&routine.blocks));
    }

    fn as_drafts(routine: &Routine) -> Vec<BlockDraft> {
        routine
            .blocks
            .iter()
            .map(|existing| {
                let mut draft = super::block_draft(existing);
                draft.id = Some(existing.id);
                draft
            })
            .collect()
    }

    #[test]
    fn create_aggregates_durations_bottom_up() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);

        let routine = database.routine(&coach, id).expect("routine");
        assert_eq!(routine.blocks.len(), 2);
        assert_eq!(routine.blocks[0].duration, 10.0);
        assert_eq!(routine.blocks[1].duration, 15.0);
        assert_eq!(routine.total_duration, 25.0);
        assert_eq!(routine.blocks[1].sort_order, 2);
        assert_aggregates(&routine);
    }

    #[test]
    fn overrides_and_timers_feed_the_total() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let rounds = timed(
            &mut database,
            &coach,
            "Rounds",
            vec![TimerSpec {
                name: "round".to_string(),
                duration: 1.0,
                repetitions: 3,
                rest_between: 0.5,
            }],
        );
        let rope = flat(&mut database, &coach, "Rope", 9);

        let mut shortened = instance(rope);
        shortened.duration_override = Some(2);
        let routine = database
            .create_routine(
                &coach,
                &draft("Mixed", vec![block("Only", vec![instance(rounds), shortened])]),
            )
            .expect("created");

        assert_eq!(routine.total_duration, 6.0);
        assert_aggregates(&routine);
    }

    #[test]
    fn unknown_exercise_rejects_the_whole_create() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let jab = flat(&mut database, &coach, "Jab", 5);

        let routine = draft(
            "Broken",
            vec![
                block("Fine", vec![instance(jab)]),
                block("Bad", vec![instance(404)]),
            ],
        );
        let error = database.create_routine(&coach, &routine).expect_err("unknown");
        assert!(
            error
                .fields()
                .expect("fields")
                .contains_key("blocks.1.exercises.0.exercise_id")
        );
        assert_eq!(database.counts().expect("counts").routines, 0);
    }

    #[test]
    fn create_does_not_touch_exercise_usage() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);
        let routine = database.routine(&coach, id).expect("routine");

        let exercise_id = routine.blocks[0].exercises[0].exercise_id;
        let exercise = database.exercise(&coach, exercise_id).expect("exercise");
        assert_eq!(exercise.usage_count, 0);
    }

    #[test]
    fn replace_blocks_reconciles_and_reorders() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);
        let extra = flat(&mut database, &coach, "Sprawl", 4);
        let routine = database.routine(&coach, id).expect("routine");

        let mut main = as_drafts(&routine).remove(1);
        main.exercises.remove(0);
        main.exercises.push(instance(extra));
        let replacement = vec![main, block("Cool-down", vec![instance(extra)])];

        let updated = database
            .replace_blocks(&coach, id, &replacement)
            .expect("replaced");

        assert_eq!(updated.blocks.len(), 2);
        assert_eq!(updated.blocks[0].id, routine.blocks[1].id);
        assert_eq!(updated.blocks[0].sort_order, 1);
        assert_eq!(updated.blocks[1].sort_order, 2);
        assert_eq!(updated.blocks[0].duration, 9.0 + 4.0);
        assert_eq!(updated.total_duration, 13.0 + 4.0);
        assert_aggregates(&updated);

        let orphaned: i64 = database
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM routine_blocks WHERE id = ?1",
                [routine.blocks[0].id],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(orphaned, 0);
    }

    #[test]
    fn replace_blocks_twice_is_idempotent() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);
        let routine = database.routine(&coach, id).expect("routine");

        let mut drafts = as_drafts(&routine);
        drafts.reverse();
        let first = database.replace_blocks(&coach, id, &drafts).expect("first");
        let second = database.replace_blocks(&coach, id, &drafts).expect("second");

        let shape = |routine: &Routine| {
            routine
                .blocks
                .iter()
                .map(|block| {
                    (
                        block.id,
                        block.sort_order,
                        block.duration,
                        block
                            .exercises
                            .iter()
                            .map(|instance| (instance.id, instance.sort_order))
                            .collect::<Vec<_>>(),
                    )
                })
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first.total_duration, second.total_duration);
        assert_eq!(first.blocks[0].id, routine.blocks[1].id);

        let instances: i64 = database
            .conn()
            .query_row("SELECT COUNT(*) FROM routine_block_exercises", [], |row| row.get(0))
            .expect("count");
        assert_eq!(instances, 3);
    }

    #[test]
    fn foreign_block_ids_are_rejected() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let first = ten_and_fifteen(&mut database, &coach);
        let second = ten_and_fifteen(&mut database, &coach);
        let other = database.routine(&coach, second).expect("routine");

        let error = database
            .replace_blocks(&coach, first, &as_drafts(&other))
            .expect_err("foreign ids");
        assert!(matches!(error, AcademyError::Validation { .. }));
        assert_eq!(database.routine(&coach, first).expect("routine").total_duration, 25.0);
    }

    #[test]
    fn clone_is_isolated_from_the_original() {
        let mut database = database();
        let owner = account(&database, "Coach", Role::Trainer);
        let other = account(&database, "Other", Role::Trainer);
        let category = database.insert_category("Boxing").expect("category");
        let id = ten_and_fifteen(&mut database, &owner);
        database
            .update_routine(
                &owner,
                id,
                &RoutinePatch {
                    category_ids: Some(vec![category.id]),
                    ..RoutinePatch::default()
                },
            )
            .expect("categorised");
        database.toggle_favorite(&owner, id).expect("favorite");

        let clone = database
            .clone_routine(&other, id, &CloneOverrides::default())
            .expect("cloned");
        assert_eq!(clone.name, "Fundamentals (Copy)");
        assert_eq!(clone.created_by, other.id);
        assert!(!clone.is_favorite);
        assert_eq!(clone.usage_count, 0);
        assert_eq!(clone.categories, vec![category]);
        assert_eq!(clone.total_duration, 25.0);
        assert_aggregates(&clone);

        let mut drafts = as_drafts(&clone);
        drafts.truncate(1);
        database
            .replace_blocks(&other, clone.id, &drafts)
            .expect("clone trimmed");

        let original = database.routine(&owner, id).expect("original");
        assert_eq!(original.total_duration, 25.0);
        assert_eq!(original.blocks.len(), 2);
        assert!(original.is_favorite);
    }

    #[test]
    fn clone_names_are_validated() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let jab = flat(&mut database, &coach, "Jab", 10);
        let routine = database
            .create_routine(
                &coach,
                &draft(&"x".repeat(255), vec![block("Main", vec![instance(jab)])]),
            )
            .expect("longest allowed name");

        let error = database
            .clone_routine(&coach, routine.id, &CloneOverrides::default())
            .expect_err("suffix overflows the name");
        let fields = error.fields().expect("field map");
        assert!(fields.contains_key("name"));
        assert_eq!(database.counts().expect("counts").routines, 1);

        let renamed = CloneOverrides {
            name: Some("Short copy".to_string()),
            ..CloneOverrides::default()
        };
        let clone = database
            .clone_routine(&coach, routine.id, &renamed)
            .expect("explicit name");
        assert_eq!(clone.name, "Short copy");
    }

    #[test]
    fn routines_with_completions_cannot_be_deleted() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);
        database
            .conn()
            .execute(
                "INSERT INTO routine_completions (
                    routine_id, routine_name, completed_at, planned_duration, actual_duration,
                    completed_by, created_at, updated_at
                 ) VALUES (?1, 'Fundamentals', 0, 25, 25, ?2, 0, 0)",
                [id, coach.id],
            )
            .expect("completion");

        let error = database.delete_routine(&coach, id).expect_err("guarded");
        assert!(matches!(error, AcademyError::Conflict(_)));
    }

    #[test]
    fn deleting_a_routine_cascades_its_blocks() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);

        database.delete_routine(&coach, id).expect("deleted");

        let (blocks, instances): (i64, i64) = database
            .conn()
            .query_row(
                "SELECT (SELECT COUNT(*) FROM routine_blocks), (SELECT COUNT(*) FROM routine_block_exercises)",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("counts");
        assert_eq!((blocks, instances), (0, 0));
    }

    #[test]
    fn students_cannot_modify_shared_routines() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let student = account(&database, "Ana", Role::Student);
        let id = ten_and_fifteen(&mut database, &coach);

        let error = database.toggle_active(&student, id).expect_err("hidden");
        assert!(matches!(error, AcademyError::NotFound(_)));
    }

    #[test]
    fn readiness_follows_repeat_interval() {
        let mut database = database();
        let coach = account(&database, "Coach", Role::Trainer);
        let id = ten_and_fifteen(&mut database, &coach);
        let now = Utc::now();

        let readiness = database.schedule_readiness(&coach, id, now).expect("readiness");
        assert!(!readiness.ready);

        database
            .update_routine(
                &coach,
                id,
                &RoutinePatch {
                    repeat_in_days: Some(2),
                    ..RoutinePatch::default()
                },
            )
            .expect("recurring");
        let readiness = database.schedule_readiness(&coach, id, now).expect("readiness");
        assert!(readiness.ready);
        assert_eq!(readiness.last_completed_at, None);

        let completed_at = (now - Duration::days(1)).timestamp();
        database
            .conn()
            .execute(
                "INSERT INTO routine_completions (
                    routine_id, routine_name, completed_at, planned_duration, actual_duration,
                    completed_by, created_at, updated_at
                 ) VALUES (?1, 'Fundamentals', ?2, 25, 25, ?3, 0, 0)",
                [id, completed_at, coach.id],
            )
            .expect("completion");
        let readiness = database.schedule_readiness(&coach, id, now).expect("readiness");
        assert!(!readiness.ready);
        assert!(readiness.next_eligible_at.is_some());
    }
}
