use super::{
    ClassDraft, ClassFilter, ClassPatch, ClassStatus, CompleteClass, DuplicateClass,
    PlannedClass, class_duration, validate_draft,
};
use crate::access::{Actor, can_modify, require_elevated};
use crate::composer::store::visible_routine;
use crate::db::{Database, json_column, non_students, to_json};
use crate::error::{AcademyError, DomainResult, Violations};
use crate::recorder::store::{insert_completion, load_completion};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

const CLASS_COLUMNS: &str = "id, title, description, date, start_time, end_time, duration,
    routine_id, class_type, max_participants, target_students, notes, status,
    routine_completion_id, created_by, created_at, updated_at";

impl Database {
    pub fn create_class(
        &mut self,
        actor: &Actor,
        draft: &ClassDraft,
        now: NaiveDateTime,
    ) -> DomainResult<PlannedClass> {
        require_elevated(actor, "plan classes")?;
        validate_draft(draft, now.date())?;

        let class = self.write(|tx| insert_class(tx, actor, draft))?;

        info!(class_id = class.id, date = %class.date, "class planned");
        Ok(class)
    }

    /// Edits a class that has not started yet; the duration follows the new times.
    pub fn update_class(
        &mut self,
        actor: &Actor,
        id: i64,
        patch: &ClassPatch,
        now: NaiveDateTime,
    ) -> DomainResult<PlannedClass> {
        let class = self.write(|tx| {
            let current = modifiable_class(tx, actor, id)?;
            if !current.status.can_edit() {
                return Err(AcademyError::conflict(format!(
                    "Only planned classes can be edited; class {id} is {}",
                    current.status
                )));
            }

            let draft = patch.apply(&current);
            validate_draft(&draft, now.date())?;
            check_references(tx, actor, &draft)?;

            tx.execute(
                "UPDATE planned_classes
                 SET title = ?2, description = ?3, date = ?4, start_time = ?5, end_time = ?6,
                     duration = ?7, routine_id = ?8, class_type = ?9, max_participants = ?10,
                     target_students = ?11, notes = ?12, updated_at = ?13
                 WHERE id = ?1",
                params![
                    id,
                    draft.title.trim(),
                    draft.description,
                    draft.date,
                    draft.start_time,
                    draft.end_time,
                    class_duration(draft.start_time, draft.end_time),
                    draft.routine_id,
                    draft.class_type,
                    draft.max_participants,
                    to_json(&draft.target_students)?,
                    to_json(&draft.notes)?,
                    Utc::now().timestamp(),
                ],
            )?;
            require_class(tx, id)
        })?;

        info!(class_id = id, date = %class.date, "class updated");
        Ok(class)
    }

    pub fn delete_class(&mut self, actor: &Actor, id: i64) -> DomainResult<()> {
        self.write(|tx| {
            let class = modifiable_class(tx, actor, id)?;
            if !class.status.can_delete() {
                return Err(AcademyError::conflict(format!(
                    "Completed class {id} cannot be deleted"
                )));
            }

            tx.execute("DELETE FROM planned_classes WHERE id = ?1", params![id])?;
            Ok(())
        })?;

        info!(class_id = id, "class deleted");
        Ok(())
    }

    /// Plans a fresh copy of a class on another date, owned by the actor.
    pub fn duplicate_class(
        &mut self,
        actor: &Actor,
        id: i64,
        request: &DuplicateClass,
        now: NaiveDateTime,
    ) -> DomainResult<PlannedClass> {
        require_elevated(actor, "plan classes")?;

        let class = self.write(|tx| {
            let source = require_class(tx, id)?;
            let draft = request.apply(&source);
            validate_draft(&draft, now.date())?;
            insert_class(tx, actor, &draft)
        })?;

        info!(source_id = id, class_id = class.id, date = %class.date, "class duplicated");
        Ok(class)
    }

    pub fn class(&self, id: i64) -> DomainResult<PlannedClass> {
        require_class(self.conn(), id)
    }

    pub fn list_classes(&self, filter: &ClassFilter, limit: usize) -> DomainResult<Vec<PlannedClass>> {
        let mut statement = self.conn().prepare(&format!(
            "SELECT {CLASS_COLUMNS} FROM planned_classes
             WHERE (?1 IS NULL OR date >= ?1)
               AND (?2 IS NULL OR date <= ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY date ASC, start_time ASC, id ASC
             LIMIT ?4"
        ))?;

        let rows = statement
            .query_map(
                params![filter.from, filter.to, filter.status, limit as i64],
                map_class,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn start_class(
        &mut self,
        actor: &Actor,
        id: i64,
        now: NaiveDateTime,
        lead_minutes: i64,
    ) -> DomainResult<PlannedClass> {
        require_elevated(actor, "start classes")?;

        let class = self.write(|tx| {
            let class = require_class(tx, id)?;
            if !class.status.can_start() {
                return Err(AcademyError::conflict(format!(
                    "Only planned classes can be started; class {id} is {}",
                    class.status
                )));
            }
            if !class.can_be_started(now, lead_minutes) {
                return Err(AcademyError::conflict(format!(
                    "Class {id} cannot be started at this time"
                )));
            }

            set_status(tx, id, ClassStatus::InProgress)?;
            require_class(tx, id)
        })?;

        info!(class_id = id, "class started");
        Ok(class)
    }

    pub fn cancel_class(&mut self, actor: &Actor, id: i64) -> DomainResult<PlannedClass> {
        let class = self.write(|tx| {
            let class = modifiable_class(tx, actor, id)?;
            if !class.status.can_cancel() {
                return Err(AcademyError::conflict(format!(
                    "Only planned or in-progress classes can be cancelled; class {id} is {}",
                    class.status
                )));
            }

            set_status(tx, id, ClassStatus::Cancelled)?;
            require_class(tx, id)
        })?;

        info!(class_id = id, "class cancelled");
        Ok(class)
    }

    /// Marks a class completed, linking or recording its completion in the same transaction.
    pub fn complete_class(
        &mut self,
        actor: &Actor,
        id: i64,
        request: &CompleteClass,
        now: DateTime<Utc>,
    ) -> DomainResult<PlannedClass> {
        require_elevated(actor, "complete classes")?;

        let class = self.write(|tx| {
            let class = require_class(tx, id)?;
            if !class.status.can_complete() {
                return Err(AcademyError::conflict(format!(
                    "Class {id} is already completed"
                )));
            }

            let completion_id = match (request.routine_completion_id, &request.completion) {
                (Some(completion_id), None) => {
                    let completion = load_completion(tx, completion_id)?.ok_or_else(|| {
                        AcademyError::not_found(format!("Completion {completion_id}"))
                    })?;
                    check_class_routine(&class, completion.routine_id)?;
                    completion_id
                }
                (None, Some(draft)) => {
                    check_class_routine(&class, draft.routine_id)?;
                    insert_completion(tx, actor, draft, now)?.id
                }
                _ => {
                    return Err(AcademyError::validation(
                        "Provide either routine_completion_id or a completion to record",
                    ));
                }
            };

            tx.execute(
                "UPDATE planned_classes
                 SET status = ?2, routine_completion_id = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![id, ClassStatus::Completed, completion_id, Utc::now().timestamp()],
            )?;
            require_class(tx, id)
        })?;

        info!(
            class_id = id,
            completion_id = class.routine_completion_id,
            "class completed"
        );
        Ok(class)
    }
}

fn insert_class(conn: &Connection, actor: &Actor, draft: &ClassDraft) -> DomainResult<PlannedClass> {
    check_references(conn, actor, draft)?;

    let timestamp = Utc::now().timestamp();
    conn.execute(
        "INSERT INTO planned_classes (
            title, description, date, start_time, end_time, duration, routine_id,
            class_type, max_participants, target_students, notes, status,
            routine_completion_id, created_by, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, ?14, ?14)",
        params![
            draft.title.trim(),
            draft.description,
            draft.date,
            draft.start_time,
            draft.end_time,
            class_duration(draft.start_time, draft.end_time),
            draft.routine_id,
            draft.class_type,
            draft.max_participants,
            to_json(&draft.target_students)?,
            to_json(&draft.notes)?,
            ClassStatus::Planned,
            actor.id,
            timestamp,
        ],
    )?;

    require_class(conn, conn.last_insert_rowid())
}

fn check_references(conn: &Connection, actor: &Actor, draft: &ClassDraft) -> DomainResult<()> {
    if let Some(routine_id) = draft.routine_id {
        visible_routine(conn, actor, routine_id)?;
    }
    let offenders = non_students(conn, &draft.target_students)?;
    if !offenders.is_empty() {
        return Err(AcademyError::validation(format!(
            "Target students are not active student accounts: {offenders:?}"
        )));
    }

    Ok(())
}

/// A class planned around a routine only accepts a session of that routine.
fn check_class_routine(class: &PlannedClass, routine_id: i64) -> DomainResult<()> {
    let mut violations = Violations::new();
    if let Some(planned) = class.routine_id {
        violations.check(
            planned == routine_id,
            "routine_id",
            format!("class {} is planned for routine {planned}, not {routine_id}", class.id),
        );
    }

    violations.into_result("Completion does not match the class routine")
}

fn modifiable_class(conn: &Connection, actor: &Actor, id: i64) -> DomainResult<PlannedClass> {
    let class = require_class(conn, id)?;
    if !can_modify(class.created_by, actor) {
        return Err(AcademyError::permission(format!(
            "You cannot modify class {id}"
        )));
    }

    Ok(class)
}

fn set_status(conn: &Connection, id: i64, status: ClassStatus) -> DomainResult<()> {
    conn.execute(
        "UPDATE planned_classes SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, status, Utc::now().timestamp()],
    )?;

    Ok(())
}

fn map_class(row: &Row<'_>) -> rusqlite::Result<PlannedClass> {
    Ok(PlannedClass {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        date: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        duration: row.get(6)?,
        routine_id: row.get(7)?,
        class_type: row.get(8)?,
        max_participants: row.get(9)?,
        target_students: json_column(row, 10)?,
        notes: json_column(row, 11)?,
        status: row.get(12)?,
        routine_completion_id: row.get(13)?,
        created_by: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

fn require_class(conn: &Connection, id: i64) -> DomainResult<PlannedClass> {
    conn.query_row(
        &format!("SELECT {CLASS_COLUMNS} FROM planned_classes WHERE id = ?1"),
        params![id],
        map_class,
    )
    .optional()?
    .ok_or_else(|| AcademyError::not_found(format!("Class {id}")))
}
