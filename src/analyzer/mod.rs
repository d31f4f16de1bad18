pub mod report;

use crate::access::{Actor, require_elevated};
use crate::analyzer::report::{
    AttendanceFact, CatalogFact, CompletionAnalytics, CompletionFact, Overview, StudentReport,
};
use crate::db::{Database, json_column, utc_from_timestamp};
use crate::error::{AcademyError, DomainResult};
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::warn;

/// A section that cannot be read degrades to an empty value instead of failing the report.
fn or_empty<T: Default>(section: &str, result: DomainResult<T>) -> T {
    result.unwrap_or_else(|error| {
        warn!(section, error = %error, "statistics section unavailable");
        T::default()
    })
}

impl Database {
    pub fn overview(
        &self,
        actor: &Actor,
        now: DateTime<Utc>,
        popular_limit: usize,
    ) -> DomainResult<Overview> {
        require_elevated(actor, "view statistics")?;

        let routines = or_empty("routines", self.routine_facts());
        let exercises = or_empty("exercises", self.exercise_facts());
        let completions = or_empty("completions", self.completion_facts(None, None, None));
        let attendance = or_empty("attendance", self.attendance_facts(None, None, None));

        Ok(report::build_overview(
            now,
            &routines,
            &exercises,
            &completions,
            &attendance,
            popular_limit,
        ))
    }

    pub fn completion_analytics(
        &self,
        actor: &Actor,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DomainResult<CompletionAnalytics> {
        require_elevated(actor, "view statistics")?;

        let completions = or_empty("completions", self.completion_facts(from, to, None));
        let attendance = or_empty("attendance", self.attendance_facts(from, to, None));

        Ok(report::build_completion_analytics(
            from,
            to,
            &completions,
            &attendance,
        ))
    }

    pub fn student_report(
        &self,
        actor: &Actor,
        student_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DomainResult<StudentReport> {
        if !actor.is_elevated() && actor.id != student_id {
            return Err(AcademyError::permission(
                "Students can only view their own report",
            ));
        }
        let student = self
            .account(student_id)?
            .ok_or_else(|| AcademyError::not_found(format!("Student {student_id}")))?;

        let completions = or_empty(
            "student completions",
            self.completion_facts(from, to, Some(student_id)),
        );
        let attendance = or_empty(
            "student attendance",
            self.attendance_facts(from, to, Some(student_id)),
        );

        Ok(report::build_student_report(
            student.id,
            &student.name,
            &completions,
            &attendance,
        ))
    }

    fn routine_facts(&self) -> DomainResult<Vec<CatalogFact>> {
        let mut statement = self.conn().prepare(
            "SELECT id, name, usage_count, average_rating, difficulty, level
             FROM routines WHERE is_active = 1",
        )?;

        let rows = statement
            .query_map([], |row| {
                Ok(CatalogFact {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    usage_count: row.get(2)?,
                    average_rating: row.get(3)?,
                    labels: vec![("difficulty", row.get(4)?), ("level", row.get(5)?)],
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn exercise_facts(&self) -> DomainResult<Vec<CatalogFact>> {
        let mut statement = self.conn().prepare(
            "SELECT id, name, usage_count, average_rating, work_type, difficulty, intensity
             FROM exercises WHERE is_active = 1",
        )?;

        let rows = statement
            .query_map([], |row| {
                Ok(CatalogFact {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    usage_count: row.get(2)?,
                    average_rating: row.get(3)?,
                    labels: vec![
                        ("work_type", row.get(4)?),
                        ("difficulty", row.get(5)?),
                        ("intensity", row.get(6)?),
                    ],
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn completion_facts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        student_id: Option<i64>,
    ) -> DomainResult<Vec<CompletionFact>> {
        let mut statement = self.conn().prepare(
            "SELECT rc.id, rc.routine_id, rc.category_name, rc.completed_at, rc.planned_duration,
                    rc.actual_duration, rc.rating, rc.morning_session, rc.afternoon_session,
                    rc.is_full_day_complete, rc.exercise_completions
             FROM routine_completions rc
             WHERE (?1 IS NULL OR rc.completed_at >= ?1)
               AND (?2 IS NULL OR rc.completed_at <= ?2)
               AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM routine_completion_attendees a
                    WHERE a.routine_completion_id = rc.id AND a.student_id = ?3))
             ORDER BY rc.completed_at ASC",
        )?;

        let rows = statement
            .query_map(
                params![
                    from.map(|from| from.timestamp()),
                    to.map(|to| to.timestamp()),
                    student_id,
                ],
                |row| {
                    Ok(CompletionFact {
                        id: row.get(0)?,
                        routine_id: row.get(1)?,
                        category_name: row.get(2)?,
                        completed_at: utc_from_timestamp(row.get(3)?),
                        planned_duration: row.get(4)?,
                        actual_duration: row.get(5)?,
                        rating: row.get(6)?,
                        morning_session: row.get(7)?,
                        afternoon_session: row.get(8)?,
                        is_full_day_complete: row.get(9)?,
                        exercise_completions: json_column(row, 10)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn attendance_facts(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        student_id: Option<i64>,
    ) -> DomainResult<Vec<AttendanceFact>> {
        let mut statement = self.conn().prepare(
            "SELECT a.routine_completion_id, a.student_id, u.name, a.participation_minutes,
                    a.completed_full_session
             FROM routine_completion_attendees a
             JOIN routine_completions rc ON rc.id = a.routine_completion_id
             JOIN users u ON u.id = a.student_id
             WHERE (?1 IS NULL OR rc.completed_at >= ?1)
               AND (?2 IS NULL OR rc.completed_at <= ?2)
               AND (?3 IS NULL OR a.student_id = ?3)",
        )?;

        let rows = statement
            .query_map(
                params![
                    from.map(|from| from.timestamp()),
                    to.map(|to| to.timestamp()),
                    student_id,
                ],
                |row| {
                    Ok(AttendanceFact {
                        completion_id: row.get(0)?,
                        student_id: row.get(1)?,
                        student_name: row.get(2)?,
                        participation_minutes: row.get(3)?,
                        completed_full_session: row.get(4)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
