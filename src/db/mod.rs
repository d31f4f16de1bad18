pub mod queries;

use crate::access::{Actor, Role};
use crate::error::{AcademyError, DomainResult};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub accounts: i64,
    pub exercises: i64,
    pub routines: i64,
    pub completions: i64,
    pub planned_classes: i64,
}

/// Join tables linking catalog records to categories.
#[derive(Debug, Clone, Copy)]
pub enum CategoryLink {
    Exercise,
    Routine,
}

impl CategoryLink {
    fn table(self) -> &'static str {
        match self {
            CategoryLink::Exercise => "exercise_categories",
            CategoryLink::Routine => "routine_categories",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            CategoryLink::Exercise => "exercise_id",
            CategoryLink::Routine => "routine_id",
        }
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite DB: {}", path.display()))?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite DB")?;

        let database = Self { conn };
        database.init_schema()?;

        Ok(database)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn
            .busy_timeout(BUSY_TIMEOUT)
            .context("Failed to set busy timeout")?;
        self.conn
            .execute_batch(queries::PRAGMAS)
            .context("Failed to enable foreign keys")?;

        queries::schema_statements()
            .iter()
            .try_for_each(|statement| {
                self.conn
                    .execute(statement, [])
                    .context("Failed to initialize schema")
                    .map(|_| ())
            })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `operation` inside an IMMEDIATE transaction. The write lock is taken at
    /// `BEGIN`, so concurrent writers serialize; any error rolls every write back.
    pub(crate) fn write<T, F>(&mut self, operation: F) -> DomainResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> DomainResult<T>,
    {
        let transaction = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = operation(&transaction)?;
        transaction.commit()?;

        Ok(value)
    }

    pub fn insert_account(&self, name: &str, email: &str, role: Role) -> DomainResult<AccountRow> {
        let name = name.trim();
        let email = email.trim().to_lowercase();

        if name.is_empty() {
            return Err(AcademyError::validation("Account name is required"));
        }
        if !email.contains('@') {
            return Err(AcademyError::validation(format!(
                "Invalid email address: {email}"
            )));
        }

        let inserted = self.conn.execute(
            "INSERT INTO users (name, email, role, is_active, created_at) VALUES (?1, ?2, ?3, 1, ?4)",
            params![name, &email, role, Utc::now().timestamp()],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(failure, _))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                return Err(AcademyError::conflict(format!(
                    "An account with email {email} already exists"
                )));
            }
            Err(error) => return Err(error.into()),
        }

        let id = self.conn.last_insert_rowid();
        self.account(id)?
            .ok_or_else(|| AcademyError::not_found(format!("Account {id}")))
    }

    pub fn account(&self, id: i64) -> DomainResult<Option<AccountRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, email, role, is_active, created_at FROM users WHERE id = ?1",
                params![id],
                map_account,
            )
            .optional()?;

        Ok(row)
    }

    pub fn list_accounts(&self, role: Option<Role>) -> DomainResult<Vec<AccountRow>> {
        let mut statement = self.conn.prepare(
            "SELECT id, name, email, role, is_active, created_at
             FROM users
             WHERE (?1 IS NULL OR role = ?1)
             ORDER BY name ASC",
        )?;

        let rows = statement
            .query_map(params![role], map_account)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Resolves an active account into the actor threaded through domain operations.
    pub fn resolve_actor(&self, id: i64) -> DomainResult<Option<Actor>> {
        Ok(self
            .account(id)?
            .filter(|account| account.is_active)
            .map(|account| Actor {
                id: account.id,
                role: account.role,
            }))
    }

    pub fn insert_category(&self, name: &str) -> DomainResult<CategoryRef> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AcademyError::validation("Category name is required"));
        }

        self.conn.execute(
            "INSERT INTO categories (name, created_at) VALUES (?1, ?2)
             ON CONFLICT(name) DO NOTHING",
            params![name, Utc::now().timestamp()],
        )?;

        let category = self.conn.query_row(
            "SELECT id, name FROM categories WHERE name = ?1",
            params![name],
            |row| {
                Ok(CategoryRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;

        Ok(category)
    }

    pub fn list_categories(&self) -> DomainResult<Vec<CategoryRef>> {
        let mut statement = self
            .conn
            .prepare("SELECT id, name FROM categories ORDER BY name ASC")?;

        let rows = statement
            .query_map([], |row| {
                Ok(CategoryRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn counts(&self) -> DomainResult<StoreCounts> {
        let count = |table: &str| -> DomainResult<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };

        Ok(StoreCounts {
            accounts: count("users")?,
            exercises: count("exercises")?,
            routines: count("routines")?,
            completions: count("routine_completions")?,
            planned_classes: count("planned_classes")?,
        })
    }
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Returns the ids in `ids` that do not belong to an active student account.
pub(crate) fn non_students(conn: &Connection, ids: &[i64]) -> DomainResult<Vec<i64>> {
    let mut statement =
        conn.prepare_cached("SELECT role, is_active FROM users WHERE id = ?1")?;

    let mut offenders = Vec::new();
    for id in ids {
        let account = statement
            .query_row(params![id], |row| {
                Ok((row.get::<_, Role>(0)?, row.get::<_, bool>(1)?))
            })
            .optional()?;

        if !matches!(account, Some((Role::Student, true))) {
            offenders.push(*id);
        }
    }

    Ok(offenders)
}

pub(crate) fn unknown_categories(conn: &Connection, ids: &[i64]) -> DomainResult<Vec<i64>> {
    let mut statement = conn.prepare_cached("SELECT 1 FROM categories WHERE id = ?1")?;

    let mut unknown = Vec::new();
    for id in ids {
        if !statement.exists(params![id])? {
            unknown.push(*id);
        }
    }

    Ok(unknown)
}

pub(crate) fn linked_categories(
    conn: &Connection,
    link: CategoryLink,
    owner_id: i64,
) -> DomainResult<Vec<CategoryRef>> {
    let sql = format!(
        "SELECT c.id, c.name FROM {table} l
         JOIN categories c ON c.id = l.category_id
         WHERE l.{owner} = ?1
         ORDER BY l.id ASC",
        table = link.table(),
        owner = link.owner_column(),
    );
    let mut statement = conn.prepare_cached(&sql)?;

    let rows = statement
        .query_map(params![owner_id], |row| {
            Ok(CategoryRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Replaces the category set of a record, keeping the incoming order.
pub(crate) fn replace_category_links(
    conn: &Connection,
    link: CategoryLink,
    owner_id: i64,
    category_ids: &[i64],
) -> DomainResult<()> {
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1",
            link.table(),
            link.owner_column()
        ),
        params![owner_id],
    )?;

    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, category_id) VALUES (?1, ?2)",
        link.table(),
        link.owner_column()
    );
    let mut statement = conn.prepare_cached(&sql)?;
    for category_id in category_ids {
        statement.execute(params![owner_id, category_id])?;
    }

    Ok(())
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> DomainResult<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

pub(crate) fn optional_json_column<T: DeserializeOwned>(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
        })
    })
    .transpose()
}

pub(crate) fn utc_from_timestamp(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_default()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Database;
    use crate::access::{Actor, Role};

    pub fn database() -> Database {
        Database::open_in_memory().expect("in-memory database")
    }

    pub fn account(database: &Database, name: &str, role: Role) -> Actor {
        let email = format!("{}@ringside.test", name.to_lowercase().replace(' ', "."));
        let row = database
            .insert_account(name, &email, role)
            .expect("account inserted");
        Actor {
            id: row.id,
            role: row.role,
        }
    }
}
