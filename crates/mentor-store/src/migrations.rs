//! Embedded schema migrations.
//!
//! Migrations are applied in version order on open. Each applied version is
//! recorded in the `migrations` table so reopening a database is a no-op.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::StoreError;

/// A single schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Strictly increasing version number.
    pub version: u32,
    /// Short description recorded with the version.
    pub name: &'static str,
    /// SQL executed as one batch.
    pub sql: &'static str,
}

/// Every migration, in the order it must be applied.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create courses, modules and lessons",
        sql: r"
CREATE TABLE courses (
    id TEXT PRIMARY KEY,
    topic TEXT NOT NULL,
    course_title TEXT NOT NULL,
    estimated_duration INTEGER NOT NULL,
    difficulty_level TEXT NOT NULL,
    prerequisites_json TEXT NOT NULL,
    user_instructions TEXT,
    profile_json TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE modules (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL,
    plan_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    learning_objectives_json TEXT NOT NULL,
    estimated_duration INTEGER NOT NULL,
    dependencies_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
);

CREATE TABLE lessons (
    module_id TEXT NOT NULL,
    id TEXT NOT NULL,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    lesson_type TEXT NOT NULL,
    key_concepts_json TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    content_markdown TEXT,
    code_examples_json TEXT NOT NULL DEFAULT '[]',
    interactive_elements_json TEXT NOT NULL DEFAULT '[]',
    practice_tasks_json TEXT NOT NULL DEFAULT '[]',
    estimated_duration INTEGER,
    PRIMARY KEY (module_id, id),
    FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
);
",
    },
    Migration {
        version: 2,
        name: "index modules and lessons by parent",
        sql: r"
CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id, position);
CREATE INDEX IF NOT EXISTS idx_lessons_module ON lessons(module_id, position);
",
    },
];

/// Applies every migration newer than the recorded schema version.
///
/// Returns the number of migrations applied.
pub fn apply(conn: &mut Connection) -> Result<usize, StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        info!(
            version = migration.version,
            name = migration.name,
            "Applied schema migration"
        );
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "Schema is up to date");
    }

    Ok(applied)
}

/// Highest recorded migration version, or 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, StoreError> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}
