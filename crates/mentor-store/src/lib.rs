//! SQLite persistence for Mentor.
//!
//! [`SqliteRepository`] implements the orchestrator's
//! [`CourseRepository`] over a single `rusqlite` connection. List-valued
//! fields are stored as JSON text columns and timestamps as RFC 3339
//! strings. Every gateway call runs in its own transaction.

pub mod migrations;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use mentor_orchestrator::{
    plan_records, CoursePlan, CourseRecord, CourseRepository, IdGenerator, LearnerProfile,
    LessonRecord, LessonType, MentorError, ModuleContent, ModuleRecord, UuidIds,
};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the SQLite store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database rejected a statement.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column could not be encoded or decoded.
    #[error("invalid JSON column: {0}")]
    Json(#[from] serde_json::Error),

    /// The database file or its directory could not be prepared.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration {version} failed: {message}")]
    Migration {
        /// Version of the failing migration.
        version: u32,
        /// Error reported by SQLite.
        message: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp '{0}'")]
    Timestamp(String),

    /// The module does not exist in the given course.
    #[error("module '{module_id}' not found in course '{course_id}'")]
    ModuleNotInCourse {
        /// Owning course that was searched.
        course_id: String,
        /// Module that was looked up.
        module_id: String,
    },
}

impl From<StoreError> for MentorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ModuleNotInCourse { module_id, .. } => Self::module_not_found(module_id),
            other => Self::storage(other.to_string()),
        }
    }
}

// ============================================================================
// Repository
// ============================================================================

/// A [`CourseRepository`] backed by SQLite.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    ids: Box<dyn IdGenerator>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Opens (or creates) the database at `path` and applies pending migrations.
    ///
    /// The parent directory is created if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened course database");
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Replaces the identifier source.
    #[must_use]
    pub fn with_ids(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::apply(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: Box::new(UuidIds),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert_course(
        &self,
        plan: &CoursePlan,
        topic: &str,
        user_instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<String, StoreError> {
        let now = Utc::now();
        let course_id = self.ids.next_id();
        let (modules, lessons) = plan_records(&course_id, plan, self.ids.as_ref(), now);
        let profile_json = profile.map(serde_json::to_string).transpose()?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO courses (id, topic, course_title, estimated_duration, difficulty_level,
                                  prerequisites_json, user_instructions, profile_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                course_id,
                topic,
                plan.course_title,
                plan.estimated_duration,
                plan.difficulty_level,
                serde_json::to_string(&plan.prerequisites)?,
                user_instructions,
                profile_json,
                now.to_rfc3339(),
            ],
        )?;

        for module in &modules {
            tx.execute(
                "INSERT INTO modules (id, course_id, plan_id, position, title, description,
                                      learning_objectives_json, estimated_duration,
                                      dependencies_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    module.id,
                    module.course_id,
                    module.plan_id,
                    module.position,
                    module.title,
                    module.description,
                    serde_json::to_string(&module.learning_objectives)?,
                    module.estimated_duration,
                    serde_json::to_string(&module.dependencies)?,
                    module.created_at.to_rfc3339(),
                ],
            )?;
        }

        for lesson in &lessons {
            insert_lesson(&tx, lesson)?;
        }

        tx.commit()?;
        debug!(
            course_id = %course_id,
            modules = modules.len(),
            lessons = lessons.len(),
            "Stored course plan"
        );
        Ok(course_id)
    }

    fn replace_lessons(
        &self,
        course_id: &str,
        module_id: &str,
        content: &ModuleContent,
    ) -> Result<String, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM modules WHERE id = ?1 AND course_id = ?2)",
            params![module_id, course_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::ModuleNotInCourse {
                course_id: course_id.to_string(),
                module_id: module_id.to_string(),
            });
        }

        tx.execute("DELETE FROM lessons WHERE module_id = ?1", [module_id])?;
        for (position, lesson) in (0u32..).zip(&content.lessons) {
            insert_lesson(&tx, &LessonRecord::from_content(module_id, position, lesson))?;
        }

        tx.commit()?;
        debug!(
            module_id = %module_id,
            lessons = content.lessons.len(),
            "Stored module content"
        );
        Ok(module_id.to_string())
    }

    fn select_course(&self, course_id: &str) -> Result<Option<CourseRecord>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, topic, course_title, estimated_duration, difficulty_level,
                        prerequisites_json, user_instructions, profile_json, created_at
                 FROM courses WHERE id = ?1",
                [course_id],
                |row| {
                    Ok(CourseRow {
                        id: row.get(0)?,
                        topic: row.get(1)?,
                        course_title: row.get(2)?,
                        estimated_duration: row.get(3)?,
                        difficulty_level: row.get(4)?,
                        prerequisites_json: row.get(5)?,
                        user_instructions: row.get(6)?,
                        profile_json: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                },
            )
            .optional()?;

        row.map(CourseRow::into_record).transpose()
    }

    fn select_modules(&self, clause: &str, key: &str) -> Result<Vec<ModuleRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, course_id, plan_id, position, title, description,
                    learning_objectives_json, estimated_duration, dependencies_json, created_at
             FROM modules WHERE {clause} = ?1 ORDER BY position"
        ))?;

        let rows = stmt.query_map([key], |row| {
            Ok(ModuleRow {
                id: row.get(0)?,
                course_id: row.get(1)?,
                plan_id: row.get(2)?,
                position: row.get(3)?,
                title: row.get(4)?,
                description: row.get(5)?,
                learning_objectives_json: row.get(6)?,
                estimated_duration: row.get(7)?,
                dependencies_json: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;

        let mut modules = Vec::new();
        for row in rows {
            modules.push(row?.into_record()?);
        }
        Ok(modules)
    }

    fn select_lessons(&self, module_id: &str) -> Result<Vec<LessonRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, module_id, position, title, lesson_type, key_concepts_json, difficulty,
                    content_markdown, code_examples_json, interactive_elements_json,
                    practice_tasks_json, estimated_duration
             FROM lessons WHERE module_id = ?1 ORDER BY position",
        )?;

        let rows = stmt.query_map([module_id], |row| {
            Ok(LessonRow {
                id: row.get(0)?,
                module_id: row.get(1)?,
                position: row.get(2)?,
                title: row.get(3)?,
                lesson_type: row.get(4)?,
                key_concepts_json: row.get(5)?,
                difficulty: row.get(6)?,
                content_markdown: row.get(7)?,
                code_examples_json: row.get(8)?,
                interactive_elements_json: row.get(9)?,
                practice_tasks_json: row.get(10)?,
                estimated_duration: row.get(11)?,
            })
        })?;

        let mut lessons = Vec::new();
        for row in rows {
            lessons.push(row?.into_record()?);
        }
        Ok(lessons)
    }
}

impl CourseRepository for SqliteRepository {
    fn save_course_plan(
        &self,
        plan: &CoursePlan,
        topic: &str,
        user_instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> mentor_orchestrator::Result<String> {
        Ok(self.insert_course(plan, topic, user_instructions, profile)?)
    }

    fn get_course(&self, course_id: &str) -> mentor_orchestrator::Result<Option<CourseRecord>> {
        Ok(self.select_course(course_id)?)
    }

    fn get_modules_by_course(
        &self,
        course_id: &str,
    ) -> mentor_orchestrator::Result<Vec<ModuleRecord>> {
        Ok(self.select_modules("course_id", course_id)?)
    }

    fn get_module(&self, module_id: &str) -> mentor_orchestrator::Result<Option<ModuleRecord>> {
        Ok(self.select_modules("id", module_id)?.into_iter().next())
    }

    fn save_module_content(
        &self,
        course_id: &str,
        module_id: &str,
        content: &ModuleContent,
    ) -> mentor_orchestrator::Result<String> {
        Ok(self.replace_lessons(course_id, module_id, content)?)
    }

    fn get_lessons_by_module(
        &self,
        module_id: &str,
    ) -> mentor_orchestrator::Result<Vec<LessonRecord>> {
        Ok(self.select_lessons(module_id)?)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn insert_lesson(tx: &Transaction<'_>, lesson: &LessonRecord) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO lessons (module_id, id, position, title, lesson_type, key_concepts_json,
                              difficulty, content_markdown, code_examples_json,
                              interactive_elements_json, practice_tasks_json, estimated_duration)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            lesson.module_id,
            lesson.id,
            lesson.position,
            lesson.title,
            lesson.lesson_type.as_str(),
            serde_json::to_string(&lesson.key_concepts)?,
            lesson.difficulty,
            lesson.content_markdown,
            serde_json::to_string(&lesson.code_examples)?,
            serde_json::to_string(&lesson.interactive_elements)?,
            serde_json::to_string(&lesson.practice_tasks)?,
            lesson.estimated_duration,
        ],
    )?;
    Ok(())
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    Ok(serde_json::from_str(text)?)
}

fn timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(text.to_string()))
}

struct CourseRow {
    id: String,
    topic: String,
    course_title: String,
    estimated_duration: u32,
    difficulty_level: String,
    prerequisites_json: String,
    user_instructions: Option<String>,
    profile_json: Option<String>,
    created_at: String,
}

impl CourseRow {
    fn into_record(self) -> Result<CourseRecord, StoreError> {
        Ok(CourseRecord {
            id: self.id,
            topic: self.topic,
            course_title: self.course_title,
            estimated_duration: self.estimated_duration,
            difficulty_level: self.difficulty_level,
            prerequisites: from_json(&self.prerequisites_json)?,
            user_instructions: self.user_instructions,
            profile: self.profile_json.as_deref().map(from_json).transpose()?,
            created_at: timestamp(&self.created_at)?,
        })
    }
}

struct ModuleRow {
    id: String,
    course_id: String,
    plan_id: String,
    position: u32,
    title: String,
    description: String,
    learning_objectives_json: String,
    estimated_duration: u32,
    dependencies_json: String,
    created_at: String,
}

impl ModuleRow {
    fn into_record(self) -> Result<ModuleRecord, StoreError> {
        Ok(ModuleRecord {
            id: self.id,
            course_id: self.course_id,
            plan_id: self.plan_id,
            position: self.position,
            title: self.title,
            description: self.description,
            learning_objectives: from_json(&self.learning_objectives_json)?,
            estimated_duration: self.estimated_duration,
            dependencies: from_json(&self.dependencies_json)?,
            created_at: timestamp(&self.created_at)?,
        })
    }
}

struct LessonRow {
    id: String,
    module_id: String,
    position: u32,
    title: String,
    lesson_type: String,
    key_concepts_json: String,
    difficulty: String,
    content_markdown: Option<String>,
    code_examples_json: String,
    interactive_elements_json: String,
    practice_tasks_json: String,
    estimated_duration: Option<u32>,
}

impl LessonRow {
    fn into_record(self) -> Result<LessonRecord, StoreError> {
        Ok(LessonRecord {
            id: self.id,
            module_id: self.module_id,
            position: self.position,
            title: self.title,
            lesson_type: LessonType::from(self.lesson_type.as_str()),
            key_concepts: from_json(&self.key_concepts_json)?,
            difficulty: self.difficulty,
            content_markdown: self.content_markdown,
            code_examples: from_json(&self.code_examples_json)?,
            interactive_elements: from_json(&self.interactive_elements_json)?,
            practice_tasks: from_json(&self.practice_tasks_json)?,
            estimated_duration: self.estimated_duration,
        })
    }
}
