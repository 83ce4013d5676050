//! Mentor Course Export
//!
//! Renders a stored course and whatever lesson content has been generated for
//! it. A [`CourseReport`] is loaded from any
//! [`CourseRepository`](mentor_orchestrator::CourseRepository) and can be
//! written as Markdown for reading or as JSON for other tools.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - A single Markdown document
//!
//! # Example
//!
//! ```rust,no_run
//! use mentor_orchestrator::MemoryRepository;
//! use mentor_report::{CourseReport, MarkdownGenerator};
//!
//! let repo = MemoryRepository::new();
//! let report = CourseReport::load(&repo, "course-id").unwrap();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mentor_orchestrator::{
    CourseProgress, CourseRecord, CourseRepository, LessonContent, LessonRecord, MentorError,
    ModuleRecord,
};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while exporting a course.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The course could not be read from storage.
    #[error("failed to load course: {0}")]
    Load(#[from] MentorError),

    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write the report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Report
// ============================================================================

/// A stored course with its modules and lessons, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseReport {
    /// Course id.
    pub course_id: String,
    /// Topic the course was requested for.
    pub topic: String,
    /// Course title.
    pub course_title: String,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Difficulty label.
    pub difficulty_level: String,
    /// Prerequisites.
    pub prerequisites: Vec<String>,
    /// Modules in plan order.
    pub modules: Vec<ModuleSection>,
    /// Generation progress.
    pub progress: CourseProgress,
    /// When the course was stored.
    pub created_at: DateTime<Utc>,
}

/// One module of a [`CourseReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSection {
    /// Persisted module id.
    pub id: String,
    /// Module title.
    pub title: String,
    /// Module description.
    pub description: String,
    /// Learning objectives.
    pub learning_objectives: Vec<String>,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Titles of the modules this one depends on.
    pub depends_on: Vec<String>,
    /// Lessons in order; outline-only lessons have an empty body.
    pub lessons: Vec<LessonContent>,
    /// `true` once every lesson has generated content.
    pub generated: bool,
}

impl ModuleSection {
    fn from_records(module: ModuleRecord, lessons: &[LessonRecord], all: &[ModuleRecord]) -> Self {
        let depends_on = module
            .dependencies
            .iter()
            .filter_map(|dep| all.iter().find(|m| &m.id == dep))
            .map(|m| m.title.clone())
            .collect();

        Self {
            generated: !lessons.is_empty() && lessons.iter().all(LessonRecord::is_generated),
            lessons: lessons.iter().map(LessonRecord::content).collect(),
            id: module.id,
            title: module.title,
            description: module.description,
            learning_objectives: module.learning_objectives,
            estimated_duration: module.estimated_duration,
            depends_on,
        }
    }

    /// Sum of the lesson estimates in minutes.
    #[must_use]
    pub fn lesson_minutes(&self) -> u32 {
        self.lessons.iter().map(|l| l.estimated_duration).sum()
    }
}

impl CourseReport {
    /// Loads a course and all of its modules and lessons.
    ///
    /// # Errors
    ///
    /// [`ReportError::Load`] wrapping `NotFound` if the course does not
    /// exist, or any storage error.
    pub fn load(repository: &dyn CourseRepository, course_id: &str) -> Result<Self> {
        let course = repository
            .get_course(course_id)?
            .ok_or_else(|| MentorError::course_not_found(course_id))?;
        let modules = repository.get_modules_by_course(course_id)?;

        let mut sections = Vec::with_capacity(modules.len());
        for module in &modules {
            let lessons = repository.get_lessons_by_module(&module.id)?;
            sections.push(ModuleSection::from_records(
                module.clone(),
                &lessons,
                &modules,
            ));
        }

        Ok(Self::from_parts(course, sections))
    }

    /// Assembles a report from an already loaded course.
    #[must_use]
    pub fn from_parts(course: CourseRecord, modules: Vec<ModuleSection>) -> Self {
        let completed = modules.iter().filter(|m| m.generated).count();
        Self {
            progress: CourseProgress::from_counts(completed, modules.len()),
            course_id: course.id,
            topic: course.topic,
            course_title: course.course_title,
            estimated_duration: course.estimated_duration,
            difficulty_level: course.difficulty_level,
            prerequisites: course.prerequisites,
            modules,
            created_at: course.created_at,
        }
    }

    /// Number of lessons across all modules.
    #[must_use]
    pub fn lesson_count(&self) -> usize {
        self.modules.iter().map(|m| m.lessons.len()).sum()
    }

    /// Number of lessons with generated content.
    #[must_use]
    pub fn generated_lesson_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.lessons)
            .filter(|l| !l.content_markdown.is_empty())
            .count()
    }

    /// Serializes the report to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        json::JsonGenerator::new(self).generate_pretty()
    }
}
