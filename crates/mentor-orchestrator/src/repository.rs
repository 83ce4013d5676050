//! Persistence gateway for courses, modules and lessons.
//!
//! [`CourseRepository`] is the seam between the pipeline and storage. The
//! SQLite adapter lives in the `mentor-store` crate; [`MemoryRepository`] is
//! kept here for tests and ephemeral runs.
//!
//! Module ids in a generated plan are only unique within that plan, so every
//! persisted module gets a fresh id from an [`IdGenerator`] and dependency
//! lists are rewritten to those ids when the plan is saved. Lessons keep their
//! outline id and are keyed by `(module_id, id)`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::course::{
    CodeExample, CourseContext, CoursePlan, InteractiveElement, LearnerProfile, LessonContent,
    LessonOutline, LessonType, ModuleContent, ModuleOutline, PracticeTask,
};
use crate::error::{MentorError, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Source of identifiers for persisted records.
pub trait IdGenerator: Send + Sync {
    /// Returns a new identifier, never returned before by this generator.
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Predictable identifiers `"{prefix}-1"`, `"{prefix}-2"`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator whose ids start with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}

// ============================================================================
// Records
// ============================================================================

/// A persisted course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Generated identifier.
    pub id: String,
    /// Topic the course was requested for.
    pub topic: String,
    /// Course title from the plan.
    pub course_title: String,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Difficulty label.
    pub difficulty_level: String,
    /// Prerequisites from the plan.
    pub prerequisites: Vec<String>,
    /// Instructions given at creation.
    pub user_instructions: Option<String>,
    /// Learner profile given at creation.
    pub profile: Option<LearnerProfile>,
    /// When the course was stored.
    pub created_at: DateTime<Utc>,
}

impl CourseRecord {
    /// Course-level context for expansion and content prompts.
    ///
    /// The topic the course was requested for serves as its domain.
    #[must_use]
    pub fn context(&self) -> CourseContext {
        CourseContext {
            course_title: self.course_title.clone(),
            difficulty_level: self.difficulty_level.clone(),
            topic_domain: self.topic.clone(),
            user_instructions: self.user_instructions.clone(),
        }
    }
}

/// A persisted module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Generated identifier.
    pub id: String,
    /// Owning course.
    pub course_id: String,
    /// The id the module had inside its generated plan.
    pub plan_id: String,
    /// Zero-based position within the course.
    pub position: u32,
    /// Module title.
    pub title: String,
    /// Module description.
    pub description: String,
    /// Learning objectives.
    pub learning_objectives: Vec<String>,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Generated ids of the modules this one depends on.
    pub dependencies: Vec<String>,
    /// When the module was stored.
    pub created_at: DateTime<Utc>,
}

impl ModuleRecord {
    /// Rebuilds the module outline, keyed by the persisted id.
    #[must_use]
    pub fn outline(&self, lessons: Vec<LessonOutline>) -> ModuleOutline {
        ModuleOutline {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            learning_objectives: self.learning_objectives.clone(),
            estimated_duration: self.estimated_duration,
            dependencies: self.dependencies.clone(),
            lessons: (!lessons.is_empty()).then_some(lessons),
        }
    }
}

/// A persisted lesson, either an outline or generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonRecord {
    /// Outline identifier, unique within the module.
    pub id: String,
    /// Owning module.
    pub module_id: String,
    /// Zero-based position within the module.
    pub position: u32,
    /// Lesson title.
    pub title: String,
    /// Lesson type.
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    /// Concepts covered.
    pub key_concepts: Vec<String>,
    /// Difficulty label.
    pub difficulty: String,
    /// Generated body, absent for outline-only lessons.
    pub content_markdown: Option<String>,
    /// Extracted code samples.
    pub code_examples: Vec<CodeExample>,
    /// Interactive widgets.
    pub interactive_elements: Vec<InteractiveElement>,
    /// Hands-on exercises.
    pub practice_tasks: Vec<PracticeTask>,
    /// Estimated minutes, absent for outline-only lessons.
    pub estimated_duration: Option<u32>,
}

impl LessonRecord {
    /// Record for a lesson that has only been outlined.
    #[must_use]
    pub fn from_outline(module_id: &str, position: u32, outline: &LessonOutline) -> Self {
        Self {
            id: outline.id.clone(),
            module_id: module_id.to_string(),
            position,
            title: outline.title.clone(),
            lesson_type: outline.lesson_type.clone(),
            key_concepts: outline.key_concepts.clone(),
            difficulty: outline.difficulty.clone(),
            content_markdown: None,
            code_examples: Vec::new(),
            interactive_elements: Vec::new(),
            practice_tasks: Vec::new(),
            estimated_duration: None,
        }
    }

    /// Record for a generated lesson.
    #[must_use]
    pub fn from_content(module_id: &str, position: u32, lesson: &LessonContent) -> Self {
        Self {
            id: lesson.id.clone(),
            module_id: module_id.to_string(),
            position,
            title: lesson.title.clone(),
            lesson_type: lesson.lesson_type.clone(),
            key_concepts: lesson.key_concepts.clone(),
            difficulty: lesson.difficulty.clone(),
            content_markdown: Some(lesson.content_markdown.clone()),
            code_examples: lesson.code_examples.clone(),
            interactive_elements: lesson.interactive_elements.clone(),
            practice_tasks: lesson.practice_tasks.clone(),
            estimated_duration: Some(lesson.estimated_duration),
        }
    }

    /// The outline part of the record.
    #[must_use]
    pub fn outline(&self) -> LessonOutline {
        LessonOutline {
            id: self.id.clone(),
            title: self.title.clone(),
            lesson_type: self.lesson_type.clone(),
            key_concepts: self.key_concepts.clone(),
            difficulty: self.difficulty.clone(),
        }
    }

    /// Returns `true` once content has been generated for the lesson.
    #[must_use]
    pub const fn is_generated(&self) -> bool {
        self.content_markdown.is_some()
    }

    /// The lesson as content; outline-only lessons have an empty body.
    #[must_use]
    pub fn content(&self) -> LessonContent {
        LessonContent {
            id: self.id.clone(),
            title: self.title.clone(),
            lesson_type: self.lesson_type.clone(),
            content_markdown: self.content_markdown.clone().unwrap_or_default(),
            key_concepts: self.key_concepts.clone(),
            difficulty: self.difficulty.clone(),
            code_examples: self.code_examples.clone(),
            interactive_elements: self.interactive_elements.clone(),
            practice_tasks: self.practice_tasks.clone(),
            estimated_duration: self.estimated_duration.unwrap_or_default(),
        }
    }
}

/// Builds module and lesson records for a newly saved plan.
///
/// Every module receives an id from `ids`; dependency lists are rewritten
/// from plan-local ids to those generated ids. Dependencies that do not
/// resolve are dropped.
#[must_use]
pub fn plan_records(
    course_id: &str,
    plan: &CoursePlan,
    ids: &dyn IdGenerator,
    created_at: DateTime<Utc>,
) -> (Vec<ModuleRecord>, Vec<LessonRecord>) {
    let assigned: HashMap<&str, String> = plan
        .modules
        .iter()
        .map(|m| (m.id.as_str(), ids.next_id()))
        .collect();

    let mut modules = Vec::with_capacity(plan.modules.len());
    let mut lessons = Vec::new();

    for (position, module) in (0u32..).zip(&plan.modules) {
        let Some(id) = assigned.get(module.id.as_str()) else {
            continue;
        };
        for (lesson_position, outline) in (0u32..).zip(module.lesson_outlines()) {
            lessons.push(LessonRecord::from_outline(id, lesson_position, outline));
        }
        modules.push(ModuleRecord {
            id: id.clone(),
            course_id: course_id.to_string(),
            plan_id: module.id.clone(),
            position,
            title: module.title.clone(),
            description: module.description.clone(),
            learning_objectives: module.learning_objectives.clone(),
            estimated_duration: module.estimated_duration,
            dependencies: module
                .dependencies
                .iter()
                .filter_map(|dep| assigned.get(dep.as_str()).cloned())
                .collect(),
            created_at,
        });
    }

    (modules, lessons)
}

// ============================================================================
// Gateway
// ============================================================================

/// Storage for courses, modules and lessons.
///
/// Each call is atomic on its own; nothing spans multiple calls.
pub trait CourseRepository: Send + Sync {
    /// Stores a generated plan with its modules (and any lesson outlines it
    /// carries). Returns the new course id.
    fn save_course_plan(
        &self,
        plan: &CoursePlan,
        topic: &str,
        user_instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<String>;

    /// Looks up a course.
    fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>>;

    /// Modules of a course in plan order.
    fn get_modules_by_course(&self, course_id: &str) -> Result<Vec<ModuleRecord>>;

    /// Looks up a module by its persisted id.
    fn get_module(&self, module_id: &str) -> Result<Option<ModuleRecord>>;

    /// Replaces the lessons of a module with generated content. Returns the
    /// module id.
    ///
    /// Fails with `NotFound` if the module does not exist in the course.
    fn save_module_content(
        &self,
        course_id: &str,
        module_id: &str,
        content: &ModuleContent,
    ) -> Result<String>;

    /// Lessons of a module in order.
    fn get_lessons_by_module(&self, module_id: &str) -> Result<Vec<LessonRecord>>;
}

// ============================================================================
// In-memory adapter
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    courses: Vec<CourseRecord>,
    modules: Vec<ModuleRecord>,
    lessons: Vec<LessonRecord>,
}

/// A [`CourseRepository`] held entirely in memory.
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    ids: Box<dyn IdGenerator>,
}

impl std::fmt::Debug for MemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRepository").finish_non_exhaustive()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Creates an empty repository issuing UUID identifiers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ids(Box::new(UuidIds))
    }

    /// Creates an empty repository issuing identifiers from `ids`.
    #[must_use]
    pub fn with_ids(ids: Box<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            ids,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CourseRepository for MemoryRepository {
    fn save_course_plan(
        &self,
        plan: &CoursePlan,
        topic: &str,
        user_instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<String> {
        let now = Utc::now();
        let course_id = self.ids.next_id();
        let (modules, lessons) = plan_records(&course_id, plan, self.ids.as_ref(), now);

        let mut state = self.state();
        state.courses.push(CourseRecord {
            id: course_id.clone(),
            topic: topic.to_string(),
            course_title: plan.course_title.clone(),
            estimated_duration: plan.estimated_duration,
            difficulty_level: plan.difficulty_level.clone(),
            prerequisites: plan.prerequisites.clone(),
            user_instructions: user_instructions.map(ToString::to_string),
            profile: profile.cloned(),
            created_at: now,
        });
        state.modules.extend(modules);
        state.lessons.extend(lessons);

        Ok(course_id)
    }

    fn get_course(&self, course_id: &str) -> Result<Option<CourseRecord>> {
        Ok(self
            .state()
            .courses
            .iter()
            .find(|c| c.id == course_id)
            .cloned())
    }

    fn get_modules_by_course(&self, course_id: &str) -> Result<Vec<ModuleRecord>> {
        let mut modules: Vec<_> = self
            .state()
            .modules
            .iter()
            .filter(|m| m.course_id == course_id)
            .cloned()
            .collect();
        modules.sort_by_key(|m| m.position);
        Ok(modules)
    }

    fn get_module(&self, module_id: &str) -> Result<Option<ModuleRecord>> {
        Ok(self
            .state()
            .modules
            .iter()
            .find(|m| m.id == module_id)
            .cloned())
    }

    fn save_module_content(
        &self,
        course_id: &str,
        module_id: &str,
        content: &ModuleContent,
    ) -> Result<String> {
        let mut state = self.state();
        if !state
            .modules
            .iter()
            .any(|m| m.id == module_id && m.course_id == course_id)
        {
            return Err(MentorError::module_not_found(module_id));
        }

        state.lessons.retain(|l| l.module_id != module_id);
        state.lessons.extend(
            (0u32..)
                .zip(&content.lessons)
                .map(|(position, lesson)| LessonRecord::from_content(module_id, position, lesson)),
        );

        Ok(module_id.to_string())
    }

    fn get_lessons_by_module(&self, module_id: &str) -> Result<Vec<LessonRecord>> {
        let mut lessons: Vec<_> = self
            .state()
            .lessons
            .iter()
            .filter(|l| l.module_id == module_id)
            .cloned()
            .collect();
        lessons.sort_by_key(|l| l.position);
        Ok(lessons)
    }
}
