//! The pipeline orchestrator.
//!
//! [`MentorService`] ties the generation stages to the persistence gateway:
//!
//! ```text
//! topic ──► syllabus ──► save plan ──► course id
//!
//! course id + module id ──► load ──► expand ──► generate lessons ──► save content
//! ```
//!
//! Every stage runs strictly after the previous one, and lessons are
//! generated one at a time in outline order. A failure anywhere aborts the
//! call; nothing is persisted for a failed run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ExpansionPolicy;
use crate::content::ContentGenerator;
use crate::course::{CoursePlan, LearnerProfile, ModuleContent, ModuleOutline};
use crate::error::{MentorError, Result};
use crate::events::{EventBroadcaster, GenerationEvent};
use crate::expander::ModuleExpander;
use crate::llm::LanguageModel;
use crate::repository::{CourseRecord, CourseRepository, LessonRecord, ModuleRecord};
use crate::syllabus::SyllabusGenerator;

/// Completion summary for a stored course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    /// Modules whose lessons have all been generated.
    pub completed_modules: usize,
    /// Modules in the course.
    pub total_modules: usize,
    /// `completed_modules` as a whole percentage of `total_modules`.
    pub completion_percentage: u32,
}

impl CourseProgress {
    /// Progress for `completed_modules` out of `total_modules`.
    #[must_use]
    pub fn from_counts(completed_modules: usize, total_modules: usize) -> Self {
        let completion_percentage = if total_modules == 0 {
            0
        } else {
            u32::try_from(completed_modules * 100 / total_modules).unwrap_or(100)
        };
        Self {
            completed_modules,
            total_modules,
            completion_percentage,
        }
    }
}

/// A stored course with its modules and any lesson outlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDetail {
    /// Course id.
    pub id: String,
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
    /// Modules in plan order, keyed by persisted id.
    pub modules: Vec<ModuleOutline>,
    /// When the course was stored.
    pub created_at: DateTime<Utc>,
    /// Generation progress.
    pub progress: CourseProgress,
}

/// Orchestrates syllabus and module generation against a repository.
#[derive(Clone)]
pub struct MentorService {
    syllabus: SyllabusGenerator,
    expander: ModuleExpander,
    content: ContentGenerator,
    repository: Arc<dyn CourseRepository>,
    events: EventBroadcaster,
}

impl std::fmt::Debug for MentorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentorService")
            .field("expansion_policy", &self.expander.policy())
            .finish_non_exhaustive()
    }
}

impl MentorService {
    /// Creates a service using one model for every stage.
    #[must_use]
    pub fn new(
        model: Arc<dyn LanguageModel>,
        repository: Arc<dyn CourseRepository>,
        policy: ExpansionPolicy,
    ) -> Self {
        Self {
            syllabus: SyllabusGenerator::new(Arc::clone(&model)),
            expander: ModuleExpander::new(Arc::clone(&model), policy),
            content: ContentGenerator::new(model),
            repository,
            events: EventBroadcaster::default(),
        }
    }

    /// Publishes progress through `events` instead of a private broadcaster.
    #[must_use]
    pub fn with_events(mut self, events: EventBroadcaster) -> Self {
        self.events = events;
        self
    }

    /// The broadcaster progress events are published on.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// The persistence gateway.
    #[must_use]
    pub fn repository(&self) -> Arc<dyn CourseRepository> {
        Arc::clone(&self.repository)
    }

    /// Generates a syllabus for `topic` and stores it.
    ///
    /// Returns the plan as generated together with the new course id.
    pub async fn create_syllabus(
        &self,
        topic: &str,
        instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<(CoursePlan, String)> {
        let result = self.run_syllabus(topic, instructions, profile).await;
        self.report_failure(result)
    }

    async fn run_syllabus(
        &self,
        topic: &str,
        instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<(CoursePlan, String)> {
        let plan = self.syllabus.generate(topic, instructions, profile).await?;

        let course_id = {
            let plan = plan.clone();
            let topic = topic.trim().to_string();
            let instructions = instructions.map(ToString::to_string);
            let profile = profile.cloned();
            self.with_repository(move |repo| {
                repo.save_course_plan(&plan, &topic, instructions.as_deref(), profile.as_ref())
            })
            .await?
        };

        info!(course_id = %course_id, modules = plan.modules.len(), "Stored course plan");
        self.events.send(GenerationEvent::syllabus_generated(
            &course_id,
            &plan.course_title,
            plan.modules.len(),
        ));
        Ok((plan, course_id))
    }

    /// Expands one stored module and generates its lessons, then stores the
    /// result.
    ///
    /// When `profile` is `None` the profile stored with the course is used.
    /// Returns the generated content and the id it was stored under.
    ///
    /// # Errors
    ///
    /// `NotFound` if the course is missing or the module is missing from it,
    /// otherwise any expansion, generation or storage error.
    pub async fn create_module_content(
        &self,
        course_id: &str,
        module_id: &str,
        profile: Option<&LearnerProfile>,
    ) -> Result<(ModuleContent, String)> {
        let result = self.run_module(course_id, module_id, profile).await;
        self.report_failure(result)
    }

    async fn run_module(
        &self,
        course_id: &str,
        module_id: &str,
        profile: Option<&LearnerProfile>,
    ) -> Result<(ModuleContent, String)> {
        let (course, module, stored_lessons) = {
            let course_id = course_id.to_string();
            let module_id = module_id.to_string();
            self.with_repository(move |repo| {
                let course = repo
                    .get_course(&course_id)?
                    .ok_or_else(|| MentorError::course_not_found(&course_id))?;
                let module = repo
                    .get_module(&module_id)?
                    .filter(|m| m.course_id == course_id)
                    .ok_or_else(|| MentorError::module_not_found(&module_id))?;
                let lessons = repo.get_lessons_by_module(&module_id)?;
                Ok((course, module, lessons))
            })
            .await?
        };

        let context = course.context();
        let profile = profile.or(course.profile.as_ref());
        let outline = module.outline(stored_lessons.iter().map(LessonRecord::outline).collect());

        let expanded = self.expander.expand(outline, &context).await?;
        self.events.send(GenerationEvent::module_expanded(
            course_id,
            module_id,
            expanded.lesson_outlines().len(),
        ));

        let events = self.events.clone();
        let content = self
            .content
            .generate_with(&expanded, &context, profile, |lesson| {
                events.send(GenerationEvent::lesson_generated(
                    module_id,
                    &lesson.id,
                    &lesson.title,
                    lesson.estimated_duration,
                ));
            })
            .await?;

        let stored_id = {
            let content = content.clone();
            let course_id = course_id.to_string();
            let module_id = module_id.to_string();
            self.with_repository(move |repo| {
                repo.save_module_content(&course_id, &module_id, &content)
            })
            .await?
        };

        info!(
            course_id,
            module_id = %stored_id,
            lessons = content.lessons.len(),
            "Stored module content"
        );
        self.events.send(GenerationEvent::module_completed(
            course_id,
            &stored_id,
            content.lessons.len(),
            content.total_lesson_minutes(),
        ));
        Ok((content, stored_id))
    }

    /// Loads a course with its modules, lesson outlines and progress.
    pub async fn course_detail(&self, course_id: &str) -> Result<CourseDetail> {
        let course_id = course_id.to_string();
        self.with_repository(move |repo| {
            let course = repo
                .get_course(&course_id)?
                .ok_or_else(|| MentorError::course_not_found(&course_id))?;
            let modules = repo.get_modules_by_course(&course_id)?;

            let mut outlines = Vec::with_capacity(modules.len());
            let mut completed = 0;
            for module in &modules {
                let lessons = repo.get_lessons_by_module(&module.id)?;
                if !lessons.is_empty() && lessons.iter().all(LessonRecord::is_generated) {
                    completed += 1;
                }
                outlines.push(module.outline(lessons.iter().map(LessonRecord::outline).collect()));
            }

            Ok(course_detail(course, outlines, completed))
        })
        .await
    }

    /// Loads a module with its stored lessons.
    pub async fn stored_module(&self, module_id: &str) -> Result<ModuleContent> {
        let module_id = module_id.to_string();
        self.with_repository(move |repo| {
            let module = repo
                .get_module(&module_id)?
                .ok_or_else(|| MentorError::module_not_found(&module_id))?;
            let lessons = repo.get_lessons_by_module(&module_id)?;
            Ok(stored_module(module, &lessons))
        })
        .await
    }

    /// Runs a repository call on the blocking thread pool.
    async fn with_repository<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn CourseRepository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = Arc::clone(&self.repository);
        tokio::task::spawn_blocking(move || f(repo.as_ref()))
            .await
            .map_err(|e| MentorError::storage(format!("storage task failed: {e}")))?
    }

    fn report_failure<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                error!(error = %e, "Pipeline run failed");
            } else {
                warn!(error = %e, transient = e.is_transient(), "Pipeline run failed");
            }
            self.events.send(GenerationEvent::error(e.to_string()));
        }
        result
    }
}

fn course_detail(course: CourseRecord, modules: Vec<ModuleOutline>, completed: usize) -> CourseDetail {
    let progress = CourseProgress::from_counts(completed, modules.len());
    CourseDetail {
        id: course.id,
        topic: course.topic,
        course_title: course.course_title,
        estimated_duration: course.estimated_duration,
        difficulty_level: course.difficulty_level,
        prerequisites: course.prerequisites,
        modules,
        created_at: course.created_at,
        progress,
    }
}

fn stored_module(module: ModuleRecord, lessons: &[LessonRecord]) -> ModuleContent {
    ModuleContent {
        module_id: module.id,
        title: module.title,
        description: module.description,
        learning_objectives: module.learning_objectives,
        estimated_duration: module.estimated_duration,
        lessons: lessons.iter().map(LessonRecord::content).collect(),
        module_assessment: None,
    }
}
