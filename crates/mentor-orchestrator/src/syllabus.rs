//! Syllabus generation: topic and learner profile in, validated course plan out.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::course::{CoursePlan, LearnerProfile};
use crate::error::{GenerationStage, MentorError, Result};
use crate::llm::LanguageModel;
use crate::prompts::{syllabus_prompt, NO_SPECIAL_INSTRUCTIONS};
use crate::reply;

/// Produces a [`CoursePlan`] for a topic with a single model call.
#[derive(Clone)]
pub struct SyllabusGenerator {
    model: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for SyllabusGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyllabusGenerator").finish_non_exhaustive()
    }
}

impl SyllabusGenerator {
    /// Creates a generator backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Generates a course plan.
    ///
    /// Missing profile fields fall back to [`LearnerProfile::default`] and
    /// missing instructions to "No special instructions". The reply must be
    /// one JSON object (optionally fenced) describing a plan whose module ids
    /// are unique and whose dependencies form a DAG over the plan.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the topic is blank (no model call is made)
    /// - Any model error, unchanged
    /// - `GenerationParse` with the raw reply if the reply is malformed
    pub async fn generate(
        &self,
        topic: &str,
        instructions: Option<&str>,
        profile: Option<&LearnerProfile>,
    ) -> Result<CoursePlan> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(MentorError::InvalidRequest("topic must not be empty".to_string()));
        }

        let default_profile = LearnerProfile::default();
        let profile = profile.unwrap_or(&default_profile);
        let instructions = instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(NO_SPECIAL_INSTRUCTIONS);

        let prompt = syllabus_prompt(topic, profile, instructions);
        debug!(topic, prompt_len = prompt.len(), "Requesting syllabus");

        let raw = self.model.invoke(&prompt).await?;
        debug!(reply_len = raw.len(), "Received syllabus reply");

        let plan = parse_plan(&raw)?;
        info!(
            topic,
            course_title = %plan.course_title,
            modules = plan.modules.len(),
            "Generated syllabus"
        );
        Ok(plan)
    }
}

/// Decodes and validates a syllabus reply.
///
/// # Errors
///
/// Returns `GenerationParse` carrying `raw` on any decode or structure failure.
pub fn parse_plan(raw: &str) -> Result<CoursePlan> {
    let plan: CoursePlan = reply::decode(GenerationStage::Syllabus, raw)?;

    let reject = |message: String| {
        warn!(%message, "Rejected syllabus reply");
        MentorError::generation_parse(GenerationStage::Syllabus, message, raw)
    };

    plan.validate().map_err(|v| reject(v.to_string()))?;

    // Modules may arrive with lessons already outlined; hold them to the same
    // rules as expansion replies.
    for module in &plan.modules {
        let mut seen = HashSet::new();
        for lesson in module.lesson_outlines() {
            if !lesson.lesson_type.is_known() {
                return Err(reject(format!(
                    "lesson '{}' in module '{}' has unknown type '{}'",
                    lesson.id, module.id, lesson.lesson_type
                )));
            }
            if !seen.insert(lesson.id.as_str()) {
                return Err(reject(format!(
                    "duplicate lesson id '{}' in module '{}'",
                    lesson.id, module.id
                )));
            }
        }
    }

    Ok(plan)
}
