//! Module structure expansion: one module outline in, lesson outlines out.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ExpansionPolicy;
use crate::course::{CourseContext, LessonOutline, ModuleOutline};
use crate::error::{GenerationStage, MentorError, Result};
use crate::llm::LanguageModel;
use crate::prompts::module_structure_prompt;
use crate::reply;

#[derive(Debug, Deserialize)]
struct LessonPlan {
    lessons: Vec<LessonOutline>,
}

/// Expands a module into lesson outlines with a single model call.
#[derive(Clone)]
pub struct ModuleExpander {
    model: Arc<dyn LanguageModel>,
    policy: ExpansionPolicy,
}

impl std::fmt::Debug for ModuleExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleExpander")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ModuleExpander {
    /// Creates an expander backed by `model` that applies `policy` to modules
    /// which already have lessons.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>, policy: ExpansionPolicy) -> Self {
        Self { model, policy }
    }

    /// The policy applied to already-expanded modules.
    #[must_use]
    pub const fn policy(&self) -> ExpansionPolicy {
        self.policy
    }

    /// Returns `module` with its lesson outlines populated.
    ///
    /// Under [`ExpansionPolicy::SkipExisting`] a module that already has
    /// lessons is returned unchanged and the model is not called. Under
    /// [`ExpansionPolicy::Regenerate`] the model is always called and its
    /// lessons replace any existing ones.
    ///
    /// # Errors
    ///
    /// - Any model error, unchanged
    /// - `GenerationParse` with the raw reply if the reply is not an object
    ///   with a non-empty `lessons` list of unique ids and known types
    pub async fn expand(
        &self,
        mut module: ModuleOutline,
        context: &CourseContext,
    ) -> Result<ModuleOutline> {
        if self.policy == ExpansionPolicy::SkipExisting && module.has_lessons() {
            debug!(module_id = %module.id, "Module already expanded, skipping");
            return Ok(module);
        }

        let prompt = module_structure_prompt(&module, context);
        debug!(module_id = %module.id, prompt_len = prompt.len(), "Requesting module structure");

        let raw = self.model.invoke(&prompt).await?;
        let lessons = parse_lessons(&raw)?;

        info!(
            module_id = %module.id,
            lessons = lessons.len(),
            "Expanded module into lesson outlines"
        );
        module.lessons = Some(lessons);
        Ok(module)
    }
}

/// Decodes and validates a module structure reply.
///
/// # Errors
///
/// Returns `GenerationParse` carrying `raw` on any decode or structure failure.
pub fn parse_lessons(raw: &str) -> Result<Vec<LessonOutline>> {
    let plan: LessonPlan = reply::decode(GenerationStage::ModuleStructure, raw)?;
    let reject =
        |message: String| MentorError::generation_parse(GenerationStage::ModuleStructure, message, raw);

    if plan.lessons.is_empty() {
        return Err(reject("reply contained no lessons".to_string()));
    }

    let mut seen = HashSet::new();
    for lesson in &plan.lessons {
        if !lesson.lesson_type.is_known() {
            return Err(reject(format!(
                "lesson '{}' has unknown type '{}'",
                lesson.id, lesson.lesson_type
            )));
        }
        if !seen.insert(lesson.id.as_str()) {
            return Err(reject(format!("duplicate lesson id '{}'", lesson.id)));
        }
    }

    Ok(plan.lessons)
}
