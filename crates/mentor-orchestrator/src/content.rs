//! Lesson content generation.
//!
//! The [`ContentGenerator`] walks a module's lesson outlines in order and asks
//! the model for each lesson's body. The reply is used verbatim as markdown;
//! fenced code blocks are additionally lifted into [`CodeExample`]s and the
//! lesson duration is estimated from the word count.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, warn};

use crate::course::{
    CodeExample, CourseContext, LearnerProfile, LessonContent, LessonOutline, LessonType,
    ModuleContent, ModuleOutline,
};
use crate::error::{MentorError, Result};
use crate::llm::LanguageModel;
use crate::prompts::lesson_prompt;

/// Languages learners can run directly from a lesson.
const RUNNABLE_LANGUAGES: &[&str] = &[
    "bash",
    "c",
    "cpp",
    "go",
    "java",
    "javascript",
    "js",
    "python",
    "py",
    "ruby",
    "rust",
    "sh",
    "shell",
    "sql",
    "typescript",
    "ts",
];

/// Fenced code block: info-string language in group 1, body in group 2.
#[allow(clippy::expect_used)]
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)^[ \t]*```")
        .expect("code block pattern is valid")
});

/// Generates lesson content for an expanded module, one model call per lesson.
#[derive(Clone)]
pub struct ContentGenerator {
    model: Arc<dyn LanguageModel>,
}

impl std::fmt::Debug for ContentGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGenerator").finish_non_exhaustive()
    }
}

impl ContentGenerator {
    /// Creates a generator backed by `model`.
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Generates content for every lesson outline of `module`.
    ///
    /// # Errors
    ///
    /// - `InvalidModule` if the module has no lesson outlines (no model call)
    /// - `ContentGeneration` naming the first lesson that failed
    pub async fn generate(
        &self,
        module: &ModuleOutline,
        context: &CourseContext,
        profile: Option<&LearnerProfile>,
    ) -> Result<ModuleContent> {
        self.generate_with(module, context, profile, |_| {}).await
    }

    /// Like [`generate`](Self::generate), calling `on_lesson` after each
    /// lesson completes.
    pub async fn generate_with<F>(
        &self,
        module: &ModuleOutline,
        context: &CourseContext,
        profile: Option<&LearnerProfile>,
        mut on_lesson: F,
    ) -> Result<ModuleContent>
    where
        F: FnMut(&LessonContent) + Send,
    {
        let outlines = module.lesson_outlines();
        if outlines.is_empty() {
            return Err(MentorError::invalid_module(
                &module.id,
                "module has no lesson outlines",
            ));
        }

        let mut lessons = Vec::with_capacity(outlines.len());
        for outline in outlines {
            let lesson = self
                .generate_lesson(outline, context, profile)
                .await
                .map_err(|e| {
                    warn!(lesson_id = %outline.id, error = %e, "Lesson generation failed");
                    MentorError::content_generation(&outline.id, e)
                })?;
            on_lesson(&lesson);
            lessons.push(lesson);
        }

        info!(
            module_id = %module.id,
            lessons = lessons.len(),
            "Generated module content"
        );

        Ok(ModuleContent {
            module_id: module.id.clone(),
            title: module.title.clone(),
            description: module.description.clone(),
            learning_objectives: module.learning_objectives.clone(),
            estimated_duration: module.estimated_duration,
            lessons,
            module_assessment: None,
        })
    }

    async fn generate_lesson(
        &self,
        outline: &LessonOutline,
        context: &CourseContext,
        profile: Option<&LearnerProfile>,
    ) -> Result<LessonContent> {
        let prompt = lesson_prompt(outline, context, profile);
        debug!(lesson_id = %outline.id, prompt_len = prompt.len(), "Requesting lesson content");

        let markdown = self.model.invoke(&prompt).await?;
        let duration = estimate_duration(&markdown, &outline.lesson_type);
        let code_examples = extract_code_examples(&markdown);

        debug!(
            lesson_id = %outline.id,
            reply_len = markdown.len(),
            duration_minutes = duration,
            code_examples = code_examples.len(),
            "Received lesson content"
        );

        let mut lesson = LessonContent::from_outline(outline, markdown, duration);
        lesson.code_examples = code_examples;
        Ok(lesson)
    }
}

/// Estimates lesson duration in minutes from its word count.
///
/// | Type | Words per minute | Floor |
/// |------|------------------|-------|
/// | theory | 15 | 20 |
/// | practice | 10 | 30 |
/// | assessment | 20 | 15 |
/// | other | 15 | 20 |
#[must_use]
pub fn estimate_duration(markdown: &str, lesson_type: &LessonType) -> u32 {
    let words = u32::try_from(markdown.split_whitespace().count()).unwrap_or(u32::MAX);
    let (floor, words_per_minute) = match lesson_type {
        LessonType::Theory | LessonType::Other(_) => (20, 15),
        LessonType::Practice => (30, 10),
        LessonType::Assessment => (15, 20),
    };
    (words / words_per_minute).max(floor)
}

/// Lifts fenced code blocks out of lesson markdown.
///
/// The explanation is the paragraph directly above the block. Blocks without
/// a language tag are recorded as `"text"` and are never runnable.
#[must_use]
pub fn extract_code_examples(markdown: &str) -> Vec<CodeExample> {
    CODE_BLOCK
        .captures_iter(markdown)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let language = cap.get(1).map_or("", |m| m.as_str()).to_lowercase();
            let code = cap.get(2).map_or("", |m| m.as_str()).trim_end().to_string();
            let language = if language.is_empty() {
                "text".to_string()
            } else {
                language
            };
            let is_runnable = RUNNABLE_LANGUAGES.contains(&language.as_str());

            Some(CodeExample {
                explanation: preceding_paragraph(&markdown[..whole.start()]),
                language,
                code,
                is_runnable,
            })
        })
        .collect()
}

fn preceding_paragraph(before: &str) -> String {
    before
        .trim_end()
        .rsplit("\n\n")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}
