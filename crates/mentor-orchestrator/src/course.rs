//! Course data model for the Mentor pipeline.
//!
//! This module defines the value types that flow between the pipeline
//! stages: the learner profile that parameterizes prompts, the course plan
//! produced by syllabus generation, lesson outlines produced by module
//! expansion, and the generated lesson and module content.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

// ============================================================================
// SkillLevel
// ============================================================================

/// Self-reported skill level of the learner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SkillLevel {
    /// New to the topic (default).
    #[default]
    Beginner,
    /// Comfortable with the basics.
    Intermediate,
    /// Experienced practitioner.
    Advanced,
}

impl SkillLevel {
    /// Parses a string into a `SkillLevel`, case-insensitively.
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(Self::Beginner),
            "intermediate" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            _ => None,
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SkillLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s).ok_or_else(|| {
            format!(
                "invalid skill level '{s}': expected one of 'beginner', 'intermediate', 'advanced'"
            )
        })
    }
}

impl<'de> Deserialize<'de> for SkillLevel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for SkillLevel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// LearnerProfile
// ============================================================================

/// Parameters describing the learner, used by both generation stages.
///
/// Constructed per request and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Self-reported skill level.
    pub skill_level: SkillLevel,
    /// Preferred learning style (e.g. "visual", "hands-on", "theoretical").
    pub learning_style: String,
    /// Weekly time budget in hours.
    pub time_commitment: u32,
    /// Related topics the learner already knows.
    #[serde(default)]
    pub prior_knowledge: Vec<String>,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self {
            skill_level: SkillLevel::Beginner,
            learning_style: "hands-on".to_string(),
            time_commitment: 5,
            prior_knowledge: Vec::new(),
        }
    }
}

impl LearnerProfile {
    /// Prior knowledge joined for prompt embedding, or `"None"` when empty.
    #[must_use]
    pub fn prior_knowledge_summary(&self) -> String {
        if self.prior_knowledge.is_empty() {
            "None".to_string()
        } else {
            self.prior_knowledge.join(", ")
        }
    }
}

// ============================================================================
// LessonType
// ============================================================================

/// The kind of lesson, which selects the content instruction template.
///
/// Model replies are only accepted with the three known types; `Other`
/// exists for outlines built by callers and falls back to a generic
/// instruction during content generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LessonType {
    /// Expository reading material.
    Theory,
    /// Hands-on exercises.
    Practice,
    /// Questions that check understanding.
    Assessment,
    /// Any other lesson type.
    Other(String),
}

impl LessonType {
    /// Returns the lowercase name used in prompts and storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Theory => "theory",
            Self::Practice => "practice",
            Self::Assessment => "assessment",
            Self::Other(name) => name,
        }
    }

    /// Returns `true` for the three lesson types the pipeline understands.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for LessonType {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "theory" => Self::Theory,
            "practice" => Self::Practice,
            "assessment" => Self::Assessment,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl std::fmt::Display for LessonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LessonType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

impl Serialize for LessonType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Course plan
// ============================================================================

/// A planned lesson before its content is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonOutline {
    /// Identifier, unique within the module.
    pub id: String,
    /// Lesson title.
    pub title: String,
    /// Lesson type.
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    /// Concepts the lesson must cover.
    pub key_concepts: Vec<String>,
    /// Difficulty label.
    pub difficulty: String,
}

/// One unit within a course plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutline {
    /// Identifier, unique within the course.
    pub id: String,
    /// Module title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// What the learner should be able to do afterwards.
    pub learning_objectives: Vec<String>,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Identifiers of modules in the same plan this module builds on.
    pub dependencies: Vec<String>,
    /// Lesson outlines, populated by module expansion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessons: Option<Vec<LessonOutline>>,
}

impl ModuleOutline {
    /// Returns `true` if the module already carries at least one lesson outline.
    #[must_use]
    pub fn has_lessons(&self) -> bool {
        self.lessons.as_ref().is_some_and(|l| !l.is_empty())
    }

    /// The lesson outlines, or an empty slice when none were generated.
    #[must_use]
    pub fn lesson_outlines(&self) -> &[LessonOutline] {
        self.lessons.as_deref().unwrap_or_default()
    }
}

/// The top-level syllabus produced for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoursePlan {
    /// Course title.
    pub course_title: String,
    /// Total estimated duration in hours.
    pub estimated_duration: u32,
    /// Difficulty label.
    pub difficulty_level: String,
    /// What the learner should know beforehand.
    pub prerequisites: Vec<String>,
    /// Ordered module list.
    pub modules: Vec<ModuleOutline>,
}

/// A structural defect in a course plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanViolation {
    /// The plan contains no modules.
    #[error("course plan has no modules")]
    NoModules,
    /// Two modules share an identifier.
    #[error("duplicate module id '{0}'")]
    DuplicateModuleId(String),
    /// A module depends on an identifier not present in the plan.
    #[error("module '{module}' depends on unknown module '{dependency}'")]
    UnknownDependency {
        /// The depending module.
        module: String,
        /// The missing dependency.
        dependency: String,
    },
    /// The dependency graph contains a cycle through these modules.
    #[error("module dependencies form a cycle involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

impl CoursePlan {
    /// Checks that module ids are unique and that dependencies form a DAG
    /// over the modules of this plan.
    pub fn validate(&self) -> std::result::Result<(), PlanViolation> {
        if self.modules.is_empty() {
            return Err(PlanViolation::NoModules);
        }

        let mut ids = HashSet::new();
        for module in &self.modules {
            if !ids.insert(module.id.as_str()) {
                return Err(PlanViolation::DuplicateModuleId(module.id.clone()));
            }
        }

        for module in &self.modules {
            if let Some(dependency) = module
                .dependencies
                .iter()
                .find(|dep| !ids.contains(dep.as_str()))
            {
                return Err(PlanViolation::UnknownDependency {
                    module: module.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let order = self.dependency_order();
        if order.len() < self.modules.len() {
            let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let cyclic = self
                .modules
                .iter()
                .filter(|m| !placed.contains(m.id.as_str()))
                .map(|m| m.id.clone())
                .collect();
            return Err(PlanViolation::DependencyCycle(cyclic));
        }

        Ok(())
    }

    /// Module ids in an order where every module follows its dependencies.
    ///
    /// Modules on a cycle are left out, so a result shorter than the module
    /// list means the graph is not acyclic. Unknown dependencies are ignored.
    #[must_use]
    pub fn dependency_order(&self) -> Vec<String> {
        let known: HashSet<&str> = self.modules.iter().map(|m| m.id.as_str()).collect();
        let mut remaining: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for module in &self.modules {
            let deps: HashSet<&str> = module
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|d| known.contains(d))
                .collect();
            remaining.insert(module.id.as_str(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(module.id.as_str());
            }
        }

        // Seed in plan order so the result is stable.
        let mut ready: VecDeque<&str> = self
            .modules
            .iter()
            .map(|m| m.id.as_str())
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(self.modules.len());

        while let Some(id) = ready.pop_front() {
            order.push(id.to_string());
            for dependent in dependents.get(id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(*dependent);
                    }
                }
            }
        }

        order
    }

    /// Finds a module by its plan-local identifier.
    #[must_use]
    pub fn module(&self, id: &str) -> Option<&ModuleOutline> {
        self.modules.iter().find(|m| m.id == id)
    }
}

// ============================================================================
// CourseContext
// ============================================================================

/// Course-level information shared by expansion and content prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseContext {
    /// Course title.
    pub course_title: String,
    /// Difficulty label of the course.
    pub difficulty_level: String,
    /// Subject area, e.g. "programming", "data", "web".
    pub topic_domain: String,
    /// Free-text instructions given when the course was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_instructions: Option<String>,
}

// ============================================================================
// Generated content
// ============================================================================

/// A code sample found in generated lesson material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeExample {
    /// Language tag of the fenced block, `"text"` when absent.
    pub language: String,
    /// The code itself.
    pub code: String,
    /// Prose immediately preceding the block.
    pub explanation: String,
    /// Whether the language is one learners can execute directly.
    pub is_runnable: bool,
}

/// An interactive widget attached to a lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    /// Widget kind, e.g. "quiz", "drag_drop", "fill_blank", "code_challenge".
    #[serde(rename = "type")]
    pub element_type: String,
    /// Type-specific payload.
    pub content: serde_json::Map<String, serde_json::Value>,
    /// How answers are checked.
    pub validation_logic: String,
}

/// One input/output check for a practice task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Input given to the learner's solution.
    pub input_data: String,
    /// Output the solution must produce.
    pub expected_output: String,
    /// What the case checks.
    pub description: String,
}

/// A hands-on exercise attached to a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PracticeTask {
    /// Identifier, unique within the lesson.
    pub id: String,
    /// Task title.
    pub title: String,
    /// What the learner must do.
    pub description: String,
    /// Task kind, e.g. "coding", "sql", "design", "analysis".
    pub task_type: String,
    /// Code the learner starts from.
    #[serde(default)]
    pub starter_code: Option<String>,
    /// Reference solution.
    pub solution: String,
    /// Checks applied to a submission.
    pub test_cases: Vec<TestCase>,
    /// Progressive hints.
    pub hints: Vec<String>,
}

/// A fully generated lesson.
///
/// Its `id` always equals the id of the outline it was generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonContent {
    /// Identifier copied from the outline.
    pub id: String,
    /// Lesson title.
    pub title: String,
    /// Lesson type.
    #[serde(rename = "type")]
    pub lesson_type: LessonType,
    /// Main lesson body in markdown.
    pub content_markdown: String,
    /// Concepts the lesson covers.
    pub key_concepts: Vec<String>,
    /// Difficulty label.
    pub difficulty: String,
    /// Code samples extracted from the body.
    #[serde(default)]
    pub code_examples: Vec<CodeExample>,
    /// Interactive widgets.
    #[serde(default)]
    pub interactive_elements: Vec<InteractiveElement>,
    /// Hands-on exercises.
    #[serde(default)]
    pub practice_tasks: Vec<PracticeTask>,
    /// Estimated duration in minutes.
    pub estimated_duration: u32,
}

impl LessonContent {
    /// Builds lesson content from its outline and the generated body.
    #[must_use]
    pub fn from_outline(
        outline: &LessonOutline,
        content_markdown: String,
        estimated_duration: u32,
    ) -> Self {
        Self {
            id: outline.id.clone(),
            title: outline.title.clone(),
            lesson_type: outline.lesson_type.clone(),
            content_markdown,
            key_concepts: outline.key_concepts.clone(),
            difficulty: outline.difficulty.clone(),
            code_examples: Vec::new(),
            interactive_elements: Vec::new(),
            practice_tasks: Vec::new(),
            estimated_duration,
        }
    }

    /// Returns the outline this lesson was generated from.
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
}

/// A question within an assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Identifier, unique within the assessment.
    pub id: String,
    /// Question kind, e.g. "multiple_choice", "code", "short_answer".
    #[serde(rename = "type")]
    pub question_type: String,
    /// The question as shown to the learner.
    pub question_text: String,
    /// Choices for multiple-choice questions.
    #[serde(default)]
    pub options: Option<Vec<String>>,
    /// The expected answer.
    pub correct_answer: String,
    /// Why the answer is correct.
    pub explanation: String,
    /// Points awarded.
    pub points: u32,
}

/// A module-level assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Identifier.
    pub id: String,
    /// Assessment title.
    pub title: String,
    /// Questions in order.
    pub questions: Vec<Question>,
    /// Passing score as a percentage.
    pub passing_score: u32,
    /// Time limit in minutes.
    #[serde(default)]
    pub time_limit: Option<u32>,
}

/// A fully generated module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleContent {
    /// Identifier of the module this content belongs to.
    pub module_id: String,
    /// Module title.
    pub title: String,
    /// Module description.
    pub description: String,
    /// Learning objectives.
    pub learning_objectives: Vec<String>,
    /// Estimated duration in hours.
    pub estimated_duration: u32,
    /// Generated lessons, in outline order.
    pub lessons: Vec<LessonContent>,
    /// Optional module-level assessment.
    #[serde(default)]
    pub module_assessment: Option<Assessment>,
}

impl ModuleContent {
    /// Sum of the lesson duration estimates in minutes.
    #[must_use]
    pub fn total_lesson_minutes(&self) -> u32 {
        self.lessons.iter().map(|l| l.estimated_duration).sum()
    }
}
