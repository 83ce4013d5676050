//! Mentor course generation pipeline.
//!
//! Turns a topic into a syllabus, expands modules into lesson outlines,
//! generates lesson content with a language model, and serves the result
//! over an HTTP API with WebSocket progress events.

pub mod api;
pub mod config;
pub mod content;
pub mod course;
pub mod error;
pub mod events;
pub mod expander;
pub mod llm;
pub mod mentor;
pub mod prompts;
pub mod reply;
pub mod repository;
pub mod syllabus;

pub use api::{
    create_router, AppState, CreateCourseRequest, CreateModuleRequest, ErrorResponse,
    HealthResponse, ServiceInfo,
};
pub use config::{
    Config, DatabaseConfig, ExpansionPolicy, GenerationConfig, LlmConfig, LlmProvider,
    ServerConfig, DATABASE_ENV,
};
pub use content::{estimate_duration, extract_code_examples, ContentGenerator};
pub use course::{
    Assessment, CodeExample, CourseContext, CoursePlan, InteractiveElement, LearnerProfile,
    LessonContent, LessonOutline, LessonType, ModuleContent, ModuleOutline, PlanViolation,
    PracticeTask, Question, SkillLevel, TestCase,
};
pub use error::{GenerationStage, LlmErrorKind, MentorError, ResourceKind, Result};
pub use events::{EventBroadcaster, GenerationEvent};
pub use expander::ModuleExpander;
pub use llm::{HttpLanguageModel, LanguageModel, ScriptedModel, TimedModel};
pub use mentor::{CourseDetail, CourseProgress, MentorService};
pub use repository::{
    plan_records, CourseRecord, CourseRepository, IdGenerator, LessonRecord, MemoryRepository,
    ModuleRecord, SequentialIds, UuidIds,
};
pub use syllabus::SyllabusGenerator;
