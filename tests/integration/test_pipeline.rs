//! End-to-end tests for the course generation pipeline.
//!
//! A real HTTP server is started on a free port, backed by an in-memory
//! SQLite store and a scripted language model, and driven with `reqwest`.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use mentor_orchestrator::{
    create_router, AppState, Config, CourseDetail, CourseRepository, LessonType, LlmErrorKind,
    ModuleContent, ScriptedModel, SequentialIds,
};
use mentor_report::{json::JsonGenerator, CourseReport, MarkdownGenerator};
use mentor_store::SqliteRepository;
use reqwest::StatusCode;
use serde_json::json;

const SQL_PLAN: &str = r#"```json
{
  "course_title": "Advanced SQL: Window Functions and Beyond",
  "estimated_duration": 32,
  "difficulty_level": "intermediate",
  "prerequisites": ["basic SQL", "database design"],
  "modules": [
    {"id": "module_1", "title": "Joins Revisited", "description": "Every join type in depth.",
     "learning_objectives": ["Choose the right join"], "estimated_duration": 6, "dependencies": []},
    {"id": "module_2", "title": "Window Functions", "description": "Ranking and running totals.",
     "learning_objectives": ["Use OVER clauses"], "estimated_duration": 8, "dependencies": ["module_1"]},
    {"id": "module_3", "title": "Common Table Expressions", "description": "Readable and recursive queries.",
     "learning_objectives": ["Write recursive CTEs"], "estimated_duration": 8, "dependencies": ["module_1"]},
    {"id": "module_4", "title": "Query Tuning", "description": "Plans, indexes and statistics.",
     "learning_objectives": ["Read a query plan"], "estimated_duration": 10, "dependencies": ["module_2", "module_3"]}
  ]
}
```"#;

const JOIN_LESSONS: &str = r#"{"lessons": [
  {"id": "lesson_1", "title": "Join semantics", "type": "theory", "key_concepts": ["INNER JOIN", "OUTER JOIN"], "difficulty": "intermediate"},
  {"id": "lesson_2", "title": "Join lab", "type": "practice", "key_concepts": ["LEFT JOIN"], "difficulty": "intermediate"},
  {"id": "lesson_3", "title": "Join check", "type": "assessment", "key_concepts": ["joins"], "difficulty": "intermediate"}
]}"#;

const THEORY_BODY: &str = "# Join semantics\n\nA join pairs rows from two tables.\n\n```sql\nSELECT * FROM a JOIN b ON a.id = b.a_id;\n```\n";
const PRACTICE_BODY: &str = "# Join lab\n\nWrite a left join that keeps unmatched customers.";
const ASSESSMENT_BODY: &str = "# Join check\n\n1. What does a left join return?";

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

struct TestServer {
    base_url: String,
    model: Arc<ScriptedModel>,
    repository: Arc<SqliteRepository>,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns a server whose model answers with `replies` in order.
async fn spawn_server(replies: &[&str]) -> TestServer {
    let model = Arc::new(ScriptedModel::with_replies(replies.iter().copied()));
    let repository = Arc::new(
        SqliteRepository::open_in_memory()
            .expect("Failed to open store")
            .with_ids(Box::new(SequentialIds::new("it"))),
    );

    let state = AppState::new(Config::default(), model.clone(), repository.clone());
    let router = create_router(state);

    let addr = format!("127.0.0.1:{}", find_available_port());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base_url: format!("http://{addr}"),
        model,
        repository,
        _handle: handle,
    }
}

async fn create_course(client: &reqwest::Client, server: &TestServer) -> CourseDetail {
    let response = client
        .post(format!("{}/api/v1/courses", server.base_url))
        .json(&json!({
            "topic": "Advanced SQL",
            "user_instructions": "Focus on window functions",
            "user_context": {
                "skill_level": "intermediate",
                "learning_style": "hands-on",
                "time_commitment": 8,
                "prior_knowledge": ["basic SQL", "database design"]
            }
        }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Invalid course body")
}

// ============================================================================
// Course Tests
// ============================================================================

#[tokio::test]
async fn test_advanced_sql_course_and_first_module() {
    let server = spawn_server(&[
        SQL_PLAN,
        JOIN_LESSONS,
        THEORY_BODY,
        PRACTICE_BODY,
        ASSESSMENT_BODY,
    ])
    .await;
    let client = reqwest::Client::new();

    let course = create_course(&client, &server).await;

    assert!(!course.id.is_empty());
    assert!((3..=10).contains(&course.modules.len()));
    let mut ids: Vec<_> = course.modules.iter().map(|m| m.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), course.modules.len(), "module ids must be unique");

    let first = &course.modules[0];
    let response = client
        .post(format!(
            "{}/api/v1/courses/{}/modules/{}",
            server.base_url, course.id, first.id
        ))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), StatusCode::CREATED);

    let content: ModuleContent = response.json().await.expect("Invalid module body");
    assert!((3..=8).contains(&content.lessons.len()));
    assert!(content.lessons.iter().all(|l| l.lesson_type.is_known()));
    assert_eq!(
        content.lessons.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(),
        ["lesson_1", "lesson_2", "lesson_3"]
    );
    assert_eq!(content.lessons[0].code_examples.len(), 1);
    assert_eq!(content.lessons[0].code_examples[0].language, "sql");
    assert_eq!(content.lessons[1].lesson_type, LessonType::Practice);
    assert!(content.lessons[1].estimated_duration >= 30);

    // One syllabus call, one expansion call, one call per lesson.
    assert_eq!(server.model.call_count(), 5);
    let prompts = server.model.prompts();
    assert!(prompts[0].contains("Advanced SQL"));
    assert!(prompts[0].contains("Focus on window functions"));
    assert!(prompts[2].contains("Join semantics"));
}

#[tokio::test]
async fn test_course_detail_reports_progress() {
    let server = spawn_server(&[
        SQL_PLAN,
        JOIN_LESSONS,
        THEORY_BODY,
        PRACTICE_BODY,
        ASSESSMENT_BODY,
    ])
    .await;
    let client = reqwest::Client::new();
    let course = create_course(&client, &server).await;
    let first = course.modules[0].id.clone();

    client
        .post(format!(
            "{}/api/v1/courses/{}/modules/{first}",
            server.base_url, course.id
        ))
        .json(&json!({}))
        .send()
        .await
        .expect("Request failed");

    let detail: CourseDetail = client
        .get(format!("{}/api/v1/courses/{}", server.base_url, course.id))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid course body");

    assert_eq!(detail.progress.completed_modules, 1);
    assert_eq!(detail.progress.total_modules, 4);
    assert_eq!(detail.progress.completion_percentage, 25);
    assert_eq!(detail.modules[0].lesson_outlines().len(), 3);
    assert!(detail.modules[1].lesson_outlines().is_empty());
    assert_eq!(detail.modules[1].dependencies, vec![first]);
}

#[tokio::test]
async fn test_stored_module_matches_generated_content() {
    let server = spawn_server(&[
        SQL_PLAN,
        JOIN_LESSONS,
        THEORY_BODY,
        PRACTICE_BODY,
        ASSESSMENT_BODY,
    ])
    .await;
    let client = reqwest::Client::new();
    let course = create_course(&client, &server).await;
    let module_id = course.modules[0].id.clone();

    let generated: ModuleContent = client
        .post(format!(
            "{}/api/v1/courses/{}/modules/{module_id}",
            server.base_url, course.id
        ))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid module body");

    let stored: ModuleContent = client
        .get(format!("{}/api/v1/modules/{module_id}", server.base_url))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid module body");

    assert_eq!(stored.lessons, generated.lessons);
    assert_eq!(stored.module_id, module_id);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_unparseable_plan_returns_500_and_stores_nothing() {
    let server = spawn_server(&["Sorry, I cannot help with that."]).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/v1/courses", server.base_url))
        .json(&json!({ "topic": "Advanced SQL" }))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.expect("Invalid error body");
    assert!(body["detail"].as_str().unwrap_or_default().contains("syllabus"));
    assert!(server
        .repository
        .get_course("it-1")
        .expect("Store failed")
        .is_none());
}

#[tokio::test]
async fn test_failed_lesson_is_named_and_nothing_is_stored() {
    let server = spawn_server(&[SQL_PLAN, JOIN_LESSONS, THEORY_BODY]).await;
    server
        .model
        .push_failure(LlmErrorKind::Server, "upstream unavailable");
    let client = reqwest::Client::new();
    let course = create_course(&client, &server).await;
    let module_id = course.modules[0].id.clone();

    let response = client
        .post(format!(
            "{}/api/v1/courses/{}/modules/{module_id}",
            server.base_url, course.id
        ))
        .send()
        .await
        .expect("Request failed");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.expect("Invalid error body");
    assert!(body["detail"].as_str().unwrap_or_default().contains("lesson_2"));

    let lessons = server
        .repository
        .get_lessons_by_module(&module_id)
        .expect("Store failed");
    assert!(lessons.iter().all(|l| !l.is_generated()));
}

#[tokio::test]
async fn test_missing_resources_return_404() {
    let server = spawn_server(&[]).await;
    let client = reqwest::Client::new();

    for (method, path) in [
        (reqwest::Method::GET, "/api/v1/courses/missing"),
        (reqwest::Method::GET, "/api/v1/modules/missing"),
        (reqwest::Method::POST, "/api/v1/courses/missing/modules/missing"),
    ] {
        let response = client
            .request(method, format!("{}{path}", server.base_url))
            .send()
            .await
            .expect("Request failed");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
    assert_eq!(server.model.call_count(), 0);
}

// ============================================================================
// Export Tests
// ============================================================================

#[tokio::test]
async fn test_export_generated_course() {
    let server = spawn_server(&[
        SQL_PLAN,
        JOIN_LESSONS,
        THEORY_BODY,
        PRACTICE_BODY,
        ASSESSMENT_BODY,
    ])
    .await;
    let client = reqwest::Client::new();
    let course = create_course(&client, &server).await;
    client
        .post(format!(
            "{}/api/v1/courses/{}/modules/{}",
            server.base_url, course.id, course.modules[0].id
        ))
        .send()
        .await
        .expect("Request failed");

    let report =
        CourseReport::load(server.repository.as_ref(), &course.id).expect("Failed to load report");
    let markdown = MarkdownGenerator::new(&report).generate();
    let json = JsonGenerator::new(&report)
        .generate()
        .expect("Failed to serialize report");

    assert!(markdown.contains("# Advanced SQL: Window Functions and Beyond"));
    assert!(markdown.contains("SELECT * FROM a JOIN b"));
    assert!(markdown.contains("*No lessons outlined yet.*"));
    assert!(json.contains("\"completion_percentage\":25"));
}
