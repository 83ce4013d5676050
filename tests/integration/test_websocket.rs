//! Integration tests for the generation event stream.
//!
//! Clients connect to `/ws` on a live server and observe the events published
//! while courses and modules are generated over the HTTP API.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use mentor_orchestrator::{
    create_router, AppState, Config, CourseDetail, EventBroadcaster, GenerationEvent,
    MemoryRepository, ScriptedModel, SequentialIds,
};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

const PLAN: &str = r#"{
  "course_title": "Advanced SQL",
  "estimated_duration": 30,
  "difficulty_level": "intermediate",
  "prerequisites": ["basic SQL"],
  "modules": [
    {"id": "module_1", "title": "Joins", "description": "d", "learning_objectives": ["join"],
     "estimated_duration": 6, "dependencies": []},
    {"id": "module_2", "title": "Windows", "description": "d", "learning_objectives": ["rank"],
     "estimated_duration": 8, "dependencies": ["module_1"]},
    {"id": "module_3", "title": "Tuning", "description": "d", "learning_objectives": ["plan"],
     "estimated_duration": 8, "dependencies": ["module_2"]}
  ]
}"#;

const LESSONS: &str = r#"{"lessons": [
  {"id": "lesson_1", "title": "Inner joins", "type": "theory", "key_concepts": ["INNER JOIN"], "difficulty": "intermediate"},
  {"id": "lesson_2", "title": "Join lab", "type": "practice", "key_concepts": ["LEFT JOIN"], "difficulty": "intermediate"},
  {"id": "lesson_3", "title": "Join quiz", "type": "assessment", "key_concepts": ["joins"], "difficulty": "intermediate"}
]}"#;

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    base_url: String,
    ws_url: String,
    broadcaster: EventBroadcaster,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns the test server with a model answering `replies` in order.
async fn spawn_test_server(replies: &[&str]) -> TestServer {
    let state = AppState::new(
        Config::default(),
        Arc::new(ScriptedModel::with_replies(replies.iter().copied())),
        Arc::new(MemoryRepository::with_ids(Box::new(SequentialIds::new("ws")))),
    );
    let broadcaster = state.broadcaster();

    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");
    let router = create_router(state);
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
        ws_url: format!("ws://{addr}/ws"),
        broadcaster,
        _handle: handle,
    }
}

/// Connects a WebSocket client and consumes its `connected` event.
async fn connect_client(url: &str) -> WsClient {
    let (mut ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    let event = receive_event(&mut ws_stream).await;
    assert!(
        matches!(event, GenerationEvent::Connected(_)),
        "Expected Connected event, got: {event:?}"
    );
    ws_stream
}

/// Receives the next text message and parses it as a `GenerationEvent`.
/// Answers ping frames with pong.
async fn receive_event(client: &mut WsClient) -> GenerationEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connected_event_names_service() {
    let server = spawn_test_server(&[]).await;
    let (mut client, _) = connect_async(&server.ws_url)
        .await
        .expect("Failed to connect to WebSocket");

    match receive_event(&mut client).await {
        GenerationEvent::Connected(payload) => assert_eq!(payload.service, "mentor"),
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_events_broadcast_to_all_clients() {
    let server = spawn_test_server(&[]).await;
    let mut client1 = connect_client(&server.ws_url).await;
    let mut client2 = connect_client(&server.ws_url).await;

    server
        .broadcaster
        .send(GenerationEvent::error("model unavailable"));

    for client in [&mut client1, &mut client2] {
        match receive_event(client).await {
            GenerationEvent::Error(payload) => assert_eq!(payload.message, "model unavailable"),
            other => panic!("Expected Error event, got: {other:?}"),
        }
    }
}

// ============================================================================
// API Integration Tests
// ============================================================================

#[tokio::test]
async fn test_course_creation_emits_syllabus_generated() {
    let server = spawn_test_server(&[PLAN]).await;
    let mut client = connect_client(&server.ws_url).await;

    let course: CourseDetail = reqwest::Client::new()
        .post(format!("{}/api/v1/courses", server.base_url))
        .json(&json!({ "topic": "Advanced SQL" }))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid course body");

    match receive_event(&mut client).await {
        GenerationEvent::SyllabusGenerated(payload) => {
            assert_eq!(payload.course_id, course.id);
            assert_eq!(payload.course_title, "Advanced SQL");
            assert_eq!(payload.modules, 3);
        }
        other => panic!("Expected SyllabusGenerated event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_module_generation_event_sequence() {
    let server = spawn_test_server(&[PLAN, LESSONS, "# One", "# Two", "# Three"]).await;
    let http = reqwest::Client::new();

    let course: CourseDetail = http
        .post(format!("{}/api/v1/courses", server.base_url))
        .json(&json!({ "topic": "Advanced SQL" }))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid course body");
    let module_id = course.modules[0].id.clone();

    let mut client = connect_client(&server.ws_url).await;
    let response = http
        .post(format!(
            "{}/api/v1/courses/{}/modules/{module_id}",
            server.base_url, course.id
        ))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let mut names = Vec::new();
    for _ in 0..5 {
        names.push(receive_event(&mut client).await.event_name().to_string());
    }
    assert_eq!(
        names,
        [
            "module_expanded",
            "lesson_generated",
            "lesson_generated",
            "lesson_generated",
            "module_completed",
        ]
    );
}

#[tokio::test]
async fn test_failed_generation_emits_error_event() {
    let server = spawn_test_server(&["this is not a syllabus"]).await;
    let mut client = connect_client(&server.ws_url).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/courses", server.base_url))
        .json(&json!({ "topic": "Advanced SQL" }))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    match receive_event(&mut client).await {
        GenerationEvent::Error(payload) => assert!(payload.message.contains("syllabus")),
        other => panic!("Expected Error event, got: {other:?}"),
    }
}
