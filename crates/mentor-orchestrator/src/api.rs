//! HTTP API for the Mentor service.
//!
//! # Endpoints
//!
//! - `GET /` - Service banner
//! - `GET /health` - Liveness check
//! - `GET /ws` - WebSocket stream of generation events
//! - `POST /api/v1/courses` - Generate and store a syllabus
//! - `GET /api/v1/courses/:course_id` - Course with modules, lesson outlines and progress
//! - `POST /api/v1/courses/:course_id/modules/:module_id` - Expand a module and generate its lessons
//! - `GET /api/v1/modules/:module_id` - Stored module content
//!
//! Failures are returned as `{"detail": "..."}` with status 404 for missing
//! resources, 400 for unusable requests and 500 for everything else.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mentor_orchestrator::{create_router, AppState, Config, MemoryRepository, ScriptedModel};
//!
//! # async fn example() {
//! let state = AppState::new(
//!     Config::default(),
//!     Arc::new(ScriptedModel::new()),
//!     Arc::new(MemoryRepository::new()),
//! );
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::course::{LearnerProfile, ModuleContent};
use crate::error::MentorError;
use crate::events::{ws_handler, EventBroadcaster};
use crate::llm::LanguageModel;
use crate::mentor::{CourseDetail, MentorService};
use crate::repository::CourseRepository;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/v1/courses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCourseRequest {
    /// Topic to build a course for.
    pub topic: String,
    /// Free-text instructions for the syllabus.
    #[serde(default)]
    pub user_instructions: Option<String>,
    /// Learner profile; stored with the course.
    #[serde(default)]
    pub user_context: Option<LearnerProfile>,
}

/// Optional request body for `POST /api/v1/courses/:course_id/modules/:module_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateModuleRequest {
    /// Learner profile overriding the one stored with the course.
    #[serde(default)]
    pub user_context: Option<LearnerProfile>,
}

/// Body of the service banner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Always `"running"`.
    pub status: String,
}

/// Body of the health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"`.
    pub status: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub detail: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// The pipeline orchestrator.
    pub service: MentorService,
}

impl AppState {
    /// Creates the state from its collaborators.
    ///
    /// The event buffer size and expansion policy come from `config`.
    #[must_use]
    pub fn new(
        config: Config,
        model: Arc<dyn LanguageModel>,
        repository: Arc<dyn CourseRepository>,
    ) -> Self {
        let service = MentorService::new(model, repository, config.generation.expansion_policy)
            .with_events(EventBroadcaster::new(config.server.event_buffer_size));
        Self { config, service }
    }

    /// The broadcaster generation events are published on.
    #[must_use]
    pub fn broadcaster(&self) -> EventBroadcaster {
        self.service.events().clone()
    }
}

impl FromRef<Arc<AppState>> for EventBroadcaster {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.broadcaster()
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type returned by handlers.
#[derive(Debug)]
enum ApiError {
    /// The request body could not be used.
    BadRequest(String),
    /// A pipeline or storage failure.
    Mentor(MentorError),
}

impl From<MentorError> for ApiError {
    fn from(err: MentorError) -> Self {
        Self::Mentor(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Mentor(err) => {
                let status = match &err {
                    MentorError::NotFound { .. } => StatusCode::NOT_FOUND,
                    MentorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    warn!(error = %err, "Request failed");
                }
                (status, err.to_string())
            }
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all endpoints.
///
/// The router carries a permissive CORS layer and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/courses", post(handle_create_course))
        .route("/courses/:course_id", get(handle_get_course))
        .route(
            "/courses/:course_id/modules/:module_id",
            post(handle_create_module),
        )
        .route("/modules/:module_id", get(handle_get_module));

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/ws", get(ws_handler))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /`.
async fn handle_root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "mentor".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
    })
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Handler for `POST /api/v1/courses`.
async fn handle_create_course(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateCourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CourseDetail>), ApiError> {
    let Json(request) = payload?;
    info!(topic = %request.topic, "Course requested");

    let (_, course_id) = state
        .service
        .create_syllabus(
            &request.topic,
            request.user_instructions.as_deref(),
            request.user_context.as_ref(),
        )
        .await?;

    let detail = state.service.course_detail(&course_id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Handler for `GET /api/v1/courses/:course_id`.
async fn handle_get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDetail>, ApiError> {
    Ok(Json(state.service.course_detail(&course_id).await?))
}

/// Handler for `POST /api/v1/courses/:course_id/modules/:module_id`.
///
/// The body is optional; without one the stored course profile is used.
/// A body that is present but does not decode is rejected with 400.
async fn handle_create_module(
    State(state): State<Arc<AppState>>,
    Path((course_id, module_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<ModuleContent>), ApiError> {
    let request = parse_optional_body::<CreateModuleRequest>(&body)?;
    info!(course_id = %course_id, module_id = %module_id, "Module content requested");

    let (content, _) = state
        .service
        .create_module_content(&course_id, &module_id, request.user_context.as_ref())
        .await?;

    Ok((StatusCode::CREATED, Json(content)))
}

/// Decodes an optional JSON body; a blank body yields `T::default()`.
fn parse_optional_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Failed to deserialize the JSON body: {e}")))
}

/// Handler for `GET /api/v1/modules/:module_id`.
async fn handle_get_module(
    State(state): State<Arc<AppState>>,
    Path(module_id): Path<String>,
) -> Result<Json<ModuleContent>, ApiError> {
    Ok(Json(state.service.stored_module(&module_id).await?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use tower::util::ServiceExt;

    use super::*;
    use crate::llm::ScriptedModel;
    use crate::repository::{MemoryRepository, SequentialIds};

    const PLAN: &str = r#"{
        "course_title": "Advanced SQL",
        "estimated_duration": 30,
        "difficulty_level": "intermediate",
        "prerequisites": ["basic SQL"],
        "modules": [
            {"id": "module_1", "title": "Joins", "description": "d",
             "learning_objectives": ["join"], "estimated_duration": 6, "dependencies": []}
        ]
    }"#;

    const LESSONS: &str = r#"{"lessons": [
        {"id": "lesson_1", "title": "Inner joins", "type": "theory", "key_concepts": ["INNER JOIN"], "difficulty": "intermediate"},
        {"id": "lesson_2", "title": "Join practice", "type": "practice", "key_concepts": ["LEFT JOIN"], "difficulty": "intermediate"},
        {"id": "lesson_3", "title": "Join quiz", "type": "assessment", "key_concepts": ["joins"], "difficulty": "intermediate"}
    ]}"#;

    fn test_state(replies: &[&str]) -> AppState {
        AppState::new(
            Config::default(),
            Arc::new(ScriptedModel::with_replies(replies.iter().copied())),
            Arc::new(MemoryRepository::with_ids(Box::new(SequentialIds::new("t")))),
        )
    }

    fn json_request(method: Method, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let router = create_router(test_state(&[]));

        let response = router.clone().oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info: ServiceInfo = body_json(response).await;
        assert_eq!(info.status, "running");

        let response = router.oneshot(get_request("/health")).await.unwrap();
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "healthy");
    }

    #[tokio::test]
    async fn test_create_course_returns_201() {
        let router = create_router(test_state(&[PLAN]));
        let body = serde_json::json!({
            "topic": "Advanced SQL",
            "user_instructions": "Focus on window functions",
            "user_context": {
                "skill_level": "intermediate",
                "learning_style": "hands-on",
                "time_commitment": 8,
                "prior_knowledge": ["basic SQL", "database design"]
            }
        });

        let response = router
            .oneshot(json_request(Method::POST, "/api/v1/courses", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let course: CourseDetail = body_json(response).await;
        assert!(!course.id.is_empty());
        assert_eq!(course.course_title, "Advanced SQL");
        assert_eq!(course.modules.len(), 1);
        assert_eq!(course.progress.completed_modules, 0);
    }

    #[tokio::test]
    async fn test_create_course_blank_topic_returns_400() {
        let router = create_router(test_state(&[]));
        let body = serde_json::json!({ "topic": "  " });

        let response = router
            .oneshot(json_request(Method::POST, "/api/v1/courses", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.detail.contains("topic"));
    }

    #[tokio::test]
    async fn test_create_course_missing_topic_returns_400() {
        let router = create_router(test_state(&[]));
        let body = serde_json::json!({ "user_instructions": "anything" });

        let response = router
            .oneshot(json_request(Method::POST, "/api/v1/courses", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_course_bad_model_reply_returns_500() {
        let router = create_router(test_state(&["no json here"]));
        let body = serde_json::json!({ "topic": "SQL" });

        let response = router
            .oneshot(json_request(Method::POST, "/api/v1/courses", &body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.detail.contains("syllabus"));
    }

    #[tokio::test]
    async fn test_get_missing_course_returns_404() {
        let router = create_router(test_state(&[]));
        let response = router
            .oneshot(get_request("/api/v1/courses/does-not-exist"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.detail.contains("does-not-exist"));
    }

    #[tokio::test]
    async fn test_get_missing_module_returns_404() {
        let router = create_router(test_state(&[]));
        let response = router
            .oneshot(get_request("/api/v1/modules/nope"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_module_generation_flow() {
        let router = create_router(test_state(&[PLAN, LESSONS, "# A", "# B", "# C"]));

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/courses",
                &serde_json::json!({ "topic": "Advanced SQL" }),
            ))
            .await
            .unwrap();
        let course: CourseDetail = body_json(response).await;
        let module_id = course.modules[0].id.clone();

        // No body at all: the stored profile is used.
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(format!("/api/v1/courses/{}/modules/{module_id}", course.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let content: ModuleContent = body_json(response).await;
        assert_eq!(content.lessons.len(), 3);
        assert_eq!(content.lessons[0].content_markdown, "# A");

        let response = router
            .clone()
            .oneshot(get_request(&format!("/api/v1/modules/{module_id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored: ModuleContent = body_json(response).await;
        assert_eq!(stored.lessons, content.lessons);

        let response = router
            .oneshot(get_request(&format!("/api/v1/courses/{}", course.id)))
            .await
            .unwrap();
        let course: CourseDetail = body_json(response).await;
        assert_eq!(course.modules[0].lesson_outlines().len(), 3);
        assert_eq!(course.progress.completion_percentage, 100);
    }

    #[tokio::test]
    async fn test_module_in_missing_course_returns_404() {
        let router = create_router(test_state(&[]));
        let response = router
            .oneshot(json_request(
                Method::POST,
                "/api/v1/courses/nope/modules/nope",
                &serde_json::json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_module_with_malformed_profile_returns_400() {
        let state = test_state(&[PLAN, LESSONS, "# A", "# B", "# C"]);
        let repo = state.service.repository();
        let router = create_router(state);

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/api/v1/courses",
                &serde_json::json!({ "topic": "Advanced SQL" }),
            ))
            .await
            .unwrap();
        let course: CourseDetail = body_json(response).await;
        let module_id = course.modules[0].id.clone();

        let response = router
            .oneshot(json_request(
                Method::POST,
                &format!("/api/v1/courses/{}/modules/{module_id}", course.id),
                &serde_json::json!({
                    "user_context": {
                        "skill_level": "expert",
                        "learning_style": "hands-on",
                        "time_commitment": 8,
                        "prior_knowledge": []
                    }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: ErrorResponse = body_json(response).await;
        assert!(error.detail.contains("expert"));
        assert!(repo.get_lessons_by_module(&module_id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_module_with_truncated_body_returns_400() {
        let router = create_router(test_state(&[]));
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/v1/courses/c/modules/m")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"user_context\": "))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_blank_optional_body_is_default() {
        let request: CreateModuleRequest = parse_optional_body(b"  \n").unwrap();
        assert!(request.user_context.is_none());
    }

    #[tokio::test]
    async fn test_cors_headers_present() {
        let router = create_router(test_state(&[]));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn test_unknown_route_returns_404() {
        let router = create_router(test_state(&[]));
        let response = router.oneshot(get_request("/api/v1/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_create_course_request_optional_fields() {
        let request: CreateCourseRequest = serde_json::from_str(r#"{"topic":"Rust"}"#).unwrap();
        assert_eq!(request.topic, "Rust");
        assert!(request.user_instructions.is_none());
        assert!(request.user_context.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_string(&ErrorResponse {
            detail: "Course with id 'x' not found".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"detail":"Course with id 'x' not found"}"#);
    }
}
