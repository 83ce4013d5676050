//! Generation progress events and their WebSocket stream.
//!
//! Pipeline runs publish [`GenerationEvent`]s through an [`EventBroadcaster`];
//! every client connected to `/ws` receives them as JSON text frames of the
//! form `{"event": "...", "payload": {...}}`.
//!
//! # Event Types
//!
//! - `connected` - Sent to a client right after it connects
//! - `syllabus_generated` - A course plan was generated and stored
//! - `module_expanded` - A module has its lesson outlines
//! - `lesson_generated` - One lesson's content was generated
//! - `module_completed` - A module's content was generated and stored
//! - `error` - A pipeline run failed

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// When the client connected.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `syllabus_generated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusGeneratedPayload {
    /// Id of the stored course.
    pub course_id: String,
    /// Generated course title.
    pub course_title: String,
    /// Number of modules in the plan.
    pub modules: usize,
}

/// Payload for the `module_expanded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleExpandedPayload {
    /// Owning course.
    pub course_id: String,
    /// Expanded module.
    pub module_id: String,
    /// Number of lesson outlines.
    pub lessons: usize,
}

/// Payload for the `lesson_generated` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonGeneratedPayload {
    /// Owning module.
    pub module_id: String,
    /// Generated lesson.
    pub lesson_id: String,
    /// Lesson title.
    pub title: String,
    /// Estimated minutes.
    pub estimated_duration: u32,
}

/// Payload for the `module_completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleCompletedPayload {
    /// Owning course.
    pub course_id: String,
    /// Completed module.
    pub module_id: String,
    /// Number of generated lessons.
    pub lessons: usize,
    /// Sum of lesson estimates in minutes.
    pub total_minutes: u32,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Progress events published while generating courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent after a syllabus is stored.
    SyllabusGenerated(SyllabusGeneratedPayload),
    /// Sent after module expansion.
    ModuleExpanded(ModuleExpandedPayload),
    /// Sent after each lesson.
    LessonGenerated(LessonGeneratedPayload),
    /// Sent after module content is stored.
    ModuleCompleted(ModuleCompletedPayload),
    /// Sent when a pipeline run fails.
    Error(ErrorPayload),
}

impl GenerationEvent {
    /// Creates a `Connected` event for this service.
    #[must_use]
    pub fn connected() -> Self {
        Self::Connected(ConnectedPayload {
            service: "mentor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        })
    }

    /// Creates a `SyllabusGenerated` event.
    #[must_use]
    pub fn syllabus_generated(
        course_id: impl Into<String>,
        course_title: impl Into<String>,
        modules: usize,
    ) -> Self {
        Self::SyllabusGenerated(SyllabusGeneratedPayload {
            course_id: course_id.into(),
            course_title: course_title.into(),
            modules,
        })
    }

    /// Creates a `ModuleExpanded` event.
    #[must_use]
    pub fn module_expanded(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        lessons: usize,
    ) -> Self {
        Self::ModuleExpanded(ModuleExpandedPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            lessons,
        })
    }

    /// Creates a `LessonGenerated` event.
    #[must_use]
    pub fn lesson_generated(
        module_id: impl Into<String>,
        lesson_id: impl Into<String>,
        title: impl Into<String>,
        estimated_duration: u32,
    ) -> Self {
        Self::LessonGenerated(LessonGeneratedPayload {
            module_id: module_id.into(),
            lesson_id: lesson_id.into(),
            title: title.into(),
            estimated_duration,
        })
    }

    /// Creates a `ModuleCompleted` event.
    #[must_use]
    pub fn module_completed(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        lessons: usize,
        total_minutes: u32,
    ) -> Self {
        Self::ModuleCompleted(ModuleCompletedPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            lessons,
            total_minutes,
        })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SyllabusGenerated(_) => "syllabus_generated",
            Self::ModuleExpanded(_) => "module_expanded",
            Self::LessonGenerated(_) => "lesson_generated",
            Self::ModuleCompleted(_) => "module_completed",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans generation events out to every subscriber.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<GenerationEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls more than `capacity` events behind receives a
    /// `Lagged` error and misses those events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event, returning how many subscribers will receive it.
    pub fn send(&self, event: GenerationEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Upgrades `/ws` requests and streams events to the client.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(broadcaster): State<EventBroadcaster>,
) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster))
}

/// Serves one WebSocket client until it disconnects.
///
/// Sends `connected` first, then forwards every broadcast event and pings
/// every 30 seconds. Three unanswered pings close the connection.
async fn handle_socket(socket: WebSocket, broadcaster: EventBroadcaster) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before greeting so nothing published in between is lost.
    let mut events = broadcaster.subscribe();

    let Ok(connected) = serde_json::to_string(&GenerationEvent::connected()) else {
        warn!("Failed to serialize connected event");
        return;
    };
    if sender.send(Message::Text(connected)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring message from client");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
