//! Event types for the Lexi event system
//!
//! Provides shared event definitions and the EventBus used to fan batch
//! progress out to observers (SSE clients, CLI progress output).

mod progress_types;

pub use progress_types::{CandidateSummary, ProgressSnapshot};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Curation event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CurationEvent {
    /// A batch left Idle and began processing
    BatchStarted {
        batch_id: Uuid,
        total_words: usize,
        dry_run: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Counters after each finished word
    BatchProgress {
        batch_id: Uuid,
        progress: ProgressSnapshot,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Candidates scored for a word, best first
    WordCandidates {
        batch_id: Uuid,
        word: String,
        candidates: Vec<CandidateSummary>,
    },

    /// A candidate became the word's selected image
    CandidateSelected {
        batch_id: Uuid,
        word: String,
        record_id: Option<i64>,
        url: String,
        score_total: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A word ended without a selection
    WordFailed {
        batch_id: Uuid,
        word: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run-state transition (Running, Paused, Stopped, ...)
    BatchStateChanged {
        batch_id: Uuid,
        old_state: String,
        new_state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Batch reached a terminal state
    BatchCompleted {
        batch_id: Uuid,
        progress: ProgressSnapshot,
        /// False when stopped before every word was processed
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Free-form log line for live consoles
    LogLine {
        batch_id: Uuid,
        level: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl CurationEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            CurationEvent::BatchStarted { .. } => "BatchStarted",
            CurationEvent::BatchProgress { .. } => "BatchProgress",
            CurationEvent::WordCandidates { .. } => "WordCandidates",
            CurationEvent::CandidateSelected { .. } => "CandidateSelected",
            CurationEvent::WordFailed { .. } => "WordFailed",
            CurationEvent::BatchStateChanged { .. } => "BatchStateChanged",
            CurationEvent::BatchCompleted { .. } => "BatchCompleted",
            CurationEvent::LogLine { .. } => "LogLine",
        }
    }

    /// Batch this event belongs to
    pub fn batch_id(&self) -> Uuid {
        match self {
            CurationEvent::BatchStarted { batch_id, .. }
            | CurationEvent::BatchProgress { batch_id, .. }
            | CurationEvent::WordCandidates { batch_id, .. }
            | CurationEvent::CandidateSelected { batch_id, .. }
            | CurationEvent::WordFailed { batch_id, .. }
            | CurationEvent::BatchStateChanged { batch_id, .. }
            | CurationEvent::BatchCompleted { batch_id, .. }
            | CurationEvent::LogLine { batch_id, .. } => *batch_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps a tokio broadcast channel. Slow subscribers lag and lose the oldest
/// events instead of blocking the batch.
///
/// # Examples
///
/// ```
/// use lexi_common::events::EventBus;
///
/// let bus = EventBus::new(100);
/// let _rx = bus.subscribe();
/// assert_eq!(bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CurationEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CurationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: CurationEvent,
    ) -> Result<usize, broadcast::error::SendError<CurationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: CurationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_line(message: &str) -> CurationEvent {
        CurationEvent::LogLine {
            batch_id: Uuid::nil(),
            level: "info".to_string(),
            message: message.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_emit_without_subscribers_fails() {
        let bus = EventBus::new(10);
        assert!(bus.emit(log_line("nobody listens")).is_err());
        // Lossy variant never reports failure
        bus.emit_lossy(log_line("still fine"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(log_line("first"));
        bus.emit_lossy(log_line("second"));

        for expected in ["first", "second"] {
            match rx.recv().await.expect("event should arrive") {
                CurationEvent::LogLine { message, .. } => assert_eq!(message, expected),
                other => panic!("unexpected event {:?}", other.event_type()),
            }
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = CurationEvent::BatchProgress {
            batch_id: Uuid::nil(),
            progress: ProgressSnapshot {
                total: 4,
                processed: 2,
                successful: 1,
                failed: 1,
                ..Default::default()
            },
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "BatchProgress");
        assert_eq!(json["progress"]["processed"], 2);
        assert_eq!(event.event_type(), "BatchProgress");
    }

    #[test]
    fn test_progress_fraction() {
        let empty = ProgressSnapshot::default();
        assert_eq!(empty.fraction(), 1.0);

        let half = ProgressSnapshot {
            total: 4,
            processed: 2,
            ..Default::default()
        };
        assert!((half.fraction() - 0.5).abs() < f64::EPSILON);
    }
}
