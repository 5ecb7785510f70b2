//! Best-effort observer fan-out
//!
//! Each observer gets its own bounded queue and delivery task, so a slow or
//! failing observer never stalls the pipeline or other observers. Events that
//! do not fit in a full queue are dropped for that observer.

use lexi_common::events::CurationEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const OBSERVER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

/// Receives progress snapshots, candidate lists, selections and log lines
pub trait BatchObserver: Send + Sync {
    fn name(&self) -> &str {
        "observer"
    }

    fn on_event(&self, event: &CurationEvent) -> Result<(), ObserverError>;
}

struct Registered {
    name: String,
    tx: mpsc::Sender<CurationEvent>,
}

/// Registered observers; must be created inside a tokio runtime
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Registered>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn register(&mut self, observer: Arc<dyn BatchObserver>) {
        let name = observer.name().to_string();
        let (tx, mut rx) = mpsc::channel::<CurationEvent>(OBSERVER_QUEUE_CAPACITY);

        let task_name = name.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = observer.on_event(&event) {
                    tracing::warn!(
                        observer = %task_name,
                        event_type = event.event_type(),
                        "Observer failed: {}",
                        e
                    );
                }
            }
        });

        self.observers.push(Registered { name, tx });
    }

    /// Hand an event to every observer without waiting
    pub fn notify(&self, event: &CurationEvent) {
        for observer in &self.observers {
            match observer.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!(observer = %observer.name, "Observer queue full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(observer = %observer.name, "Observer gone, dropping event");
                }
            }
        }
    }
}
