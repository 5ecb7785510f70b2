//! lexi-curator library interface
//!
//! Exposes the pipeline, store and HTTP router for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;
pub mod vocabulary;

pub use crate::error::{ApiError, ApiResult, CurationError};

use axum::Router;
use chrono::{DateTime, Utc};
use lexi_common::events::EventBus;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{BatchConfig, BatchSession};
use crate::services::{BatchControl, BatchOrchestrator};

/// Service name used for the TOML file and root folder resolution
pub const SERVICE_NAME: &str = "lexi-curator";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5731;

/// A batch started through the API
#[derive(Clone)]
pub struct BatchHandle {
    pub control: BatchControl,
    pub session: Arc<RwLock<BatchSession>>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: Arc<BatchOrchestrator>,
    /// Configuration applied when a start request carries none
    pub batch_defaults: BatchConfig,
    /// Batches started in this process, keyed by batch id
    pub batches: Arc<RwLock<HashMap<Uuid, BatchHandle>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<BatchOrchestrator>) -> Self {
        let services = orchestrator.services();
        Self {
            db: services.store.pool().clone(),
            event_bus: services.event_bus.clone(),
            orchestrator,
            batch_defaults: BatchConfig::default(),
            batches: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_batch_defaults(mut self, batch_defaults: BatchConfig) -> Self {
        self.batch_defaults = batch_defaults;
        self
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::batch_routes())
        .merge(api::library_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
}
