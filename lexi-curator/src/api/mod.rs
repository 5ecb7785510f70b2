//! HTTP API handlers for lexi-curator
//!
//! REST endpoints for batches and the curation library, plus an SSE stream
//! of curation events.

pub mod batch;
pub mod health;
pub mod library;
pub mod sse;

pub use batch::batch_routes;
pub use health::health_routes;
pub use library::library_routes;
pub use sse::event_stream;
