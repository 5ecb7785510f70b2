//! # Lexi Common Library
//!
//! Shared code for the Lexi vocabulary services:
//! - Error and result types
//! - Root folder / TOML configuration resolution
//! - Database pool initialization and the settings table
//! - Curation event types (CurationEvent enum) and the EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
