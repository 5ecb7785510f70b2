//! Database access shared by Lexi services

pub mod init;

pub use init::{create_settings_table, init_database};
