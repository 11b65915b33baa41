// ABOUTME: Library root for imgferry - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod error;
pub mod local;
pub mod output;
pub mod progress;
pub mod registry;
pub mod runtime;
pub mod transfer;
pub mod types;
