//! # Upstream Gateway Library
//!
//! Keeps a bearer-token session with an upstream chat API alive, executes
//! outbound calls with bounded latency and classified failures, caches
//! configuration, turns model replies into validated follow-up suggestions
//! and gates resources behind passwords with short-lived access tokens.
//!
//! Modules:
//! - `token`: token pair, JWT expiry and the single-flight refresh manager
//! - `executor`: authenticated, deadline bound outbound calls
//! - `cache`: TTL cache with read-through and background sweep
//! - `generation`: structured follow-up suggestion pipeline
//! - `access`: resource passwords and access tokens
//! - `upstream`: chat API client
//! - `config`: YAML + environment configuration

pub mod access;
pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod generation;
pub mod helpers;
pub mod observability;
pub mod resilience;
pub mod token;
pub mod upstream;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::error::{AccessError, ExecutorError, GenerationError, TokenRefreshError};
pub use crate::gateway::Gateway;
