//! # IntentForge Core
//!
//! Storage, detection and export for conversational-AI assets: entities,
//! intents with annotated training phrases, conversation logs, usage
//! analytics and playbooks.
//!
//! Every backend call goes through an explicit [`services::ServiceContext`]
//! carrying the SQLite pool and the auth provider.

pub mod config;
pub mod database;
pub mod detection;
pub mod error;
pub mod export;
pub mod fs_manager;
pub mod models;
pub mod services;
pub mod telemetry;

pub use error::AppError;

#[cfg(test)]
mod tests;
