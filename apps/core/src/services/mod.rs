//! # Services
//!
//! Backend operations scoped to the authenticated caller. Every function takes
//! a [`ServiceContext`] and fails with `AppError::NotAuthenticated` before
//! touching the database when no user is signed in.
//!
//! ## Components
//! - `context`: auth provider trait and the context handle
//! - `entities`: entity and synonym CRUD
//! - `intents`: intent CRUD with transactional save
//! - `conversation_logs`: detection audit records
//! - `analytics`: per-day usage tracking and aggregation
//! - `playbooks`: playbook template CRUD

pub mod analytics;
pub mod context;
pub mod conversation_logs;
pub mod entities;
pub mod intents;
pub mod playbooks;

pub use analytics::AnalyticsSummary;
pub use context::{AuthProvider, AuthUser, ServiceContext, StaticAuth};
