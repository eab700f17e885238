//! Test Module
//!
//! Test suite for the IntentForge core.
//!
//! ## Test Categories
//! - `detection_tests`: pattern detection properties, catalog matching, analyzer logging
//! - `database_tests`: CRUD for entities, intents, conversation logs, playbooks; auth checks
//! - `analytics_tests`: usage tracking and window aggregation
//! - `export_tests`: CSV and JSON export and import

pub mod database_tests;

use crate::database;
use crate::services::{ServiceContext, StaticAuth};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// A migrated database living in a temporary directory.
///
/// The directory is removed when the value is dropped, so keep it alive for
/// the whole test.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

impl TestDb {
    pub fn ctx(&self, user_id: &str) -> ServiceContext {
        ServiceContext::new(self.pool.clone(), Arc::new(StaticAuth::user(user_id)))
    }

    pub fn anonymous(&self) -> ServiceContext {
        ServiceContext::new(self.pool.clone(), Arc::new(StaticAuth::anonymous()))
    }

    pub async fn count(&self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to count rows")
    }
}

/// Create a test database with migrations applied
pub async fn create_test_db() -> TestDb {
    let dir = tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.sqlite");
    let db_url = format!("sqlite://{}", db_path.display());

    let pool = database::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    TestDb { pool, _dir: dir }
}
