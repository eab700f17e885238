use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

use crate::error::AppError;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

/// Resolves the current user.
///
/// Implementations may consult a session store, a token, or a fixed value.
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Returns the authenticated user, or `None` when nobody is signed in.
    async fn current_user(&self) -> Option<AuthUser>;
}

/// An auth provider with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<AuthUser>,
}

impl StaticAuth {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user: Some(AuthUser::new(id)),
        }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn current_user(&self) -> Option<AuthUser> {
        self.user.clone()
    }
}

/// Backend handle and auth provider, threaded explicitly through every service call.
#[derive(Clone)]
pub struct ServiceContext {
    pool: SqlitePool,
    auth: Arc<dyn AuthProvider>,
}

impl ServiceContext {
    pub fn new(pool: SqlitePool, auth: Arc<dyn AuthProvider>) -> Self {
        Self { pool, auth }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Same backend, different caller.
    pub fn with_auth(&self, auth: Arc<dyn AuthProvider>) -> Self {
        Self {
            pool: self.pool.clone(),
            auth,
        }
    }

    /// Resolves the current user or fails with [`AppError::NotAuthenticated`].
    pub async fn require_user(&self) -> Result<AuthUser, AppError> {
        self.auth
            .current_user()
            .await
            .ok_or(AppError::NotAuthenticated)
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").finish_non_exhaustive()
    }
}
