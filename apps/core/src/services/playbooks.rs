use chrono::Utc;
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;

use super::context::ServiceContext;
use crate::error::AppError;
use crate::models::{NewPlaybook, Playbook};

#[instrument(skip(ctx, playbook), fields(name = %playbook.name))]
pub async fn create_playbook(
    ctx: &ServiceContext,
    playbook: NewPlaybook,
) -> Result<Playbook, AppError> {
    let user = ctx.require_user().await?;
    playbook.check()?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    let created = sqlx::query_as::<_, Playbook>(
        r#"
        INSERT INTO playbooks (id, user_id, name, description, body, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id, user_id, name, description, body, created_at, updated_at
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(playbook.name.trim())
    .bind(&playbook.description)
    .bind(Json(&playbook.instruction))
    .bind(now)
    .bind(now)
    .fetch_one(ctx.pool())
    .await?;

    info!("Created playbook {} ({} steps)", created.id, created.body.steps.len());
    Ok(created)
}

pub async fn list_playbooks(ctx: &ServiceContext) -> Result<Vec<Playbook>, AppError> {
    let user = ctx.require_user().await?;

    let playbooks = sqlx::query_as::<_, Playbook>(
        r#"
        SELECT id, user_id, name, description, body, created_at, updated_at
        FROM playbooks
        WHERE user_id = ?
        ORDER BY updated_at DESC, name ASC
        "#,
    )
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    Ok(playbooks)
}

pub async fn get_playbook(ctx: &ServiceContext, id: &str) -> Result<Playbook, AppError> {
    let user = ctx.require_user().await?;

    sqlx::query_as::<_, Playbook>(
        r#"
        SELECT id, user_id, name, description, body, created_at, updated_at
        FROM playbooks
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(&user.id)
    .fetch_optional(ctx.pool())
    .await?
    .ok_or_else(|| AppError::NotFound(format!("playbook {}", id)))
}

/// Replaces name, description and body of one of the caller's playbooks.
#[instrument(skip(ctx, playbook))]
pub async fn update_playbook(
    ctx: &ServiceContext,
    id: &str,
    playbook: NewPlaybook,
) -> Result<Playbook, AppError> {
    let user = ctx.require_user().await?;
    playbook.check()?;

    sqlx::query_as::<_, Playbook>(
        r#"
        UPDATE playbooks
        SET name = ?, description = ?, body = ?, updated_at = ?
        WHERE id = ? AND user_id = ?
        RETURNING id, user_id, name, description, body, created_at, updated_at
        "#,
    )
    .bind(playbook.name.trim())
    .bind(&playbook.description)
    .bind(Json(&playbook.instruction))
    .bind(Utc::now().timestamp())
    .bind(id)
    .bind(&user.id)
    .fetch_optional(ctx.pool())
    .await?
    .ok_or_else(|| AppError::NotFound(format!("playbook {}", id)))
}

pub async fn delete_playbook(ctx: &ServiceContext, id: &str) -> Result<(), AppError> {
    let user = ctx.require_user().await?;

    let result = sqlx::query("DELETE FROM playbooks WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(&user.id)
        .execute(ctx.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("playbook {}", id)));
    }
    info!("Deleted playbook {}", id);
    Ok(())
}
