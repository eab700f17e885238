use chrono::Utc;
use sqlx::types::Json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::context::ServiceContext;
use crate::error::AppError;
use crate::models::{ConversationLog, NewConversationLog};

/// Appends an audit record of a detection run.
#[instrument(skip(ctx, log))]
pub async fn create_conversation_log(
    ctx: &ServiceContext,
    log: NewConversationLog,
) -> Result<ConversationLog, AppError> {
    let user = ctx.require_user().await?;
    log.validate()?;

    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now().timestamp();

    let record = sqlx::query_as::<_, ConversationLog>(
        r#"
        INSERT INTO conversation_logs (id, user_id, user_input, detected_entities, missing_entities,
                                       confidence_scores, language, processed, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)
        RETURNING id, user_id, user_input, detected_entities, missing_entities,
                  confidence_scores, language, processed, created_at
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(&log.user_input)
    .bind(Json(&log.detected_entities))
    .bind(Json(&log.missing_entities))
    .bind(Json(&log.confidence_scores))
    .bind(&log.language)
    .bind(created_at)
    .fetch_one(ctx.pool())
    .await?;

    info!(
        "Logged conversation {} ({} entities, {} missing)",
        record.id,
        record.detected_entities.len(),
        record.missing_entities.len()
    );
    Ok(record)
}

/// The caller's logs, newest first.
pub async fn list_conversation_logs(
    ctx: &ServiceContext,
    limit: i64,
) -> Result<Vec<ConversationLog>, AppError> {
    let user = ctx.require_user().await?;

    let logs = sqlx::query_as::<_, ConversationLog>(
        r#"
        SELECT id, user_id, user_input, detected_entities, missing_entities,
               confidence_scores, language, processed, created_at
        FROM conversation_logs
        WHERE user_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(&user.id)
    .bind(limit.max(0))
    .fetch_all(ctx.pool())
    .await?;

    Ok(logs)
}

pub async fn get_conversation_log(
    ctx: &ServiceContext,
    id: &str,
) -> Result<ConversationLog, AppError> {
    let user = ctx.require_user().await?;

    sqlx::query_as::<_, ConversationLog>(
        r#"
        SELECT id, user_id, user_input, detected_entities, missing_entities,
               confidence_scores, language, processed, created_at
        FROM conversation_logs
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(&user.id)
    .fetch_optional(ctx.pool())
    .await?
    .ok_or_else(|| AppError::NotFound(format!("conversation log {}", id)))
}

/// Flags a log as processed. The only mutation a log allows.
pub async fn mark_processed(ctx: &ServiceContext, id: &str) -> Result<(), AppError> {
    let user = ctx.require_user().await?;

    let result =
        sqlx::query("UPDATE conversation_logs SET processed = 1 WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(&user.id)
            .execute(ctx.pool())
            .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("conversation log {}", id)));
    }
    Ok(())
}

pub async fn delete_conversation_log(ctx: &ServiceContext, id: &str) -> Result<(), AppError> {
    let user = ctx.require_user().await?;

    let result = sqlx::query("DELETE FROM conversation_logs WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(&user.id)
        .execute(ctx.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("conversation log {}", id)));
    }
    info!("Deleted conversation log {}", id);
    Ok(())
}
