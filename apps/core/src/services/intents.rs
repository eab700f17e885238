//! Intent CRUD.
//!
//! An intent is stored across three tables: `intents`, `training_phrases`
//! and `phrase_entities`. Saving writes all three inside one transaction so a
//! failure at any step leaves no partial rows behind.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::context::ServiceContext;
use crate::error::AppError;
use crate::models::{Intent, IntentParameter, IntentSummary, PhraseEntity, TrainingPhrase};

#[derive(Debug, FromRow)]
struct IntentRow {
    id: String,
    user_id: String,
    display_name: String,
    description: String,
    responses: Json<Vec<String>>,
    parameters: Json<Vec<IntentParameter>>,
    contexts: Option<Json<Vec<String>>>,
    events: Option<Json<Vec<String>>>,
    priority: i64,
    is_fallback: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, FromRow)]
struct PhraseRow {
    id: String,
    text: String,
    confidence: Option<f64>,
}

#[derive(Debug, FromRow)]
struct PhraseEntityRow {
    phrase_id: String,
    entity_type: String,
    value: String,
    start_index: i64,
    end_index: i64,
}

fn to_offset(value: i64) -> Result<usize, AppError> {
    usize::try_from(value).map_err(|_| AppError::Internal(format!("Negative span offset {}", value)))
}

fn to_column(value: usize) -> Result<i64, AppError> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("Span offset {} is too large", value)))
}

async fn insert_phrases(
    conn: &mut SqliteConnection,
    intent_id: &str,
    phrases: &[TrainingPhrase],
) -> Result<usize, AppError> {
    let mut span_count = 0;
    for (position, phrase) in phrases.iter().enumerate() {
        let phrase_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO training_phrases (id, intent_id, position, text, confidence)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&phrase_id)
        .bind(intent_id)
        .bind(position as i64)
        .bind(&phrase.text)
        .bind(phrase.confidence)
        .execute(&mut *conn)
        .await?;

        for entity in &phrase.entities {
            sqlx::query(
                r#"
                INSERT INTO phrase_entities (phrase_id, entity_type, value, start_index, end_index)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&phrase_id)
            .bind(&entity.entity_type)
            .bind(&entity.value)
            .bind(to_column(entity.start_index)?)
            .bind(to_column(entity.end_index)?)
            .execute(&mut *conn)
            .await?;
            span_count += 1;
        }
    }
    Ok(span_count)
}

/// Creates or replaces an intent with all its phrases and spans.
///
/// An empty `id` creates a new intent. A known id owned by the caller is
/// replaced, keeping its `created_at`. A known id owned by someone else is
/// reported as `NotFound`.
#[instrument(skip(ctx, intent), fields(display_name = %intent.display_name))]
pub async fn save_intent(ctx: &ServiceContext, intent: Intent) -> Result<Intent, AppError> {
    let user = ctx.require_user().await?;
    intent.check()?;

    let now = Utc::now().timestamp();
    let mut tx = ctx.pool().begin().await?;

    let existing: Option<(String, i64)> = if intent.id.is_empty() {
        None
    } else {
        sqlx::query_as("SELECT user_id, created_at FROM intents WHERE id = ?")
            .bind(&intent.id)
            .fetch_optional(&mut *tx)
            .await?
    };

    let id = match existing {
        Some((owner, _)) if owner != user.id => {
            return Err(AppError::NotFound(format!("intent {}", intent.id)));
        }
        Some(_) => {
            sqlx::query(
                r#"
                UPDATE intents
                SET display_name = ?, description = ?, responses = ?, parameters = ?,
                    contexts = ?, events = ?, priority = ?, is_fallback = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(intent.display_name.trim())
            .bind(&intent.description)
            .bind(Json(&intent.responses))
            .bind(Json(&intent.parameters))
            .bind(intent.contexts.as_ref().map(Json))
            .bind(intent.events.as_ref().map(Json))
            .bind(intent.priority)
            .bind(intent.is_fallback)
            .bind(now)
            .bind(&intent.id)
            .execute(&mut *tx)
            .await?;

            // spans cascade with their phrases
            sqlx::query("DELETE FROM training_phrases WHERE intent_id = ?")
                .bind(&intent.id)
                .execute(&mut *tx)
                .await?;

            intent.id.clone()
        }
        None => {
            let id = if intent.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                intent.id.clone()
            };
            sqlx::query(
                r#"
                INSERT INTO intents (id, user_id, display_name, description, responses, parameters,
                                     contexts, events, priority, is_fallback, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&user.id)
            .bind(intent.display_name.trim())
            .bind(&intent.description)
            .bind(Json(&intent.responses))
            .bind(Json(&intent.parameters))
            .bind(intent.contexts.as_ref().map(Json))
            .bind(intent.events.as_ref().map(Json))
            .bind(intent.priority)
            .bind(intent.is_fallback)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            id
        }
    };

    let span_count = insert_phrases(&mut tx, &id, &intent.training_phrases).await?;
    tx.commit().await?;

    info!(
        "Saved intent {} ({} phrases, {} spans)",
        id,
        intent.training_phrases.len(),
        span_count
    );

    get_intent(ctx, &id).await
}

/// Loads a fully assembled intent owned by the caller.
pub async fn get_intent(ctx: &ServiceContext, id: &str) -> Result<Intent, AppError> {
    let user = ctx.require_user().await?;
    let mut conn = ctx.pool().acquire().await?;

    let row = sqlx::query_as::<_, IntentRow>(
        r#"
        SELECT id, user_id, display_name, description, responses, parameters, contexts, events,
               priority, is_fallback, created_at, updated_at
        FROM intents
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(&user.id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("intent {}", id)))?;

    let phrases = sqlx::query_as::<_, PhraseRow>(
        "SELECT id, text, confidence FROM training_phrases WHERE intent_id = ? ORDER BY position ASC",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let span_rows = sqlx::query_as::<_, PhraseEntityRow>(
        r#"
        SELECT pe.phrase_id, pe.entity_type, pe.value, pe.start_index, pe.end_index
        FROM phrase_entities pe
        JOIN training_phrases p ON p.id = pe.phrase_id
        WHERE p.intent_id = ?
        ORDER BY pe.id ASC
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let mut spans: HashMap<String, Vec<PhraseEntity>> = HashMap::new();
    for span in span_rows {
        spans.entry(span.phrase_id).or_default().push(PhraseEntity {
            entity_type: span.entity_type,
            value: span.value,
            start_index: to_offset(span.start_index)?,
            end_index: to_offset(span.end_index)?,
        });
    }

    let training_phrases = phrases
        .into_iter()
        .map(|p| TrainingPhrase {
            entities: spans.remove(&p.id).unwrap_or_default(),
            id: p.id,
            text: p.text,
            confidence: p.confidence,
        })
        .collect();

    debug!("Loaded intent {}", row.id);

    Ok(Intent {
        id: row.id,
        display_name: row.display_name,
        description: row.description,
        training_phrases,
        responses: row.responses.0,
        parameters: row.parameters.0,
        contexts: row.contexts.map(|c| c.0),
        events: row.events.map(|e| e.0),
        priority: row.priority,
        is_fallback: row.is_fallback,
        user_id: Some(row.user_id),
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Lists the caller's intents, most recently updated first.
pub async fn list_intents(ctx: &ServiceContext) -> Result<Vec<IntentSummary>, AppError> {
    let user = ctx.require_user().await?;

    let summaries = sqlx::query_as::<_, IntentSummary>(
        r#"
        SELECT i.id, i.display_name, i.description, i.priority, i.is_fallback,
               (SELECT COUNT(*) FROM training_phrases p WHERE p.intent_id = i.id) AS phrase_count,
               i.updated_at
        FROM intents i
        WHERE i.user_id = ?
        ORDER BY i.updated_at DESC, i.display_name ASC
        "#,
    )
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    Ok(summaries)
}

/// Loads every intent of the caller, fully assembled.
pub async fn load_all_intents(ctx: &ServiceContext) -> Result<Vec<Intent>, AppError> {
    let summaries = list_intents(ctx).await?;
    let mut intents = Vec::with_capacity(summaries.len());
    for summary in summaries {
        intents.push(get_intent(ctx, &summary.id).await?);
    }
    Ok(intents)
}

#[instrument(skip(ctx))]
pub async fn delete_intent(ctx: &ServiceContext, id: &str) -> Result<(), AppError> {
    let user = ctx.require_user().await?;

    let result = sqlx::query("DELETE FROM intents WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(&user.id)
        .execute(ctx.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("intent {}", id)));
    }
    info!("Deleted intent {}", id);
    Ok(())
}

/// Saves each parsed intent as a new intent of the caller. Stops at the first failure.
pub async fn import_intents(
    ctx: &ServiceContext,
    intents: Vec<Intent>,
) -> Result<Vec<Intent>, AppError> {
    ctx.require_user().await?;
    let mut saved = Vec::with_capacity(intents.len());
    for mut intent in intents {
        intent.id.clear();
        saved.push(save_intent(ctx, intent).await?);
    }
    info!("Imported {} intents", saved.len());
    Ok(saved)
}
