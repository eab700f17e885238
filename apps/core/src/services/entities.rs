//! Entity CRUD.
//!
//! Reads return entities owned by the caller plus every `system` entity.
//! Writes only ever touch rows owned by the caller.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

use super::context::ServiceContext;
use crate::error::AppError;
use crate::models::{Entity, EntityUpdate, NewEntity};

#[derive(Debug, FromRow)]
struct SynonymRow {
    entity_id: String,
    value: String,
}

/// Comparison key for synonyms; duplicates differ only by case.
fn synonym_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Trims, drops blanks, and removes case-insensitive duplicates, keeping first occurrence.
pub(crate) fn normalize_synonyms(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(synonym_key(v)))
        .map(str::to_string)
        .collect()
}

async fn insert_synonyms(
    conn: &mut SqliteConnection,
    entity_id: &str,
    synonyms: &[String],
) -> Result<(), AppError> {
    for value in synonyms {
        sqlx::query("INSERT OR IGNORE INTO entity_synonyms (entity_id, value) VALUES (?, ?)")
            .bind(entity_id)
            .bind(value)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn load_synonyms(
    conn: &mut SqliteConnection,
    entity_id: &str,
) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query_as::<_, SynonymRow>(
        "SELECT entity_id, value FROM entity_synonyms WHERE entity_id = ? ORDER BY id ASC",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|r| r.value).collect())
}

/// Fails with `NotFound` unless `entity_id` is a custom entity owned by `user_id`.
async fn ensure_owned(
    conn: &mut SqliteConnection,
    entity_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    let owned: Option<(String,)> =
        sqlx::query_as("SELECT id FROM entities WHERE id = ? AND user_id = ?")
            .bind(entity_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    owned
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound(format!("entity {}", entity_id)))
}

#[instrument(skip(ctx, new_entity), fields(name = %new_entity.name))]
pub async fn create_entity(ctx: &ServiceContext, new_entity: NewEntity) -> Result<Entity, AppError> {
    let user = ctx.require_user().await?;
    new_entity.check()?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();
    let synonyms = normalize_synonyms(&new_entity.synonyms);

    let mut tx = ctx.pool().begin().await?;

    let mut entity = sqlx::query_as::<_, Entity>(
        r#"
        INSERT INTO entities (id, name, display_name, entity_type, description, category, user_id, created_at, updated_at)
        VALUES (?, ?, ?, 'custom', ?, ?, ?, ?, ?)
        RETURNING id, name, display_name, entity_type, description, category, user_id, created_at, updated_at
        "#,
    )
    .bind(&id)
    .bind(new_entity.name.trim())
    .bind(new_entity.display_name.trim())
    .bind(&new_entity.description)
    .bind(&new_entity.category)
    .bind(&user.id)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    insert_synonyms(&mut tx, &id, &synonyms).await?;
    tx.commit().await?;

    entity.synonyms = synonyms;
    info!("Created entity {} ({} synonyms)", entity.id, entity.synonyms.len());
    Ok(entity)
}

/// Lists the caller's custom entities and all system entities, with synonyms.
pub async fn list_entities(ctx: &ServiceContext) -> Result<Vec<Entity>, AppError> {
    let user = ctx.require_user().await?;

    let mut entities = sqlx::query_as::<_, Entity>(
        r#"
        SELECT id, name, display_name, entity_type, description, category, user_id, created_at, updated_at
        FROM entities
        WHERE user_id = ? OR entity_type = 'system'
        ORDER BY entity_type ASC, name ASC
        "#,
    )
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    let rows = sqlx::query_as::<_, SynonymRow>(
        r#"
        SELECT s.entity_id, s.value
        FROM entity_synonyms s
        JOIN entities e ON e.id = s.entity_id
        WHERE e.user_id = ? OR e.entity_type = 'system'
        ORDER BY s.id ASC
        "#,
    )
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    let mut by_entity: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        by_entity.entry(row.entity_id).or_default().push(row.value);
    }
    for entity in &mut entities {
        if let Some(synonyms) = by_entity.remove(&entity.id) {
            entity.synonyms = synonyms;
        }
    }

    Ok(entities)
}

pub async fn get_entity(ctx: &ServiceContext, id: &str) -> Result<Entity, AppError> {
    let user = ctx.require_user().await?;
    let mut conn = ctx.pool().acquire().await?;

    let mut entity = sqlx::query_as::<_, Entity>(
        r#"
        SELECT id, name, display_name, entity_type, description, category, user_id, created_at, updated_at
        FROM entities
        WHERE id = ? AND (user_id = ? OR entity_type = 'system')
        "#,
    )
    .bind(id)
    .bind(&user.id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("entity {}", id)))?;

    entity.synonyms = load_synonyms(&mut conn, id).await?;
    Ok(entity)
}

#[instrument(skip(ctx, update))]
pub async fn update_entity(
    ctx: &ServiceContext,
    id: &str,
    update: EntityUpdate,
) -> Result<Entity, AppError> {
    let user = ctx.require_user().await?;
    update.check()?;

    let mut tx = ctx.pool().begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE entities
        SET display_name = COALESCE(?, display_name),
            description = CASE WHEN ? IS NULL THEN description ELSE NULLIF(TRIM(?), '') END,
            category = CASE WHEN ? IS NULL THEN category ELSE NULLIF(TRIM(?), '') END,
            updated_at = ?
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(update.display_name.as_deref().map(str::trim))
    .bind(&update.description)
    .bind(&update.description)
    .bind(&update.category)
    .bind(&update.category)
    .bind(Utc::now().timestamp())
    .bind(id)
    .bind(&user.id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("entity {}", id)));
    }

    if let Some(synonyms) = &update.synonyms {
        sqlx::query("DELETE FROM entity_synonyms WHERE entity_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_synonyms(&mut tx, id, &normalize_synonyms(synonyms)).await?;
    }

    tx.commit().await?;
    info!("Updated entity {}", id);

    get_entity(ctx, id).await
}

#[instrument(skip(ctx))]
pub async fn delete_entity(ctx: &ServiceContext, id: &str) -> Result<(), AppError> {
    let user = ctx.require_user().await?;

    let result = sqlx::query("DELETE FROM entities WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(&user.id)
        .execute(ctx.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("entity {}", id)));
    }
    info!("Deleted entity {}", id);
    Ok(())
}

/// Adds a synonym to one of the caller's entities. Adding an existing value is a no-op.
pub async fn add_synonym(
    ctx: &ServiceContext,
    entity_id: &str,
    value: &str,
) -> Result<Vec<String>, AppError> {
    let user = ctx.require_user().await?;
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation("Synonym must not be empty".to_string()));
    }

    let mut conn = ctx.pool().acquire().await?;
    ensure_owned(&mut conn, entity_id, &user.id).await?;

    let existing = load_synonyms(&mut conn, entity_id).await?;
    let key = synonym_key(value);
    if !existing.iter().any(|s| synonym_key(s) == key) {
        insert_synonyms(&mut conn, entity_id, &[value.to_string()]).await?;
    }

    load_synonyms(&mut conn, entity_id).await
}

pub async fn remove_synonym(
    ctx: &ServiceContext,
    entity_id: &str,
    value: &str,
) -> Result<Vec<String>, AppError> {
    let user = ctx.require_user().await?;
    let mut conn = ctx.pool().acquire().await?;
    ensure_owned(&mut conn, entity_id, &user.id).await?;

    sqlx::query("DELETE FROM entity_synonyms WHERE entity_id = ? AND value = ?")
        .bind(entity_id)
        .bind(value.trim())
        .execute(&mut *conn)
        .await?;

    load_synonyms(&mut conn, entity_id).await
}
