//! Entity usage analytics.
//!
//! One `entity_analytics` row per entity per day. Aggregation happens in
//! process over the rows of a trailing-day window.

use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::context::ServiceContext;
use crate::error::AppError;
use crate::models::EntityAnalyticsRecord;

/// Accuracy recorded for the first usage of an entity on a given day.
pub const DEFAULT_ACCURACY_SCORE: f64 = 0.8;

const MAX_WINDOW_DAYS: u32 = 3650;

const UNCATEGORIZED: &str = "uncategorized";

/// One analytics row joined with its entity metadata.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRow {
    pub entity_id: String,
    pub entity_name: String,
    pub display_name: String,
    pub category: Option<String>,
    pub date_tracked: String,
    pub usage_count: i64,
    pub accuracy_score: f64,
    pub last_used_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStats {
    pub entity_id: String,
    pub name: String,
    pub display_name: String,
    pub category: Option<String>,
    pub usage_count: i64,
    /// Mean of the entity's daily accuracy scores.
    pub accuracy_score: f64,
    pub last_used_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub window_days: u32,
    /// First day included in the window, `YYYY-MM-DD`.
    pub since: String,
    pub total_detections: i64,
    pub average_accuracy: f64,
    pub top_categories: Vec<CategoryCount>,
    pub entities: Vec<EntityStats>,
}

/// Parses `"7d"` (or a bare `"7"`) into a day count.
pub fn parse_window(window: &str) -> Result<u32, AppError> {
    let trimmed = window.trim();
    let digits = trimmed
        .strip_suffix('d')
        .or_else(|| trimmed.strip_suffix('D'))
        .unwrap_or(trimmed);

    let days: u32 = digits
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid analytics window '{}'", window)))?;

    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(AppError::Validation(format!(
            "Analytics window must be between 1 and {} days, got {}",
            MAX_WINDOW_DAYS, days
        )));
    }
    Ok(days)
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Folds rows into per-entity stats and the summary figures.
///
/// Entities and categories keep first-appearance order; categories are then
/// stably sorted by descending count, so ties keep that order.
pub fn summarize(window_days: u32, since: String, rows: &[UsageRow]) -> AnalyticsSummary {
    struct Acc {
        stats: EntityStats,
        accuracy_sum: f64,
        samples: u32,
    }

    let mut order: Vec<String> = Vec::new();
    let mut by_entity: HashMap<String, Acc> = HashMap::new();

    for row in rows {
        let acc = by_entity.entry(row.entity_id.clone()).or_insert_with(|| {
            order.push(row.entity_id.clone());
            Acc {
                stats: EntityStats {
                    entity_id: row.entity_id.clone(),
                    name: row.entity_name.clone(),
                    display_name: row.display_name.clone(),
                    category: row.category.clone(),
                    usage_count: 0,
                    accuracy_score: 0.0,
                    last_used_at: 0,
                },
                accuracy_sum: 0.0,
                samples: 0,
            }
        });
        acc.stats.usage_count += row.usage_count;
        acc.stats.last_used_at = acc.stats.last_used_at.max(row.last_used_at);
        acc.accuracy_sum += row.accuracy_score;
        acc.samples += 1;
    }

    let entities: Vec<EntityStats> = order
        .iter()
        .filter_map(|id| by_entity.remove(id))
        .map(|mut acc| {
            acc.stats.accuracy_score = acc.accuracy_sum / f64::from(acc.samples.max(1));
            acc.stats
        })
        .collect();

    let total_detections = entities.iter().map(|e| e.usage_count).sum();

    let average_accuracy = if entities.is_empty() {
        0.0
    } else {
        entities.iter().map(|e| e.accuracy_score).sum::<f64>() / entities.len() as f64
    };

    let mut top_categories: Vec<CategoryCount> = Vec::new();
    for entity in &entities {
        let category = entity.category.as_deref().unwrap_or(UNCATEGORIZED);
        match top_categories.iter_mut().find(|c| c.category == category) {
            Some(existing) => existing.count += entity.usage_count,
            None => top_categories.push(CategoryCount {
                category: category.to_string(),
                count: entity.usage_count,
            }),
        }
    }
    top_categories.sort_by(|a, b| b.count.cmp(&a.count));

    AnalyticsSummary {
        window_days,
        since,
        total_detections,
        average_accuracy,
        top_categories,
        entities,
    }
}

/// Analytics for the trailing window ending today (UTC).
pub async fn get_entity_analytics(
    ctx: &ServiceContext,
    window: &str,
) -> Result<AnalyticsSummary, AppError> {
    get_entity_analytics_as_of(ctx, window, Utc::now().date_naive()).await
}

#[instrument(skip(ctx))]
pub async fn get_entity_analytics_as_of(
    ctx: &ServiceContext,
    window: &str,
    today: NaiveDate,
) -> Result<AnalyticsSummary, AppError> {
    let user = ctx.require_user().await?;
    let days = parse_window(window)?;
    let since = today
        .checked_sub_days(Days::new(u64::from(days)))
        .map(day_key)
        .ok_or_else(|| AppError::Validation(format!("Window {} reaches before the calendar", window)))?;

    let rows = sqlx::query_as::<_, UsageRow>(
        r#"
        SELECT a.entity_id, e.name AS entity_name, e.display_name, e.category,
               a.date_tracked, a.usage_count, a.accuracy_score, a.last_used_at
        FROM entity_analytics a
        JOIN entities e ON e.id = a.entity_id
        WHERE a.date_tracked >= ? AND (e.user_id = ? OR e.entity_type = 'system')
        ORDER BY a.date_tracked ASC, a.rowid ASC
        "#,
    )
    .bind(&since)
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    debug!("Aggregating {} analytics rows since {}", rows.len(), since);
    Ok(summarize(days, since, &rows))
}

/// Records one usage of `entity_id` today (UTC).
pub async fn track_entity_usage(
    ctx: &ServiceContext,
    entity_id: &str,
) -> Result<EntityAnalyticsRecord, AppError> {
    track_entity_usage_on(ctx, entity_id, Utc::now().date_naive()).await
}

/// Upsert-by-day: increments the day's row, or creates it with a count of 1.
///
/// A single statement, so concurrent calls for the same entity and day do not lose updates.
#[instrument(skip(ctx))]
pub async fn track_entity_usage_on(
    ctx: &ServiceContext,
    entity_id: &str,
    day: NaiveDate,
) -> Result<EntityAnalyticsRecord, AppError> {
    let user = ctx.require_user().await?;

    let visible: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM entities WHERE id = ? AND (user_id = ? OR entity_type = 'system')",
    )
    .bind(entity_id)
    .bind(&user.id)
    .fetch_optional(ctx.pool())
    .await?;
    if visible.is_none() {
        return Err(AppError::NotFound(format!("entity {}", entity_id)));
    }

    let record = sqlx::query_as::<_, EntityAnalyticsRecord>(
        r#"
        INSERT INTO entity_analytics (id, entity_id, date_tracked, usage_count, accuracy_score, last_used_at)
        VALUES (?, ?, ?, 1, ?, ?)
        ON CONFLICT(entity_id, date_tracked) DO UPDATE
        SET usage_count = usage_count + 1,
            last_used_at = excluded.last_used_at
        RETURNING id, entity_id, date_tracked, usage_count, accuracy_score, last_used_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entity_id)
    .bind(day_key(day))
    .bind(DEFAULT_ACCURACY_SCORE)
    .bind(Utc::now().timestamp())
    .fetch_one(ctx.pool())
    .await?;

    debug!(
        "Entity {} used {} time(s) on {}",
        entity_id, record.usage_count, record.date_tracked
    );
    Ok(record)
}

/// All daily rows of one visible entity, oldest first.
pub async fn get_usage_records(
    ctx: &ServiceContext,
    entity_id: &str,
) -> Result<Vec<EntityAnalyticsRecord>, AppError> {
    let user = ctx.require_user().await?;

    let records = sqlx::query_as::<_, EntityAnalyticsRecord>(
        r#"
        SELECT a.id, a.entity_id, a.date_tracked, a.usage_count, a.accuracy_score, a.last_used_at
        FROM entity_analytics a
        JOIN entities e ON e.id = a.entity_id
        WHERE a.entity_id = ? AND (e.user_id = ? OR e.entity_type = 'system')
        ORDER BY a.date_tracked ASC
        "#,
    )
    .bind(entity_id)
    .bind(&user.id)
    .fetch_all(ctx.pool())
    .await?;

    Ok(records)
}
