//! Detection against the caller's entity catalog, with audit logging and usage tracking.

use tracing::{info, warn};

use super::detector::{DetectionOptions, DetectionResult, EntityDetector};
use crate::error::AppError;
use crate::models::{ConversationLog, NewConversationLog};
use crate::services::{analytics, conversation_logs, entities, ServiceContext};

/// Output of [`ConversationAnalyzer::analyze_and_log`].
#[derive(Debug)]
pub struct AnalyzedInput {
    pub detection: DetectionResult,
    pub log: ConversationLog,
}

pub struct ConversationAnalyzer {
    detector: EntityDetector,
}

impl Default for ConversationAnalyzer {
    fn default() -> Self {
        Self::new(EntityDetector::new())
    }
}

impl ConversationAnalyzer {
    pub fn new(detector: EntityDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &EntityDetector {
        &self.detector
    }

    /// Runs detection with the caller's catalog. Never fails: when the catalog
    /// cannot be loaded, only the built-in patterns are applied.
    pub async fn detect(
        &self,
        ctx: &ServiceContext,
        text: &str,
        options: &DetectionOptions,
    ) -> DetectionResult {
        let catalog = match entities::list_entities(ctx).await {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!("Entity catalog unavailable, using patterns only: {}", e);
                Vec::new()
            }
        };
        self.detector.detect_with_entities(text, options, &catalog)
    }

    /// Detects, appends a conversation log, and records one usage per matched catalog entity.
    pub async fn analyze_and_log(
        &self,
        ctx: &ServiceContext,
        text: &str,
        options: &DetectionOptions,
    ) -> Result<AnalyzedInput, AppError> {
        ctx.require_user().await?;

        let detection = self.detect(ctx, text, options).await;

        let log = conversation_logs::create_conversation_log(
            ctx,
            NewConversationLog {
                user_input: text.to_string(),
                detected_entities: detection.entities.clone(),
                missing_entities: detection.missing_entities.clone(),
                confidence_scores: detection.confidence_scores(),
                language: detection.language.clone(),
            },
        )
        .await?;

        let matched = detection.matched_entity_ids();
        for entity_id in &matched {
            analytics::track_entity_usage(ctx, entity_id).await?;
        }

        info!(
            "Analyzed input: {} entities, {} catalog entities tracked",
            detection.entities.len(),
            matched.len()
        );

        Ok(AnalyzedInput { detection, log })
    }
}
