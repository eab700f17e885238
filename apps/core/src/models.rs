use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::fmt;
use validator::Validate;

use crate::error::AppError;

/// Rejects values that are empty once trimmed; stored names are trimmed.
fn require_text(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} must not be blank", field)));
    }
    Ok(())
}

/// Ownership class of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EntityType {
    /// Global, built-in entity visible to every user.
    System,
    /// User-defined entity, visible to its owner only.
    Custom,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::System => "system",
            EntityType::Custom => "custom",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed, named category of text recognized within user input.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entity {
    /// The unique identifier for the entity (UUID, or `sys-*` for seeded system entities).
    pub id: String,
    /// Machine name, used as the entity type of detected spans.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// Whether the entity is global or user-owned.
    pub entity_type: EntityType,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Alternate values considered equivalent to the canonical name.
    #[sqlx(skip)]
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// Owner of a custom entity. `None` for system entities.
    pub user_id: Option<String>,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// Unix timestamp of the last update.
    pub updated_at: i64,
}

/// Input for creating a custom entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewEntity {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl NewEntity {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        require_text("name", &self.name)?;
        require_text("display_name", &self.display_name)
    }
}

/// Partial update of an entity. `None` leaves the field untouched.
///
/// An empty (or blank) `description` or `category` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct EntityUpdate {
    #[validate(length(min = 1, max = 200))]
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Replaces the whole synonym list when set.
    pub synonyms: Option<Vec<String>>,
}

impl EntityUpdate {
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        match &self.display_name {
            Some(name) => require_text("display_name", name),
            None => Ok(()),
        }
    }
}

/// An annotated span inside a training phrase.
///
/// Offsets are UTF-8 byte offsets into the phrase text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhraseEntity {
    pub entity_type: String,
    pub value: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl PhraseEntity {
    /// Checks `0 <= start < end <= text.len()` and that the span text equals `value`.
    pub fn check_span(&self, text: &str) -> Result<(), AppError> {
        if self.start_index >= self.end_index || self.end_index > text.len() {
            return Err(AppError::Validation(format!(
                "Entity span {}..{} is out of bounds for a phrase of length {}",
                self.start_index,
                self.end_index,
                text.len()
            )));
        }
        match text.get(self.start_index..self.end_index) {
            Some(slice) if slice == self.value => Ok(()),
            Some(slice) => Err(AppError::Validation(format!(
                "Entity value '{}' does not match span text '{}'",
                self.value, slice
            ))),
            None => Err(AppError::Validation(format!(
                "Entity span {}..{} does not fall on character boundaries",
                self.start_index, self.end_index
            ))),
        }
    }
}

/// An example utterance annotated with entity spans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPhrase {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub entities: Vec<PhraseEntity>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl TrainingPhrase {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            entities: Vec::new(),
            confidence: None,
        }
    }

    /// Annotates the first occurrence of `value` in the phrase text.
    pub fn with_entity(mut self, entity_type: &str, value: &str) -> Self {
        if let Some(start) = self.text.find(value) {
            self.entities.push(PhraseEntity {
                entity_type: entity_type.to_string(),
                value: value.to_string(),
                start_index: start,
                end_index: start + value.len(),
            });
        }
        self
    }

    pub fn check_spans(&self) -> Result<(), AppError> {
        if self.text.trim().is_empty() {
            return Err(AppError::Validation(
                "Training phrase text must not be empty".to_string(),
            ));
        }
        self.entities
            .iter()
            .try_for_each(|entity| entity.check_span(&self.text))
    }
}

/// A parameter slot of an intent, filled by an entity value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentParameter {
    pub name: String,
    pub entity_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_priority() -> i64 {
    500_000
}

/// A named conversational action with its example phrases, parameters and responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Empty until the intent is first saved.
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub training_phrases: Vec<TrainingPhrase>,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<IntentParameter>,
    #[serde(default)]
    pub contexts: Option<Vec<String>>,
    #[serde(default)]
    pub events: Option<Vec<String>>,
    #[serde(default = "default_priority")]
    pub priority: i64,
    #[serde(default)]
    pub is_fallback: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

impl Intent {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            display_name: display_name.into(),
            description: String::new(),
            training_phrases: Vec::new(),
            responses: Vec::new(),
            parameters: Vec::new(),
            contexts: None,
            events: None,
            priority: default_priority(),
            is_fallback: false,
            user_id: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    /// Field validation plus span checks on every training phrase.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        require_text("displayName", &self.display_name)?;
        self.training_phrases
            .iter()
            .try_for_each(TrainingPhrase::check_spans)
    }

    /// Total number of annotated spans across all phrases.
    pub fn entity_span_count(&self) -> usize {
        self.training_phrases.iter().map(|p| p.entities.len()).sum()
    }
}

/// Listing row for intents, without nested phrases.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IntentSummary {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub priority: i64,
    pub is_fallback: bool,
    pub phrase_count: i64,
    pub updated_at: i64,
}

/// A single entity match produced by detection.
///
/// `start`/`end` are UTF-8 byte offsets; `text[start..end] == value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub entity_type: String,
    pub value: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    /// Catalog entity this match was attributed to, if any.
    #[serde(default)]
    pub entity_id: Option<String>,
}

/// Append-only audit record of a detection run.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ConversationLog {
    pub id: String,
    pub user_id: String,
    pub user_input: String,
    pub detected_entities: Json<Vec<DetectedEntity>>,
    pub missing_entities: Json<Vec<String>>,
    /// Highest confidence seen per entity type.
    pub confidence_scores: Json<BTreeMap<String, f64>>,
    pub language: String,
    pub processed: bool,
    pub created_at: i64,
}

/// Input for appending a conversation log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewConversationLog {
    #[validate(length(min = 1))]
    pub user_input: String,
    pub detected_entities: Vec<DetectedEntity>,
    pub missing_entities: Vec<String>,
    pub confidence_scores: BTreeMap<String, f64>,
    #[validate(length(min = 2, max = 16))]
    pub language: String,
}

/// Per-entity, per-day usage counter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityAnalyticsRecord {
    pub id: String,
    pub entity_id: String,
    /// Day in `YYYY-MM-DD` form.
    pub date_tracked: String,
    pub usage_count: i64,
    pub accuracy_score: f64,
    pub last_used_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookStep {
    pub order: u32,
    pub instruction: String,
    #[serde(default)]
    pub expected_outcome: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookExample {
    pub user_input: String,
    pub expected_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextVariable {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookPerformance {
    pub success_rate: f64,
    pub average_turns: f64,
    pub total_runs: u64,
}

/// Structured instruction template guiding an agent's multi-step behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookInstruction {
    #[serde(default)]
    pub steps: Vec<PlaybookStep>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub tools: Vec<PlaybookTool>,
    #[serde(default)]
    pub examples: Vec<PlaybookExample>,
    #[serde(default)]
    pub context_variables: Vec<ContextVariable>,
    #[serde(default)]
    pub performance: PlaybookPerformance,
}

impl PlaybookInstruction {
    /// Step orders must be unique, instructions non-empty, success rate within 0..=1.
    pub fn check(&self) -> Result<(), AppError> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.instruction.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "Playbook step {} has an empty instruction",
                    step.order
                )));
            }
            if !seen.insert(step.order) {
                return Err(AppError::Validation(format!(
                    "Duplicate playbook step order {}",
                    step.order
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.performance.success_rate) {
            return Err(AppError::Validation(format!(
                "Success rate {} is outside 0..=1",
                self.performance.success_rate
            )));
        }
        Ok(())
    }

    /// Steps sorted by their `order` field.
    pub fn ordered_steps(&self) -> Vec<&PlaybookStep> {
        let mut steps: Vec<&PlaybookStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

/// A stored playbook.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Playbook {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub body: Json<PlaybookInstruction>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating or replacing a playbook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewPlaybook {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub instruction: PlaybookInstruction,
}

impl NewPlaybook {
    /// Field validation plus the instruction's own checks.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;
        require_text("name", &self.name)?;
        self.instruction.check()
    }
}
