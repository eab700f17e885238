//! JSON and CSV serialization of intents.
//!
//! Everything here is pure: functions return strings or bytes and never touch
//! the filesystem. Exports strip ids, owners and timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::models::{Intent, IntentParameter, PhraseEntity, TrainingPhrase};

pub const CSV_HEADER: [&str; 6] = [
    "Intent",
    "Training Phrase",
    "Entity Type",
    "Entity Value",
    "Start Index",
    "End Index",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(AppError::Validation(format!("Unknown export format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPhrase {
    pub text: String,
    #[serde(default)]
    pub entities: Vec<PhraseEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Id-free shape of an [`Intent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedIntent {
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub training_phrases: Vec<ExportedPhrase>,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<IntentParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contexts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<String>>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub is_fallback: bool,
}

impl From<&Intent> for ExportedIntent {
    fn from(intent: &Intent) -> Self {
        Self {
            display_name: intent.display_name.clone(),
            description: intent.description.clone(),
            training_phrases: intent
                .training_phrases
                .iter()
                .map(|p| ExportedPhrase {
                    text: p.text.clone(),
                    entities: p.entities.clone(),
                    confidence: p.confidence,
                })
                .collect(),
            responses: intent.responses.clone(),
            parameters: intent.parameters.clone(),
            contexts: intent.contexts.clone(),
            events: intent.events.clone(),
            priority: Some(intent.priority),
            is_fallback: intent.is_fallback,
        }
    }
}

impl ExportedIntent {
    /// Converts back into an unsaved intent, checking every span.
    pub fn into_intent(self) -> Result<Intent, AppError> {
        let mut intent = Intent::new(self.display_name);
        intent.description = self.description;
        intent.training_phrases = self
            .training_phrases
            .into_iter()
            .map(|p| TrainingPhrase {
                id: String::new(),
                text: p.text,
                entities: p.entities,
                confidence: p.confidence,
            })
            .collect();
        intent.responses = self.responses;
        intent.parameters = self.parameters;
        intent.contexts = self.contexts;
        intent.events = self.events;
        if let Some(priority) = self.priority {
            intent.priority = priority;
        }
        intent.is_fallback = self.is_fallback;
        intent.check()?;
        Ok(intent)
    }
}

/// Multi-intent export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentBundle {
    pub exported_at: DateTime<Utc>,
    pub intents: Vec<ExportedIntent>,
}

/// Accepted import shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Bundle(IntentBundle),
    List(Vec<ExportedIntent>),
    Single(ExportedIntent),
}

pub fn intent_to_json(intent: &Intent) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(&ExportedIntent::from(intent))?)
}

pub fn intents_to_json(intents: &[Intent], exported_at: DateTime<Utc>) -> Result<String, AppError> {
    let bundle = IntentBundle {
        exported_at,
        intents: intents.iter().map(ExportedIntent::from).collect(),
    };
    Ok(serde_json::to_string_pretty(&bundle)?)
}

pub fn parse_intent_json(json: &str) -> Result<Intent, AppError> {
    serde_json::from_str::<ExportedIntent>(json)?.into_intent()
}

/// Parses a bundle, a bare array, or a single exported intent.
pub fn parse_bundle_json(json: &str) -> Result<Vec<Intent>, AppError> {
    let exported = match serde_json::from_str::<ImportDocument>(json)? {
        ImportDocument::Bundle(bundle) => bundle.intents,
        ImportDocument::List(list) => list,
        ImportDocument::Single(single) => vec![single],
    };
    exported.into_iter().map(ExportedIntent::into_intent).collect()
}

/// Quotes a CSV field, doubling embedded quotes.
pub fn escape_csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn push_csv_row(out: &mut String, fields: &[&str]) {
    let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

fn push_intent_rows(out: &mut String, intent: &Intent) {
    for phrase in &intent.training_phrases {
        if phrase.entities.is_empty() {
            push_csv_row(
                out,
                &[intent.display_name.as_str(), phrase.text.as_str(), "", "", "", ""],
            );
            continue;
        }
        for entity in &phrase.entities {
            let start = entity.start_index.to_string();
            let end = entity.end_index.to_string();
            push_csv_row(
                out,
                &[
                    intent.display_name.as_str(),
                    phrase.text.as_str(),
                    entity.entity_type.as_str(),
                    entity.value.as_str(),
                    start.as_str(),
                    end.as_str(),
                ],
            );
        }
    }
}

/// One row per phrase/entity pair; a phrase without entities yields one row with empty entity fields.
pub fn intent_to_csv(intent: &Intent) -> String {
    intents_to_csv(std::slice::from_ref(intent))
}

pub fn intents_to_csv(intents: &[Intent]) -> String {
    let mut out = String::new();
    push_csv_row(&mut out, &CSV_HEADER);
    for intent in intents {
        push_intent_rows(&mut out, intent);
    }
    out
}

/// Lower-cases and replaces every non-alphanumeric character with `_`.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "intent".to_string()
    } else {
        sanitized
    }
}

pub fn export_filename(intent: &Intent, format: ExportFormat) -> String {
    format!("{}.{}", sanitize_filename(&intent.display_name), format.extension())
}

pub fn bundle_filename(exported_at: DateTime<Utc>, format: ExportFormat) -> String {
    format!(
        "intents_export_{}.{}",
        exported_at.format("%Y-%m-%d"),
        format.extension()
    )
}

/// A serialized export ready to be handed to a download or written to disk.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Serializes one intent under its own name, or several under a date-stamped name.
pub fn export_intents(
    intents: &[Intent],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<ExportArtifact, AppError> {
    let (filename, body) = match (intents, format) {
        ([single], ExportFormat::Json) => (export_filename(single, format), intent_to_json(single)?),
        ([single], ExportFormat::Csv) => (export_filename(single, format), intent_to_csv(single)),
        (many, ExportFormat::Json) => (bundle_filename(exported_at, format), intents_to_json(many, exported_at)?),
        (many, ExportFormat::Csv) => (bundle_filename(exported_at, format), intents_to_csv(many)),
    };

    Ok(ExportArtifact {
        filename,
        content_type: format.content_type(),
        bytes: body.into_bytes(),
    })
}

/// Serializes `intents` as a date-stamped bundle, whatever their count.
pub fn export_bundle(
    intents: &[Intent],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<ExportArtifact, AppError> {
    let body = match format {
        ExportFormat::Json => intents_to_json(intents, exported_at)?,
        ExportFormat::Csv => intents_to_csv(intents),
    };

    Ok(ExportArtifact {
        filename: bundle_filename(exported_at, format),
        content_type: format.content_type(),
        bytes: body.into_bytes(),
    })
}
