//! Pattern-based entity detection.
//!
//! Confidence scores are placeholders drawn uniformly from `[0.6, 1.0)`. A
//! detector built with [`EntityDetector::with_seed`] yields a reproducible
//! sequence of scores.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tracing::debug;

use super::patterns::ENTITY_PATTERNS;
use crate::config::DEFAULT_MIN_CONFIDENCE;
use crate::models::{DetectedEntity, Entity, EntityType};

/// Lower bound of the randomized confidence range.
pub const CONFIDENCE_FLOOR: f64 = 0.6;

/// Confidence assigned to catalog (name or synonym) matches.
pub const CATALOG_MATCH_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionOptions {
    pub language: String,
    pub min_confidence: f64,
    pub enable_smart_suggestions: bool,
    /// Entity types the caller expects; absent ones are reported as missing.
    #[serde(default)]
    pub expected_entities: Vec<String>,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            enable_smart_suggestions: true,
            expected_entities: Vec::new(),
        }
    }
}

/// A hint that the text probably calls for an entity the caller has not defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartSuggestion {
    pub entity_type: String,
    pub message: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub entities: Vec<DetectedEntity>,
    pub suggestions: Vec<SmartSuggestion>,
    pub missing_entities: Vec<String>,
    pub language: String,
}

impl DetectionResult {
    /// Highest confidence per entity type.
    pub fn confidence_scores(&self) -> BTreeMap<String, f64> {
        let mut scores = BTreeMap::new();
        for entity in &self.entities {
            let best = scores.entry(entity.entity_type.clone()).or_insert(0.0_f64);
            *best = best.max(entity.confidence);
        }
        scores
    }

    /// Catalog entity ids referenced by the matches, first occurrence order.
    pub fn matched_entity_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entities
            .iter()
            .filter_map(|e| e.entity_id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

/// Fixed keyword-triggered suggestions. At most two.
pub fn smart_suggestions(text: &str) -> Vec<SmartSuggestion> {
    let lower = text.to_lowercase();
    let mut suggestions = Vec::new();

    if lower.contains("book") && lower.contains("flight") {
        suggestions.push(SmartSuggestion {
            entity_type: "destination".to_string(),
            message: "Flight booking detected: consider capturing destination and travel date"
                .to_string(),
            confidence: 0.85,
        });
    }
    if lower.contains("call") || lower.contains("contact") {
        suggestions.push(SmartSuggestion {
            entity_type: "contact_person".to_string(),
            message: "Contact request detected: consider capturing who should be reached"
                .to_string(),
            confidence: 0.8,
        });
    }

    suggestions
}

pub struct EntityDetector {
    rng: Mutex<StdRng>,
}

impl Default for EntityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityDetector {
    /// Detector seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Detector with a reproducible confidence sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn draw_confidence(&self) -> f64 {
        // poisoning cannot leave the RNG in a bad state
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(CONFIDENCE_FLOOR..1.0)
    }

    /// Pattern-only detection.
    pub fn detect(&self, text: &str, options: &DetectionOptions) -> DetectionResult {
        self.detect_with_entities(text, options, &[])
    }

    /// Pattern detection followed by name/synonym matching against `catalog`.
    ///
    /// Pattern matches are attributed to the system entity of the same name
    /// when the catalog contains one.
    pub fn detect_with_entities(
        &self,
        text: &str,
        options: &DetectionOptions,
        catalog: &[Entity],
    ) -> DetectionResult {
        let mut entities = Vec::new();

        for pattern in ENTITY_PATTERNS.iter() {
            let system_id = catalog
                .iter()
                .find(|e| e.entity_type == EntityType::System && e.name == pattern.entity_type)
                .map(|e| e.id.clone());

            for m in pattern.regex.find_iter(text) {
                let confidence = self.draw_confidence();
                if confidence < options.min_confidence {
                    continue;
                }
                entities.push(DetectedEntity {
                    entity_type: pattern.entity_type.to_string(),
                    value: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                    confidence,
                    entity_id: system_id.clone(),
                });
            }
        }

        if CATALOG_MATCH_CONFIDENCE >= options.min_confidence {
            entities.extend(catalog_matches(text, catalog));
        }

        let suggestions = if options.enable_smart_suggestions {
            smart_suggestions(text)
        } else {
            Vec::new()
        };

        let found: HashSet<&str> = entities.iter().map(|e| e.entity_type.as_str()).collect();
        let missing_entities = options
            .expected_entities
            .iter()
            .filter(|expected| !found.contains(expected.as_str()))
            .cloned()
            .collect();

        debug!(
            "Detected {} entities, {} suggestions",
            entities.len(),
            suggestions.len()
        );

        DetectionResult {
            entities,
            suggestions,
            missing_entities,
            language: options.language.clone(),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// A match is a whole word when no word character continues it on either
/// side. Edges of the term that are punctuation ("C++", "U.S.") need no
/// boundary.
fn is_whole_word(text: &str, start: usize, end: usize) -> bool {
    let term = &text[start..end];
    let joins = |inner: Option<char>, outer: Option<char>| {
        inner.is_some_and(is_word_char) && outer.is_some_and(is_word_char)
    };
    !joins(term.chars().next(), text[..start].chars().next_back())
        && !joins(term.chars().next_back(), text[end..].chars().next())
}

/// Whole-word, case-insensitive matches of custom entity display names and synonyms.
fn catalog_matches(text: &str, catalog: &[Entity]) -> Vec<DetectedEntity> {
    let mut matches = Vec::new();

    for entity in catalog.iter().filter(|e| e.entity_type == EntityType::Custom) {
        let mut seen_spans = HashSet::new();
        let terms = std::iter::once(&entity.display_name).chain(entity.synonyms.iter());

        for term in terms {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let Ok(regex) = Regex::new(&format!("(?i){}", regex::escape(term))) else {
                continue;
            };

            let mut pos = 0;
            while let Some(m) = regex.find_at(text, pos) {
                if !is_whole_word(text, m.start(), m.end()) {
                    pos = m.start() + text[m.start()..].chars().next().map_or(1, char::len_utf8);
                    continue;
                }
                pos = m.end();
                if seen_spans.insert((m.start(), m.end())) {
                    matches.push(DetectedEntity {
                        entity_type: entity.name.clone(),
                        value: m.as_str().to_string(),
                        start: m.start(),
                        end: m.end(),
                        confidence: CATALOG_MATCH_CONFIDENCE,
                        entity_id: Some(entity.id.clone()),
                    });
                }
            }
        }
    }

    matches
}
