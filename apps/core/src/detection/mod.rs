//! # Detection Module
//!
//! Regex-based entity detection over free text.
//!
//! ## Components
//! - `patterns`: the fixed, ordered list of built-in patterns
//! - `detector`: confidence scoring, thresholding, catalog matches, smart suggestions
//! - `analyzer`: catalog lookup, audit logging and usage tracking

pub mod analyzer;
pub mod detector;
pub mod patterns;

pub use analyzer::{AnalyzedInput, ConversationAnalyzer};
pub use detector::{DetectionOptions, DetectionResult, EntityDetector, SmartSuggestion};
