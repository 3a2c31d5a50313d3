// Data model shared by the extraction stages

use serde::{Deserialize, Serialize};
use chrono::Utc;
use std::fmt;

/// Plain text pulled out of one uploaded PDF. Lives for a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub document_id: String, // SHA-256 of `text`
    pub text: String,
    pub byte_len: usize, // Size of the source PDF
    pub page_count: Option<usize>,
}

impl ExtractedDocument {
    pub fn new(text: String, byte_len: usize, page_count: Option<usize>) -> Self {
        Self {
            document_id: Self::generate_id(&text),
            text,
            byte_len,
            page_count,
        }
    }

    /// Generate document ID from content hash
    pub fn generate_id(content: &str) -> String {
        use sha2::{Sha256, Digest};
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Temporal role of a field that describes a position or experience
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimelineContext {
    First,
    Previous,
    Current,
    #[default]
    Unspecified,
}

impl TimelineContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineContext::First => "FIRST",
            TimelineContext::Previous => "PREVIOUS",
            TimelineContext::Current => "CURRENT",
            TimelineContext::Unspecified => "UNSPECIFIED",
        }
    }

    /// Parse a tag as written by the model (case-insensitive)
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "FIRST" => Some(TimelineContext::First),
            "PREVIOUS" | "PAST" => Some(TimelineContext::Previous),
            "CURRENT" | "PRESENT" => Some(TimelineContext::Current),
            "" | "UNSPECIFIED" | "NONE" => Some(TimelineContext::Unspecified),
            _ => None,
        }
    }

    /// Word used when a key has to be qualified by its timeline
    pub fn qualifier(&self) -> Option<&'static str> {
        match self {
            TimelineContext::First => Some("First"),
            TimelineContext::Previous => Some("Previous"),
            TimelineContext::Current => Some("Current"),
            TimelineContext::Unspecified => None,
        }
    }
}

/// One fact extracted by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub comment: String, // Source wording, may be empty
    #[serde(default)]
    pub timeline: TimelineContext,
}

impl FieldRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comment: comment.into(),
            timeline: TimelineContext::Unspecified,
        }
    }

    pub fn with_timeline(mut self, timeline: TimelineContext) -> Self {
        self.timeline = timeline;
        self
    }
}

/// Pipeline stage that raised a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Normalization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validation => f.write_str("validation"),
            Stage::Normalization => f.write_str("normalization"),
        }
    }
}

/// Non-fatal issue found while processing a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stage: Stage,
    pub key: Option<String>,
    pub message: String,
}

/// Processing log for tracking what happened during one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub extraction_tool: Option<String>,
    pub model: Option<String>,
    pub processed_at_utc: String,
    pub page_count: Option<usize>,
    #[serde(default)]
    pub steps_applied: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl ProcessingLog {
    pub fn new(extraction_tool: Option<String>) -> Self {
        Self {
            extraction_tool,
            model: None,
            processed_at_utc: Utc::now().to_rfc3339(),
            page_count: None,
            steps_applied: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: impl Into<String>) {
        self.steps_applied.push(step.into());
    }

    /// Record a warning and emit it through `tracing`
    pub fn warn(&mut self, stage: Stage, key: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%stage, key = key.unwrap_or("-"), "{}", message);
        self.warnings.push(Warning {
            stage,
            key: key.map(str::to_string),
            message,
        });
    }

    pub fn warnings_for(&self, stage: Stage) -> impl Iterator<Item = &Warning> {
        self.warnings.iter().filter(move |w| w.stage == stage)
    }
}

impl Default for ProcessingLog {
    fn default() -> Self {
        Self::new(None)
    }
}

/// One numbered row of the output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "#")]
    pub number: usize,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "Comment")]
    pub comment: String,
}

/// Ordered `(#, Key, Value, Comment)` rows handed to the exporter.
///
/// Only [`crate::document_processing::TableAssembler`] builds one, so the
/// numbering is always `1..=len` and no key is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RowTable {
    rows: Vec<Row>,
}

impl RowTable {
    pub const COLUMNS: [&'static str; 4] = ["#", "Key", "Value", "Comment"];

    pub(crate) fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.key.as_str())
    }
}
