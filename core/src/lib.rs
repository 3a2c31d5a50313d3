// core/src/lib.rs

use serde::Serialize;

// The pipeline's error type. Every variant renders as a message that is safe
// to show to the person who uploaded the document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No file provided")]
    NoFile,
    #[error("Only PDF files are supported: {0}")]
    InvalidInputFormat(String),
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge { size: usize, limit: usize },
    #[error("The PDF contains no extractable text (scanned or image-only documents are not supported)")]
    NoExtractableText,
    #[error("AI service unavailable: {0}")]
    AiServiceUnavailable(String),
    #[error("AI service did not answer within {seconds} seconds")]
    AiServiceTimeout { seconds: u64 },
    #[error("AI service returned an unusable response: {0}")]
    MalformedAiResponse(String),
    #[error("AI response does not match the expected schema: {0}")]
    SchemaViolation(String),
    #[error("No fields could be extracted from the document")]
    EmptyExtraction,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// JSON body handed back to callers when an invocation fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub mod ai_client;
pub mod config;
pub mod document_processing;
pub mod export;
pub mod intake;
pub mod pipeline;

pub use ai_client::{AiClient, LlmGeneration, TokenUsage};
pub use config::{PipelineConfig, Provider};
pub use document_processing::{
    ExtractedDocument, FieldRecord, InstructionPayload, ProcessingLog, ResponseSchema, Row,
    RowTable, TimelineContext, Warning,
};
pub use intake::{StagedUpload, Upload};
pub use pipeline::{Extraction, Pipeline};

#[cfg(test)]
mod tests;
