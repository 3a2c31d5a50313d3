// Document Processing Module
//
// Turns one uploaded PDF into a numbered Key/Value/Comment table.
//
// Main components:
// - schemas: data model shared by every stage
// - response_schema: the JSON contract the model must answer with
// - extractors: PDF text extraction
// - processors: prompt rendering, response validation, normalization and
//   table assembly
//
// Usage:
//   1. Extract text with `PdfExtractor::extract`
//   2. Render the instruction with `PromptBuilder::build` and send it to a model
//   3. Feed the answer through `process_response` to get a `RowTable`

pub mod schemas;
pub mod response_schema;
pub mod extractors;
pub mod processors;

// Re-export commonly used types
pub use schemas::{
    ExtractedDocument,
    FieldRecord,
    ProcessingLog,
    Row,
    RowTable,
    Stage,
    TimelineContext,
    Warning,
};

pub use response_schema::{FieldRole, ResponseSchema};
pub use extractors::PdfExtractor;
pub use processors::{
    FieldKind, InstructionPayload, Normalizer, PromptBuilder, ResponseValidator, TableAssembler,
};

use crate::Result;

/// Validate, normalize and assemble a raw model answer.
///
/// Shared by the live pipeline and by offline replays of saved responses.
pub fn process_response(
    raw_ai_output: &str,
    schema: &ResponseSchema,
    log: &mut ProcessingLog,
) -> Result<RowTable> {
    let records = ResponseValidator::validate(raw_ai_output, schema, log)?;
    let records = Normalizer::normalize(records, log);
    TableAssembler::assemble(records)
}
