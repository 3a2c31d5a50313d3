// core/src/pipeline.rs
//!
//! One invocation per uploaded document:
//! extract text → build prompt → call the model → validate → normalize →
//! assemble. The pipeline holds no mutable state, so a single instance can
//! serve concurrent requests from several threads.

use serde::Serialize;
use tracing::{debug, info};

use crate::ai_client::{AiClient, TokenUsage};
use crate::config::PipelineConfig;
use crate::document_processing::extractors::pdf::EXTRACTION_TOOL;
use crate::document_processing::{
    process_response, ExtractedDocument, InstructionPayload, PdfExtractor, ProcessingLog,
    PromptBuilder, ResponseSchema, RowTable,
};
use crate::intake::{StagedUpload, Upload};
use crate::Result;

/// Result of one successful invocation
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub document_id: String,
    pub table: RowTable,
    pub log: ProcessingLog,
    pub usage: TokenUsage,
}

pub struct Pipeline {
    config: PipelineConfig,
    schema: ResponseSchema,
    client: Box<dyn AiClient>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, client: Box<dyn AiClient>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            schema: ResponseSchema::default(),
            client,
        })
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schema(&self) -> &ResponseSchema {
        &self.schema
    }

    /// Check, stage and process an upload. The staged copy is deleted before
    /// this returns, on success and on every error.
    pub fn process_upload(&self, upload: &Upload) -> Result<Extraction> {
        upload.check(self.config.max_upload_bytes)?;

        let staged = StagedUpload::stage(upload, self.config.upload_dir())?;
        let bytes = staged.read()?;
        self.run(&bytes)
    }

    /// Extract the document and render its instruction without calling the model
    pub fn prepare(&self, pdf_bytes: &[u8]) -> Result<(ExtractedDocument, InstructionPayload)> {
        let document = PdfExtractor::extract(pdf_bytes)?;
        let payload = PromptBuilder::build(&document, &self.schema);
        Ok((document, payload))
    }

    pub fn run(&self, pdf_bytes: &[u8]) -> Result<Extraction> {
        let (document, payload) = self.prepare(pdf_bytes)?;
        info!(
            document_id = %&document.document_id[..12],
            pages = document.page_count.unwrap_or(0),
            chars = document.text.len(),
            "extracted document text"
        );

        let mut log = ProcessingLog::new(Some(EXTRACTION_TOOL.to_string()));
        log.model = Some(self.config.model.clone());
        log.page_count = document.page_count;
        log.add_step("extract_text");
        log.add_step("build_prompt");

        debug!(prompt_bytes = payload.len(), provider = self.client.provider_name(), "invoking ai service");
        let generation = self.client.invoke(&payload)?;
        info!(
            prompt_tokens = generation.usage.prompt_tokens,
            completion_tokens = generation.usage.completion_tokens,
            "ai service answered"
        );
        log.add_step("invoke_model");

        let table = process_response(&generation.response, &self.schema, &mut log)?;
        info!(rows = table.len(), warnings = log.warnings.len(), "extraction complete");

        Ok(Extraction {
            document_id: document.document_id,
            table,
            log,
            usage: generation.usage,
        })
    }
}
