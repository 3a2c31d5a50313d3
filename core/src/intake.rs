// core/src/intake.rs
//!
//! Upload intake: checks an incoming file before it reaches the extractor and
//! stages it on disk for the lifetime of one request.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::document_processing::extractors::pdf::PDF_MAGIC;
use crate::{Error, Result};

const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "application/x-pdf", "application/octet-stream"];

/// A file as received from the caller
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: Some(filename.into()),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Read an upload from a local file, keeping its file name
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload.pdf")
            .to_string();
        Ok(Self::new(filename, bytes))
    }

    /// Reject uploads the pipeline cannot handle, before any work is done
    pub fn check(&self, max_bytes: usize) -> Result<()> {
        let filename = self
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or(Error::NoFile)?;

        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(Error::InvalidInputFormat(format!(
                "\"{}\" does not have a .pdf extension",
                filename
            )));
        }

        if let Some(content_type) = self.content_type.as_deref() {
            let essence = content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if !ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
                return Err(Error::InvalidInputFormat(format!(
                    "declared content type {} is not a PDF",
                    essence
                )));
            }
        }

        if self.bytes.is_empty() {
            return Err(Error::NoFile);
        }
        if self.bytes.len() > max_bytes {
            return Err(Error::UploadTooLarge {
                size: self.bytes.len(),
                limit: max_bytes,
            });
        }
        if !self.bytes.starts_with(PDF_MAGIC) {
            return Err(Error::InvalidInputFormat(
                "content does not start with a PDF header".to_string(),
            ));
        }

        Ok(())
    }
}

/// An upload written to a request-scoped temporary file.
///
/// The file is removed when this value is dropped, whichever way the request
/// ends.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub fn stage(upload: &Upload, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let name = upload.filename.as_deref().unwrap_or("upload.pdf");
        let prefix = format!("{}_{}", Uuid::new_v4(), secure_filename(name));

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".part")
            .tempfile_in(dir)?;
        file.write_all(&upload.bytes)?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), bytes = upload.bytes.len(), "staged upload");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(self.file.path())?)
    }
}

/// Keep ASCII letters, digits, `.`, `-` and `_`; everything else becomes `_`
fn secure_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
