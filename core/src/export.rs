// core/src/export.rs
//!
//! Writers for the four-column `(#, Key, Value, Comment)` table: CSV, JSON
//! and a single-sheet XLSX workbook.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use crate::document_processing::RowTable;

/// Worksheet name used for XLSX exports
pub const SHEET_NAME: &str = "Extracted Data";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    /// Pick a format from the file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("json") => ExportFormat::Json,
            Some("xlsx") => ExportFormat::Xlsx,
            _ => ExportFormat::Csv,
        }
    }
}

pub fn write_csv<W: Write>(table: &RowTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(RowTable::COLUMNS)?;
    for row in table.rows() {
        csv_writer.write_record([
            row.number.to_string().as_str(),
            row.key.as_str(),
            row.value.as_str(),
            row.comment.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(table: &RowTable, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, table)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Render the table as a single-sheet workbook
pub fn xlsx_bytes(table: &RowTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;
    for (col, title) in RowTable::COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    for (index, row) in table.rows().iter().enumerate() {
        let line = index as u32 + 1;
        worksheet.write_number(line, 0, row.number as f64)?;
        worksheet.write_string(line, 1, row.key.as_str())?;
        worksheet.write_string(line, 2, row.value.as_str())?;
        worksheet.write_string(line, 3, row.comment.as_str())?;
    }
    worksheet.set_column_width(1, 32)?;
    worksheet.set_column_width(2, 32)?;
    worksheet.set_column_width(3, 60)?;

    Ok(workbook.save_to_buffer()?)
}

pub fn write_xlsx<W: Write>(table: &RowTable, mut writer: W) -> Result<()> {
    writer.write_all(&xlsx_bytes(table)?)?;
    writer.flush()?;
    Ok(())
}

pub fn write<W: Write>(table: &RowTable, format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(table, writer),
        ExportFormat::Json => write_json(table, writer),
        ExportFormat::Xlsx => write_xlsx(table, writer),
    }
}

/// Write the table to `output_path`, creating parent directories as needed
pub fn save(table: &RowTable, format: ExportFormat, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;
    write(table, format, BufWriter::new(file))
        .with_context(|| format!("Failed to write table: {}", output_path.display()))
}
