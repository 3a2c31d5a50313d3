// Extractors for uploaded documents

pub mod pdf;

pub use pdf::PdfExtractor;
