// Renders the instruction payload sent to the model

use serde::Serialize;

use crate::document_processing::response_schema::ResponseSchema;
use crate::document_processing::schemas::ExtractedDocument;

/// Instruction sent to the AI service for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstructionPayload {
    pub prompt: String,
    /// MIME type the service is asked to answer with
    pub response_mime_type: &'static str,
}

impl InstructionPayload {
    pub fn len(&self) -> usize {
        self.prompt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompt.is_empty()
    }
}

const PREAMBLE: &str = "You are an expert Data Structuring Engine. Convert the unstructured text below into a structured JSON dataset.";

const RULES: &str = r#"### GENERIC EXTRACTION RULES (Strictly Follow):

1. **Disambiguate Timelines (Logic):**
   - Analyze dates and temporal language ("currently", "previously", "started my career") to distinguish between "First", "Previous", and "Current" roles.
   - Set "timeline" to FIRST, PREVIOUS or CURRENT on every role/experience field; use UNSPECIFIED for everything else.
   - **Naming Convention:** Use verbose, descriptive keys.
     - BAD: "Salary", "Job Title".
     - GOOD: "Salary of first professional role", "Current Designation", "Joining Date of previous organization".

2. **Atomic Data Splitting:**
   - Split Names -> "First Name", "Last Name".
   - Split Locations -> "City", "State".
   - Split Money -> "Value" (Integer only, no thousands separators), "Currency" (ISO 4217 code, e.g. USD, EUR, INR) as two separate entries.

3. **List Handling (Numbering):**
   - For recurring items (Certifications, Projects), number them explicitly in document order.
   - Format Keys as: "Certifications 1", "Certifications 2".
   - Never merge, deduplicate or reorder recurring items.
   - Combine the Name, Year, and Score into the Value/Comment for that number.

4. **Data Normalization:**
   - Dates: YYYY-MM-DD (ISO 8601).
   - Numbers: Integers only (no commas, no spaces).
   - Currency: ISO 4217 three-letter code.
   - Text: Preserve the original wording in "comment"; trim "value" but do not rephrase it.

5. **Ordering:**
   - Emit entries in the order the facts appear in the document. Do not add a sequence number field."#;

pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the instruction for `document`.
    ///
    /// Pure function of its inputs: equal documents and schemas always yield
    /// byte-identical payloads.
    pub fn build(document: &ExtractedDocument, schema: &ResponseSchema) -> InstructionPayload {
        let mut prompt = String::with_capacity(document.text.len() + 4096);

        prompt.push_str(PREAMBLE);
        prompt.push_str("\n\n### INPUT TEXT:\n");
        prompt.push_str(&document.text);
        prompt.push_str("\n\n");
        prompt.push_str(RULES);
        prompt.push_str("\n\n### OUTPUT FORMAT:\n");
        prompt.push_str(&format!(
            "Return a single JSON object with a \"{}\" array. Every entry has these members:\n",
            schema.envelope
        ));
        prompt.push_str(&schema.describe_fields());
        prompt.push_str("\n\nExact structure:\n");
        prompt.push_str(&schema.example_json());
        prompt.push('\n');

        InstructionPayload {
            prompt,
            response_mime_type: "application/json",
        }
    }
}
