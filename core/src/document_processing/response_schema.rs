// Contract for the JSON document the model must return.
//
// The same schema value drives both the instructions rendered into the prompt
// and the checks applied to the model's answer, so the two cannot drift apart.

use serde_json::{Map, Value};

/// What a field of an entry means to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Key,
    Value,
    Comment,
    Timeline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub role: FieldRole,
    pub name: &'static str,
    /// Alternative spellings accepted when reading a response
    pub aliases: &'static [&'static str],
    pub required: bool,
    pub description: &'static str,
    pub example: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    /// Member of the top-level object holding the entry array
    pub envelope: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl Default for ResponseSchema {
    fn default() -> Self {
        Self {
            envelope: "entries",
            fields: vec![
                FieldSpec {
                    role: FieldRole::Key,
                    name: "key",
                    aliases: &["Key"],
                    required: true,
                    description: "Verbose, descriptive field name; numbered for repeated items",
                    example: "Field Name",
                },
                FieldSpec {
                    role: FieldRole::Value,
                    name: "value",
                    aliases: &["Value"],
                    required: true,
                    description: "Normalized value, always a JSON string",
                    example: "Extracted Data",
                },
                FieldSpec {
                    role: FieldRole::Comment,
                    name: "comment",
                    aliases: &["comments", "Comment", "Comments"],
                    required: false,
                    description: "Verbatim source sentence",
                    example: "Verbatim source sentence",
                },
                FieldSpec {
                    role: FieldRole::Timeline,
                    name: "timeline",
                    aliases: &["Timeline"],
                    required: false,
                    description: "FIRST, PREVIOUS or CURRENT for role/experience fields, otherwise UNSPECIFIED",
                    example: "UNSPECIFIED",
                },
            ],
        }
    }
}

impl ResponseSchema {
    pub fn field(&self, role: FieldRole) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.role == role)
    }

    /// Look up a role's member on one entry, trying the canonical name first
    pub fn lookup<'v>(&self, entry: &'v Map<String, Value>, role: FieldRole) -> Option<&'v Value> {
        let spec = self.field(role)?;
        std::iter::once(spec.name)
            .chain(spec.aliases.iter().copied())
            .find_map(|name| entry.get(name))
    }

    /// One-entry example of the exact output shape, pretty printed.
    ///
    /// `serde_json` is built with `preserve_order`, so member order follows
    /// `fields` and the rendering is stable across calls.
    pub fn example_json(&self) -> String {
        let mut entry = Map::new();
        for field in &self.fields {
            entry.insert(field.name.to_string(), Value::String(field.example.to_string()));
        }

        let mut envelope = Map::new();
        envelope.insert(self.envelope.to_string(), Value::Array(vec![Value::Object(entry)]));

        serde_json::to_string_pretty(&Value::Object(envelope)).unwrap_or_default()
    }

    /// Field-by-field description used in the prompt
    pub fn describe_fields(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "- \"{}\" ({}, string): {}",
                    f.name,
                    if f.required { "required" } else { "optional" },
                    f.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
