// Parses and checks the model's answer against the response schema

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::document_processing::response_schema::{FieldRole, ResponseSchema};
use crate::document_processing::schemas::{FieldRecord, ProcessingLog, Stage, TimelineContext};
use crate::{Error, Result};

pub struct ResponseValidator;

impl ResponseValidator {
    /// Turn raw model output into field records, in response order.
    ///
    /// Whole-response problems are fatal: output that is not JSON is
    /// [`Error::MalformedAiResponse`], JSON of the wrong shape is
    /// [`Error::SchemaViolation`]. Individual bad entries are dropped and
    /// recorded in `log`. Only when every entry is bad does the call fail.
    pub fn validate(
        raw_ai_output: &str,
        schema: &ResponseSchema,
        log: &mut ProcessingLog,
    ) -> Result<Vec<FieldRecord>> {
        let body = Self::strip_code_fence(raw_ai_output);
        let parsed: Value = serde_json::from_str(body)
            .map_err(|e| Error::MalformedAiResponse(format!("response is not valid JSON ({})", e)))?;

        let entries = Self::entries(&parsed, schema)?;
        let total = entries.len();

        let mut records = Vec::with_capacity(total);
        for (index, entry) in entries.iter().enumerate() {
            match Self::record(entry, schema, index + 1, log) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    log.warn(
                        Stage::Validation,
                        None,
                        format!("entry {} discarded: {}", index + 1, reason),
                    );
                }
            }
        }

        if total > 0 && records.is_empty() {
            return Err(Error::SchemaViolation(format!(
                "none of the {} entries has a string \"key\" and \"value\"",
                total
            )));
        }

        tracing::info!(entries = total, kept = records.len(), "validated ai response");
        log.add_step("validate_response");

        let records = Self::qualify_by_timeline(records, log);
        Ok(Self::number_repeated_keys(records, log))
    }

    /// Drop surrounding whitespace and a Markdown code fence, if any
    fn strip_code_fence(raw: &str) -> &str {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix("```") else {
            return trimmed;
        };
        let rest = rest.strip_suffix("```").unwrap_or(rest);
        // Skip the info string ("json"), on its own line or not
        rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            .trim()
    }

    fn entries<'v>(parsed: &'v Value, schema: &ResponseSchema) -> Result<&'v Vec<Value>> {
        match parsed {
            Value::Array(entries) => Ok(entries),
            Value::Object(map) => match map.get(schema.envelope) {
                Some(Value::Array(entries)) => Ok(entries),
                Some(other) => Err(Error::SchemaViolation(format!(
                    "\"{}\" must be an array, found {}",
                    schema.envelope,
                    json_type(other)
                ))),
                None => Err(Error::SchemaViolation(format!(
                    "missing required \"{}\" array",
                    schema.envelope
                ))),
            },
            other => Err(Error::SchemaViolation(format!(
                "top level must be an object or array, found {}",
                json_type(other)
            ))),
        }
    }

    fn record(
        entry: &Value,
        schema: &ResponseSchema,
        position: usize,
        log: &mut ProcessingLog,
    ) -> std::result::Result<FieldRecord, String> {
        let entry: &Map<String, Value> = entry
            .as_object()
            .ok_or_else(|| format!("expected an object, found {}", json_type(entry)))?;

        let key = match schema.lookup(entry, FieldRole::Key) {
            Some(Value::String(key)) if !key.trim().is_empty() => key.trim().to_string(),
            Some(Value::String(_)) => return Err("key is empty".to_string()),
            Some(other) => return Err(format!("key is {}, expected string", json_type(other))),
            None => return Err("missing key".to_string()),
        };

        let value = match schema.lookup(entry, FieldRole::Value) {
            Some(Value::String(value)) => value.trim().to_string(),
            Some(other) => {
                return Err(format!(
                    "value of \"{}\" is {}, expected string",
                    key,
                    json_type(other)
                ))
            }
            None => return Err(format!("\"{}\" has no value", key)),
        };

        let comment = match schema.lookup(entry, FieldRole::Comment) {
            Some(Value::String(comment)) => comment.clone(),
            _ => String::new(),
        };

        let timeline = match schema.lookup(entry, FieldRole::Timeline) {
            None | Some(Value::Null) => TimelineContext::Unspecified,
            Some(Value::String(tag)) => TimelineContext::parse(tag).unwrap_or_else(|| {
                log.warn(
                    Stage::Validation,
                    Some(key.as_str()),
                    format!("entry {}: unknown timeline \"{}\" ignored", position, tag),
                );
                TimelineContext::Unspecified
            }),
            Some(other) => {
                log.warn(
                    Stage::Validation,
                    Some(key.as_str()),
                    format!("entry {}: timeline is {}, ignored", position, json_type(other)),
                );
                TimelineContext::Unspecified
            }
        };

        Ok(FieldRecord {
            key,
            value,
            comment,
            timeline,
        })
    }

    /// Prefix repeated keys with their timeline ("Current Designation") when
    /// the occurrences carry different timeline tags.
    fn qualify_by_timeline(mut records: Vec<FieldRecord>, log: &mut ProcessingLog) -> Vec<FieldRecord> {
        let mut timelines: HashMap<String, HashSet<TimelineContext>> = HashMap::new();
        for record in &records {
            timelines
                .entry(record.key.clone())
                .or_default()
                .insert(record.timeline);
        }

        for record in &mut records {
            let mixed = timelines.get(&record.key).is_some_and(|set| set.len() > 1);
            let Some(qualifier) = record.timeline.qualifier() else {
                continue;
            };
            if !mixed || starts_with_word(&record.key, qualifier) {
                continue;
            }
            let qualified = format!("{} {}", qualifier, record.key);
            log.warn(
                Stage::Validation,
                Some(record.key.as_str()),
                format!("repeated key qualified by timeline as \"{}\"", qualified),
            );
            record.key = qualified;
        }

        records
    }

    /// Give identical keys sequential numeric suffixes in encounter order.
    fn number_repeated_keys(mut records: Vec<FieldRecord>, log: &mut ProcessingLog) -> Vec<FieldRecord> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *counts.entry(record.key.clone()).or_default() += 1;
        }
        if counts.values().all(|&n| n == 1) {
            return records;
        }

        let mut taken: HashSet<String> = counts
            .iter()
            .filter(|(_, n)| **n == 1)
            .map(|(key, _)| key.clone())
            .collect();
        let mut next_number: HashMap<String, u32> = HashMap::new();

        for record in &mut records {
            if counts[&record.key] == 1 {
                continue;
            }

            let (stem, numbered) = match split_numeric_suffix(&record.key) {
                Some((stem, _)) => (stem.to_string(), true),
                None => (record.key.clone(), false),
            };

            // An already numbered key keeps its number the first time it is seen
            if numbered && !taken.contains(&record.key) {
                taken.insert(record.key.clone());
                continue;
            }

            let counter = next_number.entry(stem.clone()).or_insert(1);
            let renamed = loop {
                let candidate = format!("{} {}", stem, counter);
                *counter += 1;
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };

            if numbered {
                log.warn(
                    Stage::Validation,
                    Some(record.key.as_str()),
                    format!("duplicate key renumbered as \"{}\"", renamed),
                );
            } else {
                tracing::debug!(key = %record.key, renamed = %renamed, "numbered repeated key");
            }
            taken.insert(renamed.clone());
            record.key = renamed;
        }

        log.add_step("number_repeated_keys");
        records
    }
}

/// `"Certifications 2"` -> `Some(("Certifications", 2))`
fn split_numeric_suffix(key: &str) -> Option<(&str, u32)> {
    let (stem, suffix) = key.rsplit_once(' ')?;
    let stem = stem.trim_end();
    if stem.is_empty() || suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().map(|n| (stem, n))
}

fn starts_with_word(key: &str, word: &str) -> bool {
    key.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case(word))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
