// Format checks over validated records.
//
// The prompt already asks the model for ISO dates, plain integers and ISO 4217
// codes. This pass re-checks those formats, strips thousands separators, and
// splits a currency symbol off a numeric value. It never fails: anything it
// cannot fix is passed through unchanged and reported in the processing log.

use std::collections::HashSet;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::document_processing::schemas::{FieldRecord, ProcessingLog, Stage};

/// Format family a field is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Date,
    Number,
    Currency,
    Text,
}

const DATE_WORDS: &[&str] = &["date", "dob", "birthday"];
const NUMBER_WORDS: &[&str] = &[
    "salary", "amount", "ctc", "compensation", "income", "price", "cost", "fee", "fees",
    "count", "total", "age", "value", "budget", "revenue", "package", "balance",
];
// Digits that identify rather than measure
const IDENTIFIER_WORDS: &[&str] = &[
    "phone", "mobile", "contact", "zip", "pin", "pincode", "postal", "id", "account", "passport",
];

const CURRENCY_SYMBOLS: &[(char, &str)] = &[
    ('$', "USD"),
    ('€', "EUR"),
    ('£', "GBP"),
    ('₹', "INR"),
    ('¥', "JPY"),
];

// Codes recognised when written next to an amount ("USD 45,000")
const AMOUNT_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "INR", "JPY", "CNY", "AUD", "CAD", "CHF", "SGD", "AED", "NZD", "HKD",
    "SEK", "NOK", "DKK", "ZAR", "BRL", "MXN",
];

static DATE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}$").expect("date pattern compiles"));

// Western (120,000) and lakh (1,20,000) digit grouping
static GROUPED_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d{1,3}(?:[,\s']\d{2,3})*[,\s']\d{3}$").expect("grouped number pattern compiles")
});

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date pattern compiles"));

fn key_words(key: &str) -> Vec<String> {
    key.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn key_has(key: &str, list: &[&str]) -> bool {
    key_words(key).iter().any(|w| list.contains(&w.as_str()))
}

/// The key's wording says it holds an amount
fn key_marks_number(key: &str) -> bool {
    key_has(key, NUMBER_WORDS)
}

impl FieldKind {
    /// Guess the kind from the key's wording, falling back to the value's shape
    pub fn infer(key: &str, value: &str) -> Self {
        let lower = key.to_lowercase();

        if key_words(key).last().is_some_and(|w| w == "currency") || lower.ends_with("currency code") {
            return FieldKind::Currency;
        }
        if key_has(key, DATE_WORDS) || lower.contains("date of birth") {
            return FieldKind::Date;
        }
        // A currency symbol marks money even under an identifier-like key
        if split_symbol(value).is_some() {
            return FieldKind::Number;
        }
        if key_has(key, IDENTIFIER_WORDS) {
            return FieldKind::Text;
        }
        if key_marks_number(key) || GROUPED_NUMBER.is_match(value.trim()) {
            return FieldKind::Number;
        }
        if DATE_LIKE.is_match(value) {
            return FieldKind::Date;
        }
        FieldKind::Text
    }
}

pub fn is_iso_date(value: &str) -> bool {
    ISO_DATE.is_match(value) && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn is_plain_integer(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_currency_code(value: &str) -> bool {
    value.len() == 3 && value.bytes().all(|b| b.is_ascii_uppercase())
}

/// Remove commas, apostrophes and whitespace used as thousands separators
fn strip_separators(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != ',' && *c != '\'' && !c.is_whitespace())
        .collect()
}

fn plain_amount(amount: &str) -> Option<String> {
    let amount = strip_separators(amount);
    is_plain_integer(&amount).then_some(amount)
}

/// `"$45,000"` -> `("45000", "USD")`
pub fn split_symbol(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let mut chars = value.chars();
    let first = chars.next()?;
    let (_, code) = CURRENCY_SYMBOLS.iter().find(|(s, _)| *s == first)?;
    plain_amount(chars.as_str()).map(|amount| (amount, code.to_string()))
}

/// `"USD 45,000"` / `"45000 EUR"` -> `("45000", "USD")`
pub fn split_code(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let (code, amount) = if let Some(code) = AMOUNT_CODES.iter().find(|c| value.starts_with(**c)) {
        (code, &value[3..])
    } else if let Some(code) = AMOUNT_CODES.iter().find(|c| value.ends_with(**c)) {
        (code, &value[..value.len() - 3])
    } else {
        return None;
    };
    plain_amount(amount).map(|amount| (amount, code.to_string()))
}

/// Either form: a leading symbol or an ISO code before or after the amount
pub fn split_money(value: &str) -> Option<(String, String)> {
    split_symbol(value).or_else(|| split_code(value))
}

pub struct Normalizer;

impl Normalizer {
    /// Check and canonicalize field formats. Order is preserved; split-off
    /// currency records are inserted right after the amount they belong to.
    pub fn normalize(records: Vec<FieldRecord>, log: &mut ProcessingLog) -> Vec<FieldRecord> {
        let mut existing: HashSet<String> = records.iter().map(|r| r.key.clone()).collect();
        let kinds: Vec<FieldKind> = records
            .iter()
            .map(|r| FieldKind::infer(&r.key, &r.value))
            .collect();
        // Value of the currency field directly after each record, if any
        let next_currency: Vec<Option<String>> = (0..records.len())
            .map(|i| match kinds.get(i + 1) {
                Some(FieldKind::Currency) => Some(records[i + 1].value.trim().to_string()),
                _ => None,
            })
            .collect();

        let mut normalized = Vec::with_capacity(records.len());
        for (index, mut record) in records.into_iter().enumerate() {
            let split_off = match kinds[index] {
                FieldKind::Date => {
                    Self::check_date(&record, log);
                    None
                }
                FieldKind::Number => Self::normalize_number(
                    &mut record,
                    next_currency[index].as_deref(),
                    &mut existing,
                    log,
                ),
                FieldKind::Currency => {
                    Self::check_currency(&record, log);
                    None
                }
                FieldKind::Text => None,
            };

            normalized.push(record);
            normalized.extend(split_off);
        }

        log.add_step("normalize_formats");
        normalized
    }

    fn check_date(record: &FieldRecord, log: &mut ProcessingLog) {
        if record.value.is_empty() || is_iso_date(&record.value) {
            return;
        }
        log.warn(
            Stage::Normalization,
            Some(record.key.as_str()),
            format!("date \"{}\" is not YYYY-MM-DD; left unchanged", record.value),
        );
    }

    fn check_currency(record: &FieldRecord, log: &mut ProcessingLog) {
        if record.value.is_empty() || is_currency_code(&record.value) {
            return;
        }
        log.warn(
            Stage::Normalization,
            Some(record.key.as_str()),
            format!("\"{}\" is not an ISO 4217 code; left unchanged", record.value),
        );
    }

    fn currency_key(amount_key: &str) -> String {
        if amount_key.eq_ignore_ascii_case("value") {
            "Currency".to_string()
        } else {
            format!("{} Currency", amount_key)
        }
    }

    /// Returns the currency record split off the value, if one was created.
    /// The amount is only rewritten once its currency has somewhere to go.
    fn normalize_number(
        record: &mut FieldRecord,
        next_currency: Option<&str>,
        existing: &mut HashSet<String>,
        log: &mut ProcessingLog,
    ) -> Option<FieldRecord> {
        if record.value.is_empty() || is_plain_integer(&record.value) {
            return None;
        }

        let money = if key_marks_number(&record.key) {
            split_money(&record.value)
        } else {
            split_symbol(&record.value)
        };

        if let Some((amount, code)) = money {
            if let Some(following) = next_currency {
                if following.eq_ignore_ascii_case(&code) {
                    record.value = amount;
                } else {
                    log.warn(
                        Stage::Normalization,
                        Some(record.key.as_str()),
                        format!(
                            "\"{}\" is in {} but the next field says {}; left unchanged",
                            record.value, code, following
                        ),
                    );
                }
                return None;
            }

            let currency_key = Self::currency_key(&record.key);
            if existing.contains(&currency_key) {
                log.warn(
                    Stage::Normalization,
                    Some(record.key.as_str()),
                    format!(
                        "\"{}\" carries {} but \"{}\" already exists; left unchanged",
                        record.value, code, currency_key
                    ),
                );
                return None;
            }

            tracing::debug!(key = %record.key, currency = %code, "split currency from amount");
            record.value = amount;
            existing.insert(currency_key.clone());
            return Some(FieldRecord {
                key: currency_key,
                value: code,
                comment: record.comment.clone(),
                timeline: record.timeline,
            });
        }

        match plain_amount(&record.value) {
            Some(stripped) => record.value = stripped,
            None => log.warn(
                Stage::Normalization,
                Some(record.key.as_str()),
                format!("\"{}\" is not an integer; left unchanged", record.value),
            ),
        }
        None
    }
}
