//! Submitted form data and validation errors
//!
//! Admin forms are posted as `application/x-www-form-urlencoded`. Multi-valued
//! fields (entry categories, sites) repeat their key, so the raw pairs are
//! kept in order instead of being collapsed into a map.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Format of the date fields of the admin forms
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Raw key/value pairs of a submitted form
#[derive(Debug, Clone, Default)]
pub struct FormData {
    pairs: Vec<(String, String)>,
}

impl FormData {
    pub fn new(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    /// First value of a field, trimmed; empty when missing
    pub fn text(&self, name: &str) -> String {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_default()
    }

    /// First value of a field exactly as submitted
    pub fn raw(&self, name: &str) -> String {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    /// Checkbox semantics: present with any value but `off`/`false`
    pub fn checked(&self, name: &str) -> bool {
        self.pairs
            .iter()
            .any(|(key, value)| key == name && !matches!(value.as_str(), "" | "off" | "false" | "0"))
    }

    /// Every value of a repeated field
    pub fn all(&self, name: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// Optional integer field
    pub fn id(&self, name: &str, errors: &mut FormErrors) -> Option<i64> {
        let value = self.text(name);
        if value.is_empty() {
            return None;
        }
        match value.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add(name, "invalid_choice", "Select a valid choice.");
                None
            }
        }
    }

    /// Integer values of a repeated field
    pub fn ids(&self, name: &str, errors: &mut FormErrors) -> Vec<i64> {
        let mut ids = Vec::new();
        for value in self.all(name) {
            match value.parse() {
                Ok(id) => ids.push(id),
                Err(_) => errors.add(
                    name,
                    "invalid_choice",
                    format!("Select a valid choice. {} is not one of the available choices.", value),
                ),
            }
        }
        ids
    }

    /// Optional local date and time field, converted to UTC
    pub fn datetime(
        &self,
        name: &str,
        tz: &FixedOffset,
        errors: &mut FormErrors,
    ) -> Option<DateTime<Utc>> {
        let value = self.text(name);
        if value.is_empty() {
            return None;
        }
        match parse_local_datetime(&value, tz) {
            Some(date) => Some(date),
            None => {
                errors.add(name, "invalid", "Enter a valid date/time.");
                None
            }
        }
    }
}

impl From<Vec<(String, String)>> for FormData {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self::new(pairs)
    }
}

/// Parse `YYYY-MM-DD HH:MM` (the `T` separator of HTML inputs is accepted too)
pub fn parse_local_datetime(value: &str, tz: &FixedOffset) -> Option<DateTime<Utc>> {
    let normalized = value.trim().replacen('T', " ", 1);
    let naive = NaiveDateTime::parse_from_str(&normalized, DATETIME_INPUT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S"))
        .ok()?;
    tz.from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Format a UTC instant for a date input in the given time zone
pub fn format_local_datetime(date: &DateTime<Utc>, tz: &FixedOffset) -> String {
    date.with_timezone(tz).format(DATETIME_INPUT_FORMAT).to_string()
}

/// One validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub code: String,
    pub message: String,
}

/// Validation failures keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<FieldError>>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, code: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(FieldError {
                code: code.to_string(),
                message: message.into(),
            });
    }

    pub fn required(&mut self, field: &str) {
        self.add(field, "required", "This field is required.");
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> &[FieldError] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has_code(&self, field: &str, code: &str) -> bool {
        self.get(field).iter().any(|e| e.code == code)
    }

    /// Messages per field, as handed to templates
    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.fields
            .iter()
            .map(|(field, errors)| {
                (
                    field.clone(),
                    errors.iter().map(|e| e.message.clone()).collect(),
                )
            })
            .collect()
    }

    /// `Ok(value)` when no error was recorded
    pub fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FormErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .flat_map(|(field, errors)| errors.iter().map(move |e| format!("{}: {}", field, e.message)))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}
