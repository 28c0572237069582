//! Datum sanitizer: de-aliasing, type checks, coercion and default resolution.
//!
//! A [`Pipeline`] holds one submission for the lifetime of a builder run:
//! the raw values as typed (for re-presenting a failed form), the errors
//! accumulated while checking them, and the metadata of accepted files.
//! Errors only ever grow; a successful write discards the whole pipeline.

mod date;

pub(crate) use date::{resolve_default, to_external, to_storage};

use crate::catalog::{EntityMapping, FieldMapping, FieldType};
use crate::changeset::{ErrorToken, ValidationErrors};
use crate::row::Record;
use crate::submission::Submitted;
use crate::upload::FileInfo;
use crate::value::Value;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Prefix/suffix that form field names carry on top of the mapped name
/// (`edit_EmailUser`, `EmailUser_2`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAlias {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

impl FieldAlias {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.is_empty());
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into()).filter(|s: &String| !s.is_empty());
        self
    }

    /// Mapped name of a form field. The prefix wins when both are set.
    pub fn strip<'a>(&self, form_field: &'a str) -> &'a str {
        if let Some(prefix) = &self.prefix {
            return form_field
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('_'))
                .unwrap_or(form_field);
        }
        if let Some(suffix) = &self.suffix {
            return form_field
                .strip_suffix(suffix.as_str())
                .and_then(|rest| rest.strip_suffix('_'))
                .unwrap_or(form_field);
        }
        form_field
    }

    /// `_prefix_suffix`, appended to generated unique file names.
    pub fn fix_string(&self) -> String {
        let mut out = String::new();
        for part in [&self.prefix, &self.suffix].into_iter().flatten() {
            out.push('_');
            out.push_str(part);
        }
        out
    }
}

/// What a malformed or calendar-invalid date becomes.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFallback {
    /// Use the field's default when it has one.
    pub use_default: bool,
    /// Value used otherwise.
    pub blank: Value,
}

impl Default for DateFallback {
    fn default() -> Self {
        Self {
            use_default: true,
            blank: Value::Null,
        }
    }
}

/// Finalized value of one field, ready for a write.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Autoincrement column, rendered as `DEFAULT`.
    Auto,
    Value(Value),
    /// Multi-row values, one per position.
    Rows(Vec<Value>),
}

/// Finalized field set in mapping order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finalized {
    fields: Vec<(String, Slot)>,
}

impl Finalized {
    pub fn get(&self, field: &str) -> Option<&Slot> {
        self.fields.iter().find(|(f, _)| f == field).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.fields.iter().map(|(f, s)| (f.as_str(), s))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_multi(&self) -> bool {
        self.fields.iter().any(|(_, s)| matches!(s, Slot::Rows(_)))
    }

    /// Multi-valued fields submitted without any position.
    pub fn empty_groups(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|(f, s)| match s {
            Slot::Rows(values) if values.is_empty() => Some(f.as_str()),
            _ => None,
        })
    }

    /// Expand into one value set per row. Multi-valued fields are zipped by
    /// position; shorter ones are padded with null, scalars repeat. `None`
    /// marks an autoincrement column.
    pub fn rows(&self) -> Vec<Vec<(String, Option<Value>)>> {
        let count = self
            .fields
            .iter()
            .filter_map(|(_, s)| match s {
                Slot::Rows(values) => Some(values.len()),
                _ => None,
            })
            .max()
            .unwrap_or(1);

        (0..count)
            .map(|i| {
                self.fields
                    .iter()
                    .map(|(field, slot)| {
                        let value = match slot {
                            Slot::Auto => None,
                            Slot::Value(v) => Some(v.clone()),
                            Slot::Rows(values) => Some(values.get(i).cloned().unwrap_or_default()),
                        };
                        (field.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Whether a submitted string counts as empty for mandatory checks.
fn is_empty(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Type predicate of a non-empty value.
fn matches_type(field_type: FieldType, raw: &str) -> bool {
    match field_type {
        FieldType::Integer => raw.trim().parse::<f64>().is_ok_and(f64::is_finite),
        FieldType::ShortString => !raw.chars().any(|c| c.is_control() && c != '\t'),
        FieldType::Text | FieldType::Date | FieldType::DateTime => true,
    }
}

/// Submission state of one builder run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    raw: BTreeMap<String, Submitted>,
    errors: ValidationErrors,
    files: BTreeMap<String, FileInfo>,
    now: NaiveDateTime,
}

impl Pipeline {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            raw: BTreeMap::new(),
            errors: ValidationErrors::new(),
            files: BTreeMap::new(),
            now,
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: NaiveDateTime) {
        self.now = now;
    }

    /// Anything submitted and not yet written.
    pub fn is_held(&self) -> bool {
        !self.raw.is_empty() || !self.errors.is_empty()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn add_error(&mut self, field: impl Into<String>, token: ErrorToken) {
        self.errors.push(field, token);
    }

    pub fn raw(&self, field: &str) -> Option<&Submitted> {
        self.raw.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.raw.contains_key(field)
    }

    pub fn file_info(&self, field: &str) -> Option<&FileInfo> {
        self.files.get(field)
    }

    /// Check and hold one submitted field (already de-aliased).
    ///
    /// Multi values of non-file fields are checked one by one; a file field
    /// only looks at its first value. An empty group is checked as an empty
    /// value.
    pub fn accept(&mut self, field: &FieldMapping, value: Submitted) {
        match &value {
            Submitted::Multi(values) if !field.is_file() && !values.is_empty() => {
                for v in values {
                    self.check(field, v);
                }
            }
            other => self.check(field, other.first().unwrap_or("")),
        }
        self.raw.insert(field.name.clone(), value);
    }

    /// Hold a stored or freshly staged file reference.
    pub(crate) fn accept_file(&mut self, field: &FieldMapping, info: FileInfo) {
        self.raw
            .insert(field.name.clone(), Submitted::Scalar(info.name.clone()));
        self.files.insert(field.name.clone(), info);
    }

    /// Hold a value for re-presentation without checking it.
    pub(crate) fn hold(&mut self, field: &FieldMapping, value: Submitted) {
        self.raw.insert(field.name.clone(), value);
    }

    fn check(&mut self, field: &FieldMapping, raw: &str) {
        if field.mandatory && is_empty(raw) {
            self.errors.push(field.name.as_str(), ErrorToken::Empty);
        } else if !is_empty(raw) && !matches_type(field.field_type, raw) {
            self.errors.push(field.name.as_str(), ErrorToken::Type);
        }
    }

    /// Coerce one raw value into its storage value.
    pub fn coerce(&self, field: &FieldMapping, raw: &str, fallback: &DateFallback) -> Value {
        match field.field_type {
            FieldType::Integer => {
                let raw = raw.trim();
                if raw.is_empty() {
                    Value::Null
                } else if let Ok(n) = raw.parse::<i64>() {
                    Value::Int(n)
                } else if let Ok(f) = raw.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Text(raw.to_string())
                }
            }
            FieldType::ShortString | FieldType::Text => Value::Text(raw.to_string()),
            FieldType::Date | FieldType::DateTime => match to_storage(field, raw) {
                Some(storage) => Value::Text(storage),
                None => self.date_fallback(field, fallback),
            },
        }
    }

    fn date_fallback(&self, field: &FieldMapping, fallback: &DateFallback) -> Value {
        if fallback.use_default
            && let Some(default) = resolve_default(field, self.now)
        {
            return default;
        }
        fallback.blank.clone()
    }

    fn submitted_slot(
        &self,
        field: &FieldMapping,
        submitted: &Submitted,
        fallback: &DateFallback,
    ) -> Slot {
        match submitted {
            Submitted::Multi(values) if !field.is_file() => Slot::Rows(
                values
                    .iter()
                    .map(|v| self.coerce(field, v, fallback))
                    .collect(),
            ),
            other => Slot::Value(self.coerce(field, other.first().unwrap_or(""), fallback)),
        }
    }

    /// Finalize for an INSERT.
    ///
    /// Autoincrement fields are always left to the database. Submitted
    /// fields that passed their checks are coerced, unsubmitted fields take
    /// their default, and an unsubmitted mandatory field without a default
    /// records an `empty` error.
    pub fn finalize_insert(&mut self, mapping: &EntityMapping, fallback: &DateFallback) -> Finalized {
        let mut fields = Vec::new();
        for field in mapping.fields() {
            if field.autoincrement {
                fields.push((field.name.clone(), Slot::Auto));
            } else if let Some(submitted) = self.raw.get(&field.name) {
                if !self.errors.contains_field(&field.name) {
                    fields.push((field.name.clone(), self.submitted_slot(field, submitted, fallback)));
                }
            } else if let Some(default) = resolve_default(field, self.now) {
                fields.push((field.name.clone(), Slot::Value(default)));
            } else if field.mandatory {
                self.errors.push(field.name.as_str(), ErrorToken::Empty);
            }
        }
        Finalized { fields }
    }

    /// Finalize for an UPDATE. Unsubmitted optional fields are left alone;
    /// an unsubmitted mandatory field takes its default or records `empty`.
    pub fn finalize_update(&mut self, mapping: &EntityMapping, fallback: &DateFallback) -> Finalized {
        let mut fields = Vec::new();
        for field in mapping.fields() {
            match self.raw.get(&field.name) {
                Some(submitted) if !field.autoincrement => {
                    if !self.errors.contains_field(&field.name) {
                        fields.push((field.name.clone(), self.submitted_slot(field, submitted, fallback)));
                    }
                }
                _ if field.mandatory && !field.autoincrement => {
                    match resolve_default(field, self.now) {
                        Some(default) => fields.push((field.name.clone(), Slot::Value(default))),
                        None => {
                            self.errors.push(field.name.as_str(), ErrorToken::Empty);
                        }
                    }
                }
                _ => {}
            }
        }
        Finalized { fields }
    }

    /// Record of the held submission, as typed, with its errors.
    /// `position` selects one row of multi-valued fields.
    pub fn held_record(&self, mapping: &EntityMapping, position: Option<usize>) -> Record {
        let mut record = Record::new();
        for field in mapping.fields() {
            let value = match (self.raw.get(&field.name), position) {
                (Some(Submitted::Multi(values)), Some(i)) => values.get(i).cloned().unwrap_or_default(),
                (Some(submitted), _) => submitted.first().unwrap_or("").to_string(),
                (None, _) => String::new(),
            };
            record.set(field.name.as_str(), value);
        }
        record.errors = self.errors.clone();
        record
    }

    /// Number of rows held by multi-valued fields (0 when none).
    pub fn held_rows(&self) -> usize {
        self.raw
            .values()
            .filter_map(|s| match s {
                Submitted::Multi(values) => Some(values.len()),
                Submitted::Scalar(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

/// Render a record's date columns through their external patterns.
pub fn present(mapping: &EntityMapping, mut record: Record) -> Record {
    for field in mapping.fields().iter().filter(|f| f.field_type.is_date()) {
        if let Some(value) = record.get_mut(&field.name) {
            *value = to_external(field, value);
        }
    }
    record
}

/// Record synthesized from mapping defaults, dates in external form.
pub fn defaults_record(mapping: &EntityMapping, now: NaiveDateTime) -> Record {
    let mut record = Record::new();
    for field in mapping.fields() {
        let value = match resolve_default(field, now) {
            Some(v) if field.field_type.is_date() => to_external(field, &v),
            Some(Value::Null) | None => Value::Text(String::new()),
            Some(v) => v,
        };
        record.set(field.name.as_str(), value);
    }
    record
}
