//! Per-field mapping definitions.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Declared storage type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    ShortString,
    Text,
    Date,
    DateTime,
}

impl FieldType {
    /// Parse a type name. Accepts the long names and the short `INT`/`STR` forms,
    /// case-insensitively.
    pub fn parse(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Integer),
            "str" | "string" | "short_string" => Ok(Self::ShortString),
            "text" => Ok(Self::Text),
            "date" => Ok(Self::Date),
            "datetime" => Ok(Self::DateTime),
            other => Err(OrmError::configuration(format!(
                "unknown field type '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::ShortString => "string",
            Self::Text => "text",
            Self::Date => "date",
            Self::DateTime => "datetime",
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping default: a literal, or the current date/time for date fields.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Now,
}

/// One component of an external date pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
}

impl DatePart {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "YYYY" => Some(Self::Year),
            "MM" => Some(Self::Month),
            "DD" => Some(Self::Day),
            _ => None,
        }
    }

    fn token(&self) -> &'static str {
        match self {
            Self::Year => "YYYY",
            Self::Month => "MM",
            Self::Day => "DD",
        }
    }
}

/// External date pattern such as `DD.MM.YYYY` or `YYYY-MM-DD`.
///
/// Only the date part is described; a datetime keeps its `HH:MM:SS` suffix
/// as-is in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatePattern {
    order: [DatePart; 3],
    separator: char,
}

impl DatePattern {
    /// Parse a pattern. A trailing time part (`DD.MM.YYYY HH:MM:SS`) is ignored.
    pub fn parse(pattern: &str) -> OrmResult<Self> {
        let invalid =
            || OrmError::configuration(format!("invalid date pattern '{pattern}'"));

        let date = pattern.split_whitespace().next().ok_or_else(invalid)?;
        let separator = if date.contains('.') {
            '.'
        } else if date.contains('-') {
            '-'
        } else {
            return Err(invalid());
        };

        let parts: Vec<DatePart> = date
            .split(separator)
            .map(DatePart::parse)
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;
        let [a, b, c] = parts[..] else {
            return Err(invalid());
        };
        if a == b || b == c || a == c {
            return Err(invalid());
        }

        Ok(Self {
            order: [a, b, c],
            separator,
        })
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Rearrange an external date (`05.03.2024`) into storage order (`2024-03-05`).
    ///
    /// Only the shape is checked here; calendar validity is the sanitizer's job.
    pub fn to_storage(&self, external: &str) -> Option<String> {
        let pieces: Vec<&str> = external.trim().split(self.separator).collect();
        if pieces.len() != 3 {
            return None;
        }
        let (mut year, mut month, mut day) = ("", "", "");
        for (part, piece) in self.order.iter().zip(pieces) {
            match part {
                DatePart::Year => year = piece,
                DatePart::Month => month = piece,
                DatePart::Day => day = piece,
            }
        }
        Some(format!("{year}-{month}-{day}"))
    }

    /// Rearrange a storage date (`2024-03-05`) into this pattern.
    /// Anything that is not a three-part date is returned unchanged.
    pub fn to_external(&self, storage: &str) -> String {
        let pieces: Vec<&str> = storage.split('-').collect();
        let [year, month, day] = pieces[..] else {
            return storage.to_string();
        };
        let mut out = String::with_capacity(storage.len());
        for (i, part) in self.order.iter().enumerate() {
            if i > 0 {
                out.push(self.separator);
            }
            out.push_str(match part {
                DatePart::Year => year,
                DatePart::Month => month,
                DatePart::Day => day,
            });
        }
        out
    }
}

impl fmt::Display for DatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.order.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", self.separator)?;
            }
            f.write_str(part.token())?;
        }
        Ok(())
    }
}

/// Upload constraints and destination for a file-backed field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub max_height: Option<u32>,
    /// Require the image to match `max_width`x`max_height` exactly.
    #[serde(default)]
    pub exact_dimensions: bool,
    /// Shrink oversized images instead of rejecting them.
    #[serde(default)]
    pub resize_allowed: bool,
    #[serde(default)]
    pub max_size_kb: Option<u64>,
    #[serde(default)]
    pub unique_name: bool,
    /// Lowercase extensions or mime subtypes (`jpg`, `png`, `pdf`).
    #[serde(default)]
    pub allowed_formats: Vec<String>,
    pub storage_path: PathBuf,
}

impl FileSpec {
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: storage_path.into(),
            ..Self::default()
        }
    }

    pub fn dimensions(mut self, max_width: u32, max_height: u32) -> Self {
        self.max_width = Some(max_width);
        self.max_height = Some(max_height);
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact_dimensions = true;
        self
    }

    pub fn resize(mut self) -> Self {
        self.resize_allowed = true;
        self
    }

    pub fn max_size_kb(mut self, kb: u64) -> Self {
        self.max_size_kb = Some(kb);
        self
    }

    pub fn unique_name(mut self) -> Self {
        self.unique_name = true;
        self
    }

    pub fn formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.allowed_formats = formats
            .into_iter()
            .map(|f| f.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Both bounds set: uploads are inspected as images.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        self.max_width.zip(self.max_height)
    }
}

/// Another entity referencing this field's value.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyEdge {
    /// Referencing table.
    pub entity: String,
    /// Columns of `entity` holding the reference.
    pub fields: Vec<String>,
}

impl DependencyEdge {
    pub fn new<I, S>(entity: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Mapping of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub name: String,
    pub field_type: FieldType,
    pub autoincrement: bool,
    pub primary: bool,
    pub mandatory: bool,
    pub default: Option<DefaultValue>,
    pub date_pattern: Option<DatePattern>,
    pub file: Option<FileSpec>,
    pub dependencies: Vec<DependencyEdge>,
}

impl FieldMapping {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            autoincrement: false,
            primary: false,
            mandatory: false,
            default: None,
            date_pattern: None,
            file: None,
            dependencies: Vec::new(),
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn short_string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::ShortString)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn pattern(mut self, pattern: DatePattern) -> Self {
        self.date_pattern = Some(pattern);
        self
    }

    pub fn file(mut self, spec: FileSpec) -> Self {
        self.file = Some(spec);
        self
    }

    pub fn depends(mut self, edge: DependencyEdge) -> Self {
        self.dependencies.push(edge);
        self
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }
}
