//! Field-level validation error set.
//!
//! Errors accumulate per field as a set of tokens and are never cleared
//! implicitly; a builder keeps them for the lifetime of its pipeline run.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A machine-friendly validation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorToken {
    /// Mandatory field submitted empty or missing.
    Empty,
    /// Value does not satisfy the field type predicate.
    Type,
    /// Uploaded file extension/mime not in the allow-list.
    Format,
    /// Image dimensions out of bounds or not an exact match.
    Dimension,
    /// Uploaded file heavier than the configured limit.
    Weight,
    /// Value already present in another row.
    Unique,
}

impl ErrorToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Type => "type",
            Self::Format => "format",
            Self::Dimension => "dimension",
            Self::Weight => "weight",
            Self::Unique => "unique",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "type" => Some(Self::Type),
            "format" => Some(Self::Format),
            "dimension" => Some(Self::Dimension),
            "weight" => Some(Self::Weight),
            "unique" => Some(Self::Unique),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Accumulated `field -> {token}` errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, BTreeSet<ErrorToken>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of fields carrying at least one error.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Record `token` for `field`. Returns `false` if it was already present.
    pub fn push(&mut self, field: impl Into<String>, token: ErrorToken) -> bool {
        self.fields.entry(field.into()).or_default().insert(token)
    }

    pub fn extend(&mut self, other: &Self) {
        for (field, tokens) in &other.fields {
            self.fields
                .entry(field.clone())
                .or_default()
                .extend(tokens.iter().copied());
        }
    }

    pub fn has(&self, field: &str, token: ErrorToken) -> bool {
        self.fields.get(field).is_some_and(|t| t.contains(&token))
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&BTreeSet<ErrorToken>> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<ErrorToken>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, tokens) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            let tokens: Vec<&str> = tokens.iter().map(ErrorToken::as_str).collect();
            write!(f, "{}: {}", field, tokens.join("|"))?;
        }
        Ok(())
    }
}

/// Serializes as `{"Field": {"token": true}}`, the shape form views expect.
impl Serialize for ValidationErrors {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct Tokens<'a>(&'a BTreeSet<ErrorToken>);

        impl Serialize for Tokens<'_> {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for token in self.0 {
                    map.serialize_entry(token.as_str(), &true)?;
                }
                map.end()
            }
        }

        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, tokens) in &self.fields {
            map.serialize_entry(field, &Tokens(tokens))?;
        }
        map.end()
    }
}
