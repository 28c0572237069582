//! Raw submitted input handed over by the form layer.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// One submitted form value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    Scalar(String),
    /// Positionally aligned values of a multi-row form.
    Multi(Vec<String>),
}

impl Submitted {
    /// First (or only) value.
    pub fn first(&self) -> Option<&str> {
        match self {
            Submitted::Scalar(s) => Some(s),
            Submitted::Multi(v) => v.first().map(String::as_str),
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            Submitted::Scalar(s) => vec![s.as_str()],
            Submitted::Multi(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for Submitted {
    fn from(s: &str) -> Self {
        Submitted::Scalar(s.to_string())
    }
}

impl From<String> for Submitted {
    fn from(s: String) -> Self {
        Submitted::Scalar(s)
    }
}

impl<S: Into<String>> From<Vec<S>> for Submitted {
    fn from(values: Vec<S>) -> Self {
        Submitted::Multi(values.into_iter().map(Into::into).collect())
    }
}

/// Descriptor of a freshly uploaded file waiting in a temporary location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub temp_path: PathBuf,
    /// Size announced by the client; the actual size is read from disk.
    pub declared_size: u64,
    pub content_type: Option<String>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            original_name: original_name.into(),
            temp_path: temp_path.into(),
            declared_size: 0,
            content_type: None,
        }
    }

    pub fn declared_size(mut self, size: u64) -> Self {
        self.declared_size = size;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Form fields and uploads of one request, keyed by form field name
/// (which may carry an alias prefix or suffix).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Submission {
    pub fields: BTreeMap<String, Submitted>,
    pub files: BTreeMap<String, UploadedFile>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Submitted>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(name.into(), file);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }
}
