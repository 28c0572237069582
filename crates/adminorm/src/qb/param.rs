//! Positional parameter storage.

use crate::value::Value;

/// Collected statement parameters, numbered from `$1`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamList {
    params: Vec<Value>,
}

impl ParamList {
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 1-based index.
    pub fn push(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.params.len()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.params
    }

    pub fn into_vec(self) -> Vec<Value> {
        self.params
    }
}
