//! Entity records and row decoding

use crate::changeset::ValidationErrors;
use crate::error::{OrmError, OrmResult};
use crate::value::{STORAGE_DATE, STORAGE_DATETIME, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_postgres::Row;
use tokio_postgres::types::Type;

/// A view-ready entity record: `field -> value`, the field errors attached
/// to it and, when requested, whether other entities reference it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record {
    #[serde(flatten)]
    values: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "ValidationErrors::is_empty")]
    pub errors: ValidationErrors,
    #[serde(rename = "hasDependencies", skip_serializing_if = "Option::is_none")]
    pub has_dependencies: Option<bool>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Field value, `Null` when absent.
    pub fn value(&self, field: &str) -> Value {
        self.values.get(field).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn remove(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub(crate) fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.values.get_mut(field)
    }

    /// Decode a database row. Dates come back in storage form.
    pub fn from_row(row: &Row) -> OrmResult<Self> {
        let mut record = Record::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let value = decode_column(row, idx, column.type_())
                .map_err(|e| OrmError::decode(column.name(), e.to_string()))?;
            record.set(column.name(), value);
        }
        Ok(record)
    }
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::from),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::Text(d.format(STORAGE_DATE).to_string())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|d| Value::Text(d.format(STORAGE_DATETIME).to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|d| Value::Text(d.naive_utc().format(STORAGE_DATETIME).to_string())),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|u| Value::Text(u.to_string())),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|j| Value::Text(j.to_string())),
        _ => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}
