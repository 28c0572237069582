//! TOML catalog format.
//!
//! ```toml
//! [entities.users]
//! table = "users"            # optional, defaults to the entity name
//!
//! [[entities.users.fields]]
//! name = "IdUser"
//! type = "integer"           # integer | string | text | date | datetime (INT / STR accepted)
//! autoincrement = true
//! primary = true
//!
//! [[entities.users.fields]]
//! name = "BirthUser"
//! type = "date"
//! pattern = "DD.MM.YYYY"
//! default = "NOW"
//!
//! [[entities.users.fields]]
//! name = "AvatarUser"
//! type = "string"
//! file = { storage_path = "uploads/avatars/", max_width = 200, max_height = 200, resize_allowed = true }
//!
//! [[entities.users.relations]]
//! name = "groups"
//! left = "users.IdGroup"
//! right = "groups.IdGroup"
//! kind = "left"              # left | inner | right
//! ```

use super::{
    Catalog, ColumnRef, DatePattern, DefaultValue, DependencyEdge, EntityMapping, FieldMapping,
    FieldType, FileSpec, JoinKind, Relation,
};
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    entities: BTreeMap<String, RawEntity>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntity {
    table: Option<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    relations: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    field_type: Option<String>,
    #[serde(default)]
    autoincrement: bool,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    mandatory: bool,
    default: Option<toml::Value>,
    pattern: Option<String>,
    file: Option<FileSpec>,
    #[serde(default)]
    dependencies: Vec<DependencyEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRelation {
    name: String,
    left: String,
    right: String,
    kind: Option<String>,
}

pub(super) fn parse(source: &str) -> OrmResult<Catalog> {
    let raw: RawCatalog = toml::from_str(source)
        .map_err(|e| OrmError::configuration(format!("invalid catalog: {e}")))?;

    let mut catalog = Catalog::new();
    for (name, entity) in raw.entities {
        catalog.insert(convert_entity(name, entity)?)?;
    }
    Ok(catalog)
}

fn convert_entity(name: String, raw: RawEntity) -> OrmResult<EntityMapping> {
    let mut mapping = EntityMapping::new(name.as_str());
    if let Some(table) = raw.table {
        mapping = mapping.table_name(table);
    }
    for field in raw.fields {
        mapping = mapping.field(convert_field(&name, field)?);
    }
    for relation in raw.relations {
        mapping = mapping.relation(convert_relation(&name, relation)?);
    }
    Ok(mapping)
}

fn convert_field(entity: &str, raw: RawField) -> OrmResult<FieldMapping> {
    let type_name = raw.field_type.ok_or_else(|| {
        OrmError::configuration(format!(
            "field '{}' of entity '{entity}' has no type",
            raw.name
        ))
    })?;
    let field_type = FieldType::parse(&type_name).map_err(|e| {
        OrmError::configuration(format!("field '{}' of entity '{entity}': {e}", raw.name))
    })?;

    let mut field = FieldMapping::new(raw.name, field_type);
    field.autoincrement = raw.autoincrement;
    field.primary = raw.primary;
    field.mandatory = raw.mandatory;
    field.default = raw
        .default
        .map(|v| convert_default(entity, &field.name, field_type, v))
        .transpose()?;
    field.date_pattern = raw.pattern.as_deref().map(DatePattern::parse).transpose()?;
    field.file = raw.file;
    field.dependencies = raw.dependencies;
    Ok(field)
}

fn convert_default(
    entity: &str,
    field: &str,
    field_type: FieldType,
    value: toml::Value,
) -> OrmResult<DefaultValue> {
    let literal = match value {
        toml::Value::String(s) if field_type.is_date() && s.eq_ignore_ascii_case("now") => {
            return Ok(DefaultValue::Now);
        }
        toml::Value::String(s) => Value::Text(s),
        toml::Value::Integer(n) => Value::Int(n),
        toml::Value::Float(f) => Value::Float(f),
        toml::Value::Boolean(b) => Value::from(b),
        other => {
            return Err(OrmError::configuration(format!(
                "field '{field}' of entity '{entity}': unsupported default {other}"
            )));
        }
    };
    Ok(DefaultValue::Literal(literal))
}

fn convert_relation(entity: &str, raw: RawRelation) -> OrmResult<Relation> {
    let endpoint = |s: &str| -> OrmResult<ColumnRef> {
        s.split_once('.')
            .map(|(table, column)| ColumnRef::from((table, column)))
            .ok_or_else(|| {
                OrmError::configuration(format!(
                    "relation '{}' of entity '{entity}': expected table.column, got '{s}'",
                    raw.name
                ))
            })
    };
    let left = endpoint(&raw.left)?;
    let right = endpoint(&raw.right)?;
    let kind = raw
        .kind
        .as_deref()
        .map(JoinKind::parse)
        .transpose()?
        .unwrap_or_default();
    Ok(Relation::new(raw.name.as_str(), left, right).kind(kind))
}
