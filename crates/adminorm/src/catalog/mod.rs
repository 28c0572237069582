//! Mapping catalog: immutable per-entity field and relation definitions.
//!
//! A [`Catalog`] is built once at startup, either programmatically or from a
//! TOML file, and then shared by reference with every builder.
//!
//! ```ignore
//! let catalog = Catalog::new().with_entity(
//!     EntityMapping::new("users")
//!         .field(FieldMapping::integer("IdUser").autoincrement().primary())
//!         .field(FieldMapping::short_string("EmailUser").mandatory())
//!         .relation(Relation::new("groups", ("users", "IdGroup"), ("groups", "IdGroup"))),
//! )?;
//! ```

mod config;
mod field;

pub use field::{
    DatePart, DatePattern, DefaultValue, DependencyEdge, FieldMapping, FieldType, FileSpec,
};

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// SQL join kind used when resolving relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    LeftOuter,
    Inner,
    RightOuter,
}

impl JoinKind {
    pub fn parse(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "left outer" | "left_outer" => Ok(Self::LeftOuter),
            "inner" => Ok(Self::Inner),
            "right" | "right outer" | "right_outer" => Ok(Self::RightOuter),
            other => Err(OrmError::configuration(format!("unknown join kind '{other}'"))),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::LeftOuter => "LEFT OUTER JOIN",
            Self::Inner => "INNER JOIN",
            Self::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// `table.column` endpoint of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl<T: Into<String>, C: Into<String>> From<(T, C)> for ColumnRef {
    fn from((table, column): (T, C)) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Named join path. `right.table` is the joined table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
    pub kind: JoinKind,
}

impl Relation {
    pub fn new(
        name: impl Into<String>,
        left: impl Into<ColumnRef>,
        right: impl Into<ColumnRef>,
    ) -> Self {
        Self {
            name: name.into(),
            left: left.into(),
            right: right.into(),
            kind: JoinKind::default(),
        }
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Field and relation definitions of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMapping {
    name: String,
    table: String,
    fields: Vec<FieldMapping>,
    relations: Vec<Relation>,
}

impl EntityMapping {
    /// New mapping whose table is named after the entity.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: name.clone(),
            name,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn table_name(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldMapping] {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == field)
    }

    pub fn primary(&self) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.primary)
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.file.is_some())
    }

    pub fn dependent_fields(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| !f.dependencies.is_empty())
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn find_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Check the invariants a builder relies on.
    pub fn validate(&self) -> OrmResult<()> {
        let config = |e: OrmError| OrmError::configuration(format!("entity '{}': {e}", self.name));

        Ident::parse(&self.table).map_err(config)?;
        if self.fields.is_empty() {
            return Err(OrmError::configuration(format!(
                "entity '{}' has no fields",
                self.name
            )));
        }

        let mut seen = BTreeSet::new();
        for field in &self.fields {
            Ident::parse(&field.name).map_err(config)?;
            if !seen.insert(field.name.as_str()) {
                return Err(OrmError::configuration(format!(
                    "entity '{}': duplicate field '{}'",
                    self.name, field.name
                )));
            }
            if field.date_pattern.is_some() && !field.field_type.is_date() {
                return Err(OrmError::configuration(format!(
                    "entity '{}': field '{}' has a date pattern but is {}",
                    self.name, field.name, field.field_type
                )));
            }
            for edge in &field.dependencies {
                Ident::parse(&edge.entity).map_err(config)?;
                if edge.fields.is_empty() {
                    return Err(OrmError::configuration(format!(
                        "entity '{}': dependency on '{}' names no fields",
                        self.name, edge.entity
                    )));
                }
                for f in &edge.fields {
                    Ident::parse(f).map_err(config)?;
                }
            }
        }

        let primaries = self.fields.iter().filter(|f| f.primary).count();
        if primaries > 1 {
            return Err(OrmError::configuration(format!(
                "entity '{}' declares {primaries} primary fields",
                self.name
            )));
        }

        let mut names = BTreeSet::new();
        for relation in &self.relations {
            if !names.insert(relation.name.as_str()) {
                return Err(OrmError::configuration(format!(
                    "entity '{}': duplicate relation '{}'",
                    self.name, relation.name
                )));
            }
            for end in [&relation.left, &relation.right] {
                Ident::parse(&end.table).map_err(config)?;
                Ident::parse(&end.column).map_err(config)?;
            }
        }
        Ok(())
    }
}

/// Process-wide registry of entity mappings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    entities: BTreeMap<String, EntityMapping>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a mapping (builder style).
    pub fn with_entity(mut self, mapping: EntityMapping) -> OrmResult<Self> {
        self.insert(mapping)?;
        Ok(self)
    }

    /// Validate and register a mapping, replacing any previous one of the same name.
    pub fn insert(&mut self, mapping: EntityMapping) -> OrmResult<()> {
        mapping.validate()?;
        self.entities.insert(mapping.name.clone(), mapping);
        Ok(())
    }

    /// Look up an entity; unknown names are configuration errors.
    pub fn entity(&self, name: &str) -> OrmResult<&EntityMapping> {
        self.entities
            .get(name)
            .ok_or_else(|| OrmError::configuration(format!("unknown entity '{name}'")))
    }

    pub fn get(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityMapping> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Parse a TOML catalog document.
    pub fn from_toml_str(source: &str) -> OrmResult<Self> {
        config::parse(source)
    }

    /// Read and parse a TOML catalog file.
    pub fn load(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let source =
            std::fs::read_to_string(path).map_err(|e| OrmError::filesystem(path, e))?;
        Self::from_toml_str(&source)
    }
}
