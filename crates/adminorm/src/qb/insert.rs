//! INSERT statement composer.

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::param::ParamList;
use crate::value::Value;

/// Value slot of an inserted column.
#[derive(Clone, Debug, PartialEq)]
enum InsertValue {
    /// `DEFAULT`, used for autoincrement columns.
    Default,
    Value(Value),
}

/// Single-row INSERT composer.
#[derive(Debug)]
pub struct InsertQb {
    table: String,
    columns: Vec<(Ident, InsertValue)>,
    returning: Option<Ident>,
    build_error: Option<OrmError>,
}

impl InsertQb {
    pub fn new(table: &str) -> Self {
        let (table, build_error) = match Ident::parse(table) {
            Ok(ident) => (ident.to_sql(), None),
            Err(e) => (String::new(), Some(e)),
        };
        Self {
            table,
            columns: Vec::new(),
            returning: None,
            build_error,
        }
    }

    fn push(mut self, column: &str, value: InsertValue) -> Self {
        match Ident::parse(column) {
            Ok(ident) => self.columns.push((ident, value)),
            Err(e) => {
                self.build_error.get_or_insert(e);
            }
        }
        self
    }

    /// Bind a column value.
    pub fn value(self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, InsertValue::Value(value.into()))
    }

    /// Leave the column to its database default.
    pub fn default(self, column: &str) -> Self {
        self.push(column, InsertValue::Default)
    }

    /// `RETURNING column`
    pub fn returning(mut self, column: &str) -> Self {
        match Ident::parse(column) {
            Ok(ident) => self.returning = Some(ident),
            Err(e) => {
                self.build_error.get_or_insert(e);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Build the INSERT statement. No columns renders `DEFAULT VALUES`.
    pub fn build(&self) -> OrmResult<(String, ParamList)> {
        if let Some(e) = &self.build_error {
            return Err(super::replay(e));
        }
        let mut params = ParamList::new();
        let mut sql = format!("INSERT INTO {}", self.table);

        if self.columns.is_empty() {
            sql.push_str(" DEFAULT VALUES");
        } else {
            let names: Vec<String> = self.columns.iter().map(|(c, _)| c.to_sql()).collect();
            let values: Vec<String> = self
                .columns
                .iter()
                .map(|(_, v)| match v {
                    InsertValue::Default => "DEFAULT".to_string(),
                    InsertValue::Value(v) => format!("${}", params.push(v.clone())),
                })
                .collect();
            sql.push_str(&format!(
                " ({}) VALUES ({})",
                names.join(", "),
                values.join(", ")
            ));
        }

        if let Some(returning) = &self.returning {
            sql.push_str(" RETURNING ");
            returning.write_sql(&mut sql);
        }
        Ok((sql, params))
    }
}
