//! UPDATE statement composer.

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::expr::{ClauseList, CmpOp, Expr, Joiner};
use crate::qb::param::ParamList;
use crate::value::{Conditions, Value};

/// UPDATE composer. A statement without SET or WHERE is refused.
#[derive(Debug)]
pub struct UpdateQb {
    table: String,
    set_fields: Vec<(Ident, Value)>,
    where_clauses: ClauseList,
    build_error: Option<OrmError>,
}

impl UpdateQb {
    pub fn new(table: &str) -> Self {
        let (table, build_error) = match Ident::parse(table) {
            Ok(ident) => (ident.to_sql(), None),
            Err(e) => (String::new(), Some(e)),
        };
        Self {
            table,
            set_fields: Vec::new(),
            where_clauses: ClauseList::new(),
            build_error,
        }
    }

    /// `SET column = value`
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        match Ident::parse(column) {
            Ok(ident) => self.set_fields.push((ident, value.into())),
            Err(e) => {
                self.build_error.get_or_insert(e);
            }
        }
        self
    }

    /// Add `WHERE column = value` (AND-joined).
    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        match Expr::compare(column, CmpOp::Eq, value) {
            Ok(expr) => self.where_clauses.push(Joiner::And, expr),
            Err(e) => {
                self.build_error.get_or_insert(e);
            }
        }
        self
    }

    /// Add one equality per key pair.
    pub fn filter(self, key: &Conditions) -> Self {
        key.iter()
            .fold(self, |qb, (column, value)| qb.eq(column, value.clone()))
    }

    pub fn build(&self) -> OrmResult<(String, ParamList)> {
        if let Some(e) = &self.build_error {
            return Err(super::replay(e));
        }
        if self.set_fields.is_empty() {
            return Err(OrmError::statement(format!(
                "UPDATE {} has no SET clause",
                self.table
            )));
        }
        if self.where_clauses.is_empty() {
            return Err(OrmError::statement(format!(
                "UPDATE {} has no WHERE clause",
                self.table
            )));
        }

        let mut params = ParamList::new();
        let sets: Vec<String> = self
            .set_fields
            .iter()
            .map(|(column, value)| format!("{} = ${}", column.to_sql(), params.push(value.clone())))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.table,
            sets.join(", "),
            self.where_clauses.build(&mut params)
        );
        Ok((sql, params))
    }
}
