//! DELETE statement composer.

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::qb::expr::{ClauseList, CmpOp, Expr, Joiner};
use crate::qb::param::ParamList;
use crate::value::{Conditions, Value};

/// DELETE composer. A statement without WHERE is refused rather than
/// emptying the table.
#[derive(Debug)]
pub struct DeleteQb {
    table: String,
    where_clauses: ClauseList,
    build_error: Option<OrmError>,
}

impl DeleteQb {
    pub fn new(table: &str) -> Self {
        let (table, build_error) = match Ident::parse(table) {
            Ok(ident) => (ident.to_sql(), None),
            Err(e) => (String::new(), Some(e)),
        };
        Self {
            table,
            where_clauses: ClauseList::new(),
            build_error,
        }
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
        if self.where_clauses.is_empty() {
            return Err(OrmError::statement(format!(
                "DELETE FROM {} has no WHERE clause",
                self.table
            )));
        }
        let mut params = ParamList::new();
        let sql = format!(
            "DELETE FROM {} WHERE {}",
            self.table,
            self.where_clauses.build(&mut params)
        );
        Ok((sql, params))
    }
}
