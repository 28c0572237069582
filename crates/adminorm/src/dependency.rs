//! One-level dependency edges between entities.
//!
//! A field may declare that rows of other tables reference its value. The
//! resolver composes the probe and cascade statements for one row; running
//! them is left to the builder so they land in its statement log and unit of
//! work. Edges are never followed transitively.

use crate::catalog::EntityMapping;
use crate::error::OrmResult;
use crate::qb::{CmpOp, DeleteQb, Expr, Joiner, ParamList, SelectQb};
use crate::row::Record;
use crate::value::Value;

/// A composed statement against a referencing table.
#[derive(Debug, Clone)]
pub(crate) struct EdgeStatement {
    pub table: String,
    pub column: String,
    pub statement: (String, ParamList),
}

/// `(table, column, value)` for every edge whose owning field has a value in
/// `record`. Null and missing values reference nothing.
fn references<'m>(
    mapping: &'m EntityMapping,
    record: &Record,
) -> impl Iterator<Item = (&'m str, &'m str, Value)> {
    mapping
        .dependent_fields()
        .filter_map(|field| {
            record
                .get(&field.name)
                .filter(|v| !v.is_null())
                .map(|v| (field, v.clone()))
        })
        .flat_map(|(field, value)| {
            field.dependencies.iter().flat_map(move |edge| {
                let value = value.clone();
                edge.fields
                    .iter()
                    .map(move |column| (edge.entity.as_str(), column.as_str(), value.clone()))
            })
        })
}

/// `SELECT "col" FROM "table" WHERE "col" = $1 LIMIT 1` per edge column.
pub(crate) fn probes(mapping: &EntityMapping, record: &Record) -> OrmResult<Vec<EdgeStatement>> {
    references(mapping, record)
        .map(|(table, column, value)| {
            let mut qb = SelectQb::new(table);
            qb.columns(&[column])
                .push_where(Joiner::And, Expr::compare(column, CmpOp::Eq, value))
                .limit(1);
            Ok(EdgeStatement {
                table: table.to_string(),
                column: column.to_string(),
                statement: qb.build()?,
            })
        })
        .collect()
}

/// `DELETE FROM "table" WHERE "col" = $1` per edge column.
pub(crate) fn cascades(mapping: &EntityMapping, record: &Record) -> OrmResult<Vec<EdgeStatement>> {
    references(mapping, record)
        .map(|(table, column, value)| {
            Ok(EdgeStatement {
                table: table.to_string(),
                column: column.to_string(),
                statement: DeleteQb::new(table).eq(column, value).build()?,
            })
        })
        .collect()
}

/// Columns a row must carry for [`probes`] and [`cascades`].
pub(crate) fn owning_columns(mapping: &EntityMapping) -> Vec<&str> {
    mapping
        .dependent_fields()
        .map(|f| f.name.as_str())
        .collect()
}
