//! Statement composers used by the builder.
//!
//! Every composer renders validated, double-quoted identifiers and numbers its
//! placeholders at build time. Composition errors (a hostile identifier, an
//! unknown relation) are recorded when they happen and surfaced by `build()`,
//! so chained calls never need to return `Result`.
//!
//! ```ignore
//! let mut qb = SelectQb::new("users");
//! qb.push_where(Joiner::And, Expr::compare("IdGroup", CmpOp::Eq, 1))
//!     .order_by("EmailUser", Direction::Asc);
//! let (sql, params) = qb.build()?;
//!
//! let (sql, params) = InsertQb::new("users")
//!     .value("EmailUser", "a@b.c")
//!     .default("IdUser")
//!     .returning("IdUser")
//!     .build()?;
//! ```

mod delete;
mod expr;
mod insert;
mod param;
mod select;
mod update;

pub use delete::DeleteQb;
pub use expr::{ClauseList, CmpOp, Expr, Joiner};
pub use insert::InsertQb;
pub use param::ParamList;
pub use select::{Direction, SelectQb};
pub use update::UpdateQb;

use crate::error::OrmError;

/// Re-raise a recorded composition error.
fn replay(err: &OrmError) -> OrmError {
    match err {
        OrmError::Configuration(m) => OrmError::Configuration(m.clone()),
        OrmError::Statement(m) => OrmError::Statement(m.clone()),
        other => OrmError::statement(other.to_string()),
    }
}

#[cfg(test)]
mod tests;
