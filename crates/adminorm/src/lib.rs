//! # adminorm
//!
//! A mapping-driven CRUD builder for PostgreSQL-backed admin panels.
//!
//! ## Features
//!
//! - **Mapping catalog**: entities, typed fields, relations and dependency
//!   edges declared once (TOML or code) and shared read-only
//! - **Stateful builder**: chain predicates, joins, grouping and ordering,
//!   then run exactly one terminal (`execute`, `first`, `count`, `exist`,
//!   `insert`, `update`, `delete`)
//! - **Submission pipeline**: de-aliasing, mandatory and type checks, date
//!   pattern conversion and defaults, with per-field error tokens
//! - **File intake**: format, dimension and weight checks on uploads, moved
//!   into storage only after the owning row was written
//! - **Dependencies**: one-level `is_dependent` probes and cascade deletes
//! - **Form materializer**: `build` / `builds` pick a held submission, the
//!   stored row or mapping defaults
//! - **Transaction-friendly**: pass a transaction anywhere a `GenericClient`
//!   is expected; multi-statement writes run inside a `UnitOfWork`
//!
//! ## Example
//!
//! ```ignore
//! use adminorm::{Builder, Catalog, Conditions, Direction, Submission};
//!
//! let catalog = Catalog::load("adminorm.toml")?;
//! let client = pool.get().await?;
//!
//! let mut users = Builder::new(&catalog, "users", &client)?;
//! let page = users
//!     .where_like(&["EmailUser", "PseudoUser"], &["adm"])
//!     .order("EmailUser", Direction::Asc)
//!     .limit(Some(0), 20)
//!     .execute()
//!     .await?
//!     .into_vec()
//!     .await?;
//!
//! users.ingest(&submission)?;
//! users.update(&Conditions::new().with("IdUser", 4)).await?;
//! ```

pub mod builder;
pub mod catalog;
pub mod changeset;
pub mod client;
pub mod error;
pub mod ident;
pub mod qb;
pub mod row;
pub mod sanitize;
pub mod submission;
pub mod transaction;
pub mod upload;
pub mod value;

mod dependency;

#[cfg(test)]
mod test_support;

pub use builder::{Builder, RelationRef, Stage, StatementKind};
pub use catalog::{
    Catalog, ColumnRef, DatePattern, DefaultValue, DependencyEdge, EntityMapping, FieldMapping,
    FieldType, FileSpec, JoinKind, Relation,
};
pub use changeset::{ErrorToken, ValidationErrors};
pub use client::{GenericClient, RecordStream};
pub use error::{OrmError, OrmResult};
pub use qb::Direction;
pub use row::Record;
pub use sanitize::{DateFallback, FieldAlias};
pub use submission::{Submission, Submitted, UploadedFile};
pub use transaction::UnitOfWork;
pub use upload::FileInfo;
pub use value::{Conditions, Value};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
