//! The per-entity builder.
//!
//! A [`Builder`] owns one entity of a shared [`Catalog`] and one client. It
//! holds a submission pipeline (values, errors, staged uploads) and at most
//! one pending SELECT composition. Terminal calls run the statement, append
//! it to [`Builder::statements`] and clear only their own state.
//!
//! ```ignore
//! let mut users = Builder::new(&catalog, "users", &client)?;
//! let admins = users
//!     .select(&["IdUser", "EmailUser"])
//!     .where_eq([("IdGroup", 1)])
//!     .order("EmailUser", Direction::Asc)
//!     .execute()
//!     .await?
//!     .into_vec()
//!     .await?;
//!
//! users.ingest(&submission)?;
//! match users.insert().await {
//!     Ok(Some(record)) => { /* reloaded row */ }
//!     Ok(None) => { /* entity has no primary field */ }
//!     Err(e) if e.is_validation() => { /* re-present users.build(None) */ }
//!     Err(e) => return Err(e),
//! }
//! ```

mod read;
mod state;
mod writes;

#[cfg(test)]
mod tests;

pub use state::{Stage, StatementKind};

use crate::catalog::{Catalog, EntityMapping, JoinKind};
use crate::changeset::{ErrorToken, ValidationErrors};
use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::qb::{CmpOp, Direction, Expr, Joiner, SelectQb};
use crate::sanitize::{DateFallback, FieldAlias, Pipeline};
use crate::submission::{Submission, Submitted};
use crate::upload::{self, FileInfo, StagedMove};
use crate::value::{Conditions, Value};
use chrono::NaiveDateTime;
use state::StatementLog;

/// Relations to join, resolved from an entity's configured relations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRef {
    /// Entity whose relations are looked up.
    pub owner: String,
    /// One relation, or all of the owner's relations when `None`.
    pub name: Option<String>,
    /// Overrides the relation's configured join kind.
    pub kind: Option<JoinKind>,
}

impl RelationRef {
    pub fn all(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: None,
            kind: None,
        }
    }

    pub fn named(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: Some(name.into()),
            kind: None,
        }
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Stateful builder bound to one entity.
pub struct Builder<'a, C: GenericClient> {
    catalog: &'a Catalog,
    mapping: &'a EntityMapping,
    client: &'a C,
    alias: FieldAlias,
    fallback: DateFallback,
    pipeline: Pipeline,
    staged: Vec<StagedMove>,
    select: Option<SelectQb>,
    with_dependencies: bool,
    stage: Stage,
    log: StatementLog,
}

impl<'a, C: GenericClient> Builder<'a, C> {
    /// Bind a builder to `entity`. Unknown entities are configuration errors.
    pub fn new(catalog: &'a Catalog, entity: &str, client: &'a C) -> OrmResult<Self> {
        let mapping = catalog.entity(entity)?;
        Ok(Self {
            catalog,
            mapping,
            client,
            alias: FieldAlias::default(),
            fallback: DateFallback::default(),
            pipeline: Pipeline::new(chrono::Local::now().naive_local()),
            staged: Vec::new(),
            select: None,
            with_dependencies: false,
            stage: Stage::Idle,
            log: StatementLog::default(),
        })
    }

    /// Form field prefix/suffix to strip from submitted names.
    pub fn with_alias(mut self, alias: FieldAlias) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_date_fallback(mut self, fallback: DateFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Clock used to resolve `NOW` defaults.
    pub fn at(mut self, now: NaiveDateTime) -> Self {
        self.pipeline.set_now(now);
        self
    }

    pub fn entity(&self) -> &'a EntityMapping {
        self.mapping
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every statement issued so far, in order.
    pub fn statements(&self) -> &[String] {
        self.log.entries()
    }

    // ==================== Submission pipeline ====================

    /// Take in a form submission: de-alias names, check values and validate
    /// uploads. Unknown fields are ignored.
    pub fn ingest(&mut self, submission: &Submission) -> OrmResult<&mut Self> {
        let mapping = self.mapping;
        let mut references: Vec<(&str, &Submitted)> = Vec::new();
        for (form_field, value) in &submission.fields {
            let name = self.alias.strip(form_field);
            match mapping.get(name) {
                Some(field) if field.is_file() => references.push((field.name.as_str(), value)),
                Some(field) => self.pipeline.accept(field, value.clone()),
                None => {}
            }
        }

        for field in mapping.file_fields() {
            let Some(spec) = field.file.as_ref() else {
                continue;
            };
            let upload = submission
                .files
                .iter()
                .find(|(k, f)| self.alias.strip(k) == field.name && !f.original_name.is_empty())
                .map(|(_, f)| f);
            let posted = submission
                .fields
                .keys()
                .chain(submission.files.keys())
                .any(|k| self.alias.strip(k) == field.name);
            let reference = references
                .iter()
                .find(|(name, _)| *name == field.name)
                .and_then(|(_, v)| v.first())
                .map(str::trim)
                .filter(|r| !r.is_empty());

            if let Some(file) = upload {
                let mut errors = ValidationErrors::new();
                match upload::intake(field, spec, file, &self.alias, &mut errors)? {
                    Some((info, staged)) => {
                        self.pipeline.accept_file(field, info);
                        self.staged.retain(|s| s.field != field.name);
                        self.staged.push(staged);
                    }
                    None => {
                        for (_, tokens) in errors.iter() {
                            for token in tokens {
                                self.pipeline.add_error(field.name.as_str(), *token);
                            }
                        }
                        match reference {
                            Some(name) => {
                                let info = upload::stored_info(spec, name)?;
                                self.pipeline.accept_file(field, info);
                            }
                            None => self.pipeline.hold(field, Submitted::Scalar(String::new())),
                        }
                    }
                }
            } else if let Some(name) = reference {
                let info = upload::stored_info(spec, name)?;
                self.pipeline.accept_file(field, info);
            } else if posted {
                self.pipeline.accept(field, Submitted::Scalar(String::new()));
            }
        }

        if !self.pipeline.errors().is_empty() {
            tracing::debug!(
                target: "adminorm.validate",
                entity = self.mapping.name(),
                errors = %self.pipeline.errors(),
                "submission has errors"
            );
        }
        Ok(self)
    }

    /// Merge server-side values into the pipeline. Names are taken as mapped
    /// names (no alias stripping); values go through the same checks.
    pub fn set_values(&mut self, values: impl Into<Conditions>) -> &mut Self {
        let values: Conditions = values.into();
        for (name, value) in values {
            if let Some(field) = self.mapping.get(&name) {
                self.pipeline
                    .accept(field, Submitted::Scalar(value.to_form_string()));
            }
        }
        self
    }

    pub fn errors(&self) -> &ValidationErrors {
        self.pipeline.errors()
    }

    pub fn has_errors(&self) -> bool {
        !self.pipeline.errors().is_empty()
    }

    /// Record an error found by the caller.
    pub fn add_error(&mut self, field: impl Into<String>, token: ErrorToken) -> &mut Self {
        self.pipeline.add_error(field, token);
        self
    }

    /// Metadata of an accepted or referenced file.
    pub fn file_info(&self, field: &str) -> Option<&FileInfo> {
        self.pipeline.file_info(field)
    }

    /// Record a `unique` error on `field` when another row already holds
    /// `value`. Rows matching `excluding` (the row being edited) are ignored.
    pub async fn check_unique(
        &mut self,
        field: &str,
        value: impl Into<Value>,
        excluding: Option<&Conditions>,
    ) -> OrmResult<bool> {
        let mut qb = SelectQb::new(self.mapping.table());
        qb.push_where(Joiner::And, Expr::compare(field, CmpOp::Eq, value));
        for (column, v) in excluding.into_iter().flat_map(Conditions::iter) {
            qb.push_where(Joiner::And, Expr::compare(column, CmpOp::Ne, v.clone()));
        }
        let taken = self
            .log
            .count(self.client, self.mapping.table(), qb.build_count()?)
            .await?
            > 0;
        if taken {
            self.pipeline.add_error(field, ErrorToken::Unique);
        }
        Ok(!taken)
    }

    // ==================== Composition ====================

    fn composing(&mut self) -> &mut SelectQb {
        self.stage = Stage::Composing(StatementKind::Select);
        self.select
            .get_or_insert_with(|| SelectQb::new(self.mapping.table()))
    }

    fn push_pairs(
        &mut self,
        joiner: Joiner,
        op: CmpOp,
        conditions: impl Into<Conditions>,
    ) -> &mut Self {
        let conditions: Conditions = conditions.into();
        let qb = self.composing();
        for (column, value) in conditions {
            qb.push_where(joiner, Expr::compare(&column, op, value));
        }
        self
    }

    fn push_group(
        &mut self,
        outer: Joiner,
        inner: Joiner,
        op: CmpOp,
        conditions: impl Into<Conditions>,
    ) -> &mut Self {
        let conditions: Conditions = conditions.into();
        let items: OrmResult<Vec<Expr>> = conditions
            .into_iter()
            .map(|(column, value)| Expr::compare(&column, op, value))
            .collect();
        let qb = self.composing();
        qb.push_where(outer, items.map(|items| Expr::group(inner, items)));
        self
    }

    /// Columns to select; empty selects all.
    pub fn select<S: AsRef<str>>(&mut self, fields: &[S]) -> &mut Self {
        self.composing().columns(fields);
        self
    }

    /// Join configured relations.
    pub fn joins(&mut self, relations: &[RelationRef]) -> &mut Self {
        let catalog = self.catalog;
        for relation in relations {
            let resolved = catalog.entity(&relation.owner).and_then(|owner| {
                match &relation.name {
                    Some(name) => owner
                        .find_relation(name)
                        .map(|r| vec![r])
                        .ok_or_else(|| {
                            OrmError::configuration(format!(
                                "entity '{}' has no relation '{name}'",
                                relation.owner
                            ))
                        }),
                    None => Ok(owner.relations().iter().collect()),
                }
            });
            let qb = self.composing();
            match resolved {
                Ok(found) => {
                    for r in found {
                        qb.join(
                            relation.kind.unwrap_or(r.kind),
                            &r.right.table,
                            &r.left.to_string(),
                            &r.right.to_string(),
                        );
                    }
                }
                Err(e) => {
                    qb.record_error(e);
                }
            }
        }
        self
    }

    /// Explicit join: `kind table ON left = right` (`table.column` ends).
    pub fn join(&mut self, left: &str, right: &str, kind: JoinKind) -> &mut Self {
        let table = right.split_once('.').map_or(right, |(t, _)| t);
        self.composing().join(kind, table, left, right);
        self
    }

    /// `a = 1 AND b = 2`, AND-joined to prior conditions.
    pub fn where_eq(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Eq, conditions)
    }

    /// `a = 1 OR b = 2`, OR-joined to prior conditions.
    pub fn where_or(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::Or, CmpOp::Eq, conditions)
    }

    /// `a <> 1 AND b <> 2`
    pub fn where_not(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Ne, conditions)
    }

    pub fn where_greater(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Gt, conditions)
    }

    pub fn where_greater_and_equal(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Gte, conditions)
    }

    /// `(a >= 1 OR b >= 2)`, AND-joined to prior conditions.
    pub fn where_greater_or_equal(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_group(Joiner::And, Joiner::Or, CmpOp::Gte, conditions)
    }

    pub fn where_lower(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Lt, conditions)
    }

    pub fn where_lower_and_equal(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_pairs(Joiner::And, CmpOp::Lte, conditions)
    }

    /// `(a <= 1 OR b <= 2)`, AND-joined to prior conditions.
    pub fn where_lower_or_equal(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_group(Joiner::And, Joiner::Or, CmpOp::Lte, conditions)
    }

    /// `(a = 1 OR b = 2)`, OR-joined to prior conditions.
    pub fn where_or_or(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_group(Joiner::Or, Joiner::Or, CmpOp::Eq, conditions)
    }

    /// `(a = 1 OR b = 2)`, AND-joined to prior conditions.
    pub fn where_or_and(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_group(Joiner::And, Joiner::Or, CmpOp::Eq, conditions)
    }

    /// `(a = 1 AND b = 2)`, OR-joined to prior conditions.
    pub fn where_and_or(&mut self, conditions: impl Into<Conditions>) -> &mut Self {
        self.push_group(Joiner::Or, Joiner::And, CmpOp::Eq, conditions)
    }

    /// Case-insensitive substring search: any keyword in any field.
    pub fn where_like<F, K>(&mut self, fields: &[F], keywords: &[K]) -> &mut Self
    where
        F: AsRef<str>,
        K: AsRef<str>,
    {
        if fields.is_empty() || keywords.is_empty() {
            return self;
        }
        let per_field: OrmResult<Vec<Expr>> = fields
            .iter()
            .map(|field| {
                keywords
                    .iter()
                    .map(|kw| Expr::contains(field.as_ref(), kw.as_ref()))
                    .collect::<OrmResult<Vec<Expr>>>()
                    .map(|items| Expr::group(Joiner::Or, items))
            })
            .collect();
        let qb = self.composing();
        qb.push_where(Joiner::And, per_field.map(|f| Expr::group(Joiner::Or, f)));
        self
    }

    /// Raw SQL condition, parenthesized and AND-joined.
    pub fn where_custom(&mut self, fragment: impl Into<String>) -> &mut Self {
        self.composing()
            .push_where(Joiner::And, Ok(Expr::raw(fragment)));
        self
    }

    pub fn group<S: AsRef<str>>(&mut self, fields: &[S]) -> &mut Self {
        self.composing().group_by(fields);
        self
    }

    pub fn having_greater(&mut self, field: &str, threshold: i64) -> &mut Self {
        self.composing().having_count(field, CmpOp::Gt, threshold);
        self
    }

    pub fn having_greater_or_equal(&mut self, field: &str, threshold: i64) -> &mut Self {
        self.composing().having_count(field, CmpOp::Gte, threshold);
        self
    }

    pub fn having_lower(&mut self, field: &str, threshold: i64) -> &mut Self {
        self.composing().having_count(field, CmpOp::Lt, threshold);
        self
    }

    pub fn having_lower_or_equal(&mut self, field: &str, threshold: i64) -> &mut Self {
        self.composing().having_count(field, CmpOp::Lte, threshold);
        self
    }

    pub fn order(&mut self, field: &str, direction: Direction) -> &mut Self {
        self.composing().order_by(field, direction);
        self
    }

    /// `LIMIT count [OFFSET offset]`
    pub fn limit(&mut self, offset: Option<u64>, count: u64) -> &mut Self {
        let qb = self.composing();
        qb.limit(count);
        if let Some(offset) = offset {
            qb.offset(offset);
        }
        self
    }

    /// Attach `has_dependencies` to each record of the next select terminal.
    pub fn with_dependency_info(&mut self) -> &mut Self {
        self.composing();
        self.with_dependencies = true;
        self
    }

    // ==================== State transitions ====================

    /// Take the pending select composition, or a fresh one.
    fn take_select(&mut self) -> SelectQb {
        self.stage = Stage::Executed(StatementKind::Select);
        self.select
            .take()
            .unwrap_or_else(|| SelectQb::new(self.mapping.table()))
    }

    /// Writes are refused while a select is being composed.
    fn begin_write(&mut self, kind: StatementKind) -> OrmResult<()> {
        if self.select.is_some() {
            return Err(OrmError::statement(format!(
                "cannot {kind} '{}' while a select is being composed",
                self.mapping.name()
            )));
        }
        self.stage = Stage::Composing(kind);
        Ok(())
    }

    fn end_write(&mut self, kind: StatementKind) {
        self.stage = Stage::Executed(kind);
    }

    /// Fail a write before any statement when the pipeline has errors.
    fn ensure_valid(&self) -> OrmResult<()> {
        if self.pipeline.errors().is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                target: "adminorm.validate",
                entity = self.mapping.name(),
                errors = %self.pipeline.errors(),
                "write refused"
            );
            Err(OrmError::Validation(self.pipeline.errors().clone()))
        }
    }

    /// Forget the submission after a successful write.
    fn clear_submission(&mut self) {
        let now = self.pipeline.now();
        self.pipeline = Pipeline::new(now);
        self.staged.clear();
    }
}
