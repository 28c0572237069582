//! Write terminals: insert, update, delete and stored-file removal.
//!
//! Every write checks the pipeline first and issues nothing when it holds
//! errors. Staged uploads are moved into place only after the row write
//! succeeded; the submission is forgotten afterwards.

use super::{Builder, StatementKind};
use crate::client::GenericClient;
use crate::dependency;
use crate::error::{OrmError, OrmResult};
use crate::qb::{CmpOp, DeleteQb, Expr, InsertQb, Joiner, SelectQb, UpdateQb};
use crate::row::Record;
use crate::changeset::ErrorToken;
use crate::sanitize::{Finalized, Slot};
use crate::transaction::UnitOfWork;
use crate::upload;
use crate::value::{Conditions, Value};

type Row = Vec<(String, Option<Value>)>;

impl<'a, C: GenericClient> Builder<'a, C> {
    /// Insert the held submission.
    ///
    /// Multi-valued fields insert one row per position inside a unit of
    /// work. Returns the (last) inserted row reloaded by its primary key, or
    /// `None` when the entity has no primary field.
    pub async fn insert(&mut self) -> OrmResult<Option<Record>> {
        self.begin_write(StatementKind::Insert)?;
        let result = self.run_insert().await;
        self.end_write(StatementKind::Insert);
        result
    }

    /// Update the row at `key` with the held submission.
    ///
    /// With multi-valued fields the rows at `key` are deleted and the
    /// submitted rows inserted again, inside a unit of work. Rows are not
    /// matched against each other, so generated keys of those rows change.
    pub async fn update(&mut self, key: &Conditions) -> OrmResult<Option<Record>> {
        self.begin_write(StatementKind::Update)?;
        let result = self.run_update(key).await;
        self.end_write(StatementKind::Update);
        result
    }

    /// Delete the row at `key`. With `cascade`, rows referencing it through
    /// declared dependency edges are deleted first, in the same unit of work.
    pub async fn delete(&mut self, key: &Conditions, cascade: bool) -> OrmResult<bool> {
        self.begin_write(StatementKind::Delete)?;
        let result = if cascade {
            let uow = UnitOfWork::begin(self.client).await?;
            let result = self.run_cascade_delete(key).await;
            uow.finish(result).await
        } else {
            self.run_delete(key).await
        };
        self.end_write(StatementKind::Delete);
        result
    }

    /// Remove the stored file of `field` for the row at `key` and blank the
    /// column. Returns whether a file was removed from disk.
    pub async fn delete_file(&mut self, key: &Conditions, field: &str) -> OrmResult<bool> {
        let mapping = self.mapping;
        let spec = mapping
            .get(field)
            .and_then(|f| f.file.as_ref())
            .ok_or_else(|| {
                OrmError::configuration(format!(
                    "'{field}' is not a file field of entity '{}'",
                    mapping.name()
                ))
            })?;
        self.begin_write(StatementKind::Update)?;
        let result = async {
            let mut qb = SelectQb::new(mapping.table());
            qb.columns(&[field]);
            for (column, value) in key.iter() {
                qb.push_where(Joiner::And, Expr::compare(column, CmpOp::Eq, value.clone()));
            }
            qb.limit(1);
            let row = self
                .log
                .query(
                    self.client,
                    StatementKind::Select,
                    mapping.table(),
                    qb.build()?,
                )
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    OrmError::not_found(format!("{} row not found", mapping.name()))
                })?;

            let removed = match row.get(field).and_then(|v| v.as_text()) {
                Some(name) if !name.is_empty() => upload::remove_stored(spec, name).await?,
                _ => false,
            };
            let statement = UpdateQb::new(mapping.table())
                .set(field, "")
                .filter(key)
                .build()?;
            self.log
                .execute(
                    self.client,
                    StatementKind::Update,
                    mapping.table(),
                    statement,
                )
                .await?;
            Ok::<_, OrmError>(removed)
        }
        .await;
        self.end_write(StatementKind::Update);
        result
    }

    async fn run_insert(&mut self) -> OrmResult<Option<Record>> {
        let mapping = self.mapping;
        let finalized = self.pipeline.finalize_insert(mapping, &self.fallback);
        let rows = finalized.rows();
        self.require_rows(&finalized, &rows);
        self.ensure_valid()?;

        let last = if finalized.is_multi() {
            let uow = UnitOfWork::begin(self.client).await?;
            let result = self.insert_rows(&rows).await;
            uow.finish(result).await?
        } else {
            self.insert_rows(&rows).await?
        };

        self.settle().await?;
        match (mapping.primary(), last) {
            (Some(primary), Some(id)) => {
                let key = Conditions::new().with(primary.name.as_str(), id);
                Ok(self.load(&key, Some(1)).await?.into_iter().next())
            }
            _ => Ok(None),
        }
    }

    /// Insert each row, returning the primary key of the last one.
    async fn insert_rows(&mut self, rows: &[Row]) -> OrmResult<Option<Value>> {
        let mapping = self.mapping;
        let primary = mapping.primary().map(|p| p.name.as_str());
        let table = mapping.table();
        let mut last = None;
        for row in rows {
            let mut qb = InsertQb::new(table);
            for (column, value) in row {
                qb = match value {
                    Some(value) => qb.value(column, value.clone()),
                    None => qb.default(column),
                };
            }
            match primary {
                Some(primary) => {
                    let returned = self
                        .log
                        .query(
                            self.client,
                            StatementKind::Insert,
                            table,
                            qb.returning(primary).build()?,
                        )
                        .await?;
                    last = returned.first().map(|r| r.value(primary));
                }
                None => {
                    self.log
                        .execute(self.client, StatementKind::Insert, table, qb.build()?)
                        .await?;
                }
            }
        }
        Ok(last)
    }

    async fn run_update(&mut self, key: &Conditions) -> OrmResult<Option<Record>> {
        if key.is_empty() {
            return Err(OrmError::statement(format!(
                "update of '{}' needs a key",
                self.mapping.name()
            )));
        }
        let mapping = self.mapping;
        let table = mapping.table();
        let finalized = self.pipeline.finalize_update(mapping, &self.fallback);
        let mut rows = finalized.rows();
        self.require_rows(&finalized, &rows);
        self.ensure_valid()?;

        if finalized.is_multi() {
            for row in &mut rows {
                for (column, value) in key.iter() {
                    if !row.iter().any(|(c, _)| c == column) {
                        row.push((column.to_string(), Some(value.clone())));
                    }
                }
            }
            let uow = UnitOfWork::begin(self.client).await?;
            let result = async {
                let statement = DeleteQb::new(table).filter(key).build()?;
                self.log
                    .execute(self.client, StatementKind::Delete, table, statement)
                    .await?;
                self.insert_rows(&rows).await
            }
            .await;
            uow.finish(result).await?;
        } else if !finalized.is_empty() {
            let mut qb = UpdateQb::new(table);
            for (column, slot) in finalized.iter() {
                if let Slot::Value(value) = slot {
                    qb = qb.set(column, value.clone());
                }
            }
            let statement = qb.filter(key).build()?;
            self.log
                .execute(self.client, StatementKind::Update, table, statement)
                .await?;
        }

        self.settle().await?;
        Ok(self.load(key, Some(1)).await?.into_iter().next())
    }

    async fn run_delete(&mut self, key: &Conditions) -> OrmResult<bool> {
        let table = self.mapping.table();
        let statement = DeleteQb::new(table).filter(key).build()?;
        let affected = self
            .log
            .execute(self.client, StatementKind::Delete, table, statement)
            .await?;
        Ok(affected > 0)
    }

    async fn run_cascade_delete(&mut self, key: &Conditions) -> OrmResult<bool> {
        if let Some(row) = self.owning_row(key).await? {
            for cascade in dependency::cascades(self.mapping, &row)? {
                let removed = self
                    .log
                    .execute(
                        self.client,
                        StatementKind::Delete,
                        &cascade.table,
                        cascade.statement,
                    )
                    .await?;
                tracing::info!(
                    target: "adminorm.dependency",
                    entity = self.mapping.name(),
                    table = %cascade.table,
                    column = %cascade.column,
                    removed,
                    "cascade delete"
                );
            }
        }
        self.run_delete(key).await
    }

    /// A multi-row submission without a single position would write
    /// nothing; its groups are reported as empty instead.
    fn require_rows(&mut self, finalized: &Finalized, rows: &[Row]) {
        if finalized.is_multi() && rows.is_empty() {
            for field in finalized.empty_groups() {
                self.pipeline.add_error(field, ErrorToken::Empty);
            }
        }
    }

    /// Move staged uploads and forget the written submission.
    async fn settle(&mut self) -> OrmResult<()> {
        upload::commit_moves(&self.staged).await?;
        self.clear_submission();
        Ok(())
    }
}
