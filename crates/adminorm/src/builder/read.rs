//! Select terminals and the form materializer.

use super::{Builder, StatementKind};
use crate::client::{GenericClient, RecordStream};
use crate::dependency;
use crate::error::{OrmError, OrmResult};
use crate::qb::{CmpOp, Expr, Joiner, SelectQb};
use crate::row::Record;
use crate::sanitize::{defaults_record, present};
use crate::value::Conditions;
use futures_util::StreamExt;

impl<'a, C: GenericClient> Builder<'a, C> {
    /// Run the pending select.
    ///
    /// Records arrive in order with dates in their external form. The stream
    /// is fetched lazily unless dependency info was requested, which needs
    /// every record probed before it is handed out.
    pub async fn execute(&mut self) -> OrmResult<RecordStream<'a>> {
        let mut qb = self.take_select();
        let mapping = self.mapping;

        if std::mem::take(&mut self.with_dependencies) {
            let extra = self.include_owning_columns(&mut qb);
            let records = self
                .log
                .query(self.client, StatementKind::Select, mapping.table(), qb.build()?)
                .await?;
            let mut out = Vec::with_capacity(records.len());
            for record in records {
                out.push(self.attach_dependencies(record, &extra).await?);
            }
            return Ok(RecordStream::from_records(out));
        }

        let stream = self
            .log
            .query_stream(self.client, mapping.table(), qb.build()?)
            .await?;
        Ok(RecordStream::new(
            stream.map(move |r| r.map(|record| present(mapping, record))),
        ))
    }

    /// First record of the pending select, if any.
    pub async fn first(&mut self) -> OrmResult<Option<Record>> {
        let mut qb = self.take_select();
        qb.limit(1);
        let with_dependencies = std::mem::take(&mut self.with_dependencies);
        let extra = if with_dependencies {
            self.include_owning_columns(&mut qb)
        } else {
            Vec::new()
        };
        let records = self
            .log
            .query(
                self.client,
                StatementKind::Select,
                self.mapping.table(),
                qb.build()?,
            )
            .await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(None);
        };
        if with_dependencies {
            return Ok(Some(self.attach_dependencies(record, &extra).await?));
        }
        Ok(Some(present(self.mapping, record)))
    }

    /// Number of rows (or groups) the pending select matches.
    pub async fn count(&mut self) -> OrmResult<i64> {
        let qb = self.take_select();
        self.with_dependencies = false;
        self.log
            .count(self.client, self.mapping.table(), qb.build_count()?)
            .await
    }

    /// Whether the pending select matches any row.
    pub async fn exist(&mut self) -> OrmResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// Whether any declared dependency edge references the row at `key`.
    pub async fn is_dependent(&mut self, key: &Conditions) -> OrmResult<bool> {
        match self.owning_row(key).await? {
            Some(record) => self.probe(&record).await,
            None => Ok(false),
        }
    }

    /// Record to fill a form with.
    ///
    /// A submission still held (failed, or not yet written) wins, errors
    /// included. Otherwise the row at `key` is loaded, or a record of mapping
    /// defaults is synthesized when there is no key.
    pub async fn build(&mut self, key: Option<&Conditions>) -> OrmResult<Record> {
        if self.pipeline.is_held() {
            return Ok(self.pipeline.held_record(self.mapping, None));
        }
        match key {
            Some(key) => self
                .load(key, Some(1))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    OrmError::not_found(format!("{} row not found", self.mapping.name()))
                }),
            None => Ok(defaults_record(self.mapping, self.pipeline.now())),
        }
    }

    /// Records to fill a multi-row form with: one per held position, every
    /// row at `key`, or a single record of defaults.
    pub async fn builds(&mut self, key: Option<&Conditions>) -> OrmResult<Vec<Record>> {
        if self.pipeline.is_held() {
            let rows = self.pipeline.held_rows();
            if rows == 0 {
                return Ok(vec![self.pipeline.held_record(self.mapping, None)]);
            }
            return Ok((0..rows)
                .map(|i| self.pipeline.held_record(self.mapping, Some(i)))
                .collect());
        }
        match key {
            Some(key) => self.load(key, None).await,
            None => Ok(vec![defaults_record(self.mapping, self.pipeline.now())]),
        }
    }

    /// Rows at `key` in their external form. Leaves any pending select alone.
    pub(super) async fn load(
        &mut self,
        key: &Conditions,
        limit: Option<u64>,
    ) -> OrmResult<Vec<Record>> {
        let mut qb = SelectQb::new(self.mapping.table());
        for (column, value) in key.iter() {
            qb.push_where(Joiner::And, Expr::compare(column, CmpOp::Eq, value.clone()));
        }
        if let Some(limit) = limit {
            qb.limit(limit);
        }
        let records = self
            .log
            .query(
                self.client,
                StatementKind::Select,
                self.mapping.table(),
                qb.build()?,
            )
            .await?;
        Ok(records
            .into_iter()
            .map(|r| present(self.mapping, r))
            .collect())
    }

    /// The columns of the row at `key` that own dependency edges.
    pub(super) async fn owning_row(&mut self, key: &Conditions) -> OrmResult<Option<Record>> {
        let columns = dependency::owning_columns(self.mapping);
        if columns.is_empty() {
            return Ok(None);
        }
        let mut qb = SelectQb::new(self.mapping.table());
        qb.columns(&columns);
        for (column, value) in key.iter() {
            qb.push_where(Joiner::And, Expr::compare(column, CmpOp::Eq, value.clone()));
        }
        qb.limit(1);
        let records = self
            .log
            .query(
                self.client,
                StatementKind::Select,
                self.mapping.table(),
                qb.build()?,
            )
            .await?;
        Ok(records.into_iter().next())
    }

    /// A restricted select still has to carry the columns the dependency
    /// probes read. Returns the columns added for that purpose only.
    fn include_owning_columns(&self, qb: &mut SelectQb) -> Vec<String> {
        let table = self.mapping.table();
        let columns: Vec<String> = dependency::owning_columns(self.mapping)
            .into_iter()
            .map(|column| format!("{table}.{column}"))
            .collect();
        qb.include_columns(&columns)
    }

    async fn attach_dependencies(
        &mut self,
        mut record: Record,
        extra: &[String],
    ) -> OrmResult<Record> {
        record.has_dependencies = Some(self.probe(&record).await?);
        for column in extra {
            record.remove(column);
        }
        Ok(present(self.mapping, record))
    }

    /// Stops at the first referencing row found.
    async fn probe(&mut self, record: &Record) -> OrmResult<bool> {
        for probe in dependency::probes(self.mapping, record)? {
            let found = self
                .log
                .query(self.client, StatementKind::Select, &probe.table, probe.statement)
                .await?;
            if !found.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
