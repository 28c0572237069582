//! Composition state machine and statement log.

use crate::client::{GenericClient, RecordStream};
use crate::error::OrmResult;
use crate::qb::ParamList;
use crate::row::Record;
use std::fmt;

/// Kind of statement a terminal call issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a builder is in its statement lifecycle.
///
/// `Idle -> Composing(kind) -> Executed(kind)`; a terminal moves back to a
/// fresh composition on the next chained call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Composing(StatementKind),
    Executed(StatementKind),
}

/// Diagnostic log of every statement a builder issued.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatementLog {
    entries: Vec<String>,
}

impl StatementLog {
    pub(crate) fn entries(&self) -> &[String] {
        &self.entries
    }

    fn record(&mut self, kind: StatementKind, table: &str, sql: &str, params: &ParamList) {
        tracing::debug!(
            target: "adminorm.sql",
            kind = kind.as_str(),
            table,
            params = params.len(),
            "{sql}"
        );
        self.entries.push(sql.to_string());
    }

    pub(crate) async fn query<C: GenericClient>(
        &mut self,
        client: &C,
        kind: StatementKind,
        table: &str,
        (sql, params): (String, ParamList),
    ) -> OrmResult<Vec<Record>> {
        self.record(kind, table, &sql, &params);
        client.query(&sql, params.as_slice()).await
    }

    pub(crate) async fn query_stream<'c, C: GenericClient>(
        &mut self,
        client: &'c C,
        table: &str,
        (sql, params): (String, ParamList),
    ) -> OrmResult<RecordStream<'c>> {
        self.record(StatementKind::Select, table, &sql, &params);
        client.query_stream(&sql, params.as_slice()).await
    }

    pub(crate) async fn execute<C: GenericClient>(
        &mut self,
        client: &C,
        kind: StatementKind,
        table: &str,
        (sql, params): (String, ParamList),
    ) -> OrmResult<u64> {
        self.record(kind, table, &sql, &params);
        client.execute(&sql, params.as_slice()).await
    }

    /// Run a statement whose result is a single count.
    pub(crate) async fn count<C: GenericClient>(
        &mut self,
        client: &C,
        table: &str,
        statement: (String, ParamList),
    ) -> OrmResult<i64> {
        let records = self
            .query(client, StatementKind::Select, table, statement)
            .await?;
        Ok(records
            .first()
            .and_then(|r| r.iter().next().and_then(|(_, v)| v.as_i64()))
            .unwrap_or(0))
    }
}
