//! Generic client trait for unified database access.

use crate::error::{OrmError, OrmResult};
use crate::row::Record;
use crate::value::Value;
use futures_core::Stream;
use futures_util::{StreamExt, TryStreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// Builders accept any implementor, so the same composition runs against a
/// plain connection, a pooled connection or an open transaction.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all records.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<Vec<Record>>> + Send;

    /// Execute a query and return its records as a lazily fetched stream.
    ///
    /// The default implementation buffers the result of [`GenericClient::query`].
    fn query_stream(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<RecordStream<'_>>> + Send {
        async move {
            let records = self.query(sql, params).await?;
            Ok(RecordStream::from_records(records))
        }
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;

    /// Whether statements already run inside an open transaction.
    ///
    /// Units of work use savepoints instead of `BEGIN` when this is `true`.
    fn in_transaction(&self) -> bool {
        false
    }
}

/// A finite, non-restartable stream of records.
#[must_use = "streams do nothing unless polled"]
pub struct RecordStream<'a> {
    inner: Pin<Box<dyn Stream<Item = OrmResult<Record>> + Send + 'a>>,
}

impl<'a> RecordStream<'a> {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = OrmResult<Record>> + Send + 'a,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Stream over records that are already in memory.
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(futures_util::stream::iter(records.into_iter().map(Ok)))
    }

    /// Drain the stream, stopping at the first error.
    pub async fn into_vec(self) -> OrmResult<Vec<Record>> {
        self.try_collect().await
    }
}

impl Stream for RecordStream<'_> {
    type Item = OrmResult<Record>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl std::fmt::Debug for RecordStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream").finish_non_exhaustive()
    }
}

fn sql_params(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_rows(rows: Vec<tokio_postgres::Row>) -> OrmResult<Vec<Record>> {
    rows.iter().map(Record::from_row).collect()
}

fn decode_stream(stream: tokio_postgres::RowStream) -> RecordStream<'static> {
    RecordStream::new(stream.map(|row| {
        row.map_err(OrmError::from_db_error)
            .and_then(|row| Record::from_row(&row))
    }))
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let rows = tokio_postgres::Client::query(self, sql, &sql_params(params))
            .await
            .map_err(OrmError::from_db_error)?;
        decode_rows(rows)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RecordStream<'_>> {
        let refs = sql_params(params);
        let stream = tokio_postgres::Client::query_raw(self, sql, refs.iter().copied())
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(decode_stream(stream))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        tokio_postgres::Client::execute(self, sql, &sql_params(params))
            .await
            .map_err(OrmError::from_db_error)
    }
}

impl GenericClient for tokio_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let rows = tokio_postgres::Transaction::query(self, sql, &sql_params(params))
            .await
            .map_err(OrmError::from_db_error)?;
        decode_rows(rows)
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RecordStream<'_>> {
        let refs = sql_params(params);
        let stream = tokio_postgres::Transaction::query_raw(self, sql, refs.iter().copied())
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(decode_stream(stream))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        tokio_postgres::Transaction::execute(self, sql, &sql_params(params))
            .await
            .map_err(OrmError::from_db_error)
    }

    fn in_transaction(&self) -> bool {
        true
    }
}

// ===== deadpool-postgres support =====

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let client: &tokio_postgres::Client = self;
        GenericClient::query(client, sql, params).await
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RecordStream<'_>> {
        let client: &tokio_postgres::Client = self;
        GenericClient::query_stream(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let client: &tokio_postgres::Client = self;
        GenericClient::execute(client, sql, params).await
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Transaction<'_> {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::query(tx, sql, params).await
    }

    async fn query_stream(&self, sql: &str, params: &[Value]) -> OrmResult<RecordStream<'_>> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::query_stream(tx, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let tx: &tokio_postgres::Transaction<'_> = self;
        GenericClient::execute(tx, sql, params).await
    }

    fn in_transaction(&self) -> bool {
        true
    }
}
