//! Scripted in-memory client for unit tests.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use crate::row::Record;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Records every statement and answers from scripted queues.
///
/// `query` pops the next scripted record set (empty when exhausted) and
/// `execute` pops the next affected-row count (0 when exhausted).
/// Transaction control statements never consume the queues.
#[derive(Default)]
pub(crate) struct MockClient {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    rows: Mutex<VecDeque<Vec<Record>>>,
    affected: Mutex<VecDeque<u64>>,
    fail_on: Option<String>,
    in_tx: bool,
}

impl MockClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn in_transaction(mut self, in_tx: bool) -> Self {
        self.in_tx = in_tx;
        self
    }

    pub(crate) fn with_rows(self, rows: Vec<Record>) -> Self {
        self.rows.lock().unwrap().push_back(rows);
        self
    }

    pub(crate) fn with_affected(self, n: u64) -> Self {
        self.affected.lock().unwrap().push_back(n);
        self
    }

    /// Fail any statement containing `needle`.
    pub(crate) fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn last(&self) -> (String, Vec<Value>) {
        self.calls.lock().unwrap().last().cloned().unwrap()
    }

    fn record(&self, sql: &str, params: &[Value]) -> OrmResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        match &self.fail_on {
            Some(needle) if sql.contains(needle.as_str()) => {
                Err(OrmError::Other(format!("scripted failure: {sql}")))
            }
            _ => Ok(()),
        }
    }
}

fn is_control(sql: &str) -> bool {
    ["BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT", "RELEASE"]
        .iter()
        .any(|kw| sql.starts_with(kw))
}

impl GenericClient for MockClient {
    async fn query(&self, sql: &str, params: &[Value]) -> OrmResult<Vec<Record>> {
        self.record(sql, params)?;
        Ok(self.rows.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.record(sql, params)?;
        if is_control(sql) {
            return Ok(0);
        }
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(0))
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}
