//! Unit of work: an explicit commit boundary around multi-statement writes.
//!
//! A unit of work opens a transaction with `BEGIN` on a plain client, or a
//! savepoint when the client is already a transaction, so builders can be
//! handed either without changing their behavior.
//!
//! ```ignore
//! let uow = UnitOfWork::begin(&client).await?;
//! let result = cascade_and_delete(uow.client()).await;
//! uow.finish(result).await?;
//! ```

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for anonymous savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("adminorm_sp_{n}")
}

/// An open transaction or savepoint on a borrowed client.
///
/// Dropping an unfinished unit of work does not roll it back; the enclosing
/// session does when the connection is returned or closed.
pub struct UnitOfWork<'c, C: GenericClient> {
    client: &'c C,
    savepoint: Option<String>,
    finished: bool,
}

impl<'c, C: GenericClient> UnitOfWork<'c, C> {
    /// Open the boundary.
    pub async fn begin(client: &'c C) -> OrmResult<Self> {
        let savepoint = if client.in_transaction() {
            let name = next_savepoint_name();
            client.execute(&format!("SAVEPOINT {name}"), &[]).await?;
            Some(name)
        } else {
            client.execute("BEGIN", &[]).await?;
            None
        };
        Ok(Self {
            client,
            savepoint,
            finished: false,
        })
    }

    /// The client statements of this unit should run on.
    pub fn client(&self) -> &'c C {
        self.client
    }

    /// Savepoint name, when nested inside an outer transaction.
    pub fn savepoint(&self) -> Option<&str> {
        self.savepoint.as_deref()
    }

    pub async fn commit(mut self) -> OrmResult<()> {
        self.finished = true;
        match &self.savepoint {
            Some(name) => self.client.execute(&format!("RELEASE SAVEPOINT {name}"), &[]).await?,
            None => self.client.execute("COMMIT", &[]).await?,
        };
        Ok(())
    }

    pub async fn rollback(mut self) -> OrmResult<()> {
        self.finished = true;
        match &self.savepoint {
            Some(name) => {
                self.client
                    .execute(&format!("ROLLBACK TO SAVEPOINT {name}"), &[])
                    .await?
            }
            None => self.client.execute("ROLLBACK", &[]).await?,
        };
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err` and hand the original error back.
    pub async fn finish<T>(self, result: OrmResult<T>) -> OrmResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(error = %error, "rolling back unit of work");
                match self.rollback().await {
                    Ok(()) => Err(error),
                    Err(rollback_err) => Err(OrmError::Other(format!(
                        "{error} (rollback failed: {rollback_err})"
                    ))),
                }
            }
        }
    }
}

impl<C: GenericClient> Drop for UnitOfWork<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                savepoint = self.savepoint.as_deref().unwrap_or(""),
                "unit of work dropped without commit or rollback"
            );
        }
    }
}
