//! To-do write operations (add / toggle / delete).
//!
//! # Responsibility
//! - Validate input and resolve the caller's partition synchronously.
//! - Submit writes fire-and-forget through an `Executor`.
//! - Report asynchronous write failures exactly once.
//!
//! # Invariants
//! - No local cache: read state comes from the shared `ObservableList`.
//! - No optimistic insertion and no automatic retry.
//! - Deleting an id that is already gone counts as success.

use crate::auth::PrincipalProvider;
use crate::error::{TodoError, TodoResult};
use crate::exec::Executor;
use crate::list::ObservableList;
use crate::model::item::{ItemId, ItemPatch, NewItem, PartitionId};
use crate::store::{RemoteStore, StoreError};
use log::{debug, warn};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Write operation kind, used in failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Add,
    Toggle,
    Delete,
}

impl Display for WriteOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Add => "add",
            Self::Toggle => "toggle",
            Self::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// Asynchronous write failure report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub op: WriteOp,
    pub item_id: Option<ItemId>,
    pub error: TodoError,
}

/// Receives write failures that happen after submission.
pub trait WriteErrorSink: Send + Sync {
    fn report(&self, failure: WriteFailure);
}

/// Default sink: one `warn` log line per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorSink;

impl WriteErrorSink for LogErrorSink {
    fn report(&self, failure: WriteFailure) {
        warn!(
            "event=write_failed module=service status=error op={} has_item_id={} error_code={} error={}",
            failure.op,
            failure.item_id.is_some(),
            failure.error.code(),
            failure.error
        );
    }
}

/// Domain write operations against the signed-in principal's partition.
pub struct TodoService {
    store: Arc<dyn RemoteStore>,
    auth: Arc<dyn PrincipalProvider>,
    list: Arc<ObservableList>,
    writer: Arc<dyn Executor>,
    errors: Arc<dyn WriteErrorSink>,
}

impl TodoService {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        auth: Arc<dyn PrincipalProvider>,
        list: Arc<ObservableList>,
        writer: Arc<dyn Executor>,
        errors: Arc<dyn WriteErrorSink>,
    ) -> Self {
        Self {
            store,
            auth,
            list,
            writer,
            errors,
        }
    }

    /// Submits creation of a new item with `done = false`.
    ///
    /// The new item shows up once the channel redelivers a snapshot that
    /// includes it.
    ///
    /// # Errors
    /// - `InvalidInput` when `text` is empty after trimming; the store is
    ///   not called.
    /// - `NotAuthenticated` when nobody is signed in.
    pub fn add(&self, text: &str) -> TodoResult<()> {
        let item = NewItem::new(text)?;
        let partition = self.partition()?;
        let store = self.store.clone();
        self.submit(WriteOp::Add, None, move || {
            let id = store.create(&partition, &item)?;
            debug!("event=write_applied module=service status=ok op=add item_id={id}");
            Ok(())
        });
        Ok(())
    }

    /// Submits a flip of `done` for `item_id`, based on the latest snapshot.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in.
    /// - `StaleReference` when `item_id` is absent from the latest snapshot;
    ///   the store is not called.
    pub fn toggle(&self, item_id: &str) -> TodoResult<()> {
        let partition = self.partition()?;
        let done = self
            .list
            .snapshot()
            .find(item_id)
            .map(|item| item.done)
            .ok_or_else(|| TodoError::StaleReference(item_id.to_string()))?;

        let store = self.store.clone();
        let id = item_id.to_string();
        self.submit(WriteOp::Toggle, Some(id.clone()), move || {
            // A concurrent delete that landed first surfaces as NotFound,
            // which maps to StaleReference.
            store.update(&partition, &id, &ItemPatch::done(!done))?;
            Ok(())
        });
        Ok(())
    }

    /// Submits removal of `item_id`. Missing ids are treated as deleted.
    ///
    /// # Errors
    /// - `NotAuthenticated` when nobody is signed in.
    pub fn delete(&self, item_id: &str) -> TodoResult<()> {
        let partition = self.partition()?;
        let store = self.store.clone();
        let id = item_id.to_string();
        self.submit(WriteOp::Delete, Some(id.clone()), move || {
            match store.delete(&partition, &id) {
                Ok(()) => Ok(()),
                Err(StoreError::NotFound(_)) => {
                    debug!("event=write_applied module=service status=noop op=delete reason=not_found");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        });
        Ok(())
    }

    fn partition(&self) -> TodoResult<PartitionId> {
        self.auth
            .current_principal()
            .ok_or(TodoError::NotAuthenticated)
    }

    fn submit(
        &self,
        op: WriteOp,
        item_id: Option<ItemId>,
        write: impl FnOnce() -> Result<(), StoreError> + Send + 'static,
    ) {
        let errors = self.errors.clone();
        self.writer.execute(Box::new(move || {
            if let Err(err) = write() {
                errors.report(WriteFailure {
                    op,
                    item_id,
                    error: TodoError::from(err),
                });
            }
        }));
    }
}
