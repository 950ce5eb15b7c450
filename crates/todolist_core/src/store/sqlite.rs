//! SQLite-backed remote store.
//!
//! # Responsibility
//! - Persist partitions and items across process restarts.
//! - Push a full snapshot to partition listeners after each committed write.
//!
//! # Invariants
//! - Item order is creation order (`seq ASC`).
//! - Version bump and item mutation commit in the same transaction.
//! - Snapshots are read inside the writing transaction, so each delivered
//!   snapshot matches exactly one committed version.
//! - Lock order is `conn` then `listeners`; listeners are invoked with
//!   neither held.

use super::{
    dispatch, ListenerRegistry, RemoteStore, StoreError, StoreEvent, StoreListener, StoreResult,
    StoreSubscriptionId,
};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::locks::lock_or_recover;
use crate::model::item::{Item, ItemId, ItemPatch, NewItem};
use crate::model::snapshot::Snapshot;
use log::{debug, error};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Durable `RemoteStore` over one SQLite connection.
pub struct SqliteRemoteStore {
    conn: Mutex<Connection>,
    listeners: Mutex<ListenerRegistry>,
}

impl SqliteRemoteStore {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(ListenerRegistry::default()),
        }
    }

    /// Reads the current snapshot of `partition`.
    pub fn snapshot(&self, partition: &str) -> StoreResult<Snapshot> {
        let mut conn = self.lock_conn();
        let tx = conn.transaction().map_err(map_sqlite_error)?;
        let snapshot = read_snapshot(&tx, partition)?;
        tx.commit().map_err(map_sqlite_error)?;
        Ok(snapshot)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        lock_or_recover(&self.conn)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, ListenerRegistry> {
        lock_or_recover(&self.listeners)
    }

    /// Runs `write` in a transaction, bumps the version, and delivers the
    /// resulting snapshot after commit.
    fn write<T>(
        &self,
        op: &'static str,
        partition: &str,
        apply: impl FnOnce(&Transaction<'_>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let (value, snapshot) = {
            let mut conn = self.lock_conn();
            let tx = conn.transaction().map_err(map_sqlite_error)?;
            let value = apply(&tx)?;
            tx.execute(
                "UPDATE partitions SET version = version + 1 WHERE partition_id = ?1;",
                [partition],
            )
            .map_err(map_sqlite_error)?;
            let snapshot = read_snapshot(&tx, partition)?;
            tx.commit().map_err(map_sqlite_error)?;
            (value, snapshot)
        };

        debug!(
            "event=store_write module=store status=ok store=sqlite op={op} version={}",
            snapshot.version()
        );
        let listeners = self.lock_listeners().for_partition(partition);
        dispatch(&listeners, &StoreEvent::Snapshot(snapshot));
        Ok(value)
    }
}

impl RemoteStore for SqliteRemoteStore {
    fn create(&self, partition: &str, item: &NewItem) -> StoreResult<ItemId> {
        let id = Uuid::new_v4().simple().to_string();
        self.write("create", partition, |tx| {
            tx.execute(
                "INSERT OR IGNORE INTO partitions (partition_id) VALUES (?1);",
                [partition],
            )
            .map_err(map_sqlite_error)?;
            tx.execute(
                "INSERT INTO items (id, partition_id, text, done) VALUES (?1, ?2, ?3, ?4);",
                params![id.as_str(), partition, item.text.as_str(), item.done],
            )
            .map_err(map_sqlite_error)?;
            Ok(id.clone())
        })
    }

    fn update(&self, partition: &str, id: &str, patch: &ItemPatch) -> StoreResult<()> {
        self.write("update", partition, |tx| {
            let changed = tx
                .execute(
                    "UPDATE items
                     SET
                        done = COALESCE(?1, done),
                        updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
                     WHERE partition_id = ?2 AND id = ?3;",
                    params![patch.done, partition, id],
                )
                .map_err(map_sqlite_error)?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    fn delete(&self, partition: &str, id: &str) -> StoreResult<()> {
        self.write("delete", partition, |tx| {
            let changed = tx
                .execute(
                    "DELETE FROM items WHERE partition_id = ?1 AND id = ?2;",
                    [partition, id],
                )
                .map_err(map_sqlite_error)?;
            if changed == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        partition: &str,
        listener: StoreListener,
    ) -> StoreResult<StoreSubscriptionId> {
        // Registration happens under the connection lock, so every write
        // either lands in `initial` or is dispatched to this listener.
        let (id, initial) = {
            let mut conn = self.lock_conn();
            let tx = conn.transaction().map_err(map_sqlite_error)?;
            let initial = read_snapshot(&tx, partition)?;
            tx.commit().map_err(map_sqlite_error)?;
            (self.lock_listeners().add(partition, listener.clone()), initial)
        };
        debug!(
            "event=store_subscribe module=store status=ok store=sqlite listener_id={} version={}",
            id.0,
            initial.version()
        );
        listener(StoreEvent::Snapshot(initial));
        Ok(id)
    }

    fn unsubscribe(&self, id: StoreSubscriptionId) {
        if self.lock_listeners().remove(id) {
            debug!(
                "event=store_unsubscribe module=store status=ok store=sqlite listener_id={}",
                id.0
            );
        }
    }
}

fn read_snapshot(tx: &Transaction<'_>, partition: &str) -> StoreResult<Snapshot> {
    let version = tx
        .query_row(
            "SELECT version FROM partitions WHERE partition_id = ?1;",
            [partition],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(map_sqlite_error)?
        .unwrap_or(0);
    let version = u64::try_from(version)
        .map_err(|_| StoreError::Backend(format!("invalid partition version `{version}`")))?;

    let mut stmt = tx
        .prepare(
            "SELECT id, text, done
             FROM items
             WHERE partition_id = ?1
             ORDER BY seq ASC;",
        )
        .map_err(map_sqlite_error)?;
    let items = stmt
        .query_map([partition], |row| {
            Ok(Item {
                id: row.get(0)?,
                text: row.get(1)?,
                done: row.get(2)?,
            })
        })
        .map_err(map_sqlite_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(map_sqlite_error)?;

    Ok(Snapshot::new(version, items))
}

fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StoreError::Unavailable(err.to_string())
        }
        _ => {
            error!("event=store_write module=store status=error store=sqlite error={err}");
            StoreError::Backend(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteRemoteStore;
    use crate::model::item::{ItemPatch, NewItem};
    use crate::store::{RemoteStore, StoreError, StoreEvent, StoreListener};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn create_update_delete_roundtrip_keeps_creation_order() {
        let store = SqliteRemoteStore::open_in_memory().expect("open store");
        let first = store
            .create("u1", &NewItem::new("first").expect("valid"))
            .expect("create first");
        let second = store
            .create("u1", &NewItem::new("second").expect("valid"))
            .expect("create second");
        store
            .update("u1", &first, &ItemPatch::done(true))
            .expect("update");

        let snapshot = store.snapshot("u1").expect("snapshot");
        assert_eq!(snapshot.version(), 3);
        assert_eq!(snapshot.ids(), vec![first.clone(), second.clone()]);
        assert!(snapshot.find(&first).expect("first").done);

        store.delete("u1", &first).expect("delete");
        let snapshot = store.snapshot("u1").expect("snapshot");
        assert_eq!(snapshot.version(), 4);
        assert_eq!(snapshot.ids(), vec![second]);
    }

    #[test]
    fn missing_ids_are_not_found_and_do_not_bump_version() {
        let store = SqliteRemoteStore::open_in_memory().expect("open store");
        store
            .create("u1", &NewItem::new("one").expect("valid"))
            .expect("create");

        assert_eq!(
            store.delete("u1", "ghost"),
            Err(StoreError::NotFound("ghost".to_string()))
        );
        assert_eq!(
            store.update("u1", "ghost", &ItemPatch::done(true)),
            Err(StoreError::NotFound("ghost".to_string()))
        );
        assert_eq!(store.snapshot("u1").expect("snapshot").version(), 1);
    }

    #[test]
    fn unknown_partition_reads_as_empty_version_zero() {
        let store = SqliteRemoteStore::open_in_memory().expect("open store");
        let snapshot = store.snapshot("nobody").expect("snapshot");
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.is_empty());
    }

    #[test]
    fn items_are_not_visible_across_partitions() {
        let store = SqliteRemoteStore::open_in_memory().expect("open store");
        let id = store
            .create("u1", &NewItem::new("mine").expect("valid"))
            .expect("create");
        assert_eq!(
            store.delete("u2", &id),
            Err(StoreError::NotFound(id.clone()))
        );
        assert!(store.snapshot("u2").expect("snapshot").is_empty());
    }

    #[test]
    fn subscribe_racing_a_write_still_observes_the_committed_version() {
        for _ in 0..200 {
            let store = Arc::new(SqliteRemoteStore::open_in_memory().expect("open store"));
            store
                .create("u1", &NewItem::new("seed").expect("valid"))
                .expect("seed");

            let seen = Arc::new(AtomicU64::new(0));
            let seen_in_listener = seen.clone();
            let listener: StoreListener = Arc::new(move |event| {
                if let StoreEvent::Snapshot(snapshot) = event {
                    seen_in_listener.fetch_max(snapshot.version(), Ordering::SeqCst);
                }
            });

            let writer_store = store.clone();
            let writer = thread::spawn(move || {
                writer_store
                    .create("u1", &NewItem::new("racing").expect("valid"))
                    .expect("create");
            });
            store.subscribe("u1", listener).expect("subscribe");
            writer.join().expect("writer thread");

            let committed = store.snapshot("u1").expect("snapshot").version();
            assert_eq!(committed, 2);
            assert_eq!(seen.load(Ordering::SeqCst), committed);
        }
    }
}
