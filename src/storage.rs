//! SQLite watcher store.
//!
//! One file, one logical table: `watchers`, keyed by the 8-byte big-endian
//! watcher id with the JSON record as value. The table is `WITHOUT ROWID`, so
//! scans come back in id order. Ids come from a separate `sequences` row that
//! is bumped in the same transaction as the insert, which keeps deleted ids
//! from ever being handed out again.
//!
//! The file is opened for each operation and closed when it returns, so a CLI
//! process and a running webserver can share it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use opentelemetry::KeyValue;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use tracing::debug;

use crate::domain::DomainRegistry;
use crate::error::{Error, Result};
use crate::model::{Filter, Update, Watcher, WatcherId};
use crate::telemetry::metrics;

const SEQUENCE_NAME: &str = "watchers";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable watcher records. Cheap to clone; holds only the path and registry.
#[derive(Debug, Clone)]
pub struct WatcherStore {
    path: PathBuf,
    registry: DomainRegistry,
}

/// Handle for storage operations inside one transaction.
pub(crate) struct TxContext<'a> {
    tx: &'a Connection,
}

impl TxContext<'_> {
    pub fn next_id(&self) -> Result<WatcherId> {
        next_id_on(self.tx)
    }

    pub fn get(&self, id: WatcherId) -> Result<Option<Watcher>> {
        get_on(self.tx, id)
    }

    pub fn put(&self, watcher: &Watcher) -> Result<()> {
        put_on(self.tx, watcher)
    }

    pub fn delete(&self, id: WatcherId) -> Result<bool> {
        delete_on(self.tx, id)
    }

    pub fn scan(&self, filter: &Filter) -> Result<Vec<Watcher>> {
        scan_on(self.tx, filter)
    }
}

impl WatcherStore {
    /// Point the store at `path`, creating the file and schema if needed.
    pub fn open(path: impl AsRef<Path>, registry: DomainRegistry) -> Result<Self> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
            registry,
        };
        drop(store.connect()?);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Run a store operation on the blocking pool, for use from async code.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WatcherStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| Error::Other(format!("store task failed: {e}")))?
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS watchers (
                key     BLOB PRIMARY KEY,
                value   TEXT NOT NULL
            ) WITHOUT ROWID;

            CREATE TABLE IF NOT EXISTS sequences (
                name    TEXT PRIMARY KEY,
                value   INTEGER NOT NULL
            );
            ",
        )?;
        Ok(conn)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Open the file, run `f` in a transaction, commit, close.
    ///
    /// Rolls back if `f` returns Err. Write transactions take the lock up front
    /// so two writers never deadlock on a lock upgrade.
    pub(crate) fn with_transaction<F, T>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&TxContext) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(behavior)?;
        let result = f(&TxContext { tx: &tx })?;
        tx.commit()?;
        Ok(result)
    }

    fn write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxContext) -> Result<T>,
    {
        self.with_transaction(TransactionBehavior::Immediate, f)
    }

    fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TxContext) -> Result<T>,
    {
        self.with_transaction(TransactionBehavior::Deferred, f)
    }

    // -----------------------------------------------------------------------
    // Watchers
    // -----------------------------------------------------------------------

    /// Create a watcher and return its freshly assigned id.
    pub fn create(&self, domain: &str, url: &str) -> Result<WatcherId> {
        if !self.registry.is_supported(domain) {
            return Err(Error::Validation(format!("domain '{domain}' is not supported")));
        }

        let id = self.write(|ctx| {
            let id = ctx.next_id()?;
            ctx.put(&Watcher::new(id, domain, url))?;
            Ok(id)
        })?;

        debug!(%id, domain, url, "watcher created");
        metrics::watcher_changes().add(1, &[KeyValue::new("operation", "create")]);
        Ok(id)
    }

    pub fn get(&self, id: WatcherId) -> Result<Option<Watcher>> {
        self.read(|ctx| ctx.get(id))
    }

    /// All watchers matching every entry of `filter`, in id order.
    /// An empty filter returns everything.
    pub fn list(&self, filter: &Filter) -> Result<Vec<Watcher>> {
        self.read(|ctx| ctx.scan(filter))
    }

    /// Append the update's price to its watcher.
    ///
    /// An unknown id is not an error: the call does nothing and returns
    /// `Ok(false)`, so a worker retrying after a delete is harmless.
    pub fn update(&self, update: &Update) -> Result<bool> {
        let applied = self.write(|ctx| match ctx.get(update.id)? {
            Some(mut watcher) => {
                watcher.apply(update);
                ctx.put(&watcher)?;
                Ok(true)
            }
            None => Ok(false),
        })?;

        if applied {
            debug!(id = %update.id, value = update.price.value, "price recorded");
            metrics::watcher_changes().add(1, &[KeyValue::new("operation", "update")]);
        } else {
            debug!(id = %update.id, "update for unknown watcher ignored");
        }
        Ok(applied)
    }

    /// Set or clear the in-flight mark. Unknown ids are ignored.
    pub fn set_checking(&self, id: WatcherId, checking: bool) -> Result<bool> {
        self.write(|ctx| match ctx.get(id)? {
            Some(mut watcher) if watcher.is_checking != checking => {
                watcher.is_checking = checking;
                ctx.put(&watcher)?;
                Ok(true)
            }
            Some(_) | None => Ok(false),
        })
    }

    /// Mark `seen` in flight, but only if no price landed since it was read.
    ///
    /// `seen` is the snapshot that was just submitted. When a worker already
    /// reported back, the stored history is longer and the mark is not set.
    pub fn mark_checking(&self, seen: &Watcher) -> Result<bool> {
        let seen_prices = seen.price_history.len();
        self.write(|ctx| match ctx.get(seen.id)? {
            Some(mut watcher)
                if !watcher.is_checking && watcher.price_history.len() == seen_prices =>
            {
                watcher.is_checking = true;
                ctx.put(&watcher)?;
                Ok(true)
            }
            Some(_) | None => Ok(false),
        })
    }

    /// Delete one watcher. Returns whether it existed.
    pub fn remove(&self, id: WatcherId) -> Result<bool> {
        let removed = self.write(|ctx| ctx.delete(id))?;
        if removed {
            metrics::watcher_changes().add(1, &[KeyValue::new("operation", "remove")]);
        }
        Ok(removed)
    }

    /// Delete every watcher. Returns how many were removed.
    ///
    /// The id sequence is left alone.
    pub fn remove_all(&self) -> Result<usize> {
        let removed = self.write(|ctx| Ok(ctx.tx.execute("DELETE FROM watchers", [])?))?;
        if removed > 0 {
            metrics::watcher_changes().add(
                removed as u64,
                &[KeyValue::new("operation", "remove")],
            );
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Inner functions. Take &Connection so they run inside any transaction.
// ---------------------------------------------------------------------------

fn next_id_on(conn: &Connection) -> Result<WatcherId> {
    conn.execute(
        "INSERT INTO sequences (name, value) VALUES (?1, 1)
         ON CONFLICT(name) DO UPDATE SET value = value + 1",
        params![SEQUENCE_NAME],
    )?;
    let value: i64 = conn.query_row(
        "SELECT value FROM sequences WHERE name = ?1",
        params![SEQUENCE_NAME],
        |row| row.get(0),
    )?;
    u64::try_from(value)
        .map(WatcherId)
        .map_err(|_| Error::Other(format!("corrupt watcher sequence: {value}")))
}

fn get_on(conn: &Connection, id: WatcherId) -> Result<Option<Watcher>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM watchers WHERE key = ?1",
            params![id.to_key().as_slice()],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|json| serde_json::from_str(&json).map_err(Error::from))
        .transpose()
}

fn put_on(conn: &Connection, watcher: &Watcher) -> Result<()> {
    conn.execute(
        "INSERT INTO watchers (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![watcher.id.to_key().as_slice(), serde_json::to_string(watcher)?],
    )?;
    Ok(())
}

fn delete_on(conn: &Connection, id: WatcherId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM watchers WHERE key = ?1",
        params![id.to_key().as_slice()],
    )?;
    Ok(n > 0)
}

fn scan_on(conn: &Connection, filter: &Filter) -> Result<Vec<Watcher>> {
    let mut stmt = conn.prepare("SELECT key, value FROM watchers ORDER BY key ASC")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut result = Vec::new();
    for (key, json) in rows {
        let record: Value = serde_json::from_str(&json)?;
        if !matches_filter(&record, filter) {
            continue;
        }
        let watcher: Watcher = serde_json::from_value(record)?;
        if WatcherId::from_key(&key) != Some(watcher.id) {
            return Err(Error::Other(format!(
                "record for key {key:?} carries id {}",
                watcher.id
            )));
        }
        result.push(watcher);
    }
    Ok(result)
}

/// Exact, case-sensitive match on every filter entry. A field the record
/// doesn't have, or one that isn't a scalar, never matches.
fn matches_filter(record: &Value, filter: &Filter) -> bool {
    filter.iter().all(|(field, expected)| match record.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == *expected,
        Some(Value::Bool(b)) => b.to_string() == *expected,
        _ => false,
    })
}
