//! Document store: collections of JSON documents keyed by id, with in-process
//! change subscriptions.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

/// A write observed by a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
    pub id: String,
}

pub trait DocumentStore: Send + Sync {
    /// Fresh id for a document about to be created.
    fn new_id(&self) -> String;

    /// Timestamp the store stamps onto documents ("server timestamp").
    fn server_time(&self) -> DateTime<Utc>;

    /// Create or overwrite. Last write wins.
    fn set(&self, collection: &str, id: &str, data: &serde_json::Value) -> Result<(), StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Every document in the collection, in write order.
    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Documents whose top-level `field` equals `value`.
    fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Watch a collection. The watch ends when the returned guard drops.
    fn subscribe(&self, collection: &str) -> Subscription;
}

pub fn get_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>, StoreError> {
    store
        .get(collection, id)?
        .map(|doc| serde_json::from_value(doc.data).map_err(StoreError::from))
        .transpose()
}

pub fn put<T: Serialize>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    value: &T,
) -> Result<(), StoreError> {
    store.set(collection, id, &serde_json::to_value(value)?)
}

/// Decode every document in a collection, skipping ones that no longer match `T`.
pub fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for doc in store.list(collection)? {
        match serde_json::from_value::<T>(doc.data) {
            Ok(value) => out.push(value),
            Err(err) => tracing::warn!(collection, id = %doc.id, %err, "skipping malformed document"),
        }
    }
    Ok(out)
}

// ── subscriptions ────────────────────────────────────────────────────────────

#[derive(Default)]
struct WatchTable {
    next_id: u64,
    entries: HashMap<u64, (String, Sender<Change>)>,
}

/// Registry of open subscriptions, shared by a store and its guards.
#[derive(Clone, Default)]
pub struct Watchers {
    table: Arc<Mutex<WatchTable>>,
}

impl Watchers {
    pub fn watch(&self, collection: &str) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut id = 0;
        if let Ok(mut table) = self.table.lock() {
            table.next_id += 1;
            id = table.next_id;
            table.entries.insert(id, (collection.to_string(), tx));
        }
        Subscription {
            id,
            watchers: self.clone(),
            rx,
        }
    }

    pub fn notify(&self, collection: &str, id: &str) {
        let Ok(mut table) = self.table.lock() else {
            return;
        };
        // A closed receiver means its guard is mid-drop; forget it now.
        table.entries.retain(|_, (watched, tx)| {
            if watched != collection {
                return true;
            }
            tx.send(Change {
                collection: collection.to_string(),
                id: id.to_string(),
            })
            .is_ok()
        });
    }

    pub fn active(&self) -> usize {
        self.table.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    fn release(&self, id: u64) {
        if let Ok(mut table) = self.table.lock() {
            table.entries.remove(&id);
        }
    }
}

/// An open watch on one collection. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    watchers: Watchers,
    rx: Receiver<Change>,
}

impl Subscription {
    /// Changes received since the last call, without blocking.
    pub fn drain(&self) -> Vec<Change> {
        self.rx.try_iter().collect()
    }

    pub fn wait(&self, timeout: Duration) -> Option<Change> {
        self.rx.recv_timeout(timeout).ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.watchers.release(self.id);
    }
}

// ── sqlite implementation ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteDocumentStore {
    db_path: Arc<PathBuf>,
    watchers: Watchers,
}

impl SqliteDocumentStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db_path = PathBuf::from(path);
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                written_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            ",
        )?;

        Ok(Self {
            db_path: Arc::new(db_path),
            watchers: Watchers::default(),
        })
    }

    pub fn watchers(&self) -> &Watchers {
        &self.watchers
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&*self.db_path)?)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    fn server_time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn set(&self, collection: &str, id: &str, data: &serde_json::Value) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let body = serde_json::to_string(data)?;
        conn.execute(
            "INSERT INTO documents (collection, id, body, written_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(collection, id)
             DO UPDATE SET body = excluded.body, written_at = excluded.written_at",
            params![collection, id, body, Utc::now().to_rfc3339()],
        )?;
        self.watchers.notify(collection, id);
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.connect()?;
        let body = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        body.map(|b| {
            Ok(Document {
                id: id.to_string(),
                data: serde_json::from_str(&b)?,
            })
        })
        .transpose()
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents
             WHERE collection = ?1
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![collection], map_row)?;
        collect_rows(rows)
    }

    fn find_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, body FROM documents
             WHERE collection = ?1 AND json_extract(body, '$.' || ?2) = ?3
             ORDER BY rowid ASC
             LIMIT ?4",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![collection, field, value, limit], map_row)?;
        collect_rows(rows)
    }

    fn subscribe(&self, collection: &str) -> Subscription {
        self.watchers.watch(collection)
    }
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<(String, String)>>,
) -> Result<Vec<Document>, StoreError> {
    let mut docs = Vec::new();
    for row in rows {
        let (id, body) = row?;
        docs.push(Document {
            id,
            data: serde_json::from_str(&body)?,
        });
    }
    Ok(docs)
}
