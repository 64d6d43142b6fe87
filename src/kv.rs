use crate::error::KvError;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

pub const DB_FILE: &str = "school.sqlite3";

/// Byte-string key-value storage; the local equivalent of browser storage.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError>;
}

/// Lets the store's persistence listener and other callers share one store.
impl<K: KvStore> KvStore for Rc<RefCell<K>> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.borrow_mut().set(key, value)
    }
}

pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join(DB_FILE))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv(
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at TEXT
            )",
            [],
        )?;
        Ok(Self { conn })
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let v = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |r| {
                r.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(v)
    }

    fn set(&mut self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.conn
            .execute(
                "INSERT INTO kv(key, value, updated_at)
                 VALUES(?, ?, strftime('%Y-%m-%dT%H:%M:%SZ','now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                (key, value),
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::DiskFull) => KvError::QuotaExceeded {
                    key: key.to_string(),
                },
                _ => KvError::Backend(e),
            })?;
        Ok(())
    }
}
