//! Vendor label storage using SQLite
//!
//! Labels that a server attached through the `X-ABLABEL` extension are not
//! part of the built-in subtype lists. Each one seen for the first time is
//! remembered as a `(typename, subtype, abook_id)` row so later conversions
//! of the same addressbook can offer and write it back.

use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// A remembered vendor label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtypeRow {
    /// Local field name (`email`, `phone`, ...)
    pub typename: String,
    pub subtype: String,
}

/// Storage for vendor labels, scoped per addressbook
pub trait SubtypeStore: Send + Sync {
    /// All distinct labels stored for the addressbook
    fn load_subtypes(&self, abook_id: &str) -> Result<Vec<SubtypeRow>>;

    /// Persist one label row
    fn insert_subtype(&self, typename: &str, subtype: &str, abook_id: &str) -> Result<()>;
}

/// SQLite-based vendor label store
pub struct SqliteSubtypeStore {
    conn: Mutex<Connection>,
}

impl SqliteSubtypeStore {
    /// Create a new store with the given database path
    pub fn new(db_path: &str) -> Result<Self> {
        debug!("Opening subtype database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        info!("SqliteSubtypeStore initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("subtype database lock poisoned".to_string()))
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS xsubtypes (
                typename TEXT NOT NULL,
                subtype TEXT NOT NULL,
                abook_id TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_xsubtypes_abook_id ON xsubtypes(abook_id)",
            [],
        )?;

        Ok(())
    }

    /// Number of stored rows for an addressbook, duplicates included
    pub fn count(&self, abook_id: &str) -> Result<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM xsubtypes WHERE abook_id = ?1",
            params![abook_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl SubtypeStore for SqliteSubtypeStore {
    fn load_subtypes(&self, abook_id: &str) -> Result<Vec<SubtypeRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT typename, subtype FROM xsubtypes
             WHERE abook_id = ?1
             GROUP BY typename, subtype
             ORDER BY MIN(rowid)",
        )?;

        let rows = stmt
            .query_map(params![abook_id], |row| {
                Ok(SubtypeRow {
                    typename: row.get(0)?,
                    subtype: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Loaded {} stored subtypes for addressbook {}", rows.len(), abook_id);
        Ok(rows)
    }

    fn insert_subtype(&self, typename: &str, subtype: &str, abook_id: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO xsubtypes (typename, subtype, abook_id) VALUES (?1, ?2, ?3)",
            params![typename, subtype, abook_id],
        )?;
        debug!("Stored subtype {}:{} for addressbook {}", typename, subtype, abook_id);
        Ok(())
    }
}
