//! [`SqliteKeyPairCache`]: key pairs in a single SQLite table.

use std::{path::Path, sync::Mutex};

use rusqlite::{params, Connection, OptionalExtension};

use super::{validate_id, KeyPairCache, KeyPairDto, KeyPairError};

/// SQLite-backed key-pair cache.
///
/// `rusqlite::Connection` is not `Sync`, so access is serialised through a
/// mutex. Several processes may open the same database file; SQLite's own
/// locking keeps them consistent.
#[derive(Debug)]
pub struct SqliteKeyPairCache {
    conn: Mutex<Connection>,
}

impl SqliteKeyPairCache {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KeyPairError> {
        Self::with_connection(Connection::open(path)?)
    }

    /// A private in-memory database; useful in tests.
    pub fn open_in_memory() -> Result<Self, KeyPairError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, KeyPairError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS key_pair (
                id          TEXT PRIMARY KEY,
                algorithm   TEXT NOT NULL,
                public_key  TEXT NOT NULL,
                private_key TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, KeyPairError> {
        self.conn
            .lock()
            .map_err(|_| KeyPairError::Storage("sqlite connection mutex poisoned".into()))
    }
}

impl KeyPairCache for SqliteKeyPairCache {
    fn set(&self, id: &str, key_pair: KeyPairDto) -> Result<(), KeyPairError> {
        validate_id(id)?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO key_pair (id, algorithm, public_key, private_key)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                key_pair.algorithm,
                key_pair.public_key,
                key_pair.private_key
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<KeyPairDto, KeyPairError> {
        self.lock()?
            .query_row(
                "SELECT algorithm, public_key, private_key FROM key_pair WHERE id = ?1",
                [id],
                |row| {
                    Ok(KeyPairDto {
                        algorithm: row.get(0)?,
                        public_key: row.get(1)?,
                        private_key: row.get(2)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| KeyPairError::NoSuchKeyPair(id.to_owned()))
    }

    fn destroy(&self) -> Result<(), KeyPairError> {
        self.lock()?.execute("DELETE FROM key_pair", [])?;
        Ok(())
    }
}
