//! [`CryptoInfoRepository`] and its backends.

use std::{
    collections::HashMap,
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rusqlite::{params, Connection, OptionalExtension};
use tempfile::NamedTempFile;

use super::{LocalCipherError, LocalCryptoMetaInfo};

/// Storage of [`LocalCryptoMetaInfo`] keyed by `(app_id, mark_header)`.
#[cfg_attr(test, mockall::automock)]
pub trait CryptoInfoRepository: Send + Sync {
    fn get(
        &self,
        app_id: &str,
        mark_header: &str,
    ) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError>;

    /// Store `info` unless a record with the same key exists, and return
    /// whichever record is stored afterwards.
    fn save(&self, info: LocalCryptoMetaInfo) -> Result<LocalCryptoMetaInfo, LocalCipherError>;
}

/// In-process repository. Contents are lost on restart, so every restart
/// generates new keys and earlier ciphertext becomes unreadable.
#[derive(Debug, Default)]
pub struct MemoryCryptoInfoRepository {
    records: RwLock<HashMap<(String, String), LocalCryptoMetaInfo>>,
}

impl MemoryCryptoInfoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CryptoInfoRepository for MemoryCryptoInfoRepository {
    fn get(
        &self,
        app_id: &str,
        mark_header: &str,
    ) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError> {
        let records = self
            .records
            .read()
            .map_err(|_| LocalCipherError::Repository("lock poisoned".into()))?;
        Ok(records
            .get(&(app_id.to_owned(), mark_header.to_owned()))
            .cloned())
    }

    fn save(&self, info: LocalCryptoMetaInfo) -> Result<LocalCryptoMetaInfo, LocalCipherError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| LocalCipherError::Repository("lock poisoned".into()))?;
        Ok(records
            .entry((info.app_id.clone(), info.mark_header.clone()))
            .or_insert(info)
            .clone())
    }
}

/// One JSON document per record under a directory.
#[derive(Debug)]
pub struct FileCryptoInfoRepository {
    dir: PathBuf,
    // Serialises check-then-write within this process.
    write_lock: Mutex<()>,
}

impl FileCryptoInfoRepository {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LocalCipherError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<b64url(app_id)>.<b64url(mark_header)>.json`; distinct keys never
    /// share a file.
    fn path(&self, app_id: &str, mark_header: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.json",
            URL_SAFE_NO_PAD.encode(app_id),
            URL_SAFE_NO_PAD.encode(mark_header)
        ))
    }

    fn read(&self, path: &Path) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl CryptoInfoRepository for FileCryptoInfoRepository {
    fn get(
        &self,
        app_id: &str,
        mark_header: &str,
    ) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError> {
        self.read(&self.path(app_id, mark_header))
    }

    fn save(&self, info: LocalCryptoMetaInfo) -> Result<LocalCryptoMetaInfo, LocalCipherError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| LocalCipherError::Repository("lock poisoned".into()))?;
        let path = self.path(&info.app_id, &info.mark_header);
        if let Some(existing) = self.read(&path)? {
            return Ok(existing);
        }

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, &info)?;
        tmp.flush()?;
        // Another process may have written the record in the meantime; keep theirs.
        match tmp.persist_noclobber(&path) {
            Ok(_) => Ok(info),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                self.read(&path)?.ok_or_else(|| {
                    LocalCipherError::Repository(format!("{} vanished", path.display()))
                })
            }
            Err(e) => Err(e.error.into()),
        }
    }
}

/// SQLite table `crypto_meta_info`, first writer wins.
#[derive(Debug)]
pub struct SqliteCryptoInfoRepository {
    conn: Mutex<Connection>,
}

impl SqliteCryptoInfoRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LocalCipherError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LocalCipherError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LocalCipherError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS crypto_meta_info (
                app_id             TEXT NOT NULL,
                mark_header        TEXT NOT NULL,
                root_key_salt      TEXT NOT NULL,
                encrypted_data_key TEXT NOT NULL,
                iv                 TEXT NOT NULL,
                created_at         TEXT NOT NULL,
                PRIMARY KEY (app_id, mark_header)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query(
        conn: &Connection,
        app_id: &str,
        mark_header: &str,
    ) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError> {
        Ok(conn
            .query_row(
                "SELECT app_id, mark_header, root_key_salt, encrypted_data_key, iv, created_at
                 FROM crypto_meta_info WHERE app_id = ?1 AND mark_header = ?2",
                [app_id, mark_header],
                |row| {
                    Ok(LocalCryptoMetaInfo {
                        app_id: row.get(0)?,
                        mark_header: row.get(1)?,
                        root_key_salt: row.get(2)?,
                        encrypted_data_key: row.get(3)?,
                        iv: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }
}

impl CryptoInfoRepository for SqliteCryptoInfoRepository {
    fn get(
        &self,
        app_id: &str,
        mark_header: &str,
    ) -> Result<Option<LocalCryptoMetaInfo>, LocalCipherError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LocalCipherError::Repository("sqlite connection mutex poisoned".into()))?;
        Self::query(&conn, app_id, mark_header)
    }

    fn save(&self, info: LocalCryptoMetaInfo) -> Result<LocalCryptoMetaInfo, LocalCipherError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LocalCipherError::Repository("sqlite connection mutex poisoned".into()))?;
        conn.execute(
            "INSERT OR IGNORE INTO crypto_meta_info
             (app_id, mark_header, root_key_salt, encrypted_data_key, iv, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                info.app_id,
                info.mark_header,
                info.root_key_salt,
                info.encrypted_data_key,
                info.iv,
                info.created_at
            ],
        )?;
        Self::query(&conn, &info.app_id, &info.mark_header)?.ok_or_else(|| {
            LocalCipherError::Repository("record missing after insert".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(app_id: &str, header: &str, salt: &str) -> LocalCryptoMetaInfo {
        LocalCryptoMetaInfo {
            app_id: app_id.into(),
            mark_header: header.into(),
            root_key_salt: salt.into(),
            encrypted_data_key: "ZGs=".into(),
            iv: String::new(),
            created_at: "2026-01-01T00:00:00+00:00".into(),
        }
    }

    fn exercise(repo: &dyn CryptoInfoRepository) {
        assert_eq!(repo.get("app", "v1.").unwrap(), None);

        let first = repo.save(info("app", "v1.", "first")).unwrap();
        assert_eq!(first.root_key_salt, "first");

        // First writer wins.
        let second = repo.save(info("app", "v1.", "second")).unwrap();
        assert_eq!(second.root_key_salt, "first");
        assert_eq!(repo.get("app", "v1.").unwrap(), Some(first));

        repo.save(info("app", "v2.", "other")).unwrap();
        repo.save(info("other-app", "v1.", "x")).unwrap();
        assert_eq!(repo.get("app", "v2.").unwrap().unwrap().root_key_salt, "other");
        assert_eq!(repo.get("other-app", "v1.").unwrap().unwrap().root_key_salt, "x");

        // Keys that only differ in punctuation stay apart.
        repo.save(info("my.app", "v1.", "dotted")).unwrap();
        assert_eq!(repo.get("my_app", "v1.").unwrap(), None);
        let underscored = repo.save(info("my_app", "v1.", "underscored")).unwrap();
        assert_eq!(underscored.app_id, "my_app");
        assert_eq!(underscored.root_key_salt, "underscored");
        assert_eq!(repo.get("my.app", "v1.").unwrap().unwrap().root_key_salt, "dotted");
    }

    #[test]
    fn memory_backend() {
        exercise(&MemoryCryptoInfoRepository::new());
    }

    #[test]
    fn file_backend() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileCryptoInfoRepository::open(dir.path()).unwrap());

        let reopened = FileCryptoInfoRepository::open(dir.path()).unwrap();
        assert!(reopened.get("app", "v1.").unwrap().is_some());
    }

    #[test]
    fn sqlite_backend() {
        exercise(&SqliteCryptoInfoRepository::open_in_memory().unwrap());
    }

    #[test]
    fn sqlite_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        SqliteCryptoInfoRepository::open(&path)
            .unwrap()
            .save(info("app", "v1.", "kept"))
            .unwrap();
        let reopened = SqliteCryptoInfoRepository::open(&path).unwrap();
        assert_eq!(reopened.get("app", "v1.").unwrap().unwrap().root_key_salt, "kept");
    }
}
