//! [`FileKeyPairCache`]: one JSON document per key pair under a directory.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{validate_id, KeyPairCache, KeyPairDto, KeyPairError};

const EXTENSION: &str = "json";

/// File-backed key-pair cache.
///
/// Each pair lives in `<dir>/<id>.json`. Writes go to a temporary file in the
/// same directory which is then renamed over the target, so readers on other
/// instances sharing the directory never observe a partial document.
#[derive(Debug, Clone)]
pub struct FileKeyPairCache {
    dir: PathBuf,
}

impl FileKeyPairCache {
    /// Open (creating if needed) a cache rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::Storage`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, KeyPairError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{EXTENSION}"))
    }
}

impl KeyPairCache for FileKeyPairCache {
    fn set(&self, id: &str, key_pair: KeyPairDto) -> Result<(), KeyPairError> {
        validate_id(id)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &key_pair)?;
        tmp.flush()?;
        tmp.persist(self.path_for(id))
            .map_err(|e| KeyPairError::Storage(e.to_string()))?;
        debug!(key_pair_id = id, "key pair written");
        Ok(())
    }

    fn get(&self, id: &str) -> Result<KeyPairDto, KeyPairError> {
        validate_id(id).map_err(|_| KeyPairError::NoSuchKeyPair(id.to_owned()))?;
        let bytes = match fs::read(self.path_for(id)) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KeyPairError::NoSuchKeyPair(id.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn destroy(&self) -> Result<(), KeyPairError> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::tests::{exercise_backend, sample};

    #[test]
    fn behaves_like_every_backend() {
        let dir = tempfile::tempdir().unwrap();
        exercise_backend(&FileKeyPairCache::open(dir.path()).unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileKeyPairCache::open(dir.path())
            .unwrap()
            .set("default", sample("d"))
            .unwrap();

        let reopened = FileKeyPairCache::open(dir.path()).unwrap();
        assert_eq!(reopened.get("default").unwrap(), sample("d"));
    }

    #[test]
    fn corrupt_document_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileKeyPairCache::open(dir.path()).unwrap();
        fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        assert!(matches!(cache.get("bad"), Err(KeyPairError::Storage(_))));
    }

    #[test]
    fn destroy_leaves_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileKeyPairCache::open(dir.path()).unwrap();
        cache.set("a", sample("a")).unwrap();
        fs::write(dir.path().join("README"), b"keep").unwrap();
        cache.destroy().unwrap();
        assert!(dir.path().join("README").exists());
        assert!(cache.get("a").is_err());
    }
}
