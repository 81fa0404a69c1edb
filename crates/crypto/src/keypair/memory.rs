//! [`MemoryKeyPairCache`]: lock-free, instance-local key-pair storage.

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;

use super::{validate_id, KeyPairCache, KeyPairDto, KeyPairError};

/// In-memory key-pair cache.
///
/// Backed by [`ArcSwap`] so readers never block; writers clone the map and
/// swap it in with `rcu`. Key pairs are written rarely (once per id) and read
/// on every negotiation, which is the access pattern this favours.
///
/// Contents are lost on restart and not shared between instances.
#[derive(Clone, Debug)]
pub struct MemoryKeyPairCache {
    inner: Arc<ArcSwap<HashMap<String, KeyPairDto>>>,
}

impl MemoryKeyPairCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(HashMap::new()))),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl Default for MemoryKeyPairCache {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPairCache for MemoryKeyPairCache {
    fn set(&self, id: &str, key_pair: KeyPairDto) -> Result<(), KeyPairError> {
        validate_id(id)?;
        self.inner.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(id.to_owned(), key_pair.clone());
            next
        });
        Ok(())
    }

    fn get(&self, id: &str) -> Result<KeyPairDto, KeyPairError> {
        self.inner
            .load()
            .get(id)
            .cloned()
            .ok_or_else(|| KeyPairError::NoSuchKeyPair(id.to_owned()))
    }

    fn destroy(&self) -> Result<(), KeyPairError> {
        self.inner.store(Arc::new(HashMap::new()));
        Ok(())
    }
}
