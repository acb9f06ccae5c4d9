//! Blob store abstraction.
//!
//! Documents and their highlighted artifacts live side by side in one
//! bucket. The service only needs whole-object reads and overwriting writes;
//! each write replaces the object atomically, so concurrent readers see
//! either the old or the new version, never a mix.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Whole-object storage for one bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the full contents of `name`.
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Write `bytes` under `name`, replacing any existing object.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;
}

/// In-process blob store backed by a map.
///
/// Backs the router and cache tests; nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently stored, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.objects.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        names.sort();
        names
    }

    /// Non-async read, for assertions.
    pub fn peek(&self, name: &str) -> Option<Vec<u8>> {
        match self.objects.read() {
            Ok(map) => map.get(name).cloned(),
            Err(poisoned) => poisoned.into_inner().get(name).cloned(),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let map = self
            .objects
            .read()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        map.get(name)
            .cloned()
            .ok_or_else(|| anyhow!("blob not found: {}", name))
    }

    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let mut map = self
            .objects
            .write()
            .map_err(|_| anyhow!("blob store lock poisoned"))?;
        map.insert(name.to_string(), bytes);
        Ok(())
    }
}
