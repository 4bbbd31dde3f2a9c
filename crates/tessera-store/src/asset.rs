//! Asset access collaborator.
//!
//! Models that reference binary assets (images, media) read and write them
//! through an [`AssetStore`]. Asset I/O is one of the few places the
//! surrounding application suspends, so the contract is async.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Result, StoreError};

/// Fallible byte-level access to assets addressed by a relative path.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn read_asset(&self, path: &str) -> Result<Vec<u8>>;
    async fn write_asset(&self, path: &str, bytes: Vec<u8>) -> Result<()>;
}

/// An in-memory [`AssetStore`] for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryAssetStore {
    assets: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AssetStore for InMemoryAssetStore {
    async fn read_asset(&self, path: &str) -> Result<Vec<u8>> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::AssetNotFound(path.to_string()))
    }

    async fn write_asset(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        if path.is_empty() {
            return Err(StoreError::AssetIo("asset path must not be empty".into()));
        }
        self.assets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), bytes);
        Ok(())
    }
}
