//! Content-addressable deduplication catalog service
//!
//! Keyed by the SHA-256 digest of the file bytes: at most one stored
//! copy exists per distinct content, no matter how many logical names
//! point at it.

use log::info;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::Result;
use crate::metadata::{CatalogEntry, MetadataStore};

/// Hex digest of file bytes used as the deduplication key
pub fn content_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Dedup catalog over the metadata store
pub struct DedupCatalog {
    store: Arc<dyn MetadataStore>,
}

impl DedupCatalog {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Entry for a content hash, if any
    pub fn lookup(&self, content_hash: &str) -> Result<Option<CatalogEntry>> {
        self.store.lookup_hash(content_hash)
    }

    /// Upload short-circuit: true means the bytes are already durable
    pub fn contains(&self, content_hash: &str) -> Result<bool> {
        self.store.contains_hash(content_hash)
    }

    /// Record a completed upload; hard-fails if the hash is present
    pub fn insert(
        &self,
        content_hash: &str,
        remote_path: &str,
        owning_account: &str,
        size: u64,
    ) -> Result<()> {
        self.store.insert_entry(&CatalogEntry {
            content_hash: content_hash.to_string(),
            remote_path: remote_path.to_string(),
            owning_account: owning_account.to_string(),
            size,
        })?;
        info!(
            "Cataloged {} ({} bytes) on account {}",
            remote_path, size, owning_account
        );
        Ok(())
    }

    /// Entry stored under a remote path, if any
    pub fn entry_by_path(&self, remote_path: &str) -> Result<Option<CatalogEntry>> {
        self.store.entry_by_path(remote_path)
    }

    /// Remove the unique entry with the given remote path
    pub fn remove(&self, remote_path: &str) -> Result<()> {
        self.store.remove_entry(remote_path)?;
        info!("Removed catalog entry for {}", remote_path);
        Ok(())
    }

    /// Basenames of all cataloged remote paths, eagerly materialized
    pub fn all_remote_names(&self) -> Result<Vec<String>> {
        self.store.remote_names()
    }
}
