//! Metadata Storage Layer Abstraction
//!
//! This module provides an abstraction over the durable metadata store
//! holding the account pool and the deduplication catalog, allowing the
//! system to use different storage implementations (SQLite, distributed
//! databases, etc.) without affecting higher-level services.

pub mod mock_store;
pub mod sqlite_store;


use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A capacity-limited remote storage identity with credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Credential-bearing identifier (a mailbox address)
    pub identity: String,
    /// Opaque credential handed to the remote executor
    pub secret: String,
    /// Bytes remaining on the account. Decremented only after a
    /// confirmed upload, incremented only after a confirmed delete.
    pub free_capacity: i64,
}

/// A record binding a content hash to its one physical remote location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Hex digest of the file bytes; at most one stored copy per hash
    pub content_hash: String,
    /// Logical path on the owning account
    pub remote_path: String,
    /// Identity of the account holding the bytes
    pub owning_account: String,
    /// Size of the content in bytes
    pub size: u64,
}

/// Trait defining the metadata storage interface
pub trait MetadataStore: Send + Sync {
    /// Persist a freshly provisioned account
    fn insert_account(&self, account: &Account) -> Result<()>;

    /// Fetch a single account by identity
    fn account(&self, identity: &str) -> Result<Option<Account>>;

    /// All provisioned accounts, in scan order
    fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Remaining capacity of an account
    fn capacity_of(&self, identity: &str) -> Result<i64>;

    /// Apply a relative capacity change (negative after an upload,
    /// positive after a delete) in a single atomic update
    fn adjust_capacity(&self, identity: &str, delta: i64) -> Result<()>;

    /// Fetch the catalog entry for a content hash
    fn lookup_hash(&self, content_hash: &str) -> Result<Option<CatalogEntry>>;

    /// Whether a catalog entry exists for a content hash
    fn contains_hash(&self, content_hash: &str) -> Result<bool>;

    /// Record a completed upload. Fails if the hash is already present.
    fn insert_entry(&self, entry: &CatalogEntry) -> Result<()>;

    /// Fetch the catalog entry stored under a remote path
    fn entry_by_path(&self, remote_path: &str) -> Result<Option<CatalogEntry>>;

    /// Remove the unique entry with the given remote path
    fn remove_entry(&self, remote_path: &str) -> Result<()>;

    /// Basenames of every remote path in the catalog, eagerly
    /// materialized in path order
    fn remote_names(&self) -> Result<Vec<String>>;
}

/// Last path segment of a remote path ("/Root/x" -> "x")
pub fn remote_basename(remote_path: &str) -> String {
    remote_path
        .rsplit('/')
        .next()
        .unwrap_or(remote_path)
        .to_string()
}
