//! Mock implementation of the MetadataStore trait for testing

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{NimbusError, Result};
use crate::metadata::{remote_basename, Account, CatalogEntry, MetadataStore};

#[derive(Default)]
struct Inner {
    // BTreeMap keeps scan order deterministic for tests
    accounts: BTreeMap<String, Account>,
    entries: BTreeMap<String, CatalogEntry>,
}

/// Mock implementation of MetadataStore for testing
pub struct MockMetadataStore {
    data: Mutex<Inner>,
}

impl MockMetadataStore {
    /// Create a new mock metadata store
    pub fn new() -> Self {
        Self {
            data: Mutex::new(Inner::default()),
        }
    }

    /// Clear all data from the store (useful for test cleanup)
    pub fn clear(&self) {
        let mut data = self.data.lock().unwrap();
        data.accounts.clear();
        data.entries.clear();
    }

    /// Number of provisioned accounts
    pub fn account_count(&self) -> usize {
        self.data.lock().unwrap().accounts.len()
    }

    /// Number of catalog entries
    pub fn entry_count(&self) -> usize {
        self.data.lock().unwrap().entries.len()
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MockMetadataStore {
    fn insert_account(&self, account: &Account) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if data.accounts.contains_key(&account.identity) {
            return Err(NimbusError::Metadata(format!(
                "account already exists: {}",
                account.identity
            )));
        }
        data.accounts
            .insert(account.identity.clone(), account.clone());
        Ok(())
    }

    fn account(&self, identity: &str) -> Result<Option<Account>> {
        let data = self.data.lock().unwrap();
        Ok(data.accounts.get(identity).cloned())
    }

    fn list_accounts(&self) -> Result<Vec<Account>> {
        let data = self.data.lock().unwrap();
        Ok(data.accounts.values().cloned().collect())
    }

    fn capacity_of(&self, identity: &str) -> Result<i64> {
        let data = self.data.lock().unwrap();
        data.accounts
            .get(identity)
            .map(|a| a.free_capacity)
            .ok_or_else(|| NimbusError::UnknownAccount(identity.to_string()))
    }

    fn adjust_capacity(&self, identity: &str, delta: i64) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let account = data
            .accounts
            .get_mut(identity)
            .ok_or_else(|| NimbusError::UnknownAccount(identity.to_string()))?;
        account.free_capacity += delta;
        Ok(())
    }

    fn lookup_hash(&self, content_hash: &str) -> Result<Option<CatalogEntry>> {
        let data = self.data.lock().unwrap();
        Ok(data.entries.get(content_hash).cloned())
    }

    fn contains_hash(&self, content_hash: &str) -> Result<bool> {
        let data = self.data.lock().unwrap();
        Ok(data.entries.contains_key(content_hash))
    }

    fn insert_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        if data.entries.contains_key(&entry.content_hash) {
            return Err(NimbusError::Metadata(format!(
                "catalog insert for hash {} rejected: already present",
                entry.content_hash
            )));
        }
        data.entries
            .insert(entry.content_hash.clone(), entry.clone());
        Ok(())
    }

    fn entry_by_path(&self, remote_path: &str) -> Result<Option<CatalogEntry>> {
        let data = self.data.lock().unwrap();
        Ok(data
            .entries
            .values()
            .find(|e| e.remote_path == remote_path)
            .cloned())
    }

    fn remove_entry(&self, remote_path: &str) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        let hash = data
            .entries
            .values()
            .find(|e| e.remote_path == remote_path)
            .map(|e| e.content_hash.clone())
            .ok_or_else(|| NimbusError::NotFound(remote_path.to_string()))?;
        data.entries.remove(&hash);
        Ok(())
    }

    fn remote_names(&self) -> Result<Vec<String>> {
        let data = self.data.lock().unwrap();
        let mut names: Vec<String> = data
            .entries
            .values()
            .map(|e| remote_basename(&e.remote_path))
            .collect();
        names.sort();
        Ok(names)
    }
}
