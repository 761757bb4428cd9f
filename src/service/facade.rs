//! Cache-first facade over the account pool, catalog and ledger
//!
//! Every file operation prefers the local cache and falls back to the
//! remote executor. Catalog and ledger only move after a confirmed
//! remote success; a write whose remote mirroring fails keeps the local
//! copy and reports its local size.

use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;

use crate::error::{NimbusError, Result};
use crate::metadata::MetadataStore;
use crate::remote::{RemoteExecutor, UploadOutcome, REMOTE_ROOT};
use crate::service::catalog::{content_hash, DedupCatalog};
use crate::service::ledger::QuotaLedger;
use crate::service::pool::AccountPool;

/// Result of a stat call
#[derive(Debug, Clone, PartialEq)]
pub struct StatInfo {
    pub is_directory: bool,
    pub size: u64,
    /// Whether a catalog entry (and so an owning account) backs this name
    pub owning_account_present: bool,
    /// Modified time of the local copy; None for remote-only entries
    pub modified: Option<SystemTime>,
}

/// File-operation entry points consumed by the protocol layer
pub struct CacheFacade {
    cache_root: PathBuf,
    store: Arc<dyn MetadataStore>,
    catalog: DedupCatalog,
    ledger: QuotaLedger,
    pool: AccountPool,
    executor: Arc<dyn RemoteExecutor>,
    // Serializes the contains -> insert/commit window so two writes of
    // identical content cannot both commit
    commit_lock: Mutex<()>,
}

impl CacheFacade {
    pub fn new(
        cache_root: PathBuf,
        store: Arc<dyn MetadataStore>,
        executor: Arc<dyn RemoteExecutor>,
        pool: AccountPool,
    ) -> Result<Self> {
        fs::create_dir_all(&cache_root)?;
        Ok(Self {
            catalog: DedupCatalog::new(store.clone()),
            ledger: QuotaLedger::new(store.clone()),
            cache_root,
            store,
            pool,
            executor,
            commit_lock: Mutex::new(()),
        })
    }

    /// Map a logical path onto the cache directory, rejecting escapes
    fn cache_path(&self, path: &str) -> Result<PathBuf> {
        let mut resolved = self.cache_root.clone();
        for part in path.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    debug!("Rejected path escaping the mount root: {}", path);
                    return Err(NimbusError::NotFound(path.to_string()));
                }
                part => resolved.push(part),
            }
        }
        Ok(resolved)
    }

    fn basename(path: &str) -> Result<&str> {
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .ok_or_else(|| NimbusError::NotFound(path.to_string()))
    }

    fn remote_path_of(path: &str) -> Result<String> {
        Ok(format!("{}/{}", REMOTE_ROOT, Self::basename(path)?))
    }

    /// Write bytes to the local cache and mirror new content remotely.
    /// Returns the locally written size; remote or commit failures after
    /// an account was selected are logged but do not fail the write.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<u64> {
        let local = self.cache_path(path)?;
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&local, data)?;
        let size = data.len() as u64;
        debug!("Cached {} bytes at {}", size, local.display());
        if size == 0 {
            return Ok(0);
        }

        let hash = content_hash(data);
        {
            let _commit = self.commit_lock.lock().await;
            if self.catalog.contains(&hash)? {
                info!("Content of {} already stored, skipping upload", path);
                return Ok(size);
            }
        }

        let account = self.pool.select_account(size).await?;
        match self.executor.put(&account, &local).await {
            Ok(UploadOutcome::Stored { remote_path }) => {
                let _commit = self.commit_lock.lock().await;
                if self.catalog.contains(&hash)? {
                    info!("Content of {} was stored concurrently, keeping one entry", path);
                    return Ok(size);
                }
                if let Err(e) = self
                    .catalog
                    .insert(&hash, &remote_path, &account.identity, size)
                    .and_then(|_| self.ledger.commit_decrease(&account.identity, size))
                {
                    // The remote copy exists but metadata did not commit;
                    // the views diverge until an operator reconciles them
                    error!("Post-upload commit for {} failed: {}", path, e);
                }
            }
            Ok(UploadOutcome::AlreadyExists { remote_path }) => {
                info!("File already exists at remote path: {}", remote_path);
            }
            Err(e) => {
                warn!("Upload of {} failed, keeping local copy only: {}", path, e);
            }
        }
        Ok(size)
    }

    /// Read a file, fetching it from its owning account when the local
    /// cache has no copy
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let local = self.cache_path(path)?;
        if local.is_file() {
            debug!("Serving {} from local cache", path);
            return Ok(fs::read(&local)?);
        }

        let remote_path = Self::remote_path_of(path)?;
        let entry = self
            .catalog
            .entry_by_path(&remote_path)?
            .ok_or_else(|| NimbusError::NotFound(path.to_string()))?;
        let account = self
            .store
            .account(&entry.owning_account)?
            .ok_or_else(|| NimbusError::UnknownAccount(entry.owning_account.clone()))?;

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        info!(
            "Fetching {} from account {}",
            entry.remote_path, account.identity
        );
        self.executor.get(&account, &entry.remote_path, &local).await?;
        Ok(fs::read(&local)?)
    }

    /// Remove a file remotely, then release its capacity and drop the
    /// cached copy. A failed remote removal changes nothing.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let remote_path = Self::remote_path_of(path)?;
        let entry = self
            .catalog
            .entry_by_path(&remote_path)?
            .ok_or_else(|| NimbusError::NotFound(path.to_string()))?;
        let account = self
            .store
            .account(&entry.owning_account)?
            .ok_or_else(|| NimbusError::UnknownAccount(entry.owning_account.clone()))?;

        info!("Removing {} from account {}", entry.remote_path, account.identity);
        self.executor.remove(&account, &entry.remote_path).await?;

        {
            let _commit = self.commit_lock.lock().await;
            self.catalog.remove(&entry.remote_path)?;
            self.ledger
                .commit_increase(&entry.owning_account, entry.size)?;
        }

        let local = self.cache_path(path)?;
        if local.is_file() {
            if let Err(e) = fs::remove_file(&local) {
                warn!("Could not remove cached copy {}: {}", local.display(), e);
            }
        }
        Ok(())
    }

    /// Union of local directory entries and cataloged remote names,
    /// deduplicated by name
    pub fn list_children(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.cache_path(path)?;
        let mut names = BTreeSet::new();
        if dir.is_dir() {
            for dent in fs::read_dir(&dir)? {
                names.insert(dent?.file_name().to_string_lossy().to_string());
            }
        }
        for name in self.catalog.all_remote_names()? {
            names.insert(name);
        }
        Ok(names.into_iter().collect())
    }

    /// Stat a path, consulting the local filesystem first and the
    /// catalog second
    pub fn stat(&self, path: &str) -> Result<StatInfo> {
        let owning_entry = match Self::remote_path_of(path) {
            Ok(remote_path) => self.catalog.entry_by_path(&remote_path)?,
            // The mount root has no basename and no catalog entry
            Err(_) => None,
        };

        let local = self.cache_path(path)?;
        if let Ok(meta) = fs::metadata(&local) {
            return Ok(StatInfo {
                is_directory: meta.is_dir(),
                size: meta.len(),
                owning_account_present: owning_entry.is_some(),
                modified: meta.modified().ok(),
            });
        }

        if let Some(entry) = owning_entry {
            return Ok(StatInfo {
                is_directory: false,
                size: entry.size,
                owning_account_present: true,
                modified: None,
            });
        }

        Err(NimbusError::NotFound(path.to_string()))
    }
}
