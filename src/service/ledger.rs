//! Quota ledger service tracking per-account remaining capacity
//!
//! There is no reservation step: capacity figures read during account
//! selection can be stale by the time a transfer finishes. The ledger
//! only moves after the corresponding remote operation has already
//! succeeded.

use log::info;
use std::sync::Arc;

use crate::error::Result;
use crate::metadata::MetadataStore;

/// Per-account remaining-capacity counter over the metadata store
pub struct QuotaLedger {
    store: Arc<dyn MetadataStore>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Remaining capacity of an account in bytes
    pub fn capacity_of(&self, identity: &str) -> Result<i64> {
        self.store.capacity_of(identity)
    }

    /// Record a confirmed upload of `size` bytes
    pub fn commit_decrease(&self, identity: &str, size: u64) -> Result<()> {
        self.store.adjust_capacity(identity, -(size as i64))?;
        info!("Committed {} byte decrease for account {}", size, identity);
        Ok(())
    }

    /// Record a confirmed removal of `size` bytes
    pub fn commit_increase(&self, identity: &str, size: u64) -> Result<()> {
        self.store.adjust_capacity(identity, size as i64)?;
        info!("Committed {} byte increase for account {}", size, identity);
        Ok(())
    }
}
