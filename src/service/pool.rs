//! Account pool service
//!
//! Selects an account with enough free capacity for an upload, falling
//! back to provisioning a fresh account when the pool is exhausted. The
//! scan is first-fit in store order; no ranking by most-free.

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{NimbusError, Result};
use crate::metadata::{Account, MetadataStore};
use crate::provision::Provisioner;

/// The set of provisioned accounts plus the provisioning fallback
pub struct AccountPool {
    store: Arc<dyn MetadataStore>,
    provisioner: Arc<Provisioner>,
    // Single-flight guard: concurrent exhausted writers trigger one
    // provisioning run and rescan when it settles
    provisioning: Mutex<()>,
}

impl AccountPool {
    pub fn new(store: Arc<dyn MetadataStore>, provisioner: Arc<Provisioner>) -> Self {
        Self {
            store,
            provisioner,
            provisioning: Mutex::new(()),
        }
    }

    /// First account whose free capacity exceeds `required_size`. If
    /// none qualifies the provisioning workflow runs once on a
    /// background task and the scan repeats exactly once more.
    pub async fn select_account(&self, required_size: u64) -> Result<Account> {
        if let Some(account) = self.scan(required_size)? {
            return Ok(account);
        }

        let _guard = self.provisioning.lock().await;
        // Another caller may have provisioned while we waited
        if let Some(account) = self.scan(required_size)? {
            return Ok(account);
        }

        warn!(
            "No account has more than {} bytes free, provisioning a new one",
            required_size
        );
        let provisioner = self.provisioner.clone();
        let task = tokio::spawn(async move { provisioner.provision_account().await });
        match task.await {
            Ok(Ok(account)) => {
                info!("Provisioning added account {}", account.identity)
            }
            Ok(Err(e)) => warn!("Provisioning failed: {}", e),
            Err(e) => warn!("Provisioning task aborted: {}", e),
        }

        self.scan(required_size)?
            .ok_or(NimbusError::NoCapacityAvailable(required_size))
    }

    /// Credentials for an account identity
    pub fn credentials_of(&self, identity: &str) -> Result<String> {
        self.store
            .account(identity)?
            .map(|account| account.secret)
            .ok_or_else(|| NimbusError::UnknownAccount(identity.to_string()))
    }

    fn scan(&self, required_size: u64) -> Result<Option<Account>> {
        Ok(self
            .store
            .list_accounts()?
            .into_iter()
            .find(|account| account.free_capacity > required_size as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::provision::mock_relay::MockMailRelay;
    use crate::provision::INITIAL_FREE_CAPACITY;
    use crate::remote::mock_executor::MockRemoteExecutor;

    fn pool_with(
        store: Arc<MockMetadataStore>,
        relay: Arc<MockMailRelay>,
    ) -> AccountPool {
        let mut provisioning = AppConfig::default().provisioning;
        provisioning.poll_delay_secs = 0;
        let provisioner = Arc::new(Provisioner::new(
            relay,
            Arc::new(MockRemoteExecutor::new()),
            store.clone(),
            &provisioning,
        ));
        AccountPool::new(store, provisioner)
    }

    fn account(identity: &str, free: i64) -> Account {
        Account {
            identity: identity.to_string(),
            secret: "pw".to_string(),
            free_capacity: free,
        }
    }

    #[tokio::test]
    async fn test_select_account_first_fit() {
        let store = Arc::new(MockMetadataStore::new());
        store.insert_account(&account("a@relay.example", 5)).unwrap();
        store.insert_account(&account("b@relay.example", 100)).unwrap();
        let pool = pool_with(store, Arc::new(MockMailRelay::new("x@mail.test")));

        let selected = pool.select_account(10).await.unwrap();
        assert_eq!(selected.identity, "b@relay.example");
        let selected = pool.select_account(99).await.unwrap();
        assert_eq!(selected.identity, "b@relay.example");

        // Strict inequality: an account with exactly the required size
        // does not qualify, and the unscripted relay cannot provision
        let err = pool.select_account(100).await.unwrap_err();
        assert!(matches!(err, NimbusError::NoCapacityAvailable(100)));
    }

    #[tokio::test]
    async fn test_select_account_provisions_when_exhausted() {
        let store = Arc::new(MockMetadataStore::new());
        store.insert_account(&account("a@relay.example", 5)).unwrap();
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::inbox_page("4f9a2c"));
        relay.set_message("4f9a2c", &MockMailRelay::confirmation_body());
        let pool = pool_with(store.clone(), relay);

        let selected = pool.select_account(10).await.unwrap();
        assert_eq!(selected.identity, "box12345@mail.test");
        assert_eq!(selected.free_capacity, INITIAL_FREE_CAPACITY);
        assert_eq!(store.account_count(), 2);
    }

    #[tokio::test]
    async fn test_select_account_fails_when_provisioning_fails() {
        let store = Arc::new(MockMetadataStore::new());
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.set_fail_mailbox(true);
        let pool = pool_with(store.clone(), relay);

        let err = pool.select_account(10).await.unwrap_err();
        assert!(matches!(err, NimbusError::NoCapacityAvailable(10)));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_credentials_of() {
        let store = Arc::new(MockMetadataStore::new());
        store.insert_account(&account("a@relay.example", 5)).unwrap();
        let pool = pool_with(store, Arc::new(MockMailRelay::new("x@mail.test")));

        assert_eq!(pool.credentials_of("a@relay.example").unwrap(), "pw");
        assert!(matches!(
            pool.credentials_of("missing").unwrap_err(),
            NimbusError::UnknownAccount(_)
        ));
    }
}
