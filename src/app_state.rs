//! Application State Management
//!
//! This module provides the application state that contains the facade
//! and its dependencies, following the dependency injection pattern:
//! every backend is chosen from configuration and passed in explicitly,
//! with no ambient singletons.

use log::info;
use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, MetadataBackend, RemoteBackend};
use crate::error::Result;
use crate::metadata::mock_store::MockMetadataStore;
use crate::metadata::sqlite_store::SqliteMetadataStore;
use crate::metadata::{Account, MetadataStore};
use crate::provision::mail_relay::{HttpMailRelay, MailRelay};
use crate::provision::mock_relay::MockMailRelay;
use crate::provision::Provisioner;
use crate::remote::megatools::MegatoolsExecutor;
use crate::remote::mock_executor::MockRemoteExecutor;
use crate::remote::RemoteExecutor;
use crate::service::facade::CacheFacade;
use crate::service::pool::AccountPool;

/// Application state containing the facade and its dependencies
#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<CacheFacade>,
    pub config: AppConfig,
}

impl AppState {
    /// Create a new application state with services configured from the
    /// YAML config
    pub fn new() -> Self {
        let config = AppConfig::load().expect("Failed to load configuration");
        Self::from_config(config).expect("Failed to initialize application state")
    }

    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self> {
        info!("Initializing application state with configuration");

        let store: Arc<dyn MetadataStore> = match config.metadata.backend {
            MetadataBackend::SQLite => {
                info!(
                    "Using SQLite metadata backend with db_path: {}, wal_mode: {}",
                    config.metadata.db_path, config.metadata.wal_mode
                );
                Arc::new(SqliteMetadataStore::new(Some(&config.metadata))?)
            }
            MetadataBackend::Mock => {
                info!("Using mock metadata backend");
                Arc::new(MockMetadataStore::new())
            }
        };

        let executor: Arc<dyn RemoteExecutor> = match config.remote.backend {
            RemoteBackend::Megatools => {
                info!(
                    "Using megatools remote executor: {} (timeout {}s)",
                    config.remote.binary, config.remote.timeout_secs
                );
                Arc::new(MegatoolsExecutor::new(&config.remote))
            }
            RemoteBackend::Mock => {
                info!("Using mock remote executor");
                Arc::new(MockRemoteExecutor::new())
            }
        };

        let relay: Arc<dyn MailRelay> =
            Arc::new(HttpMailRelay::new(&config.provisioning)?);
        let provisioner = Arc::new(Provisioner::new(
            relay,
            executor.clone(),
            store.clone(),
            &config.provisioning,
        ));
        let pool = AccountPool::new(store.clone(), provisioner);
        let facade = Arc::new(CacheFacade::new(
            config.cache.root.clone().into(),
            store,
            executor,
            pool,
        )?);

        info!("Application state initialized successfully");
        Ok(Self { facade, config })
    }

    /// Create application state for testing with mock backends and one
    /// seeded roomy account
    pub fn new_for_testing(cache_root: &Path) -> Self {
        let mut config = AppConfig::default();
        config.cache.root = cache_root.to_string_lossy().to_string();
        config.metadata.backend = MetadataBackend::Mock;
        config.remote.backend = RemoteBackend::Mock;
        config.provisioning.poll_delay_secs = 0;

        let store: Arc<dyn MetadataStore> = Arc::new(MockMetadataStore::new());
        store
            .insert_account(&Account {
                identity: "test@relay.example".to_string(),
                secret: "pw".to_string(),
                free_capacity: 1 << 30,
            })
            .expect("Failed to seed test account");
        let executor: Arc<dyn RemoteExecutor> = Arc::new(MockRemoteExecutor::new());
        let relay: Arc<dyn MailRelay> =
            Arc::new(MockMailRelay::new("box12345@mail.test"));
        let provisioner = Arc::new(Provisioner::new(
            relay,
            executor.clone(),
            store.clone(),
            &config.provisioning,
        ));
        let pool = AccountPool::new(store.clone(), provisioner);
        let facade = Arc::new(
            CacheFacade::new(cache_root.to_path_buf(), store, executor, pool)
                .expect("Failed to create facade"),
        );

        Self { facade, config }
    }
}
