//! Application Configuration
//!
//! This module provides configuration management for the application,
//! supporting YAML configuration files with sensible defaults.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Metadata backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MetadataBackend {
    SQLite,
    Mock,
}

impl Default for MetadataBackend {
    fn default() -> Self {
        MetadataBackend::SQLite
    }
}

/// Remote executor backend types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RemoteBackend {
    Megatools,
    Mock,
}

impl Default for RemoteBackend {
    fn default() -> Self {
        RemoteBackend::Megatools
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Local cache configuration
    pub cache: CacheConfig,
    /// Metadata configuration
    pub metadata: MetadataConfig,
    /// Remote executor configuration
    pub remote: RemoteConfig,
    /// Account provisioning configuration
    pub provisioning: ProvisioningConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Maximum payload size in bytes
    pub max_payload_size: u64,
}

/// Local cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the locally cached copies of files
    pub root: String,
}

/// Metadata backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Metadata backend type
    pub backend: MetadataBackend,
    /// Database file path
    pub db_path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
}

/// Remote executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Remote executor backend type
    pub backend: RemoteBackend,
    /// Name of the executor binary on PATH
    pub binary: String,
    /// Timeout for a single executor invocation, in seconds
    pub timeout_secs: u64,
}

/// Account provisioning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Base URL of the disposable mailbox relay
    pub relay_url: String,
    /// Display name used when registering new accounts
    pub display_name: String,
    /// Seconds to wait before polling the mailbox for the verification
    /// email. The workflow chains two waits of this length before it
    /// gives up on the message arriving.
    pub poll_delay_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Path to log configuration file
    pub config_file: String,
}

impl AppConfig {
    /// Load configuration from file, use defaults if not found
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from("config.yaml")
    }

    /// Load configuration from a specific path, use defaults if not found
    pub fn load_from(config_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if Path::new(config_path).exists() {
            let content = fs::read_to_string(config_path)?;
            let config: AppConfig = serde_yaml::from_str(&content)?;
            info!("Loaded configuration from {}", config_path);
            Ok(config)
        } else {
            warn!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Create default configuration
    pub fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9720,
                max_payload_size: 1073741824, // 1GB
            },
            cache: CacheConfig {
                root: "./data/cache".to_string(),
            },
            metadata: MetadataConfig {
                backend: MetadataBackend::SQLite,
                db_path: "./data/metadata.db".to_string(),
                wal_mode: true,
            },
            remote: RemoteConfig {
                backend: RemoteBackend::Megatools,
                binary: "megatools".to_string(),
                timeout_secs: 600,
            },
            provisioning: ProvisioningConfig {
                relay_url: "https://10minutemail.net/".to_string(),
                display_name: "test".to_string(),
                poll_delay_secs: 90,
            },
            logging: LoggingConfig {
                config_file: "server_log.yaml".to_string(),
            },
        }
    }
}
