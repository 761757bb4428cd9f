//! Remote Executor Bridge Abstraction
//!
//! This module adapts upload, download, removal and registration
//! operations to the external remote storage executor. The executor is a
//! black box; every call returns a structured outcome, and any process
//! failure, timeout or unrecognized output converts to a typed error at
//! this boundary so no catalog or ledger mutation can follow it.

pub mod megatools;
pub mod mock_executor;

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::metadata::Account;

/// Outcome of uploading a local file to an account
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The bytes were transferred and now live at `remote_path`
    Stored { remote_path: String },
    /// The remote service already held a file at that path; nothing was
    /// transferred and nothing may be committed
    AlreadyExists { remote_path: String },
}

/// Outcome of downloading a remote file into the local cache
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// The bytes were fetched into the requested local path
    Fetched,
    /// A local file was already present; the executor left it alone
    LocalAlreadyExists,
}

/// Trait defining the remote executor interface
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Upload a local file under the account's credentials
    async fn put(&self, account: &Account, local_path: &Path) -> Result<UploadOutcome>;

    /// Download a remote file into `local_path`
    async fn get(
        &self,
        account: &Account,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<DownloadOutcome>;

    /// Remove a remote file
    async fn remove(&self, account: &Account, remote_path: &str) -> Result<()>;

    /// Register a new remote account; returns the verification code
    /// extracted from the executor output
    async fn register(
        &self,
        mailbox: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String>;

    /// Verify a freshly registered account
    async fn verify(&self, verify_code: &str, confirmation_link: &str) -> Result<()>;
}

/// Remote folder every uploaded file lands in
pub const REMOTE_ROOT: &str = "/Root";

/// Remote path a local file is uploaded to ("/Root/<basename>")
pub fn remote_path_for(local_path: &Path) -> String {
    let name = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    format!("{}/{}", REMOTE_ROOT, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_path_for() {
        assert_eq!(remote_path_for(Path::new("/tmp/cache/x.bin")), "/Root/x.bin");
        assert_eq!(remote_path_for(Path::new("plain")), "/Root/plain");
    }
}
