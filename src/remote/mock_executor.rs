//! Mock implementation of the RemoteExecutor trait for testing

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{NimbusError, Result};
use crate::metadata::Account;
use crate::remote::{remote_path_for, DownloadOutcome, RemoteExecutor, UploadOutcome};

#[derive(Default)]
struct State {
    // remote_path -> bytes held by the fake remote service
    remote_files: HashMap<String, Vec<u8>>,
    uploads: Vec<(String, String)>,
    downloads: Vec<(String, String)>,
    removals: Vec<String>,
    registrations: Vec<(String, String)>,
    verifications: Vec<(String, String)>,
    fail_puts: bool,
    fail_gets: bool,
    fail_removes: bool,
    fail_register: bool,
    fail_verify: bool,
    verify_code: String,
}

/// Mock implementation of RemoteExecutor for testing
pub struct MockRemoteExecutor {
    state: Mutex<State>,
}

impl MockRemoteExecutor {
    /// Create a new mock remote executor
    pub fn new() -> Self {
        let mut state = State::default();
        state.verify_code = "MOCK-VERIFY-CODE".to_string();
        Self {
            state: Mutex::new(state),
        }
    }

    /// Pre-seed remote content (as if uploaded in a previous run)
    pub fn seed_remote(&self, remote_path: &str, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state
            .remote_files
            .insert(remote_path.to_string(), data.to_vec());
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.state.lock().unwrap().fail_puts = fail;
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.state.lock().unwrap().fail_gets = fail;
    }

    pub fn set_fail_removes(&self, fail: bool) {
        self.state.lock().unwrap().fail_removes = fail;
    }

    pub fn set_fail_register(&self, fail: bool) {
        self.state.lock().unwrap().fail_register = fail;
    }

    pub fn set_fail_verify(&self, fail: bool) {
        self.state.lock().unwrap().fail_verify = fail;
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    pub fn get_count(&self) -> usize {
        self.state.lock().unwrap().downloads.len()
    }

    pub fn remove_count(&self) -> usize {
        self.state.lock().unwrap().removals.len()
    }

    pub fn register_count(&self) -> usize {
        self.state.lock().unwrap().registrations.len()
    }

    pub fn verification_count(&self) -> usize {
        self.state.lock().unwrap().verifications.len()
    }

    /// Whether the fake remote currently holds a path
    pub fn holds_remote(&self, remote_path: &str) -> bool {
        self.state.lock().unwrap().remote_files.contains_key(remote_path)
    }
}

impl Default for MockRemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for MockRemoteExecutor {
    async fn put(&self, account: &Account, local_path: &Path) -> Result<UploadOutcome> {
        let remote_path = remote_path_for(local_path);
        let data = std::fs::read(local_path)?;
        let mut state = self.state.lock().unwrap();
        if state.fail_puts {
            return Err(NimbusError::RemoteOperationFailed(
                "scripted put failure".to_string(),
            ));
        }
        if state.remote_files.contains_key(&remote_path) {
            return Ok(UploadOutcome::AlreadyExists { remote_path });
        }
        state.remote_files.insert(remote_path.clone(), data);
        state
            .uploads
            .push((account.identity.clone(), remote_path.clone()));
        Ok(UploadOutcome::Stored { remote_path })
    }

    async fn get(
        &self,
        account: &Account,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<DownloadOutcome> {
        let data = {
            let mut state = self.state.lock().unwrap();
            if state.fail_gets {
                return Err(NimbusError::RemoteOperationFailed(
                    "scripted get failure".to_string(),
                ));
            }
            if local_path.exists() {
                return Ok(DownloadOutcome::LocalAlreadyExists);
            }
            let data = state.remote_files.get(remote_path).cloned().ok_or_else(|| {
                NimbusError::RemoteOperationFailed(format!(
                    "no remote file at {}",
                    remote_path
                ))
            })?;
            state
                .downloads
                .push((account.identity.clone(), remote_path.to_string()));
            data
        };
        std::fs::write(local_path, data)?;
        Ok(DownloadOutcome::Fetched)
    }

    async fn remove(&self, account: &Account, remote_path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_removes {
            return Err(NimbusError::RemoteOperationFailed(
                "scripted remove failure".to_string(),
            ));
        }
        if state.remote_files.remove(remote_path).is_none() {
            return Err(NimbusError::RemoteOperationFailed(format!(
                "no remote file at {} for account {}",
                remote_path, account.identity
            )));
        }
        state.removals.push(remote_path.to_string());
        Ok(())
    }

    async fn register(
        &self,
        mailbox: &str,
        _password: &str,
        display_name: &str,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.fail_register {
            return Err(NimbusError::RemoteOperationFailed(
                "scripted register failure".to_string(),
            ));
        }
        state
            .registrations
            .push((mailbox.to_string(), display_name.to_string()));
        Ok(state.verify_code.clone())
    }

    async fn verify(&self, verify_code: &str, confirmation_link: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_verify {
            return Err(NimbusError::RemoteOperationFailed(
                "scripted verify failure".to_string(),
            ));
        }
        state
            .verifications
            .push((verify_code.to_string(), confirmation_link.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            identity: "a@relay.example".to_string(),
            secret: "pw".to_string(),
            free_capacity: 100,
        }
    }

    #[tokio::test]
    async fn test_mock_put_get_remove_roundtrip() {
        let executor = MockRemoteExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("x.bin");
        std::fs::write(&local, b"payload").unwrap();

        let outcome = executor.put(&account(), &local).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Stored {
                remote_path: "/Root/x.bin".to_string()
            }
        );
        assert!(executor.holds_remote("/Root/x.bin"));
        assert_eq!(executor.put_count(), 1);

        // Second put of the same name reports the existing remote copy
        let outcome = executor.put(&account(), &local).await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::AlreadyExists {
                remote_path: "/Root/x.bin".to_string()
            }
        );
        assert_eq!(executor.put_count(), 1);

        let fetched = dir.path().join("fetched.bin");
        let outcome = executor
            .get(&account(), "/Root/x.bin", &fetched)
            .await
            .unwrap();
        assert_eq!(outcome, DownloadOutcome::Fetched);
        assert_eq!(std::fs::read(&fetched).unwrap(), b"payload");

        let outcome = executor
            .get(&account(), "/Root/x.bin", &fetched)
            .await
            .unwrap();
        assert_eq!(outcome, DownloadOutcome::LocalAlreadyExists);
        assert_eq!(executor.get_count(), 1);

        executor.remove(&account(), "/Root/x.bin").await.unwrap();
        assert!(!executor.holds_remote("/Root/x.bin"));
        assert!(executor.remove(&account(), "/Root/x.bin").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_scripted_failures() {
        let executor = MockRemoteExecutor::new();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("x.bin");
        std::fs::write(&local, b"payload").unwrap();

        executor.set_fail_puts(true);
        assert!(executor.put(&account(), &local).await.is_err());
        assert_eq!(executor.put_count(), 0);

        executor.set_fail_register(true);
        assert!(executor.register("m@relay.example", "pw", "test").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_register_and_verify() {
        let executor = MockRemoteExecutor::new();
        let code = executor
            .register("m@relay.example", "pw", "test")
            .await
            .unwrap();
        assert_eq!(code, "MOCK-VERIFY-CODE");
        executor.verify(&code, "https://mega.example/#confirm1").await.unwrap();
        assert_eq!(executor.register_count(), 1);
        assert_eq!(executor.verification_count(), 1);
    }
}
