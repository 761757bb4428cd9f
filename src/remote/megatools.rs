//! Subprocess adapter for the megatools remote storage executor
//!
//! Success and failure are derived from fixed marker substrings in the
//! last captured output line. The markers match the executor binary
//! byte-for-byte and must not be reworded.

use log::{debug, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use async_trait::async_trait;

use crate::config::RemoteConfig;
use crate::error::{NimbusError, Result};
use crate::metadata::Account;
use crate::remote::{remote_path_for, DownloadOutcome, RemoteExecutor, UploadOutcome};

const MARKER_REMOTE_EXISTS: &str = "File already exists";
const MARKER_UPLOAD_FAILED: &str = "Upload failed for";
const MARKER_LOCAL_EXISTS: &str = "Local file already exists";
const MARKER_REGISTERED: &str = "Account registered successfully!";
const MARKER_VERIFY: &str = "--verify ";

/// Length of the verification code following the `--verify ` marker
const VERIFY_CODE_LEN: usize = 61;

/// Captured result of one executor invocation
#[derive(Debug)]
struct ExecOutput {
    success: bool,
    last_line: String,
}

/// Megatools subprocess implementation of RemoteExecutor
pub struct MegatoolsExecutor {
    binary: String,
    timeout: Duration,
}

impl MegatoolsExecutor {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Run the executor once and capture its merged output. Process
    /// start failures, timeouts and signals all become
    /// `RemoteOperationFailed` here.
    async fn run(&self, args: &[String]) -> Result<ExecOutput> {
        debug!("Invoking {} {}", self.binary, args.first().map(String::as_str).unwrap_or(""));
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                NimbusError::RemoteOperationFailed(format!(
                    "process couldn't start: {}",
                    e
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                NimbusError::RemoteOperationFailed(format!(
                    "executor timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                NimbusError::RemoteOperationFailed(format!("executor failed: {}", e))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let last_line = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .last()
            .unwrap_or("")
            .to_string();

        Ok(ExecOutput {
            success: output.status.success(),
            last_line,
        })
    }
}

fn credentials_args(account: &Account) -> Vec<String> {
    vec![
        format!("--username={}", account.identity),
        format!("--password={}", account.secret),
    ]
}

fn parse_put_outcome(output: &ExecOutput, local_path: &Path) -> Result<UploadOutcome> {
    if output.last_line.contains(MARKER_REMOTE_EXISTS) {
        // The path is the last whitespace-separated token of the line
        let remote_path = output
            .last_line
            .rsplit(' ')
            .next()
            .unwrap_or("")
            .to_string();
        return Ok(UploadOutcome::AlreadyExists { remote_path });
    }
    if output.last_line.contains(MARKER_UPLOAD_FAILED) {
        return Err(NimbusError::RemoteOperationFailed(output.last_line.clone()));
    }
    if !output.success {
        return Err(NimbusError::RemoteOperationFailed(format!(
            "upload exited with failure: {}",
            output.last_line
        )));
    }
    Ok(UploadOutcome::Stored {
        remote_path: remote_path_for(local_path),
    })
}

fn parse_get_outcome(output: &ExecOutput) -> Result<DownloadOutcome> {
    if output.last_line.contains(MARKER_LOCAL_EXISTS) {
        return Ok(DownloadOutcome::LocalAlreadyExists);
    }
    if !output.success {
        return Err(NimbusError::RemoteOperationFailed(format!(
            "download exited with failure: {}",
            output.last_line
        )));
    }
    Ok(DownloadOutcome::Fetched)
}

fn parse_verify_code(output: &ExecOutput) -> Result<String> {
    if !output.last_line.contains("verify") {
        return Err(NimbusError::RemoteOperationFailed(format!(
            "no verify line in register output: {}",
            output.last_line
        )));
    }
    let start = output
        .last_line
        .rfind(MARKER_VERIFY)
        .map(|i| i + MARKER_VERIFY.len())
        .ok_or(NimbusError::ExtractionFailed("verify marker"))?;
    output
        .last_line
        .get(start..start + VERIFY_CODE_LEN)
        .map(str::to_string)
        .ok_or(NimbusError::ExtractionFailed("verify code"))
}

#[async_trait]
impl RemoteExecutor for MegatoolsExecutor {
    async fn put(&self, account: &Account, local_path: &Path) -> Result<UploadOutcome> {
        let mut args = vec!["put".to_string()];
        args.extend(credentials_args(account));
        args.push(local_path.to_string_lossy().to_string());
        let output = self.run(&args).await?;
        let outcome = parse_put_outcome(&output, local_path)?;
        if let UploadOutcome::AlreadyExists { remote_path } = &outcome {
            warn!("File already exists at remote path: {}", remote_path);
        }
        Ok(outcome)
    }

    async fn get(
        &self,
        account: &Account,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<DownloadOutcome> {
        let mut args = vec!["get".to_string()];
        args.extend(credentials_args(account));
        args.push(remote_path.to_string());
        args.push(format!("--path={}", local_path.to_string_lossy()));
        let output = self.run(&args).await?;
        parse_get_outcome(&output)
    }

    async fn remove(&self, account: &Account, remote_path: &str) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        args.extend(credentials_args(account));
        args.push(remote_path.to_string());
        let output = self.run(&args).await?;
        if !output.success {
            return Err(NimbusError::RemoteOperationFailed(format!(
                "remove exited with failure: {}",
                output.last_line
            )));
        }
        Ok(())
    }

    async fn register(
        &self,
        mailbox: &str,
        password: &str,
        display_name: &str,
    ) -> Result<String> {
        let args = vec![
            "reg".to_string(),
            "--scripted".to_string(),
            "--register".to_string(),
            format!("--name={}", display_name),
            format!("--email={}", mailbox),
            format!("--password={}", password),
        ];
        let output = self.run(&args).await?;
        parse_verify_code(&output)
    }

    async fn verify(&self, verify_code: &str, confirmation_link: &str) -> Result<()> {
        let args = vec![
            "reg".to_string(),
            "--verify".to_string(),
            verify_code.to_string(),
            confirmation_link.to_string(),
        ];
        let output = self.run(&args).await?;
        if !output.last_line.contains(MARKER_REGISTERED) {
            return Err(NimbusError::RemoteOperationFailed(format!(
                "account verification rejected: {}",
                output.last_line
            )));
        }
        Ok(())
    }
}
