//! Account Provisioning Workflow
//!
//! A linear workflow that creates a new remote account end-to-end:
//! REQUEST_MAILBOX -> REGISTER_ACCOUNT -> AWAIT_VERIFICATION_EMAIL ->
//! EXTRACT_CONFIRMATION_LINK -> VERIFY_ACCOUNT -> PERSIST_ACCOUNT.
//! Nothing is persisted between steps; any failure aborts the run
//! without leaving a partial account behind.

pub mod mail_relay;
pub mod mock_relay;

use log::info;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProvisioningConfig;
use crate::error::{NimbusError, Result};
use crate::metadata::{Account, MetadataStore};
use crate::provision::mail_relay::MailRelay;
use crate::remote::RemoteExecutor;

/// Starting allocation for every provisioned account (50 GiB)
pub const INITIAL_FREE_CAPACITY: i64 = 53_687_091_200;

/// Generated passwords are this many printable characters
const PASSWORD_LEN: usize = 13;

fn step_failure(step: &'static str, e: NimbusError) -> NimbusError {
    match e {
        NimbusError::ProvisioningFailed { .. } => e,
        other => NimbusError::ProvisioningFailed {
            step,
            reason: other.to_string(),
        },
    }
}

fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    (0..PASSWORD_LEN)
        .map(|_| rng.gen_range(33u8..122) as char)
        .collect()
}

/// Drives the provisioning workflow against the mail relay and the
/// remote executor, persisting the account only after verification.
pub struct Provisioner {
    relay: Arc<dyn MailRelay>,
    executor: Arc<dyn RemoteExecutor>,
    store: Arc<dyn MetadataStore>,
    display_name: String,
    poll_delay: Duration,
}

impl Provisioner {
    pub fn new(
        relay: Arc<dyn MailRelay>,
        executor: Arc<dyn RemoteExecutor>,
        store: Arc<dyn MetadataStore>,
        config: &ProvisioningConfig,
    ) -> Self {
        Self {
            relay,
            executor,
            store,
            display_name: config.display_name.clone(),
            poll_delay: Duration::from_secs(config.poll_delay_secs),
        }
    }

    /// Run the whole workflow once. Blocks its task for the mailbox
    /// polling delays; callers run it on a background task.
    pub async fn provision_account(&self) -> Result<Account> {
        info!("Provisioning a new account");

        let mailbox = self
            .relay
            .request_mailbox()
            .await
            .map_err(|e| step_failure("REQUEST_MAILBOX", e))?;
        info!("Obtained disposable mailbox {}", mailbox);

        let password = generate_password();
        let verify_code = self
            .executor
            .register(&mailbox, &password, &self.display_name)
            .await
            .map_err(|e| step_failure("REGISTER_ACCOUNT", e))?;

        let message_id = self.await_verification_message().await?;
        let body = self
            .relay
            .message_body(&message_id)
            .await
            .map_err(|e| step_failure("EXTRACT_CONFIRMATION_LINK", e))?;
        let confirmation_link = mail_relay::extract_confirmation_link(&body)
            .map_err(|e| step_failure("EXTRACT_CONFIRMATION_LINK", e))?;

        self.executor
            .verify(&verify_code, &confirmation_link)
            .await
            .map_err(|e| step_failure("VERIFY_ACCOUNT", e))?;

        let account = Account {
            identity: mailbox,
            secret: password,
            free_capacity: INITIAL_FREE_CAPACITY,
        };
        self.store
            .insert_account(&account)
            .map_err(|e| step_failure("PERSIST_ACCOUNT", e))?;
        info!(
            "Provisioned account {} with {} bytes",
            account.identity, account.free_capacity
        );
        Ok(account)
    }

    /// Poll the mailbox for the verification mail: one fixed wait, and
    /// a second one chained if the first snapshot only shows the
    /// relay's greeting.
    async fn await_verification_message(&self) -> Result<String> {
        info!(
            "Waiting {}s for the verification email",
            self.poll_delay.as_secs()
        );
        tokio::time::sleep(self.poll_delay).await;
        let page = self
            .relay
            .inbox_snapshot()
            .await
            .map_err(|e| step_failure("AWAIT_VERIFICATION_EMAIL", e))?;
        if let Some(id) = mail_relay::extract_message_id(&page)
            .map_err(|e| step_failure("AWAIT_VERIFICATION_EMAIL", e))?
        {
            return Ok(id);
        }

        info!(
            "Verification email hasn't arrived, waiting {}s longer",
            self.poll_delay.as_secs()
        );
        tokio::time::sleep(self.poll_delay).await;
        let page = self
            .relay
            .inbox_snapshot()
            .await
            .map_err(|e| step_failure("AWAIT_VERIFICATION_EMAIL", e))?;
        mail_relay::extract_message_id(&page)
            .map_err(|e| step_failure("AWAIT_VERIFICATION_EMAIL", e))?
            .ok_or(NimbusError::ProvisioningFailed {
                step: "AWAIT_VERIFICATION_EMAIL",
                reason: "verification email never arrived".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::provision::mock_relay::MockMailRelay;
    use crate::remote::mock_executor::MockRemoteExecutor;

    fn quick_config() -> ProvisioningConfig {
        let mut config = AppConfig::default().provisioning;
        config.poll_delay_secs = 0;
        config
    }

    fn provisioner(
        relay: Arc<MockMailRelay>,
        executor: Arc<MockRemoteExecutor>,
        store: Arc<MockMetadataStore>,
    ) -> Provisioner {
        Provisioner::new(relay, executor, store, &quick_config())
    }

    #[test]
    fn test_generated_password_shape() {
        let pw = generate_password();
        assert_eq!(pw.len(), PASSWORD_LEN);
        assert!(pw.bytes().all(|b| (33u8..122).contains(&b)));
        // Vanishingly unlikely to collide
        assert_ne!(generate_password(), generate_password());
    }

    #[tokio::test]
    async fn test_provision_happy_path() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::inbox_page("4f9a2c"));
        relay.set_message("4f9a2c", &MockMailRelay::confirmation_body());
        let executor = Arc::new(MockRemoteExecutor::new());
        let store = Arc::new(MockMetadataStore::new());

        let account = provisioner(relay, executor.clone(), store.clone())
            .provision_account()
            .await
            .unwrap();

        assert_eq!(account.identity, "box12345@mail.test");
        assert_eq!(account.secret.len(), PASSWORD_LEN);
        assert_eq!(account.free_capacity, INITIAL_FREE_CAPACITY);
        assert_eq!(store.account_count(), 1);
        assert_eq!(executor.register_count(), 1);
        assert_eq!(executor.verification_count(), 1);
    }

    #[tokio::test]
    async fn test_provision_waits_out_the_greeting_mail() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::greeting_page());
        relay.push_snapshot(&MockMailRelay::inbox_page("4f9a2c"));
        relay.set_message("4f9a2c", &MockMailRelay::confirmation_body());
        let executor = Arc::new(MockRemoteExecutor::new());
        let store = Arc::new(MockMetadataStore::new());

        let account = provisioner(relay, executor, store.clone())
            .provision_account()
            .await
            .unwrap();
        assert_eq!(store.account_count(), 1);
        assert_eq!(account.free_capacity, INITIAL_FREE_CAPACITY);
    }

    #[tokio::test]
    async fn test_provision_email_never_arrives() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::greeting_page());
        let executor = Arc::new(MockRemoteExecutor::new());
        let store = Arc::new(MockMetadataStore::new());

        let err = provisioner(relay, executor, store.clone())
            .provision_account()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NimbusError::ProvisioningFailed {
                step: "AWAIT_VERIFICATION_EMAIL",
                ..
            }
        ));
        // No partial account may be left behind
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_provision_register_failure_aborts_early() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        let executor = Arc::new(MockRemoteExecutor::new());
        executor.set_fail_register(true);
        let store = Arc::new(MockMetadataStore::new());

        let err = provisioner(relay, executor.clone(), store.clone())
            .provision_account()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NimbusError::ProvisioningFailed {
                step: "REGISTER_ACCOUNT",
                ..
            }
        ));
        assert_eq!(store.account_count(), 0);
        assert_eq!(executor.verification_count(), 0);
    }

    #[tokio::test]
    async fn test_provision_verify_failure_leaves_no_account() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::inbox_page("4f9a2c"));
        relay.set_message("4f9a2c", &MockMailRelay::confirmation_body());
        let executor = Arc::new(MockRemoteExecutor::new());
        executor.set_fail_verify(true);
        let store = Arc::new(MockMetadataStore::new());

        let err = provisioner(relay, executor, store.clone())
            .provision_account()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NimbusError::ProvisioningFailed {
                step: "VERIFY_ACCOUNT",
                ..
            }
        ));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_provision_malformed_message_body() {
        let relay = Arc::new(MockMailRelay::new("box12345@mail.test"));
        relay.push_snapshot(&MockMailRelay::inbox_page("4f9a2c"));
        relay.set_message("4f9a2c", "<p>nothing useful in here</p>");
        let executor = Arc::new(MockRemoteExecutor::new());
        let store = Arc::new(MockMetadataStore::new());

        let err = provisioner(relay, executor, store.clone())
            .provision_account()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NimbusError::ProvisioningFailed {
                step: "EXTRACT_CONFIRMATION_LINK",
                ..
            }
        ));
        assert_eq!(store.account_count(), 0);
    }
}
