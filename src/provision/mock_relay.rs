//! Mock implementation of the MailRelay trait for testing

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{NimbusError, Result};
use crate::provision::mail_relay::MailRelay;

#[derive(Default)]
struct State {
    mailbox: String,
    // Snapshots served in order; the last one keeps being served
    snapshots: VecDeque<String>,
    bodies: HashMap<String, String>,
    fail_mailbox: bool,
}

/// Mock implementation of MailRelay for testing
pub struct MockMailRelay {
    state: Mutex<State>,
}

impl MockMailRelay {
    pub fn new(mailbox: &str) -> Self {
        let state = State {
            mailbox: mailbox.to_string(),
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Queue an inbox listing page. Pages are served in push order and
    /// the final page repeats for any further polls.
    pub fn push_snapshot(&self, page: &str) {
        self.state.lock().unwrap().snapshots.push_back(page.to_string());
    }

    /// Register a message body behind an id
    pub fn set_message(&self, message_id: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .bodies
            .insert(message_id.to_string(), body.to_string());
    }

    pub fn set_fail_mailbox(&self, fail: bool) {
        self.state.lock().unwrap().fail_mailbox = fail;
    }

    /// Inbox listing that contains only the relay's greeting mail
    pub fn greeting_page() -> String {
        "<a href=\"readmail.html?mid=welcome\">Hi! New mailbox ready</a>".to_string()
    }

    /// Inbox listing carrying a verification mail with `message_id`
    pub fn inbox_page(message_id: &str) -> String {
        format!(
            "<a href=\"readmail.html?mid={}\">Mega registration</a>",
            message_id
        )
    }

    /// Message body holding a well-formed confirmation link
    pub fn confirmation_body() -> String {
        let code = "c".repeat(104);
        format!("<p>Welcome! <a href=\"https://mega.nz/#confirm{}\">Confirm</a></p>", code)
    }
}

#[async_trait]
impl MailRelay for MockMailRelay {
    async fn request_mailbox(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        if state.fail_mailbox {
            return Err(NimbusError::ProvisioningFailed {
                step: "REQUEST_MAILBOX",
                reason: "scripted relay failure".to_string(),
            });
        }
        Ok(state.mailbox.clone())
    }

    async fn inbox_snapshot(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.snapshots.len() > 1 {
            return Ok(state.snapshots.pop_front().unwrap());
        }
        state
            .snapshots
            .front()
            .cloned()
            .ok_or(NimbusError::ProvisioningFailed {
                step: "AWAIT_VERIFICATION_EMAIL",
                reason: "no inbox snapshot scripted".to_string(),
            })
    }

    async fn message_body(&self, message_id: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .bodies
            .get(message_id)
            .cloned()
            .ok_or(NimbusError::ProvisioningFailed {
                step: "EXTRACT_CONFIRMATION_LINK",
                reason: format!("no message body for id {}", message_id),
            })
    }
}
