//! Disposable mailbox relay client
//!
//! The relay serves HTML pages; every value this module needs is carved
//! out of third-party markup with fixed-width windows. Each extraction
//! treats the page as untrusted input and returns `ExtractionFailed`
//! instead of slicing out of range.

use async_trait::async_trait;
use log::debug;

use crate::config::ProvisioningConfig;
use crate::error::{NimbusError, Result};

/// Marker preceding the mailbox address on the relay front page
const MAILBOX_MARKER: &str = "class=\"mailtext\" value=\"";
/// Length of the mailbox address following the marker
const MAILBOX_LEN: usize = 18;

/// Marker preceding a message id in the inbox listing
const MESSAGE_ID_MARKER: &str = "readmail.html?mid=";
/// Length of a message id following the marker
const MESSAGE_ID_LEN: usize = 6;
/// Message id prefix of the relay's own greeting mail
const GREETING_ID: &str = "welcom";

/// Anchor inside the confirmation link
const CONFIRM_MARKER: &str = "#confirm";
/// Characters of the link preceding the anchor
const CONFIRM_PREFIX_LEN: usize = 16;
/// Characters of the link from the anchor onwards
const CONFIRM_SUFFIX_LEN: usize = 112;

/// Trait defining the mailbox relay interface
#[async_trait]
pub trait MailRelay: Send + Sync {
    /// Obtain a disposable mailbox identity, establishing the session
    async fn request_mailbox(&self) -> Result<String>;

    /// Fetch the current inbox listing for the session
    async fn inbox_snapshot(&self) -> Result<String>;

    /// Fetch the body of a message by id
    async fn message_body(&self, message_id: &str) -> Result<String>;
}

/// Mailbox address from the relay front page
pub fn extract_mailbox(page: &str) -> Result<String> {
    let start = page
        .find(MAILBOX_MARKER)
        .map(|i| i + MAILBOX_MARKER.len())
        .ok_or(NimbusError::ExtractionFailed("mailbox marker"))?;
    page.get(start..start + MAILBOX_LEN)
        .map(str::to_string)
        .ok_or(NimbusError::ExtractionFailed("mailbox address"))
}

/// Id of the newest message in the inbox listing. `Ok(None)` means the
/// listing only contains the relay's own greeting mail.
pub fn extract_message_id(page: &str) -> Result<Option<String>> {
    let start = page
        .find(MESSAGE_ID_MARKER)
        .map(|i| i + MESSAGE_ID_MARKER.len())
        .ok_or(NimbusError::ExtractionFailed("message id marker"))?;
    let id = page
        .get(start..start + MESSAGE_ID_LEN)
        .ok_or(NimbusError::ExtractionFailed("message id"))?;
    if id == GREETING_ID {
        return Ok(None);
    }
    Ok(Some(id.to_string()))
}

/// Confirmation link carved out of the verification message body: a
/// fixed window around the `#confirm` anchor.
pub fn extract_confirmation_link(body: &str) -> Result<String> {
    let anchor = body
        .find(CONFIRM_MARKER)
        .ok_or(NimbusError::ExtractionFailed("confirmation anchor"))?;
    let start = anchor
        .checked_sub(CONFIRM_PREFIX_LEN)
        .ok_or(NimbusError::ExtractionFailed("confirmation link prefix"))?;
    body.get(start..anchor + CONFIRM_SUFFIX_LEN)
        .map(str::to_string)
        .ok_or(NimbusError::ExtractionFailed("confirmation link"))
}

/// HTTP implementation of MailRelay with a cookie-bound session
pub struct HttpMailRelay {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMailRelay {
    pub fn new(config: &ProvisioningConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| NimbusError::ProvisioningFailed {
                step: "REQUEST_MAILBOX",
                reason: format!("relay client construction failed: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: config.relay_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, url: &str, step: &'static str) -> Result<String> {
        debug!("Fetching relay page: {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            NimbusError::ProvisioningFailed {
                step,
                reason: format!("relay request failed: {}", e),
            }
        })?;
        response
            .text()
            .await
            .map_err(|e| NimbusError::ProvisioningFailed {
                step,
                reason: format!("relay response unreadable: {}", e),
            })
    }
}

#[async_trait]
impl MailRelay for HttpMailRelay {
    async fn request_mailbox(&self) -> Result<String> {
        let page = self.fetch(&self.base_url, "REQUEST_MAILBOX").await?;
        extract_mailbox(&page)
    }

    async fn inbox_snapshot(&self) -> Result<String> {
        self.fetch(&self.base_url, "AWAIT_VERIFICATION_EMAIL").await
    }

    async fn message_body(&self, message_id: &str) -> Result<String> {
        let url = format!("{}/readmail.html?mid={}", self.base_url, message_id);
        self.fetch(&url, "EXTRACT_CONFIRMATION_LINK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_mailbox() {
        let page = format!(
            "<input id=\"fe_text\" class=\"mailtext\" value=\"{}\" readonly>",
            "box12345@mail.test"
        );
        assert_eq!(extract_mailbox(&page).unwrap(), "box12345@mail.test");

        assert!(extract_mailbox("<html>no marker here</html>").is_err());
        // Marker present but the page ends before the address does
        assert!(extract_mailbox("class=\"mailtext\" value=\"short").is_err());
    }

    #[test]
    fn test_extract_message_id() {
        let page = "<a href=\"readmail.html?mid=4f9a2c\">Mega registration</a>";
        assert_eq!(extract_message_id(page).unwrap(), Some("4f9a2c".to_string()));

        // Only the greeting mail present means no verification mail yet
        let page = "<a href=\"readmail.html?mid=welcome\">Hi!</a>";
        assert_eq!(extract_message_id(page).unwrap(), None);

        assert!(extract_message_id("<html></html>").is_err());
        assert!(extract_message_id("readmail.html?mid=ab").is_err());
    }

    #[test]
    fn test_extract_confirmation_link() {
        // 16 chars before the anchor plus 104 after it form the link
        let code = "c".repeat(CONFIRM_SUFFIX_LEN - CONFIRM_MARKER.len());
        let link = format!("https://mega.nz/#confirm{}", code);
        let body = format!("<p>Click <a href=\"{}\">here</a></p>", link);
        assert_eq!(extract_confirmation_link(&body).unwrap(), link);

        assert!(extract_confirmation_link("no anchor").is_err());
        // Anchor too close to the start of the body
        assert!(extract_confirmation_link("x#confirm...").is_err());
        // Anchor too close to the end of the body
        let body = format!("https://mega.nz/{}tail", CONFIRM_MARKER);
        assert!(extract_confirmation_link(&body).is_err());
    }
}
