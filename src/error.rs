//! Error types shared across the storage virtualization layer
//!
//! Every external failure (remote executor, mail relay, metadata store)
//! is converted into one of these variants at the boundary where it
//! happens; catalog and ledger mutation only ever run after a confirmed
//! success result.

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NimbusError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No account has more than {0} bytes free and provisioning did not help")]
    NoCapacityAvailable(u64),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Provisioning failed during {step}: {reason}")]
    ProvisioningFailed { step: &'static str, reason: String },

    #[error("Extraction failed: {0}")]
    ExtractionFailed(&'static str),

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("Local IO failure: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("Metadata store error: {0}")]
    Metadata(String),
}

pub type Result<T> = std::result::Result<T, NimbusError>;

impl From<rusqlite::Error> for NimbusError {
    fn from(e: rusqlite::Error) -> Self {
        NimbusError::Metadata(e.to_string())
    }
}

impl actix_web::ResponseError for NimbusError {
    fn status_code(&self) -> StatusCode {
        match self {
            NimbusError::NotFound(_) => StatusCode::NOT_FOUND,
            NimbusError::NoCapacityAvailable(_) => StatusCode::INSUFFICIENT_STORAGE,
            NimbusError::RemoteOperationFailed(_)
            | NimbusError::ProvisioningFailed { .. }
            | NimbusError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
            NimbusError::UnknownAccount(_)
            | NimbusError::LocalIo(_)
            | NimbusError::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
