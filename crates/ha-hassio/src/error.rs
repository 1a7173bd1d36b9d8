//! Error types for Supervisor discovery

use thiserror::Error;

pub type HassioResult<T> = Result<T, HassioError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HassioError {
    /// The Supervisor could not be reached or refused the request
    #[error("Supervisor unavailable: {0}")]
    SupervisorUnavailable(String),

    /// No add-on metadata for the announcing add-on
    #[error("No add-on info for {slug}: {reason}")]
    AddonInfoMissing { slug: String, reason: String },

    /// Removal requested for an announcement the Supervisor still has
    #[error("Supervisor still announces {service} service {uuid}")]
    SpuriousRemoval { service: String, uuid: String },

    /// Discovery payload could not be encoded for the flow
    #[error("Invalid discovery payload: {0}")]
    InvalidPayload(String),

    /// Discovery key of a shape this version does not understand
    #[error("Unsupported discovery key version {version}")]
    MalformedKey { version: u32 },
}

impl From<reqwest::Error> for HassioError {
    fn from(err: reqwest::Error) -> Self {
        HassioError::SupervisorUnavailable(err.to_string())
    }
}
