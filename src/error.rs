use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    /// The feature-detection capability itself is missing. Fatal for a scan.
    #[error("feature detection unavailable: {0}")]
    CapabilityUnavailable(String),
    /// Registration failed for these particular images. The scan continues
    /// on the unregistered pair.
    #[error("registration failed: {0}")]
    Registration(String),
    #[error("scan worker failed: {0}")]
    Internal(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

impl InspectError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, InspectError::CapabilityUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;
