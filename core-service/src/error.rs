use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] core_auth::AuthError),

    #[error("Box error: {0}")]
    Box(#[from] provider_box::BoxError),
}

impl CoreError {
    /// Whether the UI should send the user back through consent.
    pub fn requires_consent(&self) -> bool {
        match self {
            CoreError::Auth(e) => e.requires_consent(),
            CoreError::Box(e) => e.requires_consent(),
            _ => false,
        }
    }
}

impl From<core_runtime::Error> for CoreError {
    fn from(error: core_runtime::Error) -> Self {
        match error {
            core_runtime::Error::Config(msg) => CoreError::Config(msg),
            core_runtime::Error::CapabilityMissing {
                capability,
                message,
            } => CoreError::CapabilityMissing {
                capability,
                message,
            },
            core_runtime::Error::Internal(msg) => CoreError::InitializationFailed(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
