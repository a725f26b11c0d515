use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    #[error("{0} integration is not supported yet")]
    Unsupported(Platform),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("invalid adapter configuration: {0}")]
    Config(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}
