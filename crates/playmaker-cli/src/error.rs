use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] playmaker_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Change was rolled back: {0}")]
    RolledBack(playmaker_core::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "API is not configured. Run `playmaker config init --api-base-url <url>` or set PLAYMAKER_API_URL."
    )]
    ApiNotConfigured,
    #[error(
        "Push endpoint is not configured. Run `playmaker config init --push-url <url>` or set PLAYMAKER_PUSH_URL."
    )]
    PushNotConfigured,
}
