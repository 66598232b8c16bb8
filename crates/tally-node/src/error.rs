//! Node-level errors

use tally_core::TallyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration sources could not be read or merged
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scenario error: {0}")]
    Scenario(String),

    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    #[error("TOML decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),

    #[error(transparent)]
    Tally(#[from] TallyError),
}
