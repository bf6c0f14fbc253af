//! Error types for tileseq

use thiserror::Error;

/// Result type alias for tileseq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tileseq.
///
/// Out-of-range grid sizes, tempos and coordinates are never errors; they are
/// clamped or dropped where they enter the core.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio engine could not be opened or its stream failed
    #[error("Audio error: {0}")]
    Audio(String),

    /// Pattern assistant returned nothing usable or could not be reached
    #[error("Assistant error: {0}")]
    Assist(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
