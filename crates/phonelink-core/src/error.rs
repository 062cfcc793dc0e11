//! Error type shared by the phonelink crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A settings file could not be read or does not describe a valid
    /// configuration. The message names the file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The built-in defaults could not be converted for merging.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
