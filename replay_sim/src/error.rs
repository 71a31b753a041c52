//! Error types for the simulation harness and CLI.

use replay_core::ScriptError;
use thiserror::Error;

/// Errors that can occur while loading scripts or writing exports.
#[derive(Debug, Error)]
pub enum SimError {
    /// The script failed validation or parsing
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Reading a script or writing an export failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export serialization failed
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
