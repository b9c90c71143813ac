//! CLI-level error type: wraps the engine's [`ObfuscateError`] and adds the
//! failure modes that belong to the driver (argument parsing, config file
//! loading, I/O setup) rather than to obfuscation itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Engine(#[from] pg_stage_core::ObfuscateError),
}

impl CliError {
    /// Maps an error kind to a process exit code, per the error kinds
    /// enumerated for the driver surface.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => 2,
            CliError::Io(_) => 3,
            CliError::Toml(_) => 2,
            CliError::Engine(_) => 1,
        }
    }
}
