//! Command-line driver for `pg_stage`: wires stdin/stdout, configuration
//! layering, and temp-file lifecycle around the `pg-stage-core` engine.

pub mod config;
pub mod error;
pub mod output;

pub use config::EffectiveConfig;
pub use error::CliError;
