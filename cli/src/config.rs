//! Layered TOML configuration: CLI flags override the config file, which
//! overrides built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CliError;

const CONFIG_CANDIDATES: &[&str] = &["pg_stage.toml", ".pg_stage.toml"];

pub const DEFAULT_DELIMITER: char = '\t';
pub const DEFAULT_LOCALE: &str = "en_US";
pub const DEFAULT_TMP_PREFIX: &str = "pg_stage_";
pub const DEFAULT_SEED: u64 = 0;

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub mode: Option<String>,
    pub delimiter: Option<String>,
    pub locale: Option<String>,
    #[serde(default)]
    pub delete_patterns: Vec<String>,
    pub tmp_dir: Option<PathBuf>,
    pub tmp_prefix: Option<String>,
    pub seed: Option<u64>,
}

impl FileConfig {
    /// Loads `path` if given, otherwise searches the current directory for
    /// one of the default candidate file names. Returns an empty (all
    /// defaults) config if neither is found.
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::read(path);
        }

        for candidate in CONFIG_CANDIDATES {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                return Self::read(candidate);
            }
        }

        Ok(Self::default())
    }

    fn read(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(CliError::from)
    }
}

/// The fully resolved configuration a run obfuscates with, after merging
/// CLI flags over the config file over built-in defaults.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub mode: ModeOverride,
    pub delimiter: char,
    pub locale: String,
    pub delete_patterns: Vec<String>,
    pub tmp_dir: PathBuf,
    pub tmp_prefix: String,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeOverride {
    #[default]
    Auto,
    Plain,
    Custom,
}

impl ModeOverride {
    fn parse(raw: &str) -> Result<Self, CliError> {
        match raw {
            "auto" => Ok(ModeOverride::Auto),
            "plain" => Ok(ModeOverride::Plain),
            "custom" => Ok(ModeOverride::Custom),
            other => Err(CliError::Config(format!("invalid mode: {other}"))),
        }
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub mode: Option<String>,
    pub delimiter: Option<char>,
    pub locale: Option<String>,
    pub delete_patterns: Vec<String>,
    pub tmp_dir: Option<PathBuf>,
    pub tmp_prefix: Option<String>,
    pub seed: Option<u64>,
}

impl EffectiveConfig {
    pub fn merge(file: FileConfig, cli: CliOverrides) -> Result<Self, CliError> {
        let mode = match cli.mode.or(file.mode) {
            Some(raw) => ModeOverride::parse(&raw)?,
            None => ModeOverride::Auto,
        };

        let delimiter = match cli.delimiter {
            Some(d) => d,
            None => match file.delimiter {
                Some(s) => parse_delimiter(&s)?,
                None => DEFAULT_DELIMITER,
            },
        };

        let locale = cli
            .locale
            .or(file.locale)
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

        let mut delete_patterns = file.delete_patterns;
        delete_patterns.extend(cli.delete_patterns);

        let tmp_dir = cli
            .tmp_dir
            .or(file.tmp_dir)
            .unwrap_or_else(std::env::temp_dir);

        let tmp_prefix = cli
            .tmp_prefix
            .or(file.tmp_prefix)
            .unwrap_or_else(|| DEFAULT_TMP_PREFIX.to_string());

        let seed = cli.seed.or(file.seed).unwrap_or(DEFAULT_SEED);

        Ok(Self {
            mode,
            delimiter,
            locale,
            delete_patterns,
            tmp_dir,
            tmp_prefix,
            seed,
        })
    }
}

fn parse_delimiter(raw: &str) -> Result<char, CliError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(CliError::Config(format!(
            "delimiter must be a single character, got {raw:?}"
        ))),
    }
}
