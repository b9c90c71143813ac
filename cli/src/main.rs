//! `pg_stage` - streaming obfuscation for PostgreSQL logical dumps.
//!
//! Reads a `pg_dump` output from stdin (or a file), rewrites it according to
//! the `anon:` directives embedded in the dump's own comments, and writes
//! the result to stdout (or a file). Dispatches between the plain-text line
//! rewriter and the binary custom-archive codec depending on `--mode` and,
//! in `auto` mode, on whether the input starts with the `PGDMP` magic.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use regex::Regex;

use pg_stage_cli::config::{CliOverrides, EffectiveConfig, FileConfig, ModeOverride};
use pg_stage_cli::error::CliError;
use pg_stage_cli::output;
use pg_stage_core::{looks_like_custom_format, LineObfuscator};

/// Obfuscate a PostgreSQL logical dump read from stdin, writing the
/// rewritten dump to stdout.
#[derive(Parser, Debug)]
#[command(name = "pg_stage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML config file (default search: pg_stage.toml, .pg_stage.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override input-format detection
    #[arg(long, value_enum, value_name = "MODE")]
    mode: Option<Mode>,

    /// Column delimiter for plain-text COPY bodies
    #[arg(long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Generator locale tag
    #[arg(long, value_name = "TAG")]
    locale: Option<String>,

    /// Additional table-name regex to delete wholesale (repeatable)
    #[arg(long = "delete-pattern", value_name = "REGEX")]
    delete_pattern: Vec<String>,

    /// Directory for temporary files used by the custom-archive codec
    #[arg(long, value_name = "PATH")]
    tmp_dir: Option<PathBuf>,

    /// Prefix for temporary file names
    #[arg(long, value_name = "STRING")]
    tmp_prefix: Option<String>,

    /// RNG seed for reproducible generator output
    #[arg(long, value_name = "U64")]
    seed: Option<u64>,

    /// Read input from this file instead of stdin
    #[arg(long, value_name = "PATH")]
    input: Option<PathBuf>,

    /// Write output to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Auto,
    Plain,
    Custom,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("{}", output::err_line(&err.to_string()));
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match verbose as i8 - quiet as i8 {
        i8::MIN..=-1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), CliError> {
    let file_config = FileConfig::load(cli.config.as_deref())?;
    let overrides = CliOverrides {
        mode: cli.mode.map(|m| {
            match m {
                Mode::Auto => "auto",
                Mode::Plain => "plain",
                Mode::Custom => "custom",
            }
            .to_string()
        }),
        delimiter: cli.delimiter,
        locale: cli.locale,
        delete_patterns: cli.delete_pattern,
        tmp_dir: cli.tmp_dir,
        tmp_prefix: cli.tmp_prefix,
        seed: cli.seed,
    };
    let config = EffectiveConfig::merge(file_config, overrides)?;

    let delete_patterns = compile_delete_patterns(&config.delete_patterns)?;

    std::fs::create_dir_all(&config.tmp_dir)?;
    let sweep_dir = config.tmp_dir.clone();
    let sweep_prefix = config.tmp_prefix.clone();
    let result = dispatch(&cli.input, &cli.output, &config, delete_patterns);
    sweep_temp_files(&sweep_dir, &sweep_prefix);
    result
}

fn compile_delete_patterns(patterns: &[String]) -> Result<Vec<Regex>, CliError> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| CliError::Config(format!("invalid delete-pattern {p:?}: {e}"))))
        .collect()
}

fn dispatch(
    input_path: &Option<PathBuf>,
    output_path: &Option<PathBuf>,
    config: &EffectiveConfig,
    delete_patterns: Vec<Regex>,
) -> Result<(), CliError> {
    let mut input: Box<dyn Read> = match input_path {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let mut output: Box<dyn Write> = match output_path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    let mut obfuscator = LineObfuscator::new(
        config.delimiter,
        config.seed,
        config.locale.clone(),
        delete_patterns,
    );

    let is_custom = match config.mode {
        ModeOverride::Custom => true,
        ModeOverride::Plain => false,
        ModeOverride::Auto => sniff_custom_format(&mut input)?,
    };

    if is_custom {
        pg_stage_core::custom::process_stream(
            &mut input,
            &mut output,
            &mut obfuscator,
            &config.tmp_dir,
            &config.tmp_prefix,
        )?;
    } else {
        run_plain(&mut input, &mut output, &mut obfuscator)?;
    }

    output.flush()?;
    Ok(())
}

/// Peeks the first five bytes of `input` for the `PGDMP` magic without
/// discarding them: the bytes already consumed are re-prepended ahead of
/// the rest of the stream via `Read::chain`.
fn sniff_custom_format(input: &mut Box<dyn Read>) -> Result<bool, CliError> {
    let mut prefix = [0u8; 5];
    let mut filled = 0usize;
    while filled < prefix.len() {
        let n = input.read(&mut prefix[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    let is_custom = looks_like_custom_format(&prefix[..filled]);
    let rest: Box<dyn Read> = std::mem::replace(input, Box::new(io::empty()));
    *input = Box::new(io::Cursor::new(prefix[..filled].to_vec()).chain(rest));
    Ok(is_custom)
}

fn run_plain(input: &mut dyn Read, output: &mut dyn Write, obfuscator: &mut LineObfuscator) -> Result<(), CliError> {
    let reader = BufReader::new(input);
    for line in reader.lines() {
        let line = line?;
        if let Some(rewritten) = obfuscator.parse_line(&line)? {
            writeln!(output, "{rewritten}")?;
        }
    }
    Ok(())
}

/// Belt-and-braces cleanup: the custom-archive codec removes its own temp
/// files as it goes, but a sweep of the configured prefix catches anything
/// left behind by an early termination.
fn sweep_temp_files(tmp_dir: &std::path::Path, prefix: &str) {
    let pattern = tmp_dir.join(format!("{prefix}*"));
    let Some(pattern) = pattern.to_str() else {
        return;
    };
    let Ok(paths) = glob::glob(pattern) else {
        return;
    };
    for entry in paths.flatten() {
        if let Err(err) = std::fs::remove_file(&entry) {
            tracing::warn!("failed to remove stray temp file {}: {err}", entry.display());
        }
    }
}
