//! Command implementations for the tessera CLI.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::codec::CodecConfig;
use crate::conformance::{ConformanceConfig, ConformanceRunner, check_fixed_postings};
use crate::error::Result;
use crate::storage::file::FileStorageConfig;
use crate::storage::memory::MemoryStorageConfig;
use crate::storage::{Storage, StorageConfig, StorageFactory};

/// Execute a CLI command.
pub fn execute_command(args: TesseraArgs) -> Result<()> {
    match &args.command {
        Command::Verify(verify_args) => verify(verify_args, &args),
        Command::Config => show_config(&args),
    }
}

/// Run the conformance checks of every selected codec.
fn verify(args: &VerifyArgs, cli_args: &TesseraArgs) -> Result<()> {
    let base = load_config(args)?;
    let codecs = match args.codec {
        Some(name) => vec![codec_for(name, &base)?],
        None => CodecConfig::all(),
    };
    debug!("Checking {} codec(s)", codecs.len());

    let start = Instant::now();
    let mut outcome = VerifyOutcome::default();
    for codec in codecs {
        let config = ConformanceConfig {
            codec,
            ..base.clone()
        };
        let name = config.codec.name();

        let storage = open_storage(args.storage_dir.as_deref(), name)?;
        outcome
            .fixed
            .push(check_fixed_postings(&config.codec, storage.clone())?);

        info!("Running randomized checks of the {name} codec");
        let runner = ConformanceRunner::new(config, storage)?;
        outcome.runs.push(runner.run()?);
    }
    outcome.duration_ms = start.elapsed().as_millis() as u64;

    output_result("All conformance checks passed", &outcome, cli_args)
}

/// Print the default configuration.
fn show_config(cli_args: &TesseraArgs) -> Result<()> {
    let config = ConformanceConfig::default();
    match cli_args.output_format {
        OutputFormat::Human => println!("{}", config.to_json()?),
        OutputFormat::Json => output_result("Default configuration", &config, cli_args)?,
    }
    Ok(())
}

/// Merge the configuration file, if any, with command line overrides.
fn load_config(args: &VerifyArgs) -> Result<ConformanceConfig> {
    let mut config = match &args.config {
        Some(path) => {
            debug!("Loading configuration from: {}", path.display());
            ConformanceConfig::from_json_file(path)?
        }
        None => ConformanceConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(iterations) = args.iterations {
        config.verify.iterations = iterations;
    }
    if let Some(threads) = args.threads {
        config.verify.threads = threads;
    }
    if args.fixed_codec {
        config.randomize_codec = false;
    }

    config.validate()?;
    Ok(config)
}

/// The configured codec when it matches `name`, otherwise `name`'s defaults.
fn codec_for(name: CodecName, base: &ConformanceConfig) -> Result<CodecConfig> {
    if base.codec.name() == name.as_str() {
        Ok(base.codec.clone())
    } else {
        CodecConfig::from_name(name.as_str())
    }
}

/// Storage for one codec's segments: a subdirectory of `dir`, or memory.
fn open_storage(dir: Option<&Path>, codec: &str) -> Result<Arc<dyn Storage>> {
    let config = match dir {
        Some(dir) => StorageConfig::File(FileStorageConfig::new(dir.join(codec))),
        None => StorageConfig::Memory(MemoryStorageConfig::default()),
    };
    StorageFactory::create(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse_verify(argv: &[&str]) -> VerifyArgs {
        let args = TesseraArgs::try_parse_from(argv).unwrap();
        match args.command {
            Command::Verify(verify_args) => verify_args,
            other => panic!("Expected Verify command, got {other:?}"),
        }
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let args = parse_verify(&[
            "tessera",
            "verify",
            "--seed",
            "3",
            "--threads",
            "1",
            "--fixed-codec",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.verify.threads, 1);
        assert!(!config.randomize_codec);
    }

    #[test]
    fn test_load_config_rejects_zero_threads() {
        let args = parse_verify(&["tessera", "verify", "--threads", "0"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_codec_for_keeps_configured_tuning() {
        let mut base = ConformanceConfig::default();
        base.codec = CodecConfig::Block(crate::codec::BlockCodecConfig {
            term_index_interval: 5,
            skip_interval: 3,
        });

        assert_eq!(codec_for(CodecName::Block, &base).unwrap(), base.codec);
        assert_eq!(codec_for(CodecName::Simple, &base).unwrap().name(), "simple");
    }

    #[test]
    fn test_open_storage_in_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = open_storage(Some(dir.path()), "block").unwrap();
        assert!(storage.list_files().unwrap().is_empty());
        assert!(dir.path().join("block").is_dir());
    }
}
