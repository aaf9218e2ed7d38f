mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::checksum::ChecksumArgs;
use commands::fetch::FetchArgs;
use commands::list::ListArgs;
use commands::verify::VerifyArgs;
use config::MirdConfig;
use mird_fetch::AcquireError;
use output::{Output, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "mird")]
#[command(about = "Fetch, verify and unpack remote dataset files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Increase log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Use this configuration file instead of searching for mird.toml
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download, verify and extract the assets of a manifest
    Fetch(FetchArgs),

    /// Check files on disk against a manifest without downloading
    Verify(VerifyArgs),

    /// Show the assets a manifest declares
    List(ListArgs),

    /// Print MD5 checksums of local files
    Checksum(ChecksumArgs),
}

fn run(args: Args, output: &Output) -> Result<i32> {
    let config = MirdConfig::resolve(args.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match args.command {
        Commands::Fetch(fetch_args) => rt.block_on(commands::fetch::execute(fetch_args, &config, output)),
        Commands::Verify(verify_args) => rt.block_on(commands::verify::execute(verify_args, &config, output)),
        Commands::List(list_args) => commands::list::execute(list_args, output),
        Commands::Checksum(checksum_args) => rt.block_on(commands::checksum::execute(checksum_args, output)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(verbosity.log_filter()))
        .format_timestamp(None)
        .init();

    let output = Output::new(verbosity);

    match run(args, &output) {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            output.error(&e.to_string());
            for cause in e.chain().skip(1) {
                output.hint(&format!("Caused by: {}", cause));
            }
            if let Some(hint) = e.chain().find_map(|c| c.downcast_ref::<AcquireError>()).and_then(|e| e.remediation()) {
                output.hint(&hint);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_fetch() {
        let args = Args::try_parse_from([
            "mird", "fetch", "remotes.toml", "-o", "/tmp/data", "--select", "audio", "-s", "annotations",
            "--cleanup", "-j", "3",
        ])
        .unwrap();

        match args.command {
            Commands::Fetch(fetch) => {
                assert_eq!(fetch.manifest, PathBuf::from("remotes.toml"));
                assert_eq!(fetch.output, Some(PathBuf::from("/tmp/data")));
                assert_eq!(fetch.select, vec!["audio", "annotations"]);
                assert!(fetch.cleanup);
                assert!(!fetch.force);
                assert_eq!(fetch.jobs, Some(3));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from(["mird", "verify", "remotes.json", "-vv", "--config", "alt.toml"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(args.command, Commands::Verify(_)));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Args::try_parse_from(["mird", "-q", "-v", "list", "remotes.toml"]).is_err());
    }

    #[test]
    fn test_checksum_requires_files() {
        assert!(Args::try_parse_from(["mird", "checksum"]).is_err());
        let args = Args::try_parse_from(["mird", "checksum", "a.wav", "b.wav"]).unwrap();
        match args.command {
            Commands::Checksum(checksum) => assert_eq!(checksum.files.len(), 2),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
