//! # tdw CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tdw_cli::demo::{run_demo, DemoArgs};
use tdw_cli::load_config;
use tdw_cli::provision::{run_provision, ProvisionArgs};
use tdw_cli::resolve::{run_resolve, run_verify, ResolveArgs, VerifyArgs};
use tdw_cli::update::{run_update, UpdateArgs};

/// did:tdw toolchain
///
/// Provisions self-certifying DIDs, appends signed versions to their history
/// logs, and verifies and resolves those logs.
#[derive(Parser, Debug)]
#[command(name = "tdw", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a YAML method configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new DID with a key store and a signed genesis version.
    Provision(ProvisionArgs),

    /// Append a signed version to an existing DID.
    Update(UpdateArgs),

    /// Verify a history log and print its metadata.
    Verify(VerifyArgs),

    /// Resolve a history log at a version number or point in time.
    Resolve(ResolveArgs),

    /// Run the three-version walkthrough and write a DID configuration.
    Demo(DemoArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };
    tracing::debug!(method = %config.method_param(), "tdw CLI starting");

    let result = match &cli.command {
        Commands::Provision(args) => run_provision(args, &config),
        Commands::Update(args) => run_update(args, &config),
        Commands::Verify(args) => run_verify(args, &config),
        Commands::Resolve(args) => run_resolve(args, &config),
        Commands::Demo(args) => run_demo(args, &config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_provision() {
        let cli = Cli::try_parse_from([
            "tdw",
            "provision",
            "--auto",
            "--prerotation",
            "--length",
            "32",
            "--hash",
            "sha-384",
            "--pass-key",
            "secret",
            "example.com",
        ])
        .unwrap();
        if let Commands::Provision(args) = cli.command {
            assert!(args.auto);
            assert!(args.prerotation);
            assert_eq!(args.length, Some(32));
            assert_eq!(args.hash, Some(tdw_core::HashAlgorithm::Sha384));
            assert_eq!(args.did, "example.com");
            assert_eq!(args.base_dir, PathBuf::from("."));
        } else {
            panic!("expected provision");
        }
    }

    #[test]
    fn cli_parse_provision_rejects_unknown_hash() {
        let result = Cli::try_parse_from([
            "tdw", "provision", "--auto", "--hash", "md5", "--pass-key", "x", "example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parse_update_rotate() {
        let cli = Cli::try_parse_from([
            "tdw", "update", "--dir", "example.com:abc", "--rotate", "--pass-key", "x",
        ])
        .unwrap();
        if let Commands::Update(args) = cli.command {
            assert!(args.rotate);
            assert!(!args.deactivate);
            assert_eq!(args.dir, PathBuf::from("example.com:abc"));
        } else {
            panic!("expected update");
        }
    }

    #[test]
    fn cli_parse_deactivate_conflicts_with_rotate() {
        let result = Cli::try_parse_from([
            "tdw",
            "update",
            "--dir",
            "d",
            "--rotate",
            "--deactivate",
            "--pass-key",
            "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parse_verify() {
        let cli = Cli::try_parse_from(["tdw", "verify", "did.jsonl", "--no-proofs"]).unwrap();
        if let Commands::Verify(args) = cli.command {
            assert!(args.no_proofs);
            assert_eq!(args.history, PathBuf::from("did.jsonl"));
        } else {
            panic!("expected verify");
        }
    }

    #[test]
    fn cli_parse_resolve_at_time() {
        let cli = Cli::try_parse_from([
            "tdw",
            "resolve",
            "did.jsonl",
            "--version-time",
            "2024-06-01T12:00:00Z",
        ])
        .unwrap();
        if let Commands::Resolve(args) = cli.command {
            assert!(args.version_id.is_none());
            assert_eq!(
                args.version_time.map(|t| t.to_iso8601()),
                Some("2024-06-01T12:00:00Z".to_string())
            );
        } else {
            panic!("expected resolve");
        }
    }

    #[test]
    fn cli_parse_resolve_rejects_bad_time() {
        let result =
            Cli::try_parse_from(["tdw", "resolve", "did.jsonl", "--version-time", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_parse_demo_defaults() {
        let cli = Cli::try_parse_from(["tdw", "demo"]).unwrap();
        if let Commands::Demo(args) = cli.command {
            assert_eq!(args.domain, "domain.example");
        } else {
            panic!("expected demo");
        }
    }

    #[test]
    fn cli_parse_global_options() {
        let cli = Cli::try_parse_from([
            "tdw", "-vv", "--log-json", "--config", "tdw.yaml", "verify", "did.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.log_json);
        assert_eq!(cli.config, Some(PathBuf::from("tdw.yaml")));
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["tdw"]).is_err());
    }
}
