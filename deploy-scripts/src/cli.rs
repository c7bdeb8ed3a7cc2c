//! Definitions of CLI arguments and commands for deploy scripts

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::{
    commands::{deploy, plan},
    constants::{DEFAULT_ARTIFACTS_DIR, DEFAULT_DEPLOYMENTS_PATH, DEFAULT_SECRETS_FILE},
    deployer::FailurePolicy,
    errors::ScriptError,
    report::all_succeeded,
};

/// Deploy the contracts of a manifest to a network
#[derive(Parser)]
#[command(name = "deploy-scripts", version)]
pub struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// The dotenv-format file secrets are read from, if it exists.
    /// Variables set in the process environment take precedence.
    #[arg(long, global = true, default_value = DEFAULT_SECRETS_FILE)]
    pub secrets_file: PathBuf,

    /// The command to run
    #[command(subcommand)]
    pub command: Command,
}

/// The deploy script commands
#[derive(Subcommand)]
pub enum Command {
    /// Deploy the targets of a manifest, in order
    Deploy(DeployArgs),
    /// Validate a manifest against its artifacts without touching the network
    Plan(PlanArgs),
}

/// Deploy the targets of a manifest.
///
/// Each target is signed once and only that transaction is ever broadcast; a
/// target whose confirmation status is unknown is reported and never re-sent.
#[derive(Args)]
pub struct DeployArgs {
    /// The network to deploy to, selecting `RPC_ENDPOINT_<NETWORK>` and friends
    #[arg(short, long, env = "NETWORK")]
    pub network: String,

    /// Path to the deployment manifest
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// The directory compiled artifacts are read from
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Path to the file deployed addresses are recorded in
    #[arg(short, long, default_value = DEFAULT_DEPLOYMENTS_PATH)]
    pub deployments_path: PathBuf,

    /// What to do with the remaining targets once one fails
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub on_failure: FailurePolicy,

    /// The number of confirmations to wait for per deployment
    #[arg(long)]
    pub confirmations: Option<u64>,

    /// How long to wait for a deployment's receipt, in seconds
    #[arg(long)]
    pub confirmation_timeout_secs: Option<u64>,
}

/// Validate a manifest offline.
///
/// References to earlier targets are encoded with placeholder addresses.
#[derive(Args)]
pub struct PlanArgs {
    /// Path to the deployment manifest
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// The directory compiled artifacts are read from
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,
}

impl Command {
    /// Run the command, returning whether every target is deployable / deployed
    pub async fn run(self, secrets_file: PathBuf) -> Result<bool, ScriptError> {
        match self {
            Command::Deploy(args) => {
                deploy(args, &secrets_file).await.map(|results| all_succeeded(&results))
            },
            Command::Plan(args) => plan(args, &secrets_file),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy() {
        let cli = Cli::try_parse_from([
            "deploy-scripts",
            "-vv",
            "deploy",
            "--network",
            "sepolia",
            "--manifest",
            "manifest.json",
            "--on-failure",
            "continue",
            "--confirmations",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.secrets_file, PathBuf::from(DEFAULT_SECRETS_FILE));
        let Command::Deploy(args) = cli.command else {
            panic!("expected the deploy command");
        };
        assert_eq!(args.network, "sepolia");
        assert_eq!(args.on_failure, FailurePolicy::Continue);
        assert_eq!(args.confirmations, Some(3));
        assert_eq!(args.artifacts, PathBuf::from(DEFAULT_ARTIFACTS_DIR));
        assert_eq!(args.confirmation_timeout_secs, None);
    }

    #[test]
    fn test_invalid_failure_policy() {
        assert!(Cli::try_parse_from([
            "deploy-scripts",
            "deploy",
            "--network",
            "sepolia",
            "--manifest",
            "manifest.json",
            "--on-failure",
            "retry",
        ])
        .is_err());
    }
}
