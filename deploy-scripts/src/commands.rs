//! Implementations of the deploy script commands

use std::{path::Path, time::Duration};

use tracing::info;

use crate::{
    artifacts::ArtifactStore,
    cli::{DeployArgs, PlanArgs},
    client::AlloyClient,
    config::{self, environment, load_build_config, read_secrets_file},
    deployer::{self, Deployer, DeployerConfig, DeploymentResult, PlannedStep},
    errors::ScriptError,
    manifest::Manifest,
    report::{print_report, render_plan},
};

/// Deploy the targets of a manifest and print the results
pub async fn deploy(
    args: DeployArgs,
    secrets_file: &Path,
) -> Result<Vec<DeploymentResult>, ScriptError> {
    let env = environment(read_secrets_file(secrets_file)?);
    let (build, network) = config::load(&env, &args.network)?;
    let manifest = Manifest::read(&args.manifest)?;
    info!(
        network = %network.name,
        host = network.rpc_endpoint.host_str().unwrap_or_default(),
        compiler = %build.compiler_version,
        targets = manifest.targets().len(),
        "loaded configuration"
    );

    let defaults = DeployerConfig::default();
    let config = DeployerConfig {
        failure_policy: args.on_failure,
        confirmations: args.confirmations.unwrap_or(defaults.confirmations),
        confirmation_timeout: args
            .confirmation_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.confirmation_timeout),
        deployments_path: Some(args.deployments_path),
        expected_chain_id: network.expected_chain_id,
        ..defaults
    };

    let client = AlloyClient::connect(&network).await?;
    let deployer =
        Deployer::new(client, build, ArtifactStore::new(args.artifacts)).with_config(config);
    let results = deployer.deploy(manifest.targets()).await?;

    print_report(&results);
    Ok(results)
}

/// Validate a manifest against its artifacts and print the plan, returning
/// whether every target is deployable
pub fn plan(args: PlanArgs, secrets_file: &Path) -> Result<bool, ScriptError> {
    let env = environment(read_secrets_file(secrets_file)?);
    let build = load_build_config(&env)?;
    let manifest = Manifest::read(&args.manifest)?;

    let plan = deployer::plan(manifest.targets(), &ArtifactStore::new(args.artifacts), &build);
    println!("{}", render_plan(&plan));

    Ok(plan
        .iter()
        .all(|planned| !matches!(planned.step, PlannedStep::Invalid(_))))
}
