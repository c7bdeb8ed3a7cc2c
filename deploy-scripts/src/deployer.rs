//! The deployment runner: deploys the targets of a manifest in order and
//! reports one result per target

use std::{
    collections::HashSet,
    fmt::{self, Display},
    path::PathBuf,
    time::Duration,
};

use alloy::primitives::{Address, Bytes, TxHash};
use backon::BackoffBuilder;
use clap::ValueEnum;
use tracing::{debug, error, info, warn};

use crate::{
    artifacts::{Artifact, ArtifactStore},
    calldata::{deployment_code, AddressBook},
    client::{DeployClient, DeploymentReceipt, GasEstimate, SignedDeployment},
    config::BuildConfig,
    constants::{
        DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_NUM_DEPLOY_CONFIRMATIONS,
        DEFAULT_RECEIPT_POLL_INTERVAL,
    },
    errors::{ClientError, ErrorKind, ScriptError},
    manifest::DeploymentTarget,
    report::write_deployed_address,
    retry::RetryConfig,
};

// ---------
// | Types |
// ---------

/// What to do with the remaining targets once one fails
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Skip every later target
    #[default]
    Abort,
    /// Attempt every later target that does not depend on a failed one
    Continue,
}

impl Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

/// The outcome of a single deployment target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The contract is deployed
    Success {
        /// The contract address
        address: Address,
        /// The creation transaction; absent when an existing deployment was reused
        tx_hash: Option<TxHash>,
    },
    /// The target was attempted and did not deploy
    Failure {
        /// The kind of failure
        kind: ErrorKind,
        /// A description of the failure
        message: String,
    },
    /// The target was not attempted because an earlier target failed
    Skipped,
}

/// The result of a single deployment target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentResult {
    /// The target
    pub target: DeploymentTarget,
    /// What happened to it
    pub outcome: Outcome,
}

impl DeploymentResult {
    /// The label of the target
    pub fn label(&self) -> &str {
        self.target.label()
    }

    /// Whether the target is deployed
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    /// The deployed address, if any
    pub fn address(&self) -> Option<Address> {
        match self.outcome {
            Outcome::Success { address, .. } => Some(address),
            _ => None,
        }
    }
}

/// Tunables of a deployment run
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    /// What to do with the remaining targets once one fails
    pub failure_policy: FailurePolicy,
    /// The number of confirmations to wait for
    pub confirmations: u64,
    /// How long to wait for a receipt before giving up
    pub confirmation_timeout: Duration,
    /// How often to poll for a receipt
    pub poll_interval: Duration,
    /// How transient RPC failures are retried
    pub retry: RetryConfig,
    /// Where deployed addresses are recorded, if anywhere
    pub deployments_path: Option<PathBuf>,
    /// The chain the endpoint must serve, if checked
    pub expected_chain_id: Option<u64>,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            confirmations: DEFAULT_NUM_DEPLOY_CONFIRMATIONS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            retry: RetryConfig::default(),
            deployments_path: None,
            expected_chain_id: None,
        }
    }
}

/// Why a single target failed
#[derive(Debug)]
struct TargetFailure {
    /// The kind of failure
    kind: ErrorKind,
    /// A description of the failure
    message: String,
}

impl TargetFailure {
    /// A failure of the given kind
    fn new(kind: ErrorKind, message: impl ToString) -> Self {
        Self { kind, message: message.to_string() }
    }

    /// A target that cannot be deployed as described
    fn invalid(message: impl ToString) -> Self {
        Self::new(ErrorKind::InvalidTarget, message)
    }
}

impl From<ClientError> for TargetFailure {
    fn from(err: ClientError) -> Self {
        Self::new(ErrorKind::from(&err), err)
    }
}

// ------------
// | Deployer |
// ------------

/// Deploys manifest targets through a [`DeployClient`]
pub struct Deployer<C> {
    /// The client deployments go through
    client: C,
    /// The build settings artifacts must match
    build: BuildConfig,
    /// Where artifacts are read from
    artifacts: ArtifactStore,
    /// The tunables of the run
    config: DeployerConfig,
}

impl<C: DeployClient> Deployer<C> {
    /// A deployer with the default tunables
    pub fn new(client: C, build: BuildConfig, artifacts: ArtifactStore) -> Self {
        Self {
            client,
            build,
            artifacts,
            config: DeployerConfig::default(),
        }
    }

    /// Replace the tunables of the run
    pub fn with_config(mut self, config: DeployerConfig) -> Self {
        self.config = config;
        self
    }

    /// The client deployments go through
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy the targets in order, returning one result per target in the same order.
    ///
    /// Errors are only returned for problems that affect the whole run; a failing
    /// target is reported in its result.
    pub async fn deploy(
        &self,
        targets: &[DeploymentTarget],
    ) -> Result<Vec<DeploymentResult>, ScriptError> {
        self.check_chain_id().await?;
        info!(
            sender = %self.client.sender(),
            targets = targets.len(),
            policy = %self.config.failure_policy,
            "starting deployment"
        );

        let mut addresses = AddressBook::new();
        let mut failed: HashSet<&str> = HashSet::new();
        let mut aborted = false;
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let label = target.label();
            let outcome = if aborted {
                warn!(label, "skipping target");
                Outcome::Skipped
            } else if let Some(dep) = target.references().into_iter().find(|r| failed.contains(r)) {
                Outcome::Failure {
                    kind: ErrorKind::DependencyFailed,
                    message: format!("depends on `{dep}`, which was not deployed"),
                }
            } else {
                match self.deploy_target(target, &addresses).await {
                    Ok((address, tx_hash)) => Outcome::Success { address, tx_hash },
                    Err(TargetFailure { kind, message }) => Outcome::Failure { kind, message },
                }
            };

            match &outcome {
                Outcome::Success { address, .. } => {
                    addresses.insert(label.to_string(), *address);
                    self.record_deployment(label, *address);
                },
                Outcome::Failure { kind, message } => {
                    error!(label, %kind, reason = %message, "deployment failed");
                    failed.insert(label);
                    aborted = self.config.failure_policy == FailurePolicy::Abort;
                },
                Outcome::Skipped => {
                    failed.insert(label);
                },
            }

            results.push(DeploymentResult {
                target: target.clone(),
                outcome,
            });
        }

        Ok(results)
    }

    /// Abort the run if the endpoint serves a different chain than configured
    async fn check_chain_id(&self) -> Result<(), ScriptError> {
        let Some(expected) = self.config.expected_chain_id else {
            return Ok(());
        };

        let actual = self
            .config
            .retry
            .retry("eth_chainId", || self.client.chain_id())
            .await?;
        if actual != expected {
            return Err(ScriptError::ChainIdMismatch { expected, actual });
        }

        Ok(())
    }

    /// Deploy a single target, returning its address and creation transaction
    async fn deploy_target(
        &self,
        target: &DeploymentTarget,
        addresses: &AddressBook,
    ) -> Result<(Address, Option<TxHash>), TargetFailure> {
        let label = target.label();

        if let Some(address) = target.address {
            return self.reuse_deployment(label, address).await.map(|address| (address, None));
        }

        let artifact = self.load_artifact(&target.contract)?;
        let code = deployment_code(&artifact, &target.args, addresses)
            .map_err(|e| TargetFailure::invalid(format!("constructor arguments: {e}")))?;

        info!(label, contract = %target.contract, "deploying");
        let retry = &self.config.retry;
        let nonce = retry.retry("eth_getTransactionCount", || self.client.nonce()).await?;
        let gas = retry
            .retry("eth_estimateGas", || self.client.estimate_deployment(&code))
            .await?;
        self.check_balance(&gas).await?;

        let signed = self.client.sign_deployment(&code, nonce, &gas).await?;
        debug!(label, tx_hash = %signed.tx_hash, nonce, gas_limit = gas.gas_limit, "signed creation transaction");

        self.submit(&signed).await?;
        info!(label, tx_hash = %signed.tx_hash, "creation transaction submitted");

        let receipt = self.wait_for_confirmation(&signed).await?;
        let address = receipt
            .contract_address
            .unwrap_or_else(|| self.client.sender().create(nonce));
        info!(
            label,
            %address,
            tx_hash = %signed.tx_hash,
            gas_used = receipt.gas_used,
            "deployed"
        );

        Ok((address, Some(signed.tx_hash)))
    }

    /// Verify a previously deployed contract has code
    async fn reuse_deployment(&self, label: &str, address: Address) -> Result<Address, TargetFailure> {
        let code_size = self
            .config
            .retry
            .retry("eth_getCode", || self.client.code_size(address))
            .await?;
        if code_size == 0 {
            return Err(TargetFailure::invalid(format!("no contract code at {address}")));
        }

        info!(label, %address, "reusing existing deployment");
        Ok(address)
    }

    /// Load the artifact of a contract and check it against the build settings
    fn load_artifact(&self, contract: &str) -> Result<Artifact, TargetFailure> {
        let artifact = self.artifacts.load(contract).map_err(TargetFailure::invalid)?;
        match &artifact.metadata {
            Some(metadata) => metadata
                .check(&artifact.contract, &self.build)
                .map_err(TargetFailure::invalid)?,
            None => debug!(contract, "artifact has no build metadata, skipping build check"),
        }

        Ok(artifact)
    }

    /// Check the deployer can pay for the creation transaction
    async fn check_balance(&self, gas: &GasEstimate) -> Result<(), TargetFailure> {
        let balance = self
            .config
            .retry
            .retry("eth_getBalance", || self.client.balance())
            .await?;
        let cost = gas.max_cost();
        if balance < cost {
            return Err(TargetFailure::new(
                ErrorKind::InsufficientFunds,
                format!("balance of {balance} wei does not cover up to {cost} wei of gas"),
            ));
        }

        Ok(())
    }

    /// Broadcast a signed transaction until the node acknowledges it.
    ///
    /// Retries always re-send the same signed bytes, and stop early if a receipt
    /// shows up in between.
    async fn submit(&self, signed: &SignedDeployment) -> Result<(), TargetFailure> {
        let mut backoff = self.config.retry.backoff().build();
        loop {
            let err = match self.client.broadcast(signed).await {
                Ok(_) => return Ok(()),
                Err(ClientError::AlreadyKnown(msg)) => {
                    debug!(tx_hash = %signed.tx_hash, reason = %msg, "node already has the transaction");
                    return Ok(());
                },
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err.into()),
            };

            let Some(delay) = backoff.next() else {
                return Err(TargetFailure::new(
                    ErrorKind::UnknownState,
                    format!(
                        "broadcast of {} was never acknowledged ({err}); check whether it was \
                         included before re-running",
                        signed.tx_hash
                    ),
                ));
            };

            warn!(tx_hash = %signed.tx_hash, error = %err, ?delay, "retrying broadcast");
            tokio::time::sleep(delay).await;

            if let Ok(Some(_)) = self.client.receipt(signed.tx_hash).await {
                debug!(tx_hash = %signed.tx_hash, "receipt found while retrying broadcast");
                return Ok(());
            }
        }
    }

    /// Wait for the receipt of a submitted transaction and its confirmations
    async fn wait_for_confirmation(
        &self,
        signed: &SignedDeployment,
    ) -> Result<DeploymentReceipt, TargetFailure> {
        let timeout = self.config.confirmation_timeout;
        tokio::time::timeout(timeout, self.poll_receipt(signed.tx_hash))
            .await
            .map_err(|_| {
                TargetFailure::new(
                    ErrorKind::Timeout,
                    format!(
                        "no confirmed receipt for {} after {}s; the transaction may still be \
                         included, check before re-running",
                        signed.tx_hash,
                        timeout.as_secs_f64()
                    ),
                )
            })?
    }

    /// Poll until the transaction has a receipt with enough confirmations
    async fn poll_receipt(&self, tx_hash: TxHash) -> Result<DeploymentReceipt, TargetFailure> {
        loop {
            match self.client.receipt(tx_hash).await {
                Ok(Some(receipt)) if !receipt.success => {
                    return Err(TargetFailure::new(
                        ErrorKind::RevertedTransaction,
                        format!("creation transaction {tx_hash} reverted"),
                    ));
                },
                Ok(Some(receipt)) if self.is_confirmed(&receipt).await => return Ok(receipt),
                Ok(_) => {},
                Err(err) => warn!(%tx_hash, error = %err, "error fetching receipt"),
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Whether a receipt is buried under the configured number of confirmations
    async fn is_confirmed(&self, receipt: &DeploymentReceipt) -> bool {
        if self.config.confirmations <= 1 {
            return true;
        }
        let Some(included) = receipt.block_number else {
            return false;
        };

        match self.client.block_number().await {
            Ok(latest) => latest.saturating_sub(included) + 1 >= self.config.confirmations,
            Err(err) => {
                warn!(error = %err, "error fetching block number");
                false
            },
        }
    }

    /// Record a deployed address in the deployments file, if one is configured
    fn record_deployment(&self, label: &str, address: Address) {
        let Some(path) = &self.config.deployments_path else {
            return;
        };
        if let Err(e) = write_deployed_address(path, label, address) {
            error!(label, %address, error = %e, "error recording deployment");
        }
    }
}

// --------
// | Plan |
// --------

/// What a deployment run would do with a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    /// Reuse the deployment at the given address
    Reuse(Address),
    /// Deploy with creation code of the given size
    Deploy {
        /// The artifact the creation code is built from
        artifact: PathBuf,
        /// The creation code, with constructor arguments appended
        code: Bytes,
    },
    /// The target cannot be deployed
    Invalid(String),
}

/// A target of a deployment plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTarget {
    /// The target
    pub target: DeploymentTarget,
    /// What a run would do with it
    pub step: PlannedStep,
}

/// Validate targets against their artifacts without touching the network.
///
/// References resolve to the target's configured address when set and to the
/// zero address otherwise.
pub fn plan(
    targets: &[DeploymentTarget],
    artifacts: &ArtifactStore,
    build: &BuildConfig,
) -> Vec<PlannedTarget> {
    let placeholders: AddressBook = targets
        .iter()
        .map(|t| (t.label().to_string(), t.address.unwrap_or(Address::ZERO)))
        .collect();

    targets
        .iter()
        .map(|target| {
            let step = match target.address {
                Some(address) => PlannedStep::Reuse(address),
                None => plan_deployment(target, artifacts, build, &placeholders)
                    .unwrap_or_else(PlannedStep::Invalid),
            };
            PlannedTarget {
                target: target.clone(),
                step,
            }
        })
        .collect()
}

/// Build the creation code of a target against placeholder addresses
fn plan_deployment(
    target: &DeploymentTarget,
    artifacts: &ArtifactStore,
    build: &BuildConfig,
    placeholders: &AddressBook,
) -> Result<PlannedStep, String> {
    let artifact = artifacts.load(&target.contract).map_err(|e| e.to_string())?;
    if let Some(metadata) = &artifact.metadata {
        metadata
            .check(&artifact.contract, build)
            .map_err(|e| e.to_string())?;
    }
    let code = deployment_code(&artifact, &target.args, placeholders)
        .map_err(|e| format!("constructor arguments: {e}"))?;

    Ok(PlannedStep::Deploy {
        artifact: artifact.path,
        code,
    })
}
