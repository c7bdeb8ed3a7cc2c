//! Constants used in the deploy scripts

use std::time::Duration;

// -------------------------
// | Environment variables |
// -------------------------

/// The environment variable holding the network RPC endpoint
pub const RPC_ENDPOINT_ENV_VAR: &str = "RPC_ENDPOINT";

/// The environment variable holding the hex-encoded private key of the deployer
pub const SIGNING_KEY_ENV_VAR: &str = "SIGNING_KEY";

/// The environment variable holding the block explorer API key
pub const EXPLORER_API_KEY_ENV_VAR: &str = "EXPLORER_API_KEY";

/// The environment variable holding the chain ID the endpoint is expected to serve
pub const CHAIN_ID_ENV_VAR: &str = "CHAIN_ID";

/// The environment variable holding the Solidity compiler version
pub const COMPILER_VERSION_ENV_VAR: &str = "COMPILER_VERSION";

/// The environment variable toggling the Solidity optimizer
pub const OPTIMIZER_ENABLED_ENV_VAR: &str = "OPTIMIZER_ENABLED";

/// The environment variable holding the number of optimizer runs
pub const OPTIMIZER_RUNS_ENV_VAR: &str = "OPTIMIZER_RUNS";

/// The environment variable toggling the IR-based code generation pipeline
pub const VIA_IR_ENV_VAR: &str = "VIA_IR";

/// The environment variable used to configure log filtering
pub const LOG_FILTER_ENV_VAR: &str = "RUST_LOG";

// -------------------------
// | Build config defaults |
// -------------------------

/// The compiler version assumed when `COMPILER_VERSION` is unset
pub const DEFAULT_COMPILER_VERSION: &str = "0.8.19";

/// Whether the optimizer is assumed enabled when `OPTIMIZER_ENABLED` is unset
pub const DEFAULT_OPTIMIZER_ENABLED: bool = true;

/// The optimizer runs assumed when `OPTIMIZER_RUNS` is unset
pub const DEFAULT_OPTIMIZER_RUNS: u32 = 1000;

/// Whether the IR pipeline is assumed enabled when `VIA_IR` is unset
pub const DEFAULT_VIA_IR: bool = true;

// --------------
// | Deployment |
// --------------

/// The default number of confirmations to wait for a deployment transaction
pub const DEFAULT_NUM_DEPLOY_CONFIRMATIONS: u64 = 1;

/// The default amount of time to wait for a deployment to be confirmed
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(180);

/// The interval at which the deployer polls for a transaction receipt
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The gas limit of a creation transaction, as a percentage of the node's estimate
pub const GAS_LIMIT_MULTIPLIER_PERCENT: u64 = 120;

/// The default maximum number of retries for a failed RPC request
pub const DEFAULT_RPC_MAX_RETRIES: usize = 4;

/// The default initial delay of the RPC retry backoff
pub const DEFAULT_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// The default maximum delay of the RPC retry backoff
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

// ---------
// | Files |
// ---------

/// The secrets file read when `--secrets-file` is not given
pub const DEFAULT_SECRETS_FILE: &str = ".env";

/// The default directory containing compiled contract artifacts
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The default path of the deployments file
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";

/// The deployments key in the deployments file
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// The extension of a contract artifact file
pub const ARTIFACT_EXTENSION: &str = "json";

/// The suffix of the Hardhat debug file that points at an artifact's build info
pub const DEBUG_ARTIFACT_SUFFIX: &str = ".dbg.json";

/// The name of the directory holding compiler build info, which contains no artifacts
pub const BUILD_INFO_DIR: &str = "build-info";

/// The marker the compiler leaves in bytecode for an unlinked library
pub const UNLINKED_LIBRARY_MARKER: &str = "__$";

// --------------
// | References |
// --------------

/// The opening delimiter of a reference to an earlier deployment
pub const REFERENCE_OPEN: char = '<';

/// The closing delimiter of a reference to an earlier deployment
pub const REFERENCE_CLOSE: char = '>';

/// The optional suffix inside a reference, as in `<Token address>`
pub const REFERENCE_ADDRESS_SUFFIX: &str = " address";

/// The prefix of a string argument that is taken literally, minus its first `<`
pub const REFERENCE_ESCAPE: &str = "<<";
