//! Definitions of errors that can occur during the execution of the deploy scripts

use std::{
    fmt::{self, Display, Formatter},
    path::PathBuf,
};

use thiserror::Error;

/// Errors resolving the build & network configuration.
///
/// Any of these aborts the run before a single RPC request is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required credential or API key is absent
    #[error("missing secret: {0} is not set")]
    MissingSecret(&'static str),
    /// The requested network has no endpoint configured, or is not a valid name
    #[error("invalid network `{0}`: no RPC endpoint configured")]
    InvalidNetwork(String),
    /// A setting is present but malformed
    #[error("invalid value for {var}: {reason}")]
    InvalidValue {
        /// The environment variable holding the value
        var: String,
        /// Why the value was rejected
        reason: String,
    },
    /// The secrets file exists but could not be read
    #[error("error reading secrets file: {0}")]
    SecretsFile(String),
}

/// Errors reading or validating a deployment manifest
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// The manifest file could not be read
    #[error("error reading manifest {path}: {reason}")]
    Read {
        /// The manifest path
        path: PathBuf,
        /// The underlying IO error
        reason: String,
    },
    /// The manifest is not valid JSON of the expected shape
    #[error("error parsing manifest: {0}")]
    Parse(String),
    /// A target does not name a contract
    #[error("target #{0} has an empty contract name")]
    EmptyContract(usize),
    /// Two targets share a label
    #[error("duplicate target label `{0}`")]
    DuplicateLabel(String),
    /// A constructor argument references a label that is not deployed earlier in the manifest
    #[error("target `{label}` references `{reference}`, which is not an earlier target")]
    UnknownReference {
        /// The label of the referencing target
        label: String,
        /// The referenced label
        reference: String,
    },
}

/// Errors locating or reading a compiled contract artifact
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// No artifact exists for the contract
    #[error("no artifact for `{contract}` under {dir}")]
    NotFound {
        /// The contract name
        contract: String,
        /// The artifacts directory searched
        dir: PathBuf,
    },
    /// More than one artifact exists for the contract
    #[error("ambiguous artifact for `{contract}`: {}", .paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    Ambiguous {
        /// The contract name
        contract: String,
        /// The matching artifact paths
        paths: Vec<PathBuf>,
    },
    /// An artifact or build info file could not be read
    #[error("error reading {path}: {reason}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        reason: String,
    },
    /// An artifact or build info file could not be parsed
    #[error("error parsing {path}: {reason}")]
    Parse {
        /// The file path
        path: PathBuf,
        /// The underlying error
        reason: String,
    },
    /// The artifact has no creation bytecode, e.g. it is an interface or abstract contract
    #[error("`{0}` has no creation bytecode (abstract contract or interface?)")]
    EmptyBytecode(String),
    /// The bytecode contains placeholders for libraries that were never linked
    #[error("`{0}` has unlinked library references")]
    UnlinkedLibraries(String),
    /// The bytecode is not valid hex
    #[error("`{contract}` has malformed bytecode: {reason}")]
    InvalidBytecode {
        /// The contract name
        contract: String,
        /// The decoding error
        reason: String,
    },
    /// The artifact was compiled with settings that disagree with the build configuration
    #[error("`{contract}` was compiled with {setting} = {found}, but the build config expects {expected}")]
    BuildMismatch {
        /// The contract name
        contract: String,
        /// The mismatched setting
        setting: &'static str,
        /// The configured value
        expected: String,
        /// The value recorded in the artifact
        found: String,
    },
}

/// Errors resolving and ABI-encoding constructor arguments
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalldataError {
    /// A reference names a target that has no deployed address
    #[error("`{0}` has no deployed address")]
    UnresolvedReference(String),
    /// The number of arguments does not match the constructor
    #[error("`{contract}` constructor takes {expected} argument(s), got {got}")]
    ArgumentCount {
        /// The contract name
        contract: String,
        /// The constructor's parameter count
        expected: usize,
        /// The number of arguments in the manifest
        got: usize,
    },
    /// An argument could not be coerced into its parameter type
    #[error("argument #{index} ({param}): {reason}")]
    InvalidArgument {
        /// The argument position
        index: usize,
        /// The parameter signature
        param: String,
        /// The coercion error
        reason: String,
    },
    /// An argument is a JSON value with no ABI string form
    #[error("argument #{0} must be a string, number, bool or array")]
    UnsupportedValue(usize),
    /// The resolved values could not be ABI-encoded
    #[error("error encoding constructor arguments: {0}")]
    Encoding(String),
}

/// Errors returned by the RPC client
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never got a response: connection refused, timeout, dropped response
    #[error("transport error: {0}")]
    Transport(String),
    /// The node reports the sender cannot pay for the transaction
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Execution reverted, either in gas estimation or on chain
    #[error("execution reverted: {0}")]
    Reverted(String),
    /// The node already holds a transaction with this hash or nonce
    #[error("transaction already known: {0}")]
    AlreadyKnown(String),
    /// The node answered with any other error
    #[error("rpc error: {0}")]
    Rejected(String),
    /// The transaction could not be built or signed
    #[error("error signing transaction: {0}")]
    Signing(String),
}

impl ClientError {
    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// The top-level error of a deploy script invocation
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Configuration could not be loaded
    #[error("{0}")]
    Config(#[from] ConfigError),
    /// The manifest is invalid
    #[error("{0}")]
    Manifest(#[from] ManifestError),
    /// An artifact is invalid
    #[error("{0}")]
    Artifact(#[from] ArtifactError),
    /// The RPC client could not be set up
    #[error("error initializing client: {0}")]
    ClientInitialization(String),
    /// An RPC request failed outside of a deployment
    #[error("{0}")]
    Client(#[from] ClientError),
    /// The endpoint serves a different chain than configured
    #[error("endpoint serves chain {actual}, but chain {expected} is configured")]
    ChainIdMismatch {
        /// The configured chain ID
        expected: u64,
        /// The chain ID reported by the endpoint
        actual: u64,
    },
    /// The deployments file could not be read
    #[error("error reading deployments: {0}")]
    ReadDeployments(String),
    /// The deployments file could not be written
    #[error("error writing deployments: {0}")]
    WriteDeployments(String),
}

// ------------------------
// | Per-target taxonomy |
// ------------------------

/// The kind of failure recorded for a single deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The RPC endpoint failed or rejected a request
    RpcError,
    /// The creation transaction reverted
    RevertedTransaction,
    /// The deployer cannot pay for the creation transaction
    InsufficientFunds,
    /// The transaction was sent but no receipt was seen in time
    Timeout,
    /// The broadcast was never acknowledged, so it is unknown whether the node has it
    UnknownState,
    /// The target cannot be deployed as described: bad artifact or arguments
    InvalidTarget,
    /// The target references an earlier target that did not deploy
    DependencyFailed,
}

/// The error taxonomy a failure kind belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid settings
    Configuration,
    /// The network failed; retried with backoff before surfacing
    Network,
    /// The transaction failed; never retried
    Transaction,
    /// The on-chain outcome is unknown; left to the operator
    UnknownState,
}

impl ErrorKind {
    /// The taxonomy this kind of failure belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::RpcError => ErrorCategory::Network,
            ErrorKind::RevertedTransaction | ErrorKind::InsufficientFunds => {
                ErrorCategory::Transaction
            }
            ErrorKind::Timeout | ErrorKind::UnknownState => ErrorCategory::UnknownState,
            ErrorKind::InvalidTarget | ErrorKind::DependencyFailed => ErrorCategory::Configuration,
        }
    }
}

impl ErrorCategory {
    /// What the operator should do before re-running, if anything beyond fixing the error
    pub fn operator_action(&self) -> Option<&'static str> {
        match self {
            ErrorCategory::UnknownState => {
                Some("the transaction may still land: check on chain before re-running")
            },
            _ => None,
        }
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Transaction => write!(f, "transaction"),
            ErrorCategory::UnknownState => write!(f, "unknown state"),
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RpcError => write!(f, "rpc error"),
            ErrorKind::RevertedTransaction => write!(f, "reverted transaction"),
            ErrorKind::InsufficientFunds => write!(f, "insufficient funds"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::UnknownState => write!(f, "unknown state"),
            ErrorKind::InvalidTarget => write!(f, "invalid target"),
            ErrorKind::DependencyFailed => write!(f, "dependency failed"),
        }
    }
}

impl From<&ClientError> for ErrorKind {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            ClientError::Reverted(_) => ErrorKind::RevertedTransaction,
            ClientError::Transport(_)
            | ClientError::AlreadyKnown(_)
            | ClientError::Rejected(_)
            | ClientError::Signing(_) => ErrorKind::RpcError,
        }
    }
}
