//! Resolution of the build & network configuration from the environment.
//!
//! Secrets are never read from versioned files: the loader only sees a snapshot of
//! environment variables, optionally merged with a git-ignored dotenv secrets file.

use std::{
    collections::HashMap,
    fmt::{self, Debug, Display, Formatter},
    path::Path,
    str::FromStr,
};

use alloy::{primitives::B256, signers::local::PrivateKeySigner};
use semver::Version;
use url::Url;

use crate::{
    constants::{
        CHAIN_ID_ENV_VAR, COMPILER_VERSION_ENV_VAR, DEFAULT_COMPILER_VERSION,
        DEFAULT_OPTIMIZER_ENABLED, DEFAULT_OPTIMIZER_RUNS, DEFAULT_VIA_IR,
        EXPLORER_API_KEY_ENV_VAR, OPTIMIZER_ENABLED_ENV_VAR, OPTIMIZER_RUNS_ENV_VAR,
        RPC_ENDPOINT_ENV_VAR, SIGNING_KEY_ENV_VAR, VIA_IR_ENV_VAR,
    },
    errors::ConfigError,
};

/// A snapshot of environment variables
pub type Environment = HashMap<String, String>;

/// A secret value; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw secret
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

impl Display for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<redacted>")
    }
}

/// The compiler settings the deployed artifacts are expected to have been built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// The Solidity compiler version
    pub compiler_version: Version,
    /// Whether the optimizer is enabled
    pub optimizer_enabled: bool,
    /// The number of optimizer runs
    pub optimizer_runs: u32,
    /// Whether code generation goes through the IR pipeline
    pub via_ir: bool,
}

/// The network to deploy to and the credentials used to do so
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// The network name, as given on the command line
    pub name: String,
    /// The RPC endpoint of the network
    pub rpc_endpoint: Url,
    /// The deployer's private key
    pub signing_key: Secret,
    /// The block explorer API key, used for source verification
    pub explorer_api_key: Secret,
    /// The chain ID the endpoint must report, if configured
    pub expected_chain_id: Option<u64>,
}

impl NetworkConfig {
    /// Build the signer for the deployer's key
    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        parse_signing_key(self.signing_key.expose())
    }
}

/// Load the build & network configuration for `network` from an environment snapshot.
///
/// Secrets are checked first, so an environment lacking one always fails with
/// [`ConfigError::MissingSecret`].
pub fn load(env: &Environment, network: &str) -> Result<(BuildConfig, NetworkConfig), ConfigError> {
    let suffix = network_suffix(network);
    let lookup = |var: &'static str| scoped_lookup(env, var, &suffix);

    // Secrets
    let signing_key = lookup(SIGNING_KEY_ENV_VAR)
        .map(Secret::new)
        .ok_or(ConfigError::MissingSecret(SIGNING_KEY_ENV_VAR))?;
    let explorer_api_key = lookup(EXPLORER_API_KEY_ENV_VAR)
        .map(Secret::new)
        .ok_or(ConfigError::MissingSecret(EXPLORER_API_KEY_ENV_VAR))?;
    parse_signing_key(signing_key.expose())?;

    // Network
    validate_network_name(network)?;
    let endpoint = lookup(RPC_ENDPOINT_ENV_VAR)
        .ok_or_else(|| ConfigError::InvalidNetwork(network.to_string()))?;
    let rpc_endpoint = parse_endpoint(endpoint)?;
    let expected_chain_id = lookup(CHAIN_ID_ENV_VAR)
        .map(|id| parse_value::<u64>(CHAIN_ID_ENV_VAR, id))
        .transpose()?;

    let network = NetworkConfig {
        name: network.to_string(),
        rpc_endpoint,
        signing_key,
        explorer_api_key,
        expected_chain_id,
    };

    Ok((load_build_config(env)?, network))
}

/// Load the build configuration alone, which requires no secrets
pub fn load_build_config(env: &Environment) -> Result<BuildConfig, ConfigError> {
    let lookup = |var: &'static str| env.get(var).map(|v| v.trim()).filter(|v| !v.is_empty());

    let compiler_version = lookup(COMPILER_VERSION_ENV_VAR).unwrap_or(DEFAULT_COMPILER_VERSION);
    let compiler_version = Version::parse(compiler_version.trim_start_matches('v')).map_err(|e| {
        ConfigError::InvalidValue {
            var: COMPILER_VERSION_ENV_VAR.to_string(),
            reason: e.to_string(),
        }
    })?;

    let optimizer_enabled = lookup(OPTIMIZER_ENABLED_ENV_VAR)
        .map(|v| parse_bool(OPTIMIZER_ENABLED_ENV_VAR, v))
        .transpose()?
        .unwrap_or(DEFAULT_OPTIMIZER_ENABLED);
    let optimizer_runs = lookup(OPTIMIZER_RUNS_ENV_VAR)
        .map(|v| parse_value::<u32>(OPTIMIZER_RUNS_ENV_VAR, v))
        .transpose()?
        .unwrap_or(DEFAULT_OPTIMIZER_RUNS);
    let via_ir = lookup(VIA_IR_ENV_VAR)
        .map(|v| parse_bool(VIA_IR_ENV_VAR, v))
        .transpose()?
        .unwrap_or(DEFAULT_VIA_IR);

    Ok(BuildConfig {
        compiler_version,
        optimizer_enabled,
        optimizer_runs,
        via_ir,
    })
}

/// Read a dotenv-format secrets file without touching the process environment.
///
/// A missing file yields an empty snapshot.
pub fn read_secrets_file(path: &Path) -> Result<Environment, ConfigError> {
    if !path.exists() {
        return Ok(Environment::new());
    }

    dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::SecretsFile(e.to_string()))?
        .map(|item| item.map_err(|e| ConfigError::SecretsFile(e.to_string())))
        .collect()
}

/// Merge the process environment over a secrets file snapshot
pub fn environment(secrets: Environment) -> Environment {
    merge_environment(secrets, std::env::vars())
}

/// Merge `overrides` over `base`; on conflict the override wins
pub fn merge_environment(
    base: Environment,
    overrides: impl IntoIterator<Item = (String, String)>,
) -> Environment {
    let mut env = base;
    env.extend(overrides);
    env
}

// -----------
// | Helpers |
// -----------

/// The suffix of a network's scoped variables, e.g. `arbitrum-sepolia` -> `ARBITRUM_SEPOLIA`
fn network_suffix(network: &str) -> String {
    network.to_ascii_uppercase().replace('-', "_")
}

/// Network names are used in variable names, so only `[A-Za-z0-9_-]` is allowed
fn validate_network_name(network: &str) -> Result<(), ConfigError> {
    let valid = !network.is_empty()
        && network
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidNetwork(network.to_string()))
    }
}

/// Look up `<VAR>_<NETWORK>`, then `<VAR>`, ignoring empty values
fn scoped_lookup<'a>(env: &'a Environment, var: &str, suffix: &str) -> Option<&'a str> {
    [format!("{var}_{suffix}"), var.to_string()]
        .iter()
        .filter_map(|key| env.get(key))
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}

/// Parse an HTTP or WebSocket RPC endpoint with a host
fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        var: RPC_ENDPOINT_ENV_VAR.to_string(),
        reason,
    };

    let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
        return Err(invalid(format!("unsupported scheme `{}`", url.scheme())));
    }
    if url.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url)
}

/// Parse a hex private key. The key itself never appears in the error.
fn parse_signing_key(key: &str) -> Result<PrivateKeySigner, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        var: SIGNING_KEY_ENV_VAR.to_string(),
        reason: reason.to_string(),
    };

    let bytes = B256::from_str(key.trim()).map_err(|_| invalid("expected 32 hex-encoded bytes"))?;
    PrivateKeySigner::from_bytes(&bytes).map_err(|_| invalid("not a valid secp256k1 private key"))
}

/// Parse a variable with its `FromStr` implementation
fn parse_value<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a boolean variable, accepting `true`/`false`, `1`/`0` and `yes`/`no`
fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            reason: format!("expected a boolean, got `{value}`"),
        }),
    }
}
