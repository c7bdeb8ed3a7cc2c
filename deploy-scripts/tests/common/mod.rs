//! Shared fixtures for the deployer tests: a scripted in-memory chain and an
//! artifacts directory

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fs,
    path::Path,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use alloy::primitives::{address, keccak256, Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use deploy_scripts::{
    client::{DeployClient, DeploymentReceipt, GasEstimate, SignedDeployment},
    config::BuildConfig,
    deployer::DeployerConfig,
    errors::ClientError,
    retry::RetryConfig,
};
use semver::Version;
use serde_json::json;
use tempfile::TempDir;

/// The deployer account of the mock chain
pub const SENDER: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

/// The chain ID of the mock chain
pub const CHAIN_ID: u64 = 31337;

/// The gas parameters the mock chain estimates for every deployment
pub const GAS: GasEstimate = GasEstimate {
    gas_limit: 1_000_000,
    max_fee_per_gas: 10,
    max_priority_fee_per_gas: 1,
};

// -------------
// | Mock chain |
// -------------

/// The scripted state of the mock chain
pub struct MockState {
    /// The chain ID reported
    pub chain_id: u64,
    /// The next nonce of the sender
    pub nonce: u64,
    /// The balance of the sender
    pub balance: U256,
    /// The latest block
    pub block: u64,
    /// Errors returned by the next gas estimations, in order
    pub estimate_errors: VecDeque<ClientError>,
    /// Errors returned by the next broadcasts, in order
    pub broadcast_errors: VecDeque<ClientError>,
    /// Whether a broadcast that errors still lands on chain
    pub include_failed_broadcasts: bool,
    /// Whether receipts are withheld, as if the transactions never got mined
    pub withhold_receipts: bool,
    /// Whether every block number query sees a new block
    pub advance_blocks: bool,
    /// Nonces whose creation transaction reverts
    pub reverting_nonces: HashSet<u64>,
    /// Every transaction signed, in order
    pub signed: Vec<SignedDeployment>,
    /// The creation code of every transaction signed, in order
    pub signed_code: Vec<Bytes>,
    /// Every broadcast attempt, in order
    pub broadcasts: Vec<SignedDeployment>,
    /// Receipts of included transactions
    pub receipts: HashMap<TxHash, DeploymentReceipt>,
    /// Code size of deployed contracts
    pub code: HashMap<Address, usize>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            chain_id: CHAIN_ID,
            nonce: 0,
            balance: U256::from(10u64).pow(U256::from(18)),
            block: 100,
            estimate_errors: VecDeque::new(),
            broadcast_errors: VecDeque::new(),
            include_failed_broadcasts: false,
            withhold_receipts: false,
            advance_blocks: false,
            reverting_nonces: HashSet::new(),
            signed: Vec::new(),
            signed_code: Vec::new(),
            broadcasts: Vec::new(),
            receipts: HashMap::new(),
            code: HashMap::new(),
        }
    }
}

impl MockState {
    /// Include a transaction in a new block
    fn include(&mut self, tx: &SignedDeployment) {
        if self.receipts.contains_key(&tx.tx_hash) || tx.nonce != self.nonce {
            return;
        }

        self.block += 1;
        self.nonce += 1;
        let success = !self.reverting_nonces.contains(&tx.nonce);
        let contract_address = success.then(|| SENDER.create(tx.nonce));
        if let Some(address) = contract_address {
            self.code.insert(address, tx.raw.len());
        }

        if !self.withhold_receipts {
            self.receipts.insert(
                tx.tx_hash,
                DeploymentReceipt {
                    tx_hash: tx.tx_hash,
                    success,
                    contract_address,
                    block_number: Some(self.block),
                    gas_used: 21_000,
                },
            );
        }
    }

    /// The addresses contracts were deployed to, in order
    pub fn deployed(&self) -> Vec<Address> {
        self.signed
            .iter()
            .filter_map(|tx| self.receipts.get(&tx.tx_hash))
            .filter_map(|receipt| receipt.contract_address)
            .collect()
    }
}

/// A [`DeployClient`] over a scripted in-memory chain
#[derive(Default)]
pub struct MockClient {
    /// The chain state
    state: Mutex<MockState>,
}

impl MockClient {
    /// A client over the given chain state
    pub fn new(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// The chain state
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl DeployClient for MockClient {
    fn sender(&self) -> Address {
        SENDER
    }

    async fn chain_id(&self) -> Result<u64, ClientError> {
        Ok(self.state().chain_id)
    }

    async fn nonce(&self) -> Result<u64, ClientError> {
        Ok(self.state().nonce)
    }

    async fn balance(&self) -> Result<U256, ClientError> {
        Ok(self.state().balance)
    }

    async fn estimate_deployment(&self, _code: &Bytes) -> Result<GasEstimate, ClientError> {
        match self.state().estimate_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(GAS),
        }
    }

    async fn sign_deployment(
        &self,
        code: &Bytes,
        nonce: u64,
        _gas: &GasEstimate,
    ) -> Result<SignedDeployment, ClientError> {
        let mut raw = code.to_vec();
        raw.extend_from_slice(&nonce.to_be_bytes());
        let signed = SignedDeployment {
            tx_hash: keccak256(&raw),
            nonce,
            raw: raw.into(),
        };

        let mut state = self.state();
        state.signed.push(signed.clone());
        state.signed_code.push(code.clone());
        Ok(signed)
    }

    async fn broadcast(&self, tx: &SignedDeployment) -> Result<TxHash, ClientError> {
        let mut state = self.state();
        state.broadcasts.push(tx.clone());

        if let Some(err) = state.broadcast_errors.pop_front() {
            if state.include_failed_broadcasts {
                state.include(tx);
            }
            return Err(err);
        }

        state.include(tx);
        Ok(tx.tx_hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<DeploymentReceipt>, ClientError> {
        Ok(self.state().receipts.get(&tx_hash).cloned())
    }

    async fn block_number(&self) -> Result<u64, ClientError> {
        let mut state = self.state();
        if state.advance_blocks {
            state.block += 1;
        }
        Ok(state.block)
    }

    async fn code_size(&self, address: Address) -> Result<usize, ClientError> {
        Ok(self.state().code.get(&address).copied().unwrap_or(0))
    }
}

// ------------
// | Fixtures |
// ------------

/// The build settings the fixture artifacts are compiled with
pub fn build_config() -> BuildConfig {
    BuildConfig {
        compiler_version: Version::new(0, 8, 19),
        optimizer_enabled: true,
        optimizer_runs: 1000,
        via_ir: true,
    }
}

/// Deployer tunables with short delays
pub fn fast_config() -> DeployerConfig {
    DeployerConfig {
        confirmation_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
        ..DeployerConfig::default()
    }
}

/// The creation bytecode of the fixture `Vault` contract
pub const VAULT_BYTECODE: [u8; 4] = [0x60, 0x80, 0x60, 0x41];

/// Write a Hardhat-layout artifacts directory with the fixture contracts:
///
/// - `TokenA`, `TokenB`: no constructor
/// - `Vault`: `constructor(address token, uint256 cap)`
/// - `IVault`: an interface, with no bytecode
/// - `Legacy`: compiled with a different compiler version
pub fn artifacts_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let contracts = dir.path().join("contracts");

    for token in ["TokenA", "TokenB"] {
        write_artifact(
            &contracts,
            token,
            json!({ "contractName": token, "abi": [], "bytecode": "0x60806040" }),
        );
    }
    write_artifact(
        &contracts,
        "Vault",
        json!({
            "contractName": "Vault",
            "abi": [{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [
                    { "name": "token", "type": "address", "internalType": "address" },
                    { "name": "cap", "type": "uint256", "internalType": "uint256" }
                ]
            }],
            "bytecode": "0x60806041"
        }),
    );
    write_artifact(
        &contracts,
        "IVault",
        json!({ "contractName": "IVault", "abi": [], "bytecode": "0x" }),
    );
    write_artifact(
        &contracts,
        "Legacy",
        json!({ "contractName": "Legacy", "abi": [], "bytecode": "0x6080" }),
    );

    let debug = json!({ "_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/legacy.json" });
    fs::write(contracts.join("Legacy.sol/Legacy.dbg.json"), debug.to_string()).unwrap();
    fs::create_dir_all(dir.path().join("build-info")).unwrap();
    let build_info = json!({
        "solcVersion": "0.7.6",
        "input": { "settings": { "optimizer": { "enabled": true, "runs": 1000 }, "viaIR": true } }
    });
    fs::write(dir.path().join("build-info/legacy.json"), build_info.to_string()).unwrap();

    dir
}

fn write_artifact(contracts: &Path, name: &str, artifact: serde_json::Value) {
    let dir = contracts.join(format!("{name}.sol"));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.json")), artifact.to_string()).unwrap();
}
