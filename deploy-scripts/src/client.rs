//! The RPC client used to deploy contracts.
//!
//! [`DeployClient`] is the narrow set of node interactions the deployer needs.
//! [`AlloyClient`] implements it over an alloy provider, signing locally.

use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{RpcError, TransportError},
};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    config::NetworkConfig,
    constants::GAS_LIMIT_MULTIPLIER_PERCENT,
    errors::{ClientError, ScriptError},
};

/// The gas parameters of a creation transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    /// The gas limit, padded over the node's estimate
    pub gas_limit: u64,
    /// The maximum fee per gas
    pub max_fee_per_gas: u128,
    /// The maximum priority fee per gas
    pub max_priority_fee_per_gas: u128,
}

impl GasEstimate {
    /// The most the transaction can cost the sender
    pub fn max_cost(&self) -> U256 {
        U256::from(self.gas_limit) * U256::from(self.max_fee_per_gas)
    }
}

/// A signed creation transaction.
///
/// Re-broadcasting the same bytes can never create a second contract: the nonce
/// is fixed by the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDeployment {
    /// The transaction hash
    pub tx_hash: TxHash,
    /// The nonce the transaction was signed with
    pub nonce: u64,
    /// The EIP-2718 encoded transaction
    pub raw: Bytes,
}

/// The parts of a transaction receipt relevant to a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReceipt {
    /// The transaction hash
    pub tx_hash: TxHash,
    /// Whether execution succeeded
    pub success: bool,
    /// The address of the created contract
    pub contract_address: Option<Address>,
    /// The block the transaction was included in
    pub block_number: Option<u64>,
    /// The gas used by the transaction
    pub gas_used: u64,
}

impl From<TransactionReceipt> for DeploymentReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
            contract_address: receipt.contract_address,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
        }
    }
}

/// The node interactions needed to deploy contracts
#[async_trait]
pub trait DeployClient: Send + Sync {
    /// The deployer account
    fn sender(&self) -> Address;

    /// The chain ID served by the endpoint
    async fn chain_id(&self) -> Result<u64, ClientError>;

    /// The next nonce of the deployer, counting pending transactions
    async fn nonce(&self) -> Result<u64, ClientError>;

    /// The balance of the deployer
    async fn balance(&self) -> Result<U256, ClientError>;

    /// Estimate the gas parameters of a creation transaction
    async fn estimate_deployment(&self, code: &Bytes) -> Result<GasEstimate, ClientError>;

    /// Sign a creation transaction with a fixed nonce
    async fn sign_deployment(
        &self,
        code: &Bytes,
        nonce: u64,
        gas: &GasEstimate,
    ) -> Result<SignedDeployment, ClientError>;

    /// Broadcast a signed transaction
    async fn broadcast(&self, tx: &SignedDeployment) -> Result<TxHash, ClientError>;

    /// The receipt of a transaction, if it has been included
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<DeploymentReceipt>, ClientError>;

    /// The latest block number
    async fn block_number(&self) -> Result<u64, ClientError>;

    /// The size of the code deployed at `address`
    async fn code_size(&self, address: Address) -> Result<usize, ClientError>;
}

/// A [`DeployClient`] backed by an alloy provider
pub struct AlloyClient {
    /// The provider, without signing fillers
    provider: DynProvider,
    /// The deployer's wallet
    wallet: EthereumWallet,
    /// The deployer's address
    sender: Address,
}

impl AlloyClient {
    /// Connect to the endpoint of a network
    pub async fn connect(network: &NetworkConfig) -> Result<Self, ScriptError> {
        let signer = network.signer()?;
        Self::connect_with_signer(network.rpc_endpoint.as_str(), signer).await
    }

    /// Connect to an endpoint, signing with `signer`
    pub async fn connect_with_signer(
        rpc_endpoint: &str,
        signer: PrivateKeySigner,
    ) -> Result<Self, ScriptError> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect(rpc_endpoint)
            .await
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?
            .erased();

        let sender = signer.address();
        Ok(Self {
            provider,
            wallet: EthereumWallet::from(signer),
            sender,
        })
    }
}

#[async_trait]
impl DeployClient for AlloyClient {
    fn sender(&self) -> Address {
        self.sender
    }

    async fn chain_id(&self) -> Result<u64, ClientError> {
        self.provider.get_chain_id().await.map_err(classify_error)
    }

    async fn nonce(&self) -> Result<u64, ClientError> {
        self.provider
            .get_transaction_count(self.sender)
            .pending()
            .await
            .map_err(classify_error)
    }

    async fn balance(&self) -> Result<U256, ClientError> {
        self.provider.get_balance(self.sender).await.map_err(classify_error)
    }

    async fn estimate_deployment(&self, code: &Bytes) -> Result<GasEstimate, ClientError> {
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_deploy_code(code.clone());
        let gas = self.provider.estimate_gas(tx).await.map_err(classify_error)?;
        let fees = self.provider.estimate_eip1559_fees().await.map_err(classify_error)?;

        Ok(GasEstimate {
            gas_limit: gas.saturating_mul(GAS_LIMIT_MULTIPLIER_PERCENT) / 100,
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn sign_deployment(
        &self,
        code: &Bytes,
        nonce: u64,
        gas: &GasEstimate,
    ) -> Result<SignedDeployment, ClientError> {
        let chain_id = self.chain_id().await?;
        let tx = TransactionRequest::default()
            .with_from(self.sender)
            .with_deploy_code(code.clone())
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_limit(gas.gas_limit)
            .with_max_fee_per_gas(gas.max_fee_per_gas)
            .with_max_priority_fee_per_gas(gas.max_priority_fee_per_gas);

        let envelope = tx
            .build(&self.wallet)
            .await
            .map_err(|e| ClientError::Signing(e.to_string()))?;

        Ok(SignedDeployment {
            tx_hash: *envelope.tx_hash(),
            nonce,
            raw: envelope.encoded_2718().into(),
        })
    }

    async fn broadcast(&self, tx: &SignedDeployment) -> Result<TxHash, ClientError> {
        let pending = self
            .provider
            .send_raw_transaction(&tx.raw)
            .await
            .map_err(classify_error)?;
        debug!(tx_hash = %pending.tx_hash(), "broadcast accepted");
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<DeploymentReceipt>, ClientError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(classify_error)?;
        Ok(receipt.map(DeploymentReceipt::from))
    }

    async fn block_number(&self) -> Result<u64, ClientError> {
        self.provider.get_block_number().await.map_err(classify_error)
    }

    async fn code_size(&self, address: Address) -> Result<usize, ClientError> {
        let code = self.provider.get_code_at(address).await.map_err(classify_error)?;
        Ok(code.len())
    }
}

// -----------
// | Helpers |
// -----------

/// Sort a transport error into the client's taxonomy.
///
/// Only failures where the node never answered are retryable.
fn classify_error(err: TransportError) -> ClientError {
    match err {
        RpcError::ErrorResp(payload) => classify_node_error(&payload.message),
        RpcError::Transport(_) | RpcError::NullResp => ClientError::Transport(err.to_string()),
        other => ClientError::Rejected(other.to_string()),
    }
}

/// Classify an error message returned by a node
pub fn classify_node_error(message: &str) -> ClientError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        ClientError::InsufficientFunds(message.to_string())
    } else if lower.contains("revert") {
        ClientError::Reverted(message.to_string())
    } else if lower.contains("already known")
        || lower.contains("known transaction")
        || lower.contains("nonce too low")
    {
        ClientError::AlreadyKnown(message.to_string())
    } else {
        ClientError::Rejected(message.to_string())
    }
}
