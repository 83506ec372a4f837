//! Connection to the forked chain the fixtures run against.
//!
//! Either spawns a local Anvil node forking an upstream RPC, or connects to
//! a fork that is already running. Transactions are sent unsigned through
//! `eth_sendTransaction`: the node holds the dev-account keys and accepts
//! impersonated senders, and fills nonce, gas and fees itself.

use std::sync::Arc;

use alloy::network::{Ethereum, ReceiptResponse};
use alloy::node_bindings::{Anvil, AnvilInstance};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{BlockNumberOrTag, TransactionReceipt, TransactionRequest};
use serde_json::json;

use crate::config::ForkConfig;
use crate::error::FixtureError;

/// Provider used for every fixture call.
///
/// No fillers and no wallet: the fork node signs for unlocked and
/// impersonated accounts, so nothing is cached client-side and an
/// `evm_revert` never leaves a stale nonce behind.
pub type NodeProvider = RootProvider<Ethereum>;

/// Identifier returned by `evm_snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotId(pub String);

/// Height and timestamp of the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPoint {
    pub block_number: u64,
    pub timestamp: u64,
}

/// Handle to the fork. Cloning shares the same node.
#[derive(Clone)]
pub struct ForkChain {
    provider: NodeProvider,
    endpoint: String,
    // Keeps a spawned node alive until the last clone is dropped.
    node: Option<Arc<AnvilInstance>>,
}

impl std::fmt::Debug for ForkChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkChain")
            .field("endpoint", &self.endpoint)
            .field("spawned", &self.node.is_some())
            .finish()
    }
}

impl ForkChain {
    /// Connect to a running node (a fork started by another tool).
    pub fn connect(rpc_url: &str) -> Result<Self, FixtureError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| FixtureError::ConfigError(format!("Invalid RPC URL: {e}")))?;
        Ok(Self {
            provider: RootProvider::new_http(url),
            endpoint: rpc_url.to_string(),
            node: None,
        })
    }

    /// Spawn a local Anvil node forking `config.fork_url`.
    pub fn spawn(config: &ForkConfig) -> Result<Self, FixtureError> {
        let fork_url = config
            .fork_url
            .clone()
            .ok_or_else(|| FixtureError::ConfigError("fork_url is required to spawn a fork".into()))?;

        let mut anvil = Anvil::new().fork(fork_url).chain_id(config.chain_id);
        if let Some(block) = config.fork_block_number {
            anvil = anvil.fork_block_number(block);
        }
        let instance = anvil.try_spawn()?;
        let endpoint = instance.endpoint();
        tracing::info!(
            endpoint = %endpoint,
            fork_block = ?config.fork_block_number,
            "Spawned forked node"
        );

        Ok(Self {
            provider: RootProvider::new_http(instance.endpoint_url()),
            endpoint,
            node: Some(Arc::new(instance)),
        })
    }

    /// Connect when `connect_url` is set, otherwise spawn.
    pub fn from_config(config: &ForkConfig) -> Result<Self, FixtureError> {
        match &config.connect_url {
            Some(url) => {
                tracing::info!(endpoint = %url, "Connecting to running fork");
                Self::connect(url)
            }
            None => Self::spawn(config),
        }
    }

    pub fn provider(&self) -> &NodeProvider {
        &self.provider
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Unlocked accounts exposed by the node (`eth_accounts`).
    pub async fn accounts(&self) -> Result<Vec<Address>, FixtureError> {
        Ok(self.provider.get_accounts().await?)
    }

    /// Allow `address` to send transactions without its key.
    pub async fn impersonate(&self, address: Address) -> Result<(), FixtureError> {
        let _: () = self
            .provider
            .raw_request("anvil_impersonateAccount".into(), json!([address]))
            .await?;
        tracing::debug!(%address, "Impersonating account");
        Ok(())
    }

    /// Overwrite the ETH balance of `address`.
    pub async fn set_balance(&self, address: Address, wei: U256) -> Result<(), FixtureError> {
        let _: () = self
            .provider
            .raw_request("anvil_setBalance".into(), json!([address, wei]))
            .await?;
        Ok(())
    }

    /// Move the node clock forward. The next mined block carries the new time.
    pub async fn increase_time(&self, seconds: u64) -> Result<(), FixtureError> {
        let _: serde_json::Value = self
            .provider
            .raw_request("evm_increaseTime".into(), json!([seconds]))
            .await?;
        tracing::debug!(seconds, "Increased chain time");
        Ok(())
    }

    /// Mine `blocks` empty blocks in one call.
    pub async fn mine(&self, blocks: u64) -> Result<(), FixtureError> {
        let _: serde_json::Value = self
            .provider
            .raw_request("anvil_mine".into(), json!([format!("{blocks:#x}")]))
            .await?;
        tracing::debug!(blocks, "Mined blocks");
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<SnapshotId, FixtureError> {
        let id: String = self
            .provider
            .raw_request("evm_snapshot".into(), json!([]))
            .await?;
        Ok(SnapshotId(id))
    }

    /// Roll the fork back to `id`. Snapshots are single use.
    pub async fn revert(&self, id: &SnapshotId) -> Result<(), FixtureError> {
        let reverted: bool = self
            .provider
            .raw_request("evm_revert".into(), json!([id.0]))
            .await?;
        if !reverted {
            return Err(FixtureError::NodeError(format!("Snapshot {} could not be reverted", id.0)));
        }
        Ok(())
    }

    pub async fn block_number(&self) -> Result<u64, FixtureError> {
        Ok(self.provider.get_block_number().await?)
    }

    /// Height and timestamp of the latest block.
    pub async fn latest(&self) -> Result<ChainPoint, FixtureError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| FixtureError::RpcError("latest block not found".into()))?;
        Ok(ChainPoint {
            block_number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    pub async fn eth_balance(&self, address: Address) -> Result<U256, FixtureError> {
        Ok(self.provider.get_balance(address).await?)
    }

    /// Send a prepared transaction and require a successful receipt.
    pub async fn submit(
        &self,
        step: &str,
        tx: TransactionRequest,
    ) -> Result<TransactionReceipt, FixtureError> {
        let receipt = self
            .provider
            .send_transaction(tx)
            .await?
            .get_receipt()
            .await?;
        ensure_success(step, &receipt)?;
        Ok(receipt)
    }

    /// Deploy creation code (with ABI-encoded constructor arguments appended)
    /// from `deployer`. Returns the new contract address.
    pub async fn deploy(
        &self,
        step: &str,
        deployer: Address,
        bytecode: Vec<u8>,
        constructor_args: Vec<u8>,
    ) -> Result<Address, FixtureError> {
        let mut deploy_data = bytecode;
        deploy_data.extend_from_slice(&constructor_args);

        let mut tx = TransactionRequest::default()
            .from(deployer)
            .input(alloy::rpc::types::TransactionInput::both(Bytes::from(deploy_data)));
        tx.to = Some(TxKind::Create);

        let receipt = self.submit(step, tx).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            FixtureError::DeploymentFailed(format!("{step}: no contract address in receipt"))
        })?;
        tracing::info!(step, %address, %deployer, "Deployed contract");
        Ok(address)
    }
}

/// Map a failed receipt to [`FixtureError::Reverted`].
pub fn ensure_success(step: &str, receipt: &TransactionReceipt) -> Result<(), FixtureError> {
    if receipt.status() {
        Ok(())
    } else {
        Err(FixtureError::Reverted {
            step: step.to_string(),
            tx_hash: receipt.transaction_hash().to_string(),
        })
    }
}
