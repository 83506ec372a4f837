//! Fixture configuration.
//!
//! Every address, constant and location the fixtures depend on lives in
//! [`FixtureConfig`]. Defaults reproduce the Ethereum mainnet deployment
//! the strategy is tested against; a TOML file and environment variables
//! can override any of it.

use std::path::{Path, PathBuf};

use alloy::primitives::{Address, U256, address};
use serde::{Deserialize, Serialize};

use crate::error::FixtureError;

/// Seconds in the day Tokemak uses as its withdrawal timelock.
pub const ONE_DAY_SECS: u64 = 3600 * 24;

/// Blocks mined per simulated day. Must exceed the manager's cycle duration.
pub const BLOCKS_PER_SIMULATED_DAY: u64 = 6300;

/// Tokemak's cycle duration in blocks at the time the fixtures were written.
/// Readable on-chain through `getCycleDuration()`.
pub const KNOWN_CYCLE_DURATION_BLOCKS: u64 = 6200;

/// Rewards hash passed to `completeRollover`.
pub const ROLLOVER_IPFS_HASH: &str = "DmTzdi7eC9SM5FaZCzaMpfwpuTt2gXZircVsZUA3DPXWqv";

/// Tolerance used when comparing on-chain amounts.
pub const RELATIVE_APPROX: f64 = 1e-5;

/// Package the vault implementation is resolved from.
pub const VAULT_PACKAGE: &str = "yearn/yearn-vaults@0.4.3";

/// Complete fixture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FixtureConfig {
    pub fork: ForkConfig,
    pub addresses: NetworkAddresses,
    pub accounts: AccountPool,
    pub allocation: StrategyAllocation,
    pub chain_time: ChainTimeConfig,
    pub funding: FundingConfig,
    pub artifacts: ArtifactConfig,
    pub tolerance: ToleranceConfig,
}

/// How to reach the forked chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    /// Upstream RPC the local node forks from.
    pub fork_url: Option<String>,
    /// Pin the fork to a block for reproducible state.
    pub fork_block_number: Option<u64>,
    /// Connect to an already running fork instead of spawning one.
    pub connect_url: Option<String>,
    /// Chain id the spawned node reports.
    pub chain_id: u64,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            fork_url: None,
            fork_block_number: None,
            connect_url: None,
            chain_id: 1,
        }
    }
}

/// Fixed mainnet deployments and externally owned accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkAddresses {
    /// ERC-20 the vault and strategy operate on.
    pub token: Address,
    pub weth: Address,
    /// Tokemak wETH reactor; doubles as the tWETH token.
    pub tokemak_weth_pool: Address,
    pub toke_token: Address,
    pub tokemak_manager: Address,
    pub trade_factory: Address,
    pub ymechs_safe: Address,
    pub sushi_swapper: Address,
    pub gov: Address,
    /// Aave wETH pool.
    pub weth_whale: Address,
    /// Tokemak treasury.
    pub toke_whale: Address,
    /// Holder of the manager's rollover role.
    pub rollover_role_holder: Address,
}

impl Default for NetworkAddresses {
    fn default() -> Self {
        Self {
            token: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            weth: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            tokemak_weth_pool: address!("D3D13a578a53685B4ac36A1Bab31912D2B2A2F36"),
            toke_token: address!("2e9d63788249371f1DFC918a52f8d799F4a38C94"),
            tokemak_manager: address!("A86e412109f77c45a3BC1c5870b880492Fb86A14"),
            trade_factory: address!("Bf26Ff7C7367ee7075443c4F95dEeeE77432614d"),
            ymechs_safe: address!("2C01B4AD51a67E2d8F02208F54dF9aC4c0B778B6"),
            sushi_swapper: address!("55dcee9332848AFcF660CE6a2116D83Dd7a71B60"),
            gov: address!("FEB4acf3df3cDEA7399794D0869ef76A6EfAff52"),
            weth_whale: address!("030bA81f1c18d280636F32af80b9AAd02Cf0854e"),
            toke_whale: address!("8b4334d4812c530574bd4f2763fcd22de94a969b"),
            rollover_role_holder: address!("9e0bcE7ec474B481492610eB9dd5D69EB03718D5"),
        }
    }
}

/// Indices into the node's unlocked dev-account pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountPool {
    pub user: usize,
    pub rewards: usize,
    pub guardian: usize,
    pub management: usize,
    pub strategist: usize,
    pub keeper: usize,
}

impl Default for AccountPool {
    fn default() -> Self {
        Self {
            user: 0,
            rewards: 1,
            guardian: 2,
            management: 3,
            strategist: 4,
            keeper: 5,
        }
    }
}

/// Parameters passed to `vault.addStrategy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyAllocation {
    /// Basis points of vault assets the strategy may borrow.
    pub debt_ratio: U256,
    pub min_debt_per_harvest: U256,
    pub max_debt_per_harvest: U256,
    /// Basis points.
    pub performance_fee: U256,
    /// Applied through `setDepositLimit` right after initialization.
    pub deposit_limit: U256,
}

impl Default for StrategyAllocation {
    fn default() -> Self {
        Self {
            debt_ratio: U256::from(10_000u64),
            min_debt_per_harvest: U256::ZERO,
            max_debt_per_harvest: U256::MAX,
            performance_fee: U256::from(1_000u64),
            deposit_limit: U256::MAX,
        }
    }
}

/// Chain-time choreography constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainTimeConfig {
    pub seconds_per_day: u64,
    pub blocks_to_mine: u64,
    pub known_cycle_duration_blocks: u64,
    pub rollover_ipfs_hash: String,
}

impl Default for ChainTimeConfig {
    fn default() -> Self {
        Self {
            seconds_per_day: ONE_DAY_SECS,
            blocks_to_mine: BLOCKS_PER_SIMULATED_DAY,
            known_cycle_duration_blocks: KNOWN_CYCLE_DURATION_BLOCKS,
            rollover_ipfs_hash: ROLLOVER_IPFS_HASH.to_string(),
        }
    }
}

/// Amounts moved while funding test accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FundingConfig {
    /// Whole tokens the `amount` fixture moves from the whale to the user.
    pub amount_whole_tokens: u64,
    /// Whole ETH the `weth_amount` fixture wraps.
    pub weth_whole_tokens: u64,
    /// ETH (in wei) granted to impersonated accounts so they can pay gas.
    pub impersonated_gas_balance_wei: U256,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            amount_whole_tokens: 10,
            weth_whole_tokens: 1,
            impersonated_gas_balance_wei: U256::from(10u64) * U256::from(10u64).pow(U256::from(18)),
        }
    }
}

/// Where compiled contracts are looked up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Package reference the vault implementation is resolved from.
    pub vault_package: String,
    pub vault_contract: String,
    /// Root of installed packages, laid out as `<org>/<repo>@<version>/`.
    pub packages_dir: PathBuf,
    /// Build output directories searched for the strategy, in order.
    pub build_dirs: Vec<PathBuf>,
    pub strategy_contract: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        let packages_dir = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".brownie").join("packages"))
            .unwrap_or_else(|_| PathBuf::from(".brownie/packages"));
        Self {
            vault_package: VAULT_PACKAGE.to_string(),
            vault_contract: "Vault".to_string(),
            packages_dir,
            build_dirs: vec![PathBuf::from("out"), PathBuf::from("build/contracts")],
            strategy_contract: "Strategy".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    pub relative_approx: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            relative_approx: RELATIVE_APPROX,
        }
    }
}

impl FixtureConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, FixtureError> {
        let config: FixtureConfig = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FixtureError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Load from `FIXTURES_CONFIG` (if set), then apply environment overrides
    /// and validate.
    pub fn load() -> Result<Self, FixtureError> {
        let mut config = match std::env::var("FIXTURES_CONFIG") {
            Ok(path) => Self::from_toml_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), FixtureError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ETH_RPC_URL").filter(|v| !v.is_empty()) {
            self.fork.fork_url = Some(url);
        }
        if let Some(url) = lookup("FORK_RPC_URL").filter(|v| !v.is_empty()) {
            self.fork.connect_url = Some(url);
        }
        if let Some(block) = lookup("FORK_BLOCK_NUMBER") {
            let block = block.parse::<u64>().map_err(|e| {
                FixtureError::ConfigError(format!("Invalid FORK_BLOCK_NUMBER '{block}': {e}"))
            })?;
            self.fork.fork_block_number = Some(block);
        }
        if let Some(dir) = lookup("FIXTURES_PACKAGES_DIR") {
            self.artifacts.packages_dir = PathBuf::from(dir);
        }
        if let Some(dirs) = lookup("FIXTURES_ARTIFACTS_DIR") {
            self.artifacts.build_dirs = dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(hash) = lookup("TOKEMAK_ROLLOVER_HASH").filter(|v| !v.is_empty()) {
            self.chain_time.rollover_ipfs_hash = hash;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FixtureError> {
        if self.fork.fork_url.is_none() && self.fork.connect_url.is_none() {
            return Err(FixtureError::ConfigError(
                "Either ETH_RPC_URL (fork upstream) or FORK_RPC_URL (running fork) must be set"
                    .into(),
            ));
        }
        if self.chain_time.blocks_to_mine <= self.chain_time.known_cycle_duration_blocks {
            return Err(FixtureError::ConfigError(format!(
                "blocks_to_mine ({}) must exceed the Tokemak cycle duration ({})",
                self.chain_time.blocks_to_mine, self.chain_time.known_cycle_duration_blocks
            )));
        }
        if !(self.tolerance.relative_approx > 0.0 && self.tolerance.relative_approx < 1.0) {
            return Err(FixtureError::ConfigError(format!(
                "relative_approx must be in (0, 1), got {}",
                self.tolerance.relative_approx
            )));
        }
        if self.chain_time.rollover_ipfs_hash.is_empty() {
            return Err(FixtureError::ConfigError("rollover_ipfs_hash is empty".into()));
        }
        Ok(())
    }
}
