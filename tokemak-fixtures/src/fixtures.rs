//! Fixture provider.
//!
//! A [`Fixtures`] value models one test invocation: every fixture is built
//! on first request and memoized, so `strategy()` and a later `vault()`
//! hand back the same deployment. Dropping the value and reverting the fork
//! gives the next test a clean slate.
//!
//! Every step awaits its receipt before the next one starts. A revert
//! anywhere aborts the fixture with the step name in the error; steps that
//! already landed stay on chain.

use std::sync::Arc;

use alloy::contract::{CallBuilder, CallDecoder};
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol_types::SolValue;
use tokio::sync::OnceCell;

use crate::approx;
use crate::artifacts::ArtifactStore;
use crate::chain::{ForkChain, NodeProvider, ensure_success};
use crate::chain_time::ChainTime;
use crate::config::FixtureConfig;
use crate::contracts::{IERC20, ITokemakManager, ITokemakPool, ITokemakStrategy, ITradeFactory, IYearnVault};
use crate::error::FixtureError;
use crate::types::{Account, DeployedStrategy, DeployedVault, FundedAmount, scaled_amount};

pub type Erc20 = IERC20::IERC20Instance<NodeProvider>;
pub type YearnVault = IYearnVault::IYearnVaultInstance<NodeProvider>;
pub type TokemakStrategy = ITokemakStrategy::ITokemakStrategyInstance<NodeProvider>;
pub type TradeFactory = ITradeFactory::ITradeFactoryInstance<NodeProvider>;
pub type TokemakManager = ITokemakManager::ITokemakManagerInstance<NodeProvider>;
pub type TokemakPool = ITokemakPool::ITokemakPoolInstance<NodeProvider>;

/// Send a contract call and require a successful receipt.
pub async fn transact<P: Provider, D: CallDecoder>(
    step: &str,
    call: CallBuilder<P, D>,
) -> Result<TransactionReceipt, FixtureError> {
    let receipt = call.send().await?.get_receipt().await?;
    ensure_success(step, &receipt)?;
    tracing::debug!(step, tx = %receipt.transaction_hash, "Transaction mined");
    Ok(receipt)
}

pub struct Fixtures {
    chain: ForkChain,
    config: Arc<FixtureConfig>,
    artifacts: ArtifactStore,

    pool: OnceCell<Vec<Address>>,
    gov: OnceCell<Account>,
    weth_whale: OnceCell<Account>,
    toke_whale: OnceCell<Account>,
    rollover_role: OnceCell<Account>,
    ymechs_safe: OnceCell<Account>,

    amount: OnceCell<FundedAmount>,
    weth_amount: OnceCell<FundedAmount>,
    vault: OnceCell<DeployedVault>,
    sushi_swapper: OnceCell<Address>,
    strategy: OnceCell<DeployedStrategy>,
    standalone_strategy: OnceCell<DeployedStrategy>,
}

impl Fixtures {
    pub fn new(chain: ForkChain, config: Arc<FixtureConfig>) -> Self {
        let artifacts = ArtifactStore::new(config.artifacts.clone());
        Self {
            chain,
            config,
            artifacts,
            pool: OnceCell::new(),
            gov: OnceCell::new(),
            weth_whale: OnceCell::new(),
            toke_whale: OnceCell::new(),
            rollover_role: OnceCell::new(),
            ymechs_safe: OnceCell::new(),
            amount: OnceCell::new(),
            weth_amount: OnceCell::new(),
            vault: OnceCell::new(),
            sushi_swapper: OnceCell::new(),
            strategy: OnceCell::new(),
            standalone_strategy: OnceCell::new(),
        }
    }

    pub fn chain(&self) -> &ForkChain {
        &self.chain
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    fn provider(&self) -> NodeProvider {
        self.chain.provider().clone()
    }

    // ── Accounts ────────────────────────────────────────────────────────────

    async fn pool_account(&self, index: usize) -> Result<Account, FixtureError> {
        let pool = self
            .pool
            .get_or_try_init(|| async move { self.chain.accounts().await })
            .await?;
        pool.get(index)
            .copied()
            .map(Account::unlocked)
            .ok_or(FixtureError::MissingAccount {
                index,
                available: pool.len(),
            })
    }

    /// Impersonate `address` and make sure it can pay for gas.
    async fn force(&self, cell: &OnceCell<Account>, address: Address) -> Result<Account, FixtureError> {
        cell.get_or_try_init(|| async move {
            self.chain.impersonate(address).await?;
            let floor = self.config.funding.impersonated_gas_balance_wei;
            if self.chain.eth_balance(address).await? < floor {
                self.chain.set_balance(address, floor).await?;
            }
            Ok(Account::impersonated(address))
        })
        .await
        .copied()
    }

    pub async fn gov(&self) -> Result<Account, FixtureError> {
        self.force(&self.gov, self.config.addresses.gov).await
    }

    pub async fn user(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.user).await
    }

    pub async fn rewards(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.rewards).await
    }

    pub async fn guardian(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.guardian).await
    }

    pub async fn management(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.management).await
    }

    pub async fn strategist(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.strategist).await
    }

    pub async fn keeper(&self) -> Result<Account, FixtureError> {
        self.pool_account(self.config.accounts.keeper).await
    }

    pub async fn weth_whale(&self) -> Result<Account, FixtureError> {
        self.force(&self.weth_whale, self.config.addresses.weth_whale).await
    }

    pub async fn toke_whale(&self) -> Result<Account, FixtureError> {
        self.force(&self.toke_whale, self.config.addresses.toke_whale).await
    }

    /// Account allowed to call `completeRollover` on the Tokemak manager.
    pub async fn account_with_tokemak_rollover_role(&self) -> Result<Account, FixtureError> {
        self.force(&self.rollover_role, self.config.addresses.rollover_role_holder)
            .await
    }

    /// The yMechs multisig, impersonated so it can administer the trade factory.
    pub async fn ymechs_safe_account(&self) -> Result<Account, FixtureError> {
        self.force(&self.ymechs_safe, self.config.addresses.ymechs_safe)
            .await
    }

    // ── Contract handles ────────────────────────────────────────────────────

    /// The ERC-20 the vault and strategy operate on.
    pub fn token(&self) -> Erc20 {
        IERC20::new(self.config.addresses.token, self.provider())
    }

    pub fn weth(&self) -> Erc20 {
        IERC20::new(self.config.addresses.weth, self.provider())
    }

    pub fn tweth(&self) -> Erc20 {
        IERC20::new(self.config.addresses.tokemak_weth_pool, self.provider())
    }

    pub fn toke_token(&self) -> Erc20 {
        IERC20::new(self.config.addresses.toke_token, self.provider())
    }

    pub fn tokemak_manager(&self) -> TokemakManager {
        ITokemakManager::new(self.config.addresses.tokemak_manager, self.provider())
    }

    pub fn tokemak_weth_pool(&self) -> TokemakPool {
        ITokemakPool::new(self.config.addresses.tokemak_weth_pool, self.provider())
    }

    pub fn trade_factory(&self) -> TradeFactory {
        ITradeFactory::new(self.config.addresses.trade_factory, self.provider())
    }

    pub fn ymechs_safe(&self) -> Address {
        self.config.addresses.ymechs_safe
    }

    pub fn vault_at(&self, address: Address) -> YearnVault {
        IYearnVault::new(address, self.provider())
    }

    pub fn strategy_at(&self, address: Address) -> TokemakStrategy {
        ITokemakStrategy::new(address, self.provider())
    }

    // ── Funding ─────────────────────────────────────────────────────────────

    /// Move `10 * 10^decimals` of the token from the wETH whale to the user.
    pub async fn amount(&self) -> Result<FundedAmount, FixtureError> {
        self.amount
            .get_or_try_init(|| async move {
                let token = self.token();
                let user = self.user().await?;
                let whale = self.weth_whale().await?;

                let decimals = token.decimals().call().await?;
                let amount = scaled_amount(self.config.funding.amount_whole_tokens, decimals);

                let whale_balance = token.balanceOf(whale.address).call().await?;
                if whale_balance < amount {
                    return Err(FixtureError::InsufficientBalance {
                        have: whale_balance.to_string(),
                        need: amount.to_string(),
                    });
                }

                transact(
                    "amount: whale transfer",
                    token.transfer(user.address, amount).from(whale.address),
                )
                .await?;
                tracing::info!(%amount, user = %user.address, "Funded user from whale");

                Ok(FundedAmount {
                    token: *token.address(),
                    recipient: user.address,
                    amount,
                    decimals,
                })
            })
            .await
            .copied()
    }

    /// The user wraps `1 * 10^decimals` ETH into wETH.
    pub async fn weth_amount(&self) -> Result<FundedAmount, FixtureError> {
        self.weth_amount
            .get_or_try_init(|| async move {
                let weth = self.weth();
                let user = self.user().await?;
                let decimals = weth.decimals().call().await?;
                let amount = scaled_amount(self.config.funding.weth_whole_tokens, decimals);

                let have = self.chain.eth_balance(user.address).await?;
                if have < amount {
                    return Err(FixtureError::InsufficientBalance {
                        have: have.to_string(),
                        need: amount.to_string(),
                    });
                }

                let tx = TransactionRequest::default()
                    .from(user.address)
                    .to(*weth.address())
                    .value(amount);
                self.chain.submit("weth_amount: wrap", tx).await?;
                tracing::info!(%amount, user = %user.address, "Wrapped ETH");

                Ok(FundedAmount {
                    token: *weth.address(),
                    recipient: user.address,
                    amount,
                    decimals,
                })
            })
            .await
            .copied()
    }

    // ── Deployments ─────────────────────────────────────────────────────────

    /// Deploy and initialize a fresh vault for the token.
    pub async fn vault(&self) -> Result<DeployedVault, FixtureError> {
        self.vault
            .get_or_try_init(|| async move {
                let gov = self.gov().await?;
                let rewards = self.rewards().await?;
                let guardian = self.guardian().await?;
                let management = self.management().await?;
                let token = self.config.addresses.token;

                let bytecode = self.artifacts.vault_bytecode()?;
                let address = self
                    .chain
                    .deploy("vault: deploy", guardian.address, bytecode, Vec::new())
                    .await?;
                let vault = self.vault_at(address);

                transact(
                    "vault: initialize",
                    vault
                        .initialize(
                            token,
                            gov.address,
                            rewards.address,
                            String::new(),
                            String::new(),
                            guardian.address,
                            management.address,
                        )
                        .from(gov.address),
                )
                .await?;
                transact(
                    "vault: setDepositLimit",
                    vault
                        .setDepositLimit(self.config.allocation.deposit_limit)
                        .from(gov.address),
                )
                .await?;
                transact(
                    "vault: setManagement",
                    vault.setManagement(management.address).from(gov.address),
                )
                .await?;

                tracing::info!(vault = %address, %token, "Vault ready");
                Ok(DeployedVault {
                    address,
                    token,
                    governance: gov.address,
                    management: management.address,
                })
            })
            .await
            .copied()
    }

    /// Allow-list the sushi swapper on the trade factory, as the yMechs safe.
    pub async fn sushi_swapper(&self) -> Result<Address, FixtureError> {
        self.sushi_swapper
            .get_or_try_init(|| async move {
                let safe = self.ymechs_safe_account().await?;
                let swapper = self.config.addresses.sushi_swapper;
                transact(
                    "sushi_swapper: addSwappers",
                    self.trade_factory()
                        .addSwappers(vec![swapper])
                        .from(safe.address),
                )
                .await?;
                tracing::info!(%swapper, "Swapper registered on trade factory");
                Ok(swapper)
            })
            .await
            .copied()
    }

    /// Deploy the strategy, attach it to the vault and grant it the trade
    /// factory's strategy role.
    pub async fn strategy(&self) -> Result<DeployedStrategy, FixtureError> {
        self.strategy
            .get_or_try_init(|| async move {
                let vault = self.vault().await?;
                let strategist = self.strategist().await?;
                let keeper = self.keeper().await?;
                let gov = self.gov().await?;
                let safe = self.ymechs_safe_account().await?;
                let trade_factory = self.trade_factory();
                let trade_factory_address = *trade_factory.address();

                let address = self
                    .deploy_strategy(
                        "strategy: deploy",
                        strategist.address,
                        vault.address,
                        trade_factory_address,
                    )
                    .await?;

                transact(
                    "strategy: setKeeper",
                    self.strategy_at(address)
                        .setKeeper(keeper.address)
                        .from(gov.address),
                )
                .await?;

                let allocation = &self.config.allocation;
                transact(
                    "strategy: vault.addStrategy",
                    self.vault_at(vault.address)
                        .addStrategy(
                            address,
                            allocation.debt_ratio,
                            allocation.min_debt_per_harvest,
                            allocation.max_debt_per_harvest,
                            allocation.performance_fee,
                        )
                        .from(gov.address),
                )
                .await?;

                let role = trade_factory.STRATEGY().call().await?;
                transact(
                    "strategy: tradeFactory.grantRole",
                    trade_factory.grantRole(role, address).from(safe.address),
                )
                .await?;

                tracing::info!(strategy = %address, vault = %vault.address, "Strategy attached");
                Ok(DeployedStrategy {
                    address,
                    vault: vault.address,
                    strategist: strategist.address,
                    keeper: keeper.address,
                    trade_factory: Some(trade_factory_address),
                    attached: true,
                })
            })
            .await
            .copied()
    }

    /// Deploy a strategy with no trade factory and no debt allocation.
    pub async fn standalone_strategy(&self) -> Result<DeployedStrategy, FixtureError> {
        self.standalone_strategy
            .get_or_try_init(|| async move {
                let vault = self.vault().await?;
                let strategist = self.strategist().await?;
                let keeper = self.keeper().await?;

                let address = self
                    .deploy_strategy(
                        "standalone_strategy: deploy",
                        strategist.address,
                        vault.address,
                        Address::ZERO,
                    )
                    .await?;

                transact(
                    "standalone_strategy: setKeeper",
                    self.strategy_at(address)
                        .setKeeper(keeper.address)
                        .from(strategist.address),
                )
                .await?;

                tracing::info!(strategy = %address, "Standalone strategy ready");
                Ok(DeployedStrategy {
                    address,
                    vault: vault.address,
                    strategist: strategist.address,
                    keeper: keeper.address,
                    trade_factory: None,
                    attached: false,
                })
            })
            .await
            .copied()
    }

    async fn deploy_strategy(
        &self,
        step: &str,
        strategist: Address,
        vault: Address,
        trade_factory: Address,
    ) -> Result<Address, FixtureError> {
        let bytecode = self.artifacts.strategy_bytecode()?;
        let args = (vault, trade_factory).abi_encode_params();
        self.chain.deploy(step, strategist, bytecode, args).await
    }

    // ── Utilities ───────────────────────────────────────────────────────────

    pub fn relative_approx(&self) -> f64 {
        self.config.tolerance.relative_approx
    }

    /// Compare amounts with the configured relative tolerance.
    pub fn approx_eq(&self, actual: U256, expected: U256) -> bool {
        approx::approx_eq(actual, expected, self.relative_approx())
    }

    /// Chain-time helper bound to the manager and the rollover-role account.
    pub async fn utils(&self) -> Result<ChainTime, FixtureError> {
        let rollover = self.account_with_tokemak_rollover_role().await?;
        Ok(ChainTime::new(
            self.chain.clone(),
            self.config.addresses.tokemak_manager,
            rollover,
            self.config.chain_time.clone(),
        ))
    }
}
