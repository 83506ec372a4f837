//! Chain-time control for Tokemak's timelocks.
//!
//! Tokemak only releases requested withdrawals after a rollover, and a
//! rollover only happens once a cycle has elapsed. On a fork neither
//! happens by itself, so [`ChainTime`] moves the clock forward, mines past
//! the cycle and completes the rollover from the privileged account.

use alloy::primitives::{Address, B256, U256};

use crate::chain::{ChainPoint, ForkChain};
use crate::config::ChainTimeConfig;
use crate::contracts::{ITokemakManager, ITokemakStrategy};
use crate::error::FixtureError;
use crate::fixtures::transact;
use crate::types::{Account, DeployedStrategy};

/// Chain state before and after a simulated day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAdvance {
    pub before: ChainPoint,
    pub after: ChainPoint,
    pub rollover_tx: B256,
}

impl TimeAdvance {
    pub fn blocks_elapsed(&self) -> u64 {
        self.after.block_number.saturating_sub(self.before.block_number)
    }

    pub fn seconds_elapsed(&self) -> u64 {
        self.after.timestamp.saturating_sub(self.before.timestamp)
    }

    /// Whether at least the configured day and block count have passed.
    pub fn covers(&self, config: &ChainTimeConfig) -> bool {
        self.blocks_elapsed() >= config.blocks_to_mine
            && self.seconds_elapsed() >= config.seconds_per_day
    }
}

/// Bound to one manager and one rollover-role account.
#[derive(Debug, Clone)]
pub struct ChainTime {
    chain: ForkChain,
    tokemak_manager: Address,
    rollover_account: Account,
    config: ChainTimeConfig,
}

impl ChainTime {
    pub fn new(
        chain: ForkChain,
        tokemak_manager: Address,
        rollover_account: Account,
        config: ChainTimeConfig,
    ) -> Self {
        Self {
            chain,
            tokemak_manager,
            rollover_account,
            config,
        }
    }

    pub fn config(&self) -> &ChainTimeConfig {
        &self.config
    }

    /// Advance one day, mine past the cycle and complete the rollover.
    ///
    /// Fails if the rollover reverts, for instance because the cycle was
    /// already rolled over or the caller lost its role.
    pub async fn mock_one_day_passed(&self) -> Result<TimeAdvance, FixtureError> {
        let before = self.chain.latest().await?;

        self.chain.increase_time(self.config.seconds_per_day).await?;
        self.chain.mine(self.config.blocks_to_mine).await?;

        let manager = ITokemakManager::new(self.tokemak_manager, self.chain.provider().clone());
        let receipt = transact(
            "completeRollover",
            manager
                .completeRollover(self.config.rollover_ipfs_hash.clone())
                .from(self.rollover_account.address),
        )
        .await?;

        let after = self.chain.latest().await?;
        let advance = TimeAdvance {
            before,
            after,
            rollover_tx: receipt.transaction_hash,
        };
        tracing::info!(
            blocks = advance.blocks_elapsed(),
            seconds = advance.seconds_elapsed(),
            block = after.block_number,
            "Simulated one day and completed rollover"
        );
        Ok(advance)
    }

    /// Request a withdrawal on the strategy, then wait out the one-day
    /// withdrawal timelock.
    pub async fn make_funds_withdrawable_from_tokemak(
        &self,
        strategy: &DeployedStrategy,
        amount: U256,
    ) -> Result<TimeAdvance, FixtureError> {
        let handle = ITokemakStrategy::new(strategy.address, self.chain.provider().clone());
        transact(
            "strategy: requestWithdrawal",
            handle.requestWithdrawal(amount).from(strategy.strategist),
        )
        .await?;
        tracing::info!(strategy = %strategy.address, %amount, "Requested Tokemak withdrawal");

        self.mock_one_day_passed().await
    }

    /// Current cycle duration in blocks, read from the manager.
    pub async fn cycle_duration(&self) -> Result<u64, FixtureError> {
        let manager = ITokemakManager::new(self.tokemak_manager, self.chain.provider().clone());
        let duration = manager.getCycleDuration().call().await?;
        u64::try_from(duration).map_err(|_| {
            FixtureError::ContractError(format!("cycle duration {duration} does not fit in u64"))
        })
    }

    /// Check that one simulated day still mines past a full cycle. Logs a
    /// warning and returns `false` when the on-chain duration has grown.
    pub async fn check_cycle_coverage(&self) -> Result<bool, FixtureError> {
        let duration = self.cycle_duration().await?;
        if duration != self.config.known_cycle_duration_blocks {
            tracing::warn!(
                on_chain = duration,
                known = self.config.known_cycle_duration_blocks,
                "Tokemak cycle duration changed"
            );
        }
        let covered = self.config.blocks_to_mine > duration;
        if !covered {
            tracing::warn!(
                on_chain = duration,
                mined = self.config.blocks_to_mine,
                "Simulated day no longer covers a full Tokemak cycle"
            );
        }
        Ok(covered)
    }

    /// Like [`check_cycle_coverage`](Self::check_cycle_coverage), but a
    /// simulated day too short for the on-chain cycle is a config error.
    pub async fn ensure_cycle_coverage(&self) -> Result<(), FixtureError> {
        if self.check_cycle_coverage().await? {
            return Ok(());
        }
        Err(FixtureError::ConfigError(format!(
            "blocks_to_mine ({}) does not exceed the on-chain cycle duration",
            self.config.blocks_to_mine
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_node::{GENESIS_BLOCK, TestNode};
    use alloy::sol_types::SolCall;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    async fn chain_time_with_cycle(server: &MockServer, duration: u64) -> ChainTime {
        let word = format!("0x{}", hex::encode(U256::from(duration).to_be_bytes::<32>()));
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_call"})))
            .respond_with(move |req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": word,
                }))
            })
            .mount(server)
            .await;

        let config = crate::config::FixtureConfig::default();
        ChainTime::new(
            ForkChain::connect(&server.uri()).unwrap(),
            config.addresses.tokemak_manager,
            Account::impersonated(config.addresses.rollover_role_holder),
            config.chain_time,
        )
    }

    #[tokio::test]
    async fn test_cycle_duration_read_from_manager() {
        let server = MockServer::start().await;
        let chain_time = chain_time_with_cycle(&server, 6_200).await;
        assert_eq!(chain_time.cycle_duration().await.unwrap(), 6_200);
        assert!(chain_time.check_cycle_coverage().await.unwrap());
    }

    #[tokio::test]
    async fn test_cycle_longer_than_simulated_day() {
        let server = MockServer::start().await;
        let chain_time = chain_time_with_cycle(&server, 6_400).await;
        assert!(!chain_time.check_cycle_coverage().await.unwrap());
        let err = chain_time.ensure_cycle_coverage().await.unwrap_err();
        assert!(matches!(err, FixtureError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_ensure_cycle_coverage_accepts_known_cycle() {
        let server = MockServer::start().await;
        let chain_time = chain_time_with_cycle(&server, 6_200).await;
        chain_time.ensure_cycle_coverage().await.unwrap();
    }

    fn chain_time_on(node: &TestNode) -> ChainTime {
        let config = crate::config::FixtureConfig::default();
        ChainTime::new(
            node.chain(),
            config.addresses.tokemak_manager,
            Account::impersonated(config.addresses.rollover_role_holder),
            config.chain_time,
        )
    }

    fn strategy_on(node: &TestNode) -> DeployedStrategy {
        DeployedStrategy {
            address: Address::repeat_byte(0x5a),
            vault: Address::repeat_byte(0x7a),
            strategist: node.account(4),
            keeper: node.account(5),
            trade_factory: None,
            attached: true,
        }
    }

    #[tokio::test]
    async fn test_mock_one_day_passed_advances_then_rolls_over() {
        let node = TestNode::start().await;
        let chain_time = chain_time_on(&node);
        let defaults = crate::config::FixtureConfig::default().addresses;

        let advance = chain_time.mock_one_day_passed().await.unwrap();

        let requests = node.requests();
        let methods: Vec<&str> = requests.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, ["evm_increaseTime", "anvil_mine", "eth_sendTransaction"]);
        assert_eq!(requests[0].1, json!([86400]));
        assert_eq!(requests[1].1, json!(["0x189c"]));

        let sent = node.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, defaults.rollover_role_holder);
        assert_eq!(sent[0].to, Some(defaults.tokemak_manager));
        let call = ITokemakManager::completeRolloverCall::abi_decode(&sent[0].input).unwrap();
        assert_eq!(call.rewardsIpfsHash, crate::config::ROLLOVER_IPFS_HASH);

        assert_eq!(advance.rollover_tx, sent[0].hash);
        assert_eq!(advance.before.block_number, GENESIS_BLOCK);
        assert_eq!(advance.blocks_elapsed(), 6_301);
        assert!(advance.seconds_elapsed() >= 86_400);
        assert!(advance.covers(chain_time.config()));
    }

    #[tokio::test]
    async fn test_reverted_rollover_fails() {
        let node = TestNode::start().await;
        node.revert_on(ITokemakManager::completeRolloverCall::SELECTOR);
        let chain_time = chain_time_on(&node);

        let err = chain_time.mock_one_day_passed().await.unwrap_err();
        let sent = node.sent();
        match err {
            FixtureError::Reverted { step, tx_hash } => {
                assert_eq!(step, "completeRollover");
                assert_eq!(tx_hash, sent[0].hash.to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_withdrawal_requested_by_strategist_before_rollover() {
        let node = TestNode::start().await;
        let chain_time = chain_time_on(&node);
        let strategy = strategy_on(&node);
        let amount = U256::from(5u64) * U256::from(10u64).pow(U256::from(18));

        let advance = chain_time
            .make_funds_withdrawable_from_tokemak(&strategy, amount)
            .await
            .unwrap();

        let sent = node.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].from, strategy.strategist);
        assert_eq!(sent[0].to, Some(strategy.address));
        let request = ITokemakStrategy::requestWithdrawalCall::abi_decode(&sent[0].input).unwrap();
        assert_eq!(request.amount, amount);
        assert_eq!(sent[1].selector(), ITokemakManager::completeRolloverCall::SELECTOR);
        assert_eq!(advance.rollover_tx, sent[1].hash);

        // the request lands before the clock moves
        let methods = node.methods();
        assert_eq!(
            methods,
            ["eth_sendTransaction", "evm_increaseTime", "anvil_mine", "eth_sendTransaction"]
        );
    }

    #[tokio::test]
    async fn test_rejected_withdrawal_request_skips_time_advance() {
        let node = TestNode::start().await;
        node.revert_on(ITokemakStrategy::requestWithdrawalCall::SELECTOR);
        let chain_time = chain_time_on(&node);

        let err = chain_time
            .make_funds_withdrawable_from_tokemak(&strategy_on(&node), U256::from(1u64))
            .await
            .unwrap_err();
        assert!(
            matches!(err, FixtureError::Reverted { ref step, .. } if step == "strategy: requestWithdrawal")
        );
        assert!(!node.methods().iter().any(|m| m == "evm_increaseTime"));
        assert_eq!(node.sent().len(), 1);
    }

    fn point(block_number: u64, timestamp: u64) -> ChainPoint {
        ChainPoint {
            block_number,
            timestamp,
        }
    }

    #[test]
    fn test_time_advance_covers_defaults() {
        let config = ChainTimeConfig::default();
        let advance = TimeAdvance {
            before: point(14_000_000, 1_640_000_000),
            // 6300 mined blocks plus the rollover block
            after: point(14_006_301, 1_640_000_000 + 86_400 + 6_300),
            rollover_tx: B256::ZERO,
        };
        assert_eq!(advance.blocks_elapsed(), 6_301);
        assert!(advance.seconds_elapsed() >= 86_400);
        assert!(advance.covers(&config));
    }

    #[test]
    fn test_time_advance_short_on_blocks() {
        let config = ChainTimeConfig::default();
        let advance = TimeAdvance {
            before: point(100, 0),
            after: point(6_299, 86_400),
            rollover_tx: B256::ZERO,
        };
        assert!(!advance.covers(&config));
    }

    #[test]
    fn test_time_advance_short_on_time() {
        let config = ChainTimeConfig::default();
        let advance = TimeAdvance {
            before: point(0, 1_000),
            after: point(7_000, 1_000 + 86_399),
            rollover_tx: B256::ZERO,
        };
        assert!(!advance.covers(&config));
    }

    #[test]
    fn test_time_advance_never_underflows() {
        let advance = TimeAdvance {
            before: point(10, 10),
            after: point(5, 5),
            rollover_tx: B256::ZERO,
        };
        assert_eq!(advance.blocks_elapsed(), 0);
        assert_eq!(advance.seconds_elapsed(), 0);
    }
}
