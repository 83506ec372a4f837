use std::sync::Arc;

use tokemak_fixtures::fixtures::transact;
use tokemak_fixtures::{DeployedStrategy, FixtureConfig, FixtureError, Fixtures, ForkChain, FundedAmount, TimeAdvance};

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Setup,
    OneDay,
    Withdraw,
}

impl Scenario {
    fn from_env() -> Result<Self, FixtureError> {
        match std::env::var("FIXTURES_SCENARIO").as_deref() {
            Err(_) | Ok("") | Ok("setup") => Ok(Self::Setup),
            Ok("one-day") => Ok(Self::OneDay),
            Ok("withdraw") => Ok(Self::Withdraw),
            Ok(other) => Err(FixtureError::ConfigError(format!(
                "FIXTURES_SCENARIO must be setup, one-day or withdraw, got {other}"
            ))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();
    dotenvy::dotenv().ok();

    let scenario = Scenario::from_env()?;
    let with_swapper = std::env::var("FIXTURES_WITH_SWAPPER")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let config = FixtureConfig::load()?;
    let chain = ForkChain::from_config(&config.fork)?;
    tracing::info!(endpoint = chain.endpoint(), ?scenario, "Fork ready");

    let fixtures = Fixtures::new(chain, Arc::new(config));

    // ── 1. Accounts ──────────────────────────────────────────────────────────
    tracing::info!(
        gov = %fixtures.gov().await?,
        user = %fixtures.user().await?,
        strategist = %fixtures.strategist().await?,
        keeper = %fixtures.keeper().await?,
        rollover = %fixtures.account_with_tokemak_rollover_role().await?,
        "Accounts"
    );

    // ── 2. Funding and deployments ───────────────────────────────────────────
    let funded = fixtures.amount().await?;
    let vault = fixtures.vault().await?;
    let strategy = fixtures.strategy().await?;
    if with_swapper {
        fixtures.sushi_swapper().await?;
    }
    tracing::info!(
        vault = %vault.address,
        strategy = %strategy.address,
        amount = %funded.amount,
        "Fixture set built"
    );

    // ── 3. Scenario ──────────────────────────────────────────────────────────
    let utils = fixtures.utils().await?;
    let advance = match scenario {
        Scenario::Setup => {
            let covered = utils.check_cycle_coverage().await?;
            tracing::info!(covered, "Setup complete");
            return Ok(());
        }
        Scenario::OneDay => {
            utils.ensure_cycle_coverage().await?;
            utils.mock_one_day_passed().await?
        }
        Scenario::Withdraw => {
            utils.ensure_cycle_coverage().await?;
            invest(&fixtures, &strategy, &funded).await?;
            utils
                .make_funds_withdrawable_from_tokemak(&strategy, funded.amount)
                .await?
        }
    };
    report(&advance);
    Ok(())
}

/// Deposit the funded amount and harvest it into Tokemak so there is
/// something to withdraw.
async fn invest(
    fixtures: &Fixtures,
    strategy: &DeployedStrategy,
    funded: &FundedAmount,
) -> Result<(), FixtureError> {
    let user = fixtures.user().await?;
    let keeper = fixtures.keeper().await?;

    transact(
        "user: approve vault",
        fixtures
            .token()
            .approve(strategy.vault, funded.amount)
            .from(user.address),
    )
    .await?;
    transact(
        "user: vault.deposit",
        fixtures
            .vault_at(strategy.vault)
            .deposit(funded.amount, user.address)
            .from(user.address),
    )
    .await?;
    transact(
        "keeper: harvest",
        fixtures
            .strategy_at(strategy.address)
            .harvest()
            .from(keeper.address),
    )
    .await?;

    let invested = fixtures
        .strategy_at(strategy.address)
        .estimatedTotalAssets()
        .call()
        .await?;
    tracing::info!(%invested, "Strategy invested");
    Ok(())
}

fn report(advance: &TimeAdvance) {
    tracing::info!(
        from_block = advance.before.block_number,
        to_block = advance.after.block_number,
        blocks = advance.blocks_elapsed(),
        seconds = advance.seconds_elapsed(),
        rollover_tx = %advance.rollover_tx,
        "Time advanced"
    );
}
