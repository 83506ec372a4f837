use std::sync::{Arc, Once};

use tokemak_fixtures::artifacts::ArtifactStore;
use tokemak_fixtures::{FixtureConfig, Fixtures, ForkChain};

static LOG_INIT: Once = Once::new();

pub fn setup_log() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Load config from `.env` / the environment.
///
/// Returns `None` (graceful skip) when neither `ETH_RPC_URL` nor
/// `FORK_RPC_URL` is set.
pub fn load_config() -> Option<FixtureConfig> {
    dotenv::dotenv().ok();
    match FixtureConfig::load() {
        Ok(config) => Some(config),
        Err(err) => {
            eprintln!("Skipping test: {err}");
            None
        }
    }
}

/// Spawn (or connect to) a fork and wrap it in a fresh fixture set.
pub async fn fork_fixtures() -> Option<Fixtures> {
    setup_log();
    let config = load_config()?;
    let chain = ForkChain::from_config(&config.fork).expect("Failed to start fork");
    Some(Fixtures::new(chain, Arc::new(config)))
}

/// Like [`fork_fixtures`], but also skips when the vault package or the
/// strategy build output is missing.
pub async fn fork_fixtures_with_artifacts() -> Option<Fixtures> {
    let fixtures = fork_fixtures().await?;
    let store = ArtifactStore::new(fixtures.config().artifacts.clone());
    if let Err(err) = store.vault_bytecode().and_then(|_| store.strategy_bytecode()) {
        eprintln!("Skipping test: {err}");
        return None;
    }
    Some(fixtures)
}
