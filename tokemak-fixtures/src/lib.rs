pub mod approx;
pub mod artifacts;
pub mod chain;
pub mod chain_time;
pub mod config;
pub mod contracts;
pub mod error;
pub mod fixtures;
pub mod types;

#[cfg(test)]
mod test_node;

pub use chain::ForkChain;
pub use chain_time::{ChainTime, TimeAdvance};
pub use config::FixtureConfig;
pub use error::FixtureError;
pub use fixtures::Fixtures;
pub use types::*;
