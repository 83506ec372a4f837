use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Node error: {0}")]
    NodeError(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Contract call failed: {0}")]
    ContractError(String),

    #[error("Transaction reverted: {step} (tx {tx_hash})")]
    Reverted { step: String, tx_hash: String },

    #[error("Insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: String, need: String },

    #[error("Account pool exhausted: index {index} requested, node exposes {available}")]
    MissingAccount { index: usize, available: usize },

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<alloy::transports::TransportError> for FixtureError {
    fn from(e: alloy::transports::TransportError) -> Self {
        FixtureError::RpcError(e.to_string())
    }
}

impl From<alloy::contract::Error> for FixtureError {
    fn from(e: alloy::contract::Error) -> Self {
        FixtureError::ContractError(e.to_string())
    }
}

impl From<alloy::providers::PendingTransactionError> for FixtureError {
    fn from(e: alloy::providers::PendingTransactionError) -> Self {
        FixtureError::RpcError(e.to_string())
    }
}

impl From<alloy::node_bindings::NodeError> for FixtureError {
    fn from(e: alloy::node_bindings::NodeError) -> Self {
        FixtureError::NodeError(e.to_string())
    }
}

impl From<serde_json::Error> for FixtureError {
    fn from(e: serde_json::Error) -> Self {
        FixtureError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for FixtureError {
    fn from(e: toml::de::Error) -> Self {
        FixtureError::ConfigError(e.to_string())
    }
}

impl From<std::io::Error> for FixtureError {
    fn from(e: std::io::Error) -> Self {
        FixtureError::IoError(e.to_string())
    }
}
