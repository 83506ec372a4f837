use alloy::primitives::{Address, U256};

/// How the fork node is allowed to send from an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountControl {
    /// One of the node's dev accounts.
    Unlocked,
    /// External address forced through `anvil_impersonateAccount`.
    Impersonated,
}

/// A test actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub control: AccountControl,
}

impl Account {
    pub fn unlocked(address: Address) -> Self {
        Self {
            address,
            control: AccountControl::Unlocked,
        }
    }

    pub fn impersonated(address: Address) -> Self {
        Self {
            address,
            control: AccountControl::Impersonated,
        }
    }

    pub fn is_impersonated(&self) -> bool {
        self.control == AccountControl::Impersonated
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.control {
            AccountControl::Unlocked => write!(f, "{}", self.address),
            AccountControl::Impersonated => write!(f, "{} (impersonated)", self.address),
        }
    }
}

/// A freshly deployed vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedVault {
    pub address: Address,
    pub token: Address,
    pub governance: Address,
    pub management: Address,
}

/// A freshly deployed strategy and the actors wired to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedStrategy {
    pub address: Address,
    pub vault: Address,
    pub strategist: Address,
    pub keeper: Address,
    /// `None` for the standalone variant.
    pub trade_factory: Option<Address>,
    /// Whether the vault allocated debt to this strategy.
    pub attached: bool,
}

/// Amount the user was funded with by a funding fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundedAmount {
    pub token: Address,
    pub recipient: Address,
    pub amount: U256,
    pub decimals: u8,
}

/// `whole * 10^decimals`.
pub fn scaled_amount(whole: u64, decimals: u8) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(decimals))
}
