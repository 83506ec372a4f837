//! Solidity bindings for every contract the fixtures touch.
//!
//! Only the narrow surface the fixtures call is declared; the contracts
//! themselves are external (mainnet deployments or compiled artifacts).

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Yearn v2 vault (0.4.x).
    #[sol(rpc)]
    interface IYearnVault {
        struct StrategyParams {
            uint256 performanceFee;
            uint256 activation;
            uint256 debtRatio;
            uint256 minDebtPerHarvest;
            uint256 maxDebtPerHarvest;
            uint256 lastReport;
            uint256 totalDebt;
            uint256 totalGain;
            uint256 totalLoss;
        }

        function initialize(
            address token, address governance, address rewards,
            string calldata nameOverride, string calldata symbolOverride,
            address guardian, address management
        ) external;
        function setDepositLimit(uint256 limit) external;
        function setManagement(address management) external;
        function deposit(uint256 amount, address recipient) external returns (uint256);
        function addStrategy(
            address strategy, uint256 debtRatio, uint256 minDebtPerHarvest,
            uint256 maxDebtPerHarvest, uint256 performanceFee
        ) external;
        function token() external view returns (address);
        function governance() external view returns (address);
        function management() external view returns (address);
        function guardian() external view returns (address);
        function depositLimit() external view returns (uint256);
        function strategies(address strategy) external view returns (StrategyParams memory);
    }

    #[sol(rpc)]
    interface ITokemakStrategy {
        function keeper() external view returns (address);
        function strategist() external view returns (address);
        function estimatedTotalAssets() external view returns (uint256);
        function setKeeper(address keeper) external;
        function harvest() external;
        function requestWithdrawal(uint256 amount) external;
    }

    /// yMechs trade factory (ySwaps).
    #[sol(rpc)]
    interface ITradeFactory {
        function STRATEGY() external view returns (bytes32);
        function grantRole(bytes32 role, address account) external;
        function hasRole(bytes32 role, address account) external view returns (bool);
        function addSwappers(address[] calldata swappers) external;
        function isSwapper(address swapper) external view returns (bool);
    }

    #[sol(rpc)]
    interface ITokemakManager {
        function completeRollover(string calldata rewardsIpfsHash) external;
        function getCycleDuration() external view returns (uint256);
        function getCurrentCycleIndex() external view returns (uint256);
    }

    /// Tokemak reactor pool; the pool contract is also the tAsset ERC-20.
    #[sol(rpc)]
    interface ITokemakPool {
        function requestedWithdrawals(address account) external view returns (uint256 minCycle, uint256 amount);
    }
}
