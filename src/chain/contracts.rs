use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::Serialize;

// Linking entry points of the protocol contracts
sol! {
    #[allow(missing_docs)]
    interface IMintableToken {
        function mint(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function addMinter(address account) external;
        function renounceMinter() external;
    }

    #[allow(missing_docs)]
    interface IOrganisation {
        function unlockOrganisation(uint256 unlockAmount, uint256 initialMogulSupply) external;
    }
}

/// A call with every argument resolved to a concrete value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ContractCall {
    Mint { to: Address, amount: U256 },
    AddMinter { account: Address },
    RenounceMinter,
    Approve { spender: Address, amount: U256 },
    UnlockOrganisation { unlock_amount: U256, initial_supply: U256 },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mint { .. } => "mint",
            Self::AddMinter { .. } => "addMinter",
            Self::RenounceMinter => "renounceMinter",
            Self::Approve { .. } => "approve",
            Self::UnlockOrganisation { .. } => "unlockOrganisation",
        }
    }

    /// ABI-encoded calldata (selector + arguments)
    pub fn calldata(&self) -> Bytes {
        let encoded = match self {
            Self::Mint { to, amount } => IMintableToken::mintCall {
                to: *to,
                amount: *amount,
            }
            .abi_encode(),
            Self::AddMinter { account } => {
                IMintableToken::addMinterCall { account: *account }.abi_encode()
            }
            Self::RenounceMinter => IMintableToken::renounceMinterCall {}.abi_encode(),
            Self::Approve { spender, amount } => IMintableToken::approveCall {
                spender: *spender,
                amount: *amount,
            }
            .abi_encode(),
            Self::UnlockOrganisation {
                unlock_amount,
                initial_supply,
            } => IOrganisation::unlockOrganisationCall {
                unlockAmount: *unlock_amount,
                initialMogulSupply: *initial_supply,
            }
            .abi_encode(),
        };
        Bytes::from(encoded)
    }
}
