use alloy::primitives::{b256, B256, U256};

/// One whole unit of an 18-decimal token
pub const ONE_TOKEN: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Stable-value amount pulled into the organization on activation
pub const UNLOCK_AMOUNT: U256 = ONE_TOKEN;

/// Governance tokens minted to the operator on activation
pub const INITIAL_GOVERNANCE_SUPPLY: U256 = ONE_TOKEN;

/// Content identifiers registered with the voting module, in order
pub const CONTENT_CATALOG: [B256; 5] = [
    b256!("0x4d6f766965310000000000000000000000000000000000000000000000000000"), // Movie1
    b256!("0x4d6f766965320000000000000000000000000000000000000000000000000000"), // Movie2
    b256!("0x4d6f766965330000000000000000000000000000000000000000000000000000"), // Movie3
    b256!("0x4d6f766965340000000000000000000000000000000000000000000000000000"), // Movie4
    b256!("0x4d6f766965350000000000000000000000000000000000000000000000000000"), // Movie5
];
