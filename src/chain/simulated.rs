//! In-memory chain used for dry runs and tests
//!
//! Models only what the linking steps touch: minter roles, balances and allowances
//! of the protocol tokens, and the organization's lock. Addresses follow the CREATE
//! scheme of the operator account, so every run yields fresh addresses.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{keccak256, Address, TxHash, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    ConfirmedDeployment, ContractCall, DeployRequest, Invocation, ResourceDeployer,
    TransactionSubmitter, TxReceipt,
};
use crate::domain::ResourceName;
use crate::error::{DeployError, Result};

const DEPLOY_GAS: u64 = 1_500_000;
const CALL_GAS: u64 = 60_000;

#[derive(Debug, Default)]
struct TokenState {
    minters: HashSet<Address>,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
}

impl TokenState {
    fn with_minter(minter: Address) -> Self {
        let mut token = Self::default();
        token.minters.insert(minter);
        token
    }

    fn balance(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or(U256::ZERO)
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn mint(&mut self, to: Address, amount: U256) {
        *self.balances.entry(to).or_default() += amount;
        self.total_supply += amount;
    }
}

#[derive(Debug)]
struct OrganizationState {
    stable_token: Address,
    governance_token: Address,
    unlocked: bool,
}

#[derive(Debug)]
enum Contract {
    Token(TokenState),
    Organization(OrganizationState),
    /// Exchange, voting and math helpers: nothing the linking steps touch
    Opaque,
}

#[derive(Debug, Default)]
struct Ledger {
    nonce: u64,
    block: u64,
    contracts: HashMap<Address, Contract>,
    failures: HashMap<ResourceName, String>,
    history: Vec<String>,
}

impl Ledger {
    fn next_tx(&mut self, sender: Address) -> (TxHash, u64) {
        let mut preimage = sender.to_vec();
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        let hash = keccak256(preimage);
        self.nonce += 1;
        self.block += 1;
        (hash, self.block)
    }

    fn token(&self, address: Address) -> std::result::Result<&TokenState, String> {
        match self.contracts.get(&address) {
            Some(Contract::Token(token)) => Ok(token),
            Some(_) => Err(format!("{} is not a token", address)),
            None => Err(format!("no contract at {}", address)),
        }
    }

    fn token_mut(&mut self, address: Address) -> std::result::Result<&mut TokenState, String> {
        match self.contracts.get_mut(&address) {
            Some(Contract::Token(token)) => Ok(token),
            Some(_) => Err(format!("{} is not a token", address)),
            None => Err(format!("no contract at {}", address)),
        }
    }

    /// Apply `call` from `caller`; on error the ledger is left untouched.
    fn apply(
        &mut self,
        caller: Address,
        target: Address,
        call: &ContractCall,
    ) -> std::result::Result<(), String> {
        match call {
            ContractCall::Mint { to, amount } => {
                let token = self.token_mut(target)?;
                require_minter(token, caller)?;
                token.mint(*to, *amount);
            }
            ContractCall::AddMinter { account } => {
                let token = self.token_mut(target)?;
                require_minter(token, caller)?;
                token.minters.insert(*account);
            }
            ContractCall::RenounceMinter => {
                let token = self.token_mut(target)?;
                require_minter(token, caller)?;
                token.minters.remove(&caller);
            }
            ContractCall::Approve { spender, amount } => {
                let token = self.token_mut(target)?;
                token.allowances.insert((caller, *spender), *amount);
            }
            ContractCall::UnlockOrganisation {
                unlock_amount,
                initial_supply,
            } => self.unlock(caller, target, *unlock_amount, *initial_supply)?,
        }
        Ok(())
    }

    fn unlock(
        &mut self,
        caller: Address,
        organization: Address,
        unlock_amount: U256,
        initial_supply: U256,
    ) -> std::result::Result<(), String> {
        let (stable, governance) = match self.contracts.get(&organization) {
            Some(Contract::Organization(org)) if org.unlocked => {
                return Err("organisation already unlocked".to_string())
            }
            Some(Contract::Organization(org)) => (org.stable_token, org.governance_token),
            Some(_) => return Err(format!("{} is not an organisation", organization)),
            None => return Err(format!("no contract at {}", organization)),
        };

        let stable_token = self.token(stable)?;
        if stable_token.allowance(caller, organization) < unlock_amount {
            return Err("insufficient allowance".to_string());
        }
        if stable_token.balance(caller) < unlock_amount {
            return Err("insufficient balance".to_string());
        }
        if !self.token(governance)?.minters.contains(&organization) {
            return Err("organisation is not a governance token minter".to_string());
        }

        let stable_token = self.token_mut(stable)?;
        *stable_token.balances.entry(caller).or_default() -= unlock_amount;
        *stable_token.balances.entry(organization).or_default() += unlock_amount;
        *stable_token
            .allowances
            .entry((caller, organization))
            .or_default() -= unlock_amount;

        self.token_mut(governance)?.mint(caller, initial_supply);

        if let Some(Contract::Organization(org)) = self.contracts.get_mut(&organization) {
            org.unlocked = true;
        }
        Ok(())
    }
}

fn require_minter(token: &TokenState, caller: Address) -> std::result::Result<(), String> {
    if token.minters.contains(&caller) {
        Ok(())
    } else {
        Err("MinterRole: caller does not have the Minter role".to_string())
    }
}

fn address_arg(args: &[DynSolValue], index: usize) -> std::result::Result<Address, String> {
    args.get(index)
        .and_then(DynSolValue::as_address)
        .ok_or_else(|| format!("constructor argument {} is not an address", index))
}

/// In-memory network where the operator is the only signer
#[derive(Debug)]
pub struct SimulatedChain {
    operator: Address,
    ledger: Mutex<Ledger>,
}

impl SimulatedChain {
    pub fn new(operator: Address) -> Self {
        Self {
            operator,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    /// Pre-existing stable-value token at `address`, as found on a shared network.
    /// `holder` starts with `balance` and is a minter.
    pub async fn install_token(&self, address: Address, holder: Address, balance: U256) {
        let mut token = TokenState::with_minter(holder);
        token.mint(holder, balance);
        self.ledger
            .lock()
            .await
            .contracts
            .insert(address, Contract::Token(token));
    }

    /// Make the next deployment of `resource` fail with `reason`
    pub async fn fail_deployment(&self, resource: ResourceName, reason: &str) {
        self.ledger
            .lock()
            .await
            .failures
            .insert(resource, reason.to_string());
    }

    pub async fn is_minter(&self, token: Address, account: Address) -> bool {
        let ledger = self.ledger.lock().await;
        ledger
            .token(token)
            .map(|t| t.minters.contains(&account))
            .unwrap_or(false)
    }

    pub async fn minter_count(&self, token: Address) -> usize {
        let ledger = self.ledger.lock().await;
        ledger.token(token).map(|t| t.minters.len()).unwrap_or(0)
    }

    pub async fn balance_of(&self, token: Address, account: Address) -> U256 {
        let ledger = self.ledger.lock().await;
        ledger
            .token(token)
            .map(|t| t.balance(account))
            .unwrap_or(U256::ZERO)
    }

    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        let ledger = self.ledger.lock().await;
        ledger
            .token(token)
            .map(|t| t.allowance(owner, spender))
            .unwrap_or(U256::ZERO)
    }

    pub async fn total_supply(&self, token: Address) -> U256 {
        let ledger = self.ledger.lock().await;
        ledger
            .token(token)
            .map(|t| t.total_supply)
            .unwrap_or(U256::ZERO)
    }

    pub async fn is_unlocked(&self, organization: Address) -> bool {
        matches!(
            self.ledger.lock().await.contracts.get(&organization),
            Some(Contract::Organization(org)) if org.unlocked
        )
    }

    pub async fn has_code(&self, address: Address) -> bool {
        self.ledger.lock().await.contracts.contains_key(&address)
    }

    /// Confirmed transactions in submission order, e.g. `deploy exchange`,
    /// `governance_token.renounceMinter`
    pub async fn history(&self) -> Vec<String> {
        self.ledger.lock().await.history.clone()
    }
}

#[async_trait]
impl ResourceDeployer for SimulatedChain {
    async fn deploy(&self, request: &DeployRequest) -> Result<ConfirmedDeployment> {
        let mut ledger = self.ledger.lock().await;
        let failed = |reason: String| DeployError::DeploymentFailed {
            artifact: request.artifact.clone(),
            reason,
        };

        if let Some(reason) = ledger.failures.remove(&request.resource) {
            return Err(failed(reason));
        }
        if request.code.is_empty() {
            return Err(failed("empty creation code".to_string()));
        }

        let contract = match request.resource {
            ResourceName::StableToken
            | ResourceName::ContentToken
            | ResourceName::GovernanceToken => Contract::Token(TokenState::with_minter(self.operator)),
            ResourceName::Organization => Contract::Organization(OrganizationState {
                stable_token: address_arg(&request.args, 1).map_err(&failed)?,
                governance_token: address_arg(&request.args, 2).map_err(&failed)?,
                unlocked: false,
            }),
            _ => Contract::Opaque,
        };

        let address = self.operator.create(ledger.nonce);
        let (tx_hash, block) = ledger.next_tx(self.operator);
        ledger.contracts.insert(address, contract);
        ledger.history.push(format!("deploy {}", request.resource));

        debug!("Simulated deployment of {} at {}", request.artifact, address);
        Ok(ConfirmedDeployment {
            address,
            receipt: TxReceipt {
                tx_hash,
                block_number: Some(block),
                gas_used: DEPLOY_GAS,
            },
        })
    }
}

#[async_trait]
impl TransactionSubmitter for SimulatedChain {
    async fn invoke(&self, invocation: &Invocation) -> Result<TxReceipt> {
        let mut ledger = self.ledger.lock().await;

        ledger
            .apply(self.operator, invocation.address, &invocation.call)
            .map_err(|reason| DeployError::InvocationFailed {
                target: invocation.target.to_string(),
                action: invocation.call.name().to_string(),
                reason,
            })?;

        let (tx_hash, block) = ledger.next_tx(self.operator);
        ledger
            .history
            .push(format!("{}.{}", invocation.target, invocation.call.name()));

        Ok(TxReceipt {
            tx_hash,
            block_number: Some(block),
            gas_used: CALL_GAS,
        })
    }
}
