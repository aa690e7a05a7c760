//! JSON-RPC backed deployer and submitter
//!
//! All transactions of the operator go through one signing lane: the lane owns the
//! nonce sequence and is held from submission until confirmation, so no two
//! transactions of the same signer are ever in flight together.

use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{
    ConfirmedDeployment, DeployMode, DeployRequest, Invocation, ResourceDeployer,
    TransactionSubmitter, TxReceipt,
};
use crate::environment::{EnvironmentDescriptor, TxParams};
use crate::error::{DeployError, Result};
use crate::signing::OperatorWallet;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Chain client for a real network
pub struct RpcChain {
    provider: DynProvider,
    operator: Address,
    /// Next nonce of the operator; `None` until fetched or after a failed send
    lane: Mutex<Option<u64>>,
}

impl RpcChain {
    pub fn connect(env: &EnvironmentDescriptor, wallet: &OperatorWallet) -> Self {
        let provider = ProviderBuilder::new()
            .wallet(wallet.ethereum_wallet())
            .connect_http(env.endpoint.clone())
            .erased();

        info!("Connected RPC chain client to {} as {}", env.endpoint, wallet.address());

        Self::with_provider(provider, wallet.address())
    }

    fn with_provider(provider: DynProvider, operator: Address) -> Self {
        Self {
            provider,
            operator,
            lane: Mutex::new(None),
        }
    }

    pub fn operator(&self) -> Address {
        self.operator
    }

    /// Submit `tx` through the signing lane and wait for one confirmation.
    ///
    /// The transaction is first simulated with `eth_call` so that a revert
    /// surfaces with its reason instead of a bare failed receipt.
    async fn submit(
        &self,
        tx: TransactionRequest,
        params: &TxParams,
    ) -> std::result::Result<TransactionReceipt, String> {
        let mut lane = self.lane.lock().await;

        let nonce = match *lane {
            Some(nonce) => nonce,
            None => self
                .provider
                .get_transaction_count(self.operator)
                .pending()
                .await
                .map_err(|e| format!("cannot fetch operator nonce: {}", e))?,
        };

        let tx = tx
            .with_from(self.operator)
            .with_nonce(nonce)
            .with_gas_limit(params.gas_limit)
            .with_gas_price(params.gas_price_wei);

        if let Err(e) = self.provider.call(tx.clone()).await {
            // Nothing was broadcast; the nonce stays reserved for the next submission.
            *lane = Some(nonce);
            return Err(format!("rejected in simulation: {}", e));
        }

        let pending = match self.provider.send_transaction(tx).await {
            Ok(pending) => pending,
            Err(e) => {
                // The node may or may not have accepted it; re-read the nonce next time.
                *lane = None;
                return Err(format!("submission rejected: {}", e));
            }
        };
        *lane = Some(nonce + 1);

        let tx_hash = *pending.tx_hash();
        debug!("Submitted tx {} (nonce {}), awaiting confirmation", tx_hash, nonce);

        let receipt = self
            .await_receipt(tx_hash, params.confirmation_timeout)
            .await?;

        if !receipt.status() {
            return Err(format!(
                "transaction {} reverted in block {:?}",
                tx_hash,
                receipt.block_number()
            ));
        }

        Ok(receipt)
    }

    /// Poll for the receipt of `tx_hash`; inclusion in a block is one confirmation.
    async fn await_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> std::result::Result<TransactionReceipt, String> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => tokio::time::sleep(RECEIPT_POLL_INTERVAL).await,
                    Err(e) => return Err(format!("confirmation of {} failed: {}", tx_hash, e)),
                }
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| format!("{} not confirmed within {:?}", tx_hash, timeout))?
    }
}

fn to_receipt(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        tx_hash: receipt.transaction_hash(),
        block_number: receipt.block_number(),
        gas_used: receipt.gas_used(),
    }
}

#[async_trait]
impl ResourceDeployer for RpcChain {
    #[instrument(skip(self, request), fields(resource = %request.resource, mode = ?request.mode))]
    async fn deploy(&self, request: &DeployRequest) -> Result<ConfirmedDeployment> {
        let failed = |reason: String| DeployError::DeploymentFailed {
            artifact: request.artifact.clone(),
            reason,
        };

        let tx = TransactionRequest::default().with_deploy_code(Bytes::clone(&request.code));
        let receipt = self.submit(tx, &request.params).await.map_err(&failed)?;

        let address = receipt
            .contract_address()
            .ok_or_else(|| failed("receipt carries no contract address".to_string()))?;

        if request.mode == DeployMode::Raw {
            debug!("Raw deployment of {} resolved from receipt", request.artifact);
        }

        Ok(ConfirmedDeployment {
            address,
            receipt: to_receipt(&receipt),
        })
    }
}

#[async_trait]
impl TransactionSubmitter for RpcChain {
    #[instrument(skip(self, invocation), fields(target = %invocation.target, call = invocation.call.name()))]
    async fn invoke(&self, invocation: &Invocation) -> Result<TxReceipt> {
        let tx = TransactionRequest::default()
            .with_to(invocation.address)
            .with_input(invocation.call.calldata());

        match self.submit(tx, &invocation.params).await {
            Ok(receipt) => Ok(to_receipt(&receipt)),
            Err(reason) => {
                warn!(
                    "{} on {} ({}) failed: {}",
                    invocation.call.name(),
                    invocation.target,
                    invocation.address,
                    reason
                );
                Err(DeployError::InvocationFailed {
                    target: invocation.target.to_string(),
                    action: invocation.call.name().to_string(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ContractCall;
    use crate::domain::ResourceName;
    use crate::environment::TxParams;
    use alloy::primitives::{B256, U64};
    use alloy::transports::mock::Asserter;
    use serde_json::{json, Value};

    const OPERATOR_NONCE: u64 = 7;

    fn chain() -> (RpcChain, Asserter) {
        let wallet = OperatorWallet::random();
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new()
            .wallet(wallet.ethereum_wallet())
            .connect_mocked_client(asserter.clone())
            .erased();
        (RpcChain::with_provider(provider, wallet.address()), asserter)
    }

    fn params() -> TxParams {
        TxParams {
            gas_limit: 4_700_000,
            gas_price_wei: 9_000_000_000,
            confirmation_timeout: Duration::from_secs(5),
        }
    }

    fn receipt_json(
        chain: &RpcChain,
        tx_hash: B256,
        success: bool,
        contract_address: Option<Address>,
    ) -> Value {
        let status = if success { "0x1" } else { "0x0" };
        json!({
            "type": "0x0",
            "status": status,
            "cumulativeGasUsed": "0x5208",
            "logs": [],
            "logsBloom": format!("0x{}", "0".repeat(512)),
            "transactionHash": tx_hash,
            "transactionIndex": "0x0",
            "blockHash": B256::repeat_byte(0xbb),
            "blockNumber": "0x10",
            "gasUsed": "0x5208",
            "effectiveGasPrice": "0x218711a00",
            "from": chain.operator(),
            "to": Value::Null,
            "contractAddress": contract_address,
        })
    }

    /// Script the responses of one submission that reaches the chain
    fn push_confirmed(
        asserter: &Asserter,
        chain: &RpcChain,
        tag: u8,
        success: bool,
        contract_address: Option<Address>,
    ) {
        let tx_hash = B256::repeat_byte(tag);
        asserter.push_success(&Bytes::new());
        asserter.push_success(&tx_hash);
        asserter.push_success(&receipt_json(chain, tx_hash, success, contract_address));
    }

    fn push_first_contact(asserter: &Asserter) {
        asserter.push_success(&U64::from(OPERATOR_NONCE));
    }

    fn push_chain_id(asserter: &Asserter) {
        asserter.push_success(&U64::from(31_337));
    }

    fn add_minter() -> Invocation {
        Invocation {
            target: ResourceName::StableToken,
            address: Address::repeat_byte(0x11),
            call: ContractCall::AddMinter {
                account: Address::repeat_byte(0x22),
            },
            params: params(),
        }
    }

    fn raw_deploy() -> DeployRequest {
        DeployRequest {
            resource: ResourceName::BondingHelper,
            artifact: "TokensSQRT".to_string(),
            mode: DeployMode::Raw,
            code: Bytes::from_static(&[0x60, 0x00, 0x60, 0x00, 0xf3]),
            args: Vec::new(),
            params: params(),
        }
    }

    async fn next_nonce(chain: &RpcChain) -> Option<u64> {
        *chain.lane.lock().await
    }

    #[tokio::test]
    async fn test_nonce_is_fetched_once_then_incremented() {
        let (chain, asserter) = chain();

        // eth_getTransactionCount, eth_call, eth_chainId, eth_sendRawTransaction, receipt
        push_first_contact(&asserter);
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_success(&B256::repeat_byte(1));
        asserter.push_success(&receipt_json(&chain, B256::repeat_byte(1), true, None));
        push_confirmed(&asserter, &chain, 2, true, None);

        let first = chain.invoke(&add_minter()).await.unwrap();
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE + 1));

        let second = chain.invoke(&add_minter()).await.unwrap();
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE + 2));

        assert_eq!(first.tx_hash, B256::repeat_byte(1));
        assert_eq!(second.tx_hash, B256::repeat_byte(2));
        assert_eq!(second.block_number, Some(16));
        assert_eq!(second.gas_used, 21_000);
        assert!(asserter.pop_response().is_none());
    }

    #[tokio::test]
    async fn test_rejected_simulation_keeps_nonce_reserved() {
        let (chain, asserter) = chain();

        push_first_contact(&asserter);
        asserter.push_failure_msg(
            "execution reverted: MinterRole: caller does not have the Minter role",
        );

        let err = chain.invoke(&add_minter()).await.unwrap_err();
        match err {
            DeployError::InvocationFailed { action, reason, .. } => {
                assert_eq!(action, "addMinter");
                assert!(reason.contains("MinterRole"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE));

        // The next submission reuses the reserved nonce without asking the node
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_success(&B256::repeat_byte(3));
        asserter.push_success(&receipt_json(&chain, B256::repeat_byte(3), true, None));

        chain.invoke(&add_minter()).await.unwrap();
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE + 1));
        assert!(asserter.pop_response().is_none());
    }

    #[tokio::test]
    async fn test_rejected_send_refetches_nonce() {
        let (chain, asserter) = chain();

        push_first_contact(&asserter);
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_failure_msg("nonce too low");

        let err = chain.invoke(&add_minter()).await.unwrap_err();
        assert!(err.to_string().contains("submission rejected"), "{err}");
        assert_eq!(next_nonce(&chain).await, None);

        asserter.push_success(&U64::from(OPERATOR_NONCE + 1));
        push_confirmed(&asserter, &chain, 4, true, None);

        chain.invoke(&add_minter()).await.unwrap();
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE + 2));
        assert!(asserter.pop_response().is_none());
    }

    #[tokio::test]
    async fn test_reverted_receipt_fails_the_step() {
        let (chain, asserter) = chain();

        push_first_contact(&asserter);
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_success(&B256::repeat_byte(5));
        asserter.push_success(&receipt_json(&chain, B256::repeat_byte(5), false, None));

        let err = chain.invoke(&add_minter()).await.unwrap_err();
        match err {
            DeployError::InvocationFailed { reason, .. } => {
                assert!(reason.contains("reverted"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        // The transaction was mined, so its nonce is spent
        assert_eq!(next_nonce(&chain).await, Some(OPERATOR_NONCE + 1));

        push_confirmed(&asserter, &chain, 6, false, Some(Address::repeat_byte(0x66)));
        let err = chain.deploy(&raw_deploy()).await.unwrap_err();
        assert!(matches!(err, DeployError::DeploymentFailed { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_raw_deploy_reads_address_from_receipt() {
        let (chain, asserter) = chain();
        let created = Address::repeat_byte(0x77);

        push_first_contact(&asserter);
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_success(&B256::repeat_byte(7));
        asserter.push_success(&receipt_json(
            &chain,
            B256::repeat_byte(7),
            true,
            Some(created),
        ));

        let deployment = chain.deploy(&raw_deploy()).await.unwrap();
        assert_eq!(deployment.address, created);
        assert_eq!(deployment.receipt.tx_hash, B256::repeat_byte(7));

        // A receipt without a created address is a failed deployment
        push_confirmed(&asserter, &chain, 8, true, None);
        let err = chain.deploy(&raw_deploy()).await.unwrap_err();
        match err {
            DeployError::DeploymentFailed { artifact, reason } => {
                assert_eq!(artifact, "TokensSQRT");
                assert!(reason.contains("no contract address"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pending_receipt_is_polled_until_mined() {
        let (chain, asserter) = chain();

        push_first_contact(&asserter);
        asserter.push_success(&Bytes::new());
        push_chain_id(&asserter);
        asserter.push_success(&B256::repeat_byte(9));
        asserter.push_success(&Value::Null);
        asserter.push_success(&receipt_json(&chain, B256::repeat_byte(9), true, None));

        let receipt = chain.invoke(&add_minter()).await.unwrap();
        assert_eq!(receipt.tx_hash, B256::repeat_byte(9));
        assert!(asserter.pop_response().is_none());
    }
}
