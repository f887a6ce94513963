//! The destination-chain client: simulate, broadcast, and confirm
//! `receiveAndForward` calls against the deployed router, and look up
//! receipts by hash for the submitter's restart-recovery sweep.

use std::time::Duration;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use url::Url;

use crate::contract::IRelayRouter;
use crate::error::ChainError;

/// `estimated_gas * GAS_MARGIN_NUM / GAS_MARGIN_DEN` is the gas limit this
/// client sends with every broadcast, to absorb drift between
/// `eth_estimateGas` and the gas actually consumed at inclusion time.
const GAS_MARGIN_NUM: u64 = 120;
const GAS_MARGIN_DEN: u64 = 100;

fn with_gas_margin(estimated: u64) -> u64 {
    estimated.saturating_mul(GAS_MARGIN_NUM) / GAS_MARGIN_DEN
}

/// A handle to the destination chain: one signer, one router, one RPC
/// endpoint. Cheaply cloneable, shared across the submitter loop and the
/// restart-recovery sweep.
#[derive(Clone)]
pub struct ChainClient {
    provider: DynProvider,
    router: Address,
    signer_address: Address,
}

impl ChainClient {
    /// Builds a provider wired with a single local signer over HTTP.
    pub fn connect(rpc_url: &Url, private_key: &[u8; 32], router: Address) -> Result<Self, ChainError> {
        let signer = PrivateKeySigner::from_bytes(private_key.into())
            .map_err(|err| ChainError::InvalidPrivateKey(err.to_string()))?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(rpc_url.clone())
            .erased();
        Ok(Self {
            provider,
            router,
            signer_address,
        })
    }

    pub fn router_address(&self) -> Address {
        self.router
    }

    /// The address derived from the configured private key, used at
    /// startup as a sanity check against the operator-supplied
    /// `TRANSMITTER_ADDRESS`.
    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    fn build_call(&self, message: &[u8], attestation: &[u8], relay_fee: U256) -> TransactionRequest {
        let call = IRelayRouter::receiveAndForwardCall {
            message: Bytes::copy_from_slice(message),
            attestation: Bytes::copy_from_slice(attestation),
            relayFee: relay_fee,
        };
        TransactionRequest::default()
            .with_to(self.router)
            .with_input(Bytes::from(call.abi_encode()))
    }

    /// Dry-runs `receiveAndForward` via `eth_call`, without broadcasting.
    /// An `Err` carries the node's revert message.
    pub async fn simulate(
        &self,
        message: &[u8],
        attestation: &[u8],
        relay_fee: U256,
    ) -> Result<(), ChainError> {
        let tx = self.build_call(message, attestation, relay_fee);
        self.provider
            .call(tx)
            .await
            .map(|_| ())
            .map_err(|err| ChainError::Reverted(err.to_string()))
    }

    /// Broadcasts `receiveAndForward` with a 20% gas margin over the
    /// provider's own estimate, and returns the transaction hash
    /// immediately; it does not wait for inclusion, see
    /// [`ChainClient::wait_for_receipt`].
    pub async fn broadcast(
        &self,
        message: &[u8],
        attestation: &[u8],
        relay_fee: U256,
    ) -> Result<TxHash, ChainError> {
        let tx = self.build_call(message, attestation, relay_fee);

        let estimated = self
            .provider
            .estimate_gas(tx.clone())
            .await
            .map_err(|err| ChainError::Reverted(err.to_string()))?;
        let tx = tx.with_gas_limit(with_gas_margin(estimated));

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|err| ChainError::Submission(err.to_string()))?;
        Ok(*pending.tx_hash())
    }

    /// Looks up a receipt by hash, used by both the post-broadcast wait and
    /// the restart-recovery sweep over jobs left in `submitted`.
    pub async fn get_receipt(&self, tx_hash: TxHash) -> Result<Option<TransactionReceipt>, ChainError> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|err| ChainError::Rpc(err.to_string()))
    }

    /// Polls for `tx_hash`'s receipt until it appears or `timeout` elapses.
    /// A timeout is not an error: the caller leaves the job in `submitted`
    /// and relies on the next cycle (or a restart sweep) to pick it back up.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.get_receipt(tx_hash).await? {
                return Ok(Some(receipt));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_margin_rounds_down_and_never_shrinks_estimate() {
        assert_eq!(with_gas_margin(100_000), 120_000);
        assert_eq!(with_gas_margin(1), 1);
        assert_eq!(with_gas_margin(0), 0);
    }

    #[test]
    fn gas_margin_saturates_instead_of_overflowing() {
        assert_eq!(with_gas_margin(u64::MAX), u64::MAX / GAS_MARGIN_DEN);
    }
}
