use alloy_network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy_primitives::{Address, TxHash, U256};
use alloy_provider::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller, WalletFiller,
};
use alloy_provider::{Identity, PendingTransactionError, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_client::RpcClient;
use alloy_rpc_types_eth::{TransactionReceipt, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use alloy_transport::layers::{FallbackLayer, ThrottleLayer};
use alloy_transport_http::Http;
use nexus_types::chain::{ChainId, FromConfig};
use nexus_types::config::RpcConfig;
use nexus_types::settlement::{NativeSettlement, SettlementError};
use nexus_types::util::WeiAmount;
use std::num::NonZeroUsize;
use std::time::Duration;
use tower::ServiceBuilder;

use crate::chain::config::Eip155ChainConfig;
use crate::chain::pending_nonce_manager::PendingNonceManager;

/// Gas limit of a plain value transfer.
pub const NATIVE_TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Confirmations to wait for before a transfer counts as settled.
pub const REQUIRED_CONFIRMATIONS: u64 = 1;

/// Combined filler type for gas, blob gas, nonce, and chain ID.
pub type InnerFiller = JoinFill<
    GasFiller,
    JoinFill<BlobGasFiller, JoinFill<NonceFiller<PendingNonceManager>, ChainIdFiller>>,
>;

/// The fully composed Ethereum provider type used for settlement.
///
/// Combines filler layers for gas, nonce, chain ID, blob gas, and wallet signing,
/// and wraps a [`RootProvider`] for actual JSON-RPC communication.
pub type InnerProvider = FillProvider<
    JoinFill<JoinFill<Identity, InnerFiller>, WalletFiller<EthereumWallet>>,
    RootProvider,
>;

#[derive(Debug, thiserror::Error)]
pub enum Eip155ProviderError {
    #[error("No HTTP(S) RPC endpoint configured for chain {0}")]
    NoHttpTransport(ChainId),
}

/// Builds a rate-limited JSON-RPC client over the chain's HTTP endpoints.
///
/// Non-HTTP endpoints are skipped. Several endpoints are combined with a
/// fallback layer.
pub fn rpc_client(chain_id: ChainId, rpc: &[RpcConfig]) -> Result<RpcClient, Eip155ProviderError> {
    let transports = rpc
        .iter()
        .filter_map(|provider_config| {
            let scheme = provider_config.http.scheme();
            let is_http = scheme == "http" || scheme == "https";
            if !is_http {
                return None;
            }
            let rpc_url = provider_config.http.clone();
            tracing::info!(chain=%chain_id, rpc_url=%rpc_url, rate_limit=?provider_config.rate_limit, "Using HTTP transport");
            let rate_limit = provider_config.rate_limit.unwrap_or(u32::MAX);
            let service = ServiceBuilder::new()
                .layer(ThrottleLayer::new(rate_limit))
                .service(Http::new(rpc_url));
            Some(service)
        })
        .collect::<Vec<_>>();
    let active = NonZeroUsize::new(transports.len())
        .ok_or(Eip155ProviderError::NoHttpTransport(chain_id))?;
    let fallback = ServiceBuilder::new()
        .layer(FallbackLayer::default().with_active_transport_count(active))
        .service(transports);
    Ok(RpcClient::new(fallback, false))
}

/// Settlement provider for one EVM chain.
///
/// Sends native-currency transfers from the operator wallet. Nonces are
/// allocated by [`PendingNonceManager`] and reset whenever submission or
/// confirmation fails, so a transfer that may or may not have reached the
/// mempool never leaves a stale nonce behind.
#[derive(Debug)]
pub struct Eip155ChainProvider {
    chain_id: ChainId,
    eip1559: bool,
    receipt_timeout_secs: u64,
    inner: InnerProvider,
    signer_address: Address,
    nonce_manager: PendingNonceManager,
}

impl Eip155ChainProvider {
    pub fn inner(&self) -> &InnerProvider {
        &self.inner
    }

    /// Sends `value` wei to `to` and waits for one confirmation.
    ///
    /// # Gas Pricing
    ///
    /// - **EIP-1559 networks**: fees are filled in by the provider.
    /// - **Legacy networks**: the current gas price is fetched and set explicitly.
    ///
    /// # Errors
    ///
    /// - [`NativeTransferError::Transport`] if gas pricing or submission fails
    /// - [`NativeTransferError::PendingTransaction`] if the receipt is not
    ///   available within the receipt timeout
    /// - [`NativeTransferError::Reverted`] if the receipt has a failed status
    pub async fn send_native_transfer(
        &self,
        to: Address,
        value: U256,
    ) -> Result<TransactionReceipt, NativeTransferError> {
        let from_address = self.signer_address;
        let mut txr = TransactionRequest::default()
            .with_to(to)
            .with_from(from_address)
            .with_value(value)
            .with_gas_limit(NATIVE_TRANSFER_GAS_LIMIT);

        if !self.eip1559 {
            let gas: u128 = self.inner.get_gas_price().await?;
            txr.set_gas_price(gas);
        }

        let pending_tx = match self.inner.send_transaction(txr).await {
            Ok(pending) => pending,
            Err(e) => {
                self.nonce_manager.reset_nonce(from_address).await;
                return Err(NativeTransferError::Transport(e));
            }
        };
        tracing::debug!(chain=%self.chain_id, tx=%pending_tx.tx_hash(), %to, %value, "Native transfer submitted");

        let timeout = Duration::from_secs(self.receipt_timeout_secs);
        let watcher = pending_tx
            .with_required_confirmations(REQUIRED_CONFIRMATIONS)
            .with_timeout(Some(timeout));

        let receipt = match watcher.get_receipt().await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.nonce_manager.reset_nonce(from_address).await;
                return Err(NativeTransferError::PendingTransaction(e));
            }
        };
        if receipt.status() {
            Ok(receipt)
        } else {
            Err(NativeTransferError::Reverted(receipt.transaction_hash))
        }
    }
}

/// Creates a new provider from configuration.
///
/// # Errors
///
/// Returns an error if the signing key is not a valid secp256k1 scalar or
/// the chain has no usable HTTP endpoint.
#[async_trait::async_trait]
impl FromConfig<Eip155ChainConfig> for Eip155ChainProvider {
    async fn from_config(config: &Eip155ChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let signer = PrivateKeySigner::from_bytes(config.signer.as_b256())?
            .with_chain_id(Some(config.chain_id().inner()));
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let client = rpc_client(config.chain_id(), std::slice::from_ref(&config.chain.rpc))?;

        let nonce_manager = PendingNonceManager::default();
        // Gas -> BlobGas -> Nonce -> ChainId, matching InnerFiller
        let filler = JoinFill::new(
            GasFiller,
            JoinFill::new(
                BlobGasFiller::default(),
                JoinFill::new(
                    NonceFiller::new(nonce_manager.clone()),
                    ChainIdFiller::default(),
                ),
            ),
        );
        let inner: InnerProvider = ProviderBuilder::default()
            .filler(filler)
            .wallet(wallet)
            .connect_client(client);

        tracing::info!(chain=%config.chain_id(), signer=%signer_address, eip1559=config.eip1559, "Using EVM settlement provider");

        Ok(Self {
            chain_id: config.chain_id(),
            eip1559: config.eip1559,
            receipt_timeout_secs: config.receipt_timeout_secs,
            inner,
            signer_address,
            nonce_manager,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NativeTransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    #[error("Transaction {0} reverted")]
    Reverted(TxHash),
}

impl From<NativeTransferError> for SettlementError {
    fn from(value: NativeTransferError) -> Self {
        match value {
            NativeTransferError::Transport(e) => SettlementError::Submission(Box::new(e)),
            NativeTransferError::PendingTransaction(e) => {
                SettlementError::Confirmation(Box::new(e))
            }
            NativeTransferError::Reverted(tx_hash) => SettlementError::Reverted(tx_hash),
        }
    }
}

#[async_trait::async_trait]
impl NativeSettlement for Eip155ChainProvider {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn signer_address(&self) -> Address {
        self.signer_address
    }

    async fn transfer_native(
        &self,
        to: Address,
        amount: WeiAmount,
    ) -> Result<TxHash, SettlementError> {
        let receipt = self.send_native_transfer(to, amount.inner()).await?;
        Ok(receipt.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_types::chain::ChainConfig;
    use url::Url;

    fn rpc(url: &str) -> RpcConfig {
        RpcConfig {
            http: Url::parse(url).unwrap(),
            rate_limit: None,
        }
    }

    #[test]
    fn test_rpc_client_requires_http_endpoint() {
        let err = rpc_client(ChainId::new(240), &[rpc("wss://example.org")]).unwrap_err();
        assert!(matches!(err, Eip155ProviderError::NoHttpTransport(id) if id.inner() == 240));
        assert!(rpc_client(ChainId::new(240), &[]).is_err());
    }

    #[test]
    fn test_rpc_client_accepts_http_endpoint() {
        assert!(rpc_client(ChainId::new(240), &[rpc("https://testnet.zkevm.cronos.org")]).is_ok());
    }

    #[tokio::test]
    async fn test_from_config_derives_signer_address() {
        let chain = ChainConfig {
            chain_id: ChainId::new(84532),
            name: "Base Sepolia".to_string(),
            rpc: rpc("https://sepolia.base.org"),
            native_symbol: "ETH".to_string(),
        };
        // Well-known development key (anvil account #0)
        let signer = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .parse()
            .unwrap();
        let config = Eip155ChainConfig::new(chain, signer).with_eip1559(false);
        let provider = Eip155ChainProvider::from_config(&config).await.unwrap();
        assert_eq!(NativeSettlement::chain_id(&provider).inner(), 84532);
        assert_eq!(
            provider.signer_address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_reverted_maps_to_settlement_error() {
        let err: SettlementError = NativeTransferError::Reverted(TxHash::repeat_byte(1)).into();
        assert_eq!(err.tx_hash(), Some(TxHash::repeat_byte(1)));
    }
}
