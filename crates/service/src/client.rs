//! Execution-client RPC seam used by the resolver and reconciler.

use alloy_consensus::TxEnvelope;
use alloy_primitives::B256;
use alloy_provider::{Provider, RootProvider};
use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};
use thiserror::Error;

/// Error text geth raises while its transaction index is catching up.
/// Receipt lookups failing with this message are transient and retried.
const INDEXING_IN_PROGRESS: &str = "transaction indexing is in progress";

/// Receipt fields the resolver needs to classify a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptInfo {
    /// Whether execution succeeded.
    pub success: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Number of the including block.
    pub block_number: u64,
    /// Hash of the including block.
    pub block_hash: B256,
}

/// A signed transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone)]
pub struct RpcTransaction {
    /// The signed envelope.
    pub envelope: TxEnvelope,
    /// Whether the transaction is still outside a block.
    pub pending: bool,
}

/// The subset of a block the pipeline consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDetails {
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
    /// Hashes of the block's transactions.
    pub transactions: Vec<B256>,
}

/// Errors surfaced by an [`ExecutionClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The RPC URL did not parse.
    #[error("invalid rpc url: {0}")]
    InvalidUrl(String),

    /// Transport or JSON-RPC failure.
    #[error(transparent)]
    Transport(#[from] alloy_transport::TransportError),

    /// The call exceeded the configured deadline.
    #[error("rpc call timed out")]
    Timeout,
}

impl ClientError {
    /// Whether the error is the transient receipt-before-index condition.
    pub fn is_indexing_in_progress(&self) -> bool {
        matches!(self, Self::Transport(err) if err.to_string().contains(INDEXING_IN_PROGRESS))
    }
}

/// Read-only execution-client RPC operations the pipeline depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionClient: Debug + Send + Sync {
    /// Fetches the receipt for a transaction; `None` when not mined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ClientError>;

    /// Fetches a transaction by hash; `None` when unknown to the client.
    async fn transaction_by_hash(&self, hash: B256) -> Result<Option<RpcTransaction>, ClientError>;

    /// Fetches a block (transaction hashes only) by number.
    async fn block_by_number(&self, number: u64) -> Result<Option<BlockDetails>, ClientError>;
}

/// [`ExecutionClient`] backed by an alloy HTTP provider.
///
/// Each call is bounded by the configured timeout; the timeout applies per
/// call, not per resolver tick.
#[derive(Debug, Clone)]
pub struct AlloyExecutionClient {
    provider: RootProvider,
    timeout: Duration,
}

impl AlloyExecutionClient {
    /// Builds a client for `rpc_url` with a per-call `timeout`.
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let url = rpc_url.parse().map_err(|_| ClientError::InvalidUrl(rpc_url.to_owned()))?;
        Ok(Self { provider: RootProvider::new_http(url), timeout })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ClientError>
    where
        F: std::future::IntoFuture<Output = Result<T, alloy_transport::TransportError>>,
    {
        tokio::time::timeout(self.timeout, call.into_future())
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(Into::into)
    }
}

#[async_trait]
impl ExecutionClient for AlloyExecutionClient {
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, ClientError> {
        let receipt = self.bounded(self.provider.get_transaction_receipt(hash)).await?;
        Ok(receipt.map(|receipt| ReceiptInfo {
            success: receipt.status(),
            gas_used: receipt.gas_used,
            block_number: receipt.block_number.unwrap_or_default(),
            block_hash: receipt.block_hash.unwrap_or_default(),
        }))
    }

    async fn transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<RpcTransaction>, ClientError> {
        let transaction = self.bounded(self.provider.get_transaction_by_hash(hash)).await?;
        Ok(transaction.map(|tx| {
            let pending = tx.block_hash.is_none();
            let (envelope, _) = tx.inner.into_parts();
            RpcTransaction { envelope, pending }
        }))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<BlockDetails>, ClientError> {
        let block = self.bounded(self.provider.get_block_by_number(number.into())).await?;
        Ok(block.map(|block| BlockDetails {
            timestamp: block.header.inner.timestamp,
            transactions: block.transactions.hashes().collect(),
        }))
    }
}
