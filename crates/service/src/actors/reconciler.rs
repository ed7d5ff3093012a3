//! Inclusion-list reconciliation against mined blocks.

use crate::{Actor, ExecutionClient, config::Endpoint};
use alloy_consensus::TxEnvelope;
use alloy_provider::{Provider, ProviderBuilder, WsConnect};
use async_trait::async_trait;
use futures::StreamExt;
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txscope_storage::{StorageError, Store, keys};
use txscope_types::{InclusionReport, InclusionSummary};

/// Offset between an execution block number and the beacon slot whose
/// inclusion list constrains it. Forks may change this relation.
const SLOT_EXECUTION_OFFSET: u64 = 1;

/// Errors that end a reconciler task.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Dialing the websocket or subscribing to `newHeads` failed.
    #[error("newHeads subscription failed")]
    Subscribe(#[from] alloy_transport::TransportError),

    /// The header stream closed.
    #[error("newHeads stream closed")]
    Closed,

    /// A cache operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One task per execution endpoint.
///
/// Follows `newHeads`; for each header it fetches the block's transaction
/// hashes, looks up the inclusion list stored for the associated slot, and
/// writes the per-slot inclusion report. Reports are per-chain rather than
/// per-client, so endpoints observing the same slot overwrite one another
/// (last writer wins).
#[derive(Debug)]
pub struct ReconcilerActor<S, C> {
    endpoint: Endpoint,
    worker: Arc<ReconcilerWorker<S, C>>,
    cancel_token: CancellationToken,
}

impl<S, C> ReconcilerActor<S, C>
where
    S: Store + 'static,
    C: ExecutionClient + 'static,
{
    /// Creates the reconciler for one endpoint.
    pub fn new(
        endpoint: Endpoint,
        client: Arc<C>,
        store: Arc<S>,
        cancel_token: CancellationToken,
    ) -> Self {
        let worker =
            Arc::new(ReconcilerWorker { client_name: endpoint.name.clone(), rpc: client, store });
        Self { endpoint, worker, cancel_token }
    }
}

#[async_trait]
impl<S, C> Actor for ReconcilerActor<S, C>
where
    S: Store + 'static,
    C: ExecutionClient + 'static,
{
    type Error = ReconcilerError;

    async fn start(self) -> Result<(), Self::Error> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.endpoint.websocket_url.clone()))
            .await?;
        let subscription = provider.subscribe_blocks().await?;
        let mut headers = subscription.into_stream();

        info!(target: "txscope::reconciler", client = %self.endpoint.name, "Subscribed to new block headers");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(target: "txscope::reconciler", client = %self.endpoint.name, "Cancellation requested, stopping...");
                    return Ok(());
                }
                maybe_header = headers.next() => {
                    let Some(header) = maybe_header else {
                        warn!(target: "txscope::reconciler", client = %self.endpoint.name, "Header stream closed");
                        return Err(ReconcilerError::Closed);
                    };
                    let block_number = header.inner.number;
                    info!(target: "txscope::reconciler", client = %self.endpoint.name, block_number, "New block");

                    let worker = self.worker.clone();
                    tokio::spawn(async move {
                        worker.process_block(block_number).await;
                    });
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReconcilerWorker<S, C> {
    client_name: String,
    rpc: Arc<C>,
    store: Arc<S>,
}

impl<S, C> ReconcilerWorker<S, C>
where
    S: Store,
    C: ExecutionClient,
{
    /// Reconciles one mined block against the inclusion list stored for its
    /// slot, emitting the per-slot report.
    async fn process_block(&self, block_number: u64) {
        let Some(slot) = block_number.checked_sub(SLOT_EXECUTION_OFFSET) else {
            return;
        };
        let slot_field = slot.to_string();

        let block = match self.rpc.block_by_number(block_number).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(target: "txscope::reconciler", client = %self.client_name, block_number, "Block not found");
                return;
            }
            Err(err) => {
                error!(target: "txscope::reconciler", client = %self.client_name, block_number, %err, "Failed to fetch block");
                return;
            }
        };
        let block_hashes: HashSet<_> = block.transactions.iter().copied().collect();

        let stored = match self.store.hash_get(keys::inclusion_txns(), &slot_field).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                // No inclusion list was observed in time for this slot.
                debug!(target: "txscope::reconciler", client = %self.client_name, slot, "No inclusion list for slot");
                return;
            }
            Err(err) => {
                error!(target: "txscope::reconciler", client = %self.client_name, slot, %err, "Failed to read inclusion list");
                return;
            }
        };

        let envelopes: Vec<TxEnvelope> = match serde_json::from_str(&stored) {
            Ok(envelopes) => envelopes,
            Err(err) => {
                error!(target: "txscope::reconciler", client = %self.client_name, slot, %err, "Failed to decode inclusion list");
                return;
            }
        };

        let mut included = Vec::new();
        let mut missing = Vec::new();
        for envelope in &envelopes {
            let hash = *envelope.tx_hash();
            if block_hashes.contains(&hash) {
                included.push(hash);
            } else {
                missing.push(hash);
            }
        }

        let report = InclusionReport {
            summary: InclusionSummary {
                total: envelopes.len(),
                included: included.len(),
                missing: missing.len(),
            },
            included,
            missing,
        };

        let encoded = match serde_json::to_string(&report) {
            Ok(encoded) => encoded,
            Err(err) => {
                error!(target: "txscope::reconciler", client = %self.client_name, slot, %err, "Failed to encode inclusion report");
                return;
            }
        };
        if let Err(err) = self.store.hash_set(keys::inclusion_report(), &slot_field, &encoded).await
        {
            error!(target: "txscope::reconciler", client = %self.client_name, slot, %err, "Failed to store inclusion report");
            return;
        }

        info!(
            target: "txscope::reconciler",
            client = %self.client_name,
            slot,
            total = report.summary.total,
            included = report.summary.included,
            missing = report.summary.missing,
            "Inclusion report written"
        );
    }
}
