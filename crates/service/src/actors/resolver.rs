//! Queue-driven transaction resolution.

use crate::{Actor, ExecutionClient, ReceiptInfo, unix_now};
use alloy_primitives::B256;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txscope_storage::{ClientStorage, StorageError, Store, UpdateOutcome, keys};

/// Retry counter lifetime for updates that found no record.
const RETRY_TTL: Duration = Duration::from_secs(15 * 60);

/// How many times a hash with no record is requeued before being dropped.
const MAX_MISSING_RECORD_RETRIES: u64 = 5;

/// Queue depth is reported every this many poll intervals.
const QUEUE_MONITOR_FACTOR: u32 = 5;

/// Errors that end a resolver task.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The cache became unreachable; the task exits and supervision records it.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One resolver task per execution endpoint, paced by the polling interval.
///
/// Each tick pops at most one queue entry and dispatches its resolution to a
/// sub-task so a slow RPC round trip does not block the tick cadence.
/// Classification follows receipt-first order: a receipt means mined
/// (terminal), a missing transaction means dropped (terminal), and
/// pending/queued observations are written back and requeued for a later
/// pass.
#[derive(Debug)]
pub struct ResolverActor<S, C> {
    worker: Arc<ResolverWorker<S, C>>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl<S, C> ResolverActor<S, C>
where
    S: Store + 'static,
    C: ExecutionClient + 'static,
{
    /// Creates the resolver for one endpoint.
    pub fn new(
        endpoint_name: &str,
        client: Arc<C>,
        store: Arc<S>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        let worker = Arc::new(ResolverWorker {
            client_name: endpoint_name.to_owned(),
            rpc: client,
            storage: ClientStorage::new(endpoint_name, store.clone()),
            store,
        });
        Self { worker, interval, cancel_token }
    }
}

#[async_trait]
impl<S, C> Actor for ResolverActor<S, C>
where
    S: Store + 'static,
    C: ExecutionClient + 'static,
{
    type Error = ResolverError;

    async fn start(self) -> Result<(), Self::Error> {
        let mut tick = tokio::time::interval(self.interval);
        let mut monitor = tokio::time::interval(self.interval * QUEUE_MONITOR_FACTOR);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(
                        target: "txscope::resolver",
                        client = %self.worker.client_name,
                        "Cancellation requested, stopping..."
                    );
                    return Ok(());
                }
                _ = monitor.tick() => {
                    self.worker.report_queue_depth().await;
                }
                _ = tick.tick() => {
                    // Tick timestamp is captured before the pop.
                    let tick_ts = unix_now();
                    let Some(entry) = self.worker.storage.dequeue().await? else {
                        continue;
                    };
                    let Some(hash) = parse_queue_entry(&entry) else {
                        warn!(
                            target: "txscope::resolver",
                            client = %self.worker.client_name,
                            entry,
                            "Invalid queue entry format"
                        );
                        continue;
                    };

                    let worker = self.worker.clone();
                    tokio::spawn(async move {
                        worker.resolve(hash, tick_ts).await;
                    });
                }
            }
        }
    }
}

/// Splits a `client:hash` queue entry, returning the hash.
fn parse_queue_entry(entry: &str) -> Option<String> {
    let (_, hash) = entry.split_once(':')?;
    (!hash.is_empty()).then(|| hash.to_owned())
}

#[derive(Debug)]
struct ResolverWorker<S, C> {
    client_name: String,
    rpc: Arc<C>,
    storage: ClientStorage<S>,
    store: Arc<S>,
}

impl<S, C> ResolverWorker<S, C>
where
    S: Store,
    C: ExecutionClient,
{
    /// Resolves one popped hash against the endpoint's RPC.
    async fn resolve(&self, hash_str: String, tick_ts: i64) {
        let Ok(hash) = hash_str.parse::<B256>() else {
            warn!(
                target: "txscope::resolver",
                client = %self.client_name,
                hash = %hash_str,
                "Queue entry is not a transaction hash"
            );
            return;
        };

        // A receipt means the tx is mined; a transient indexing error means
        // retry later. Any other receipt failure legitimately happens for
        // unmined txs on some clients, so classification continues below.
        match self.rpc.transaction_receipt(hash).await {
            Ok(Some(receipt)) => {
                self.handle_mined(&hash_str, hash, receipt).await;
                return;
            }
            Err(err) if err.is_indexing_in_progress() => {
                debug!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    "Receipt not indexed yet, requeueing"
                );
                self.requeue(&hash_str).await;
                return;
            }
            Ok(None) => {}
            Err(err) => {
                debug!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Receipt unavailable"
                );
            }
        }

        // No receipt: consult the mempool.
        match self.rpc.transaction_by_hash(hash).await {
            Ok(None) => {
                debug!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    "Transaction left the mempool, marking dropped"
                );
                match self.storage.update_dropped(&hash_str, tick_ts).await {
                    Ok(UpdateOutcome::Applied) => {}
                    Ok(UpdateOutcome::Missing) => self.retry_missing(&hash_str).await,
                    Err(err) => {
                        error!(
                            target: "txscope::resolver",
                            client = %self.client_name,
                            hash = %hash_str,
                            %err,
                            "Error updating dropped transaction"
                        );
                    }
                }
            }
            Ok(Some(tx)) if tx.pending => {
                match self.storage.update_pending(&hash_str, &tx.envelope, tick_ts).await {
                    Ok(UpdateOutcome::Applied) => self.requeue(&hash_str).await,
                    Ok(UpdateOutcome::Missing) => self.retry_missing(&hash_str).await,
                    Err(err) => {
                        error!(
                            target: "txscope::resolver",
                            client = %self.client_name,
                            hash = %hash_str,
                            %err,
                            "Error updating pending transaction"
                        );
                    }
                }
            }
            Ok(Some(tx)) => {
                // In the pool but not executable: nonce gap or low gas.
                match self.storage.update_queued(&hash_str, &tx.envelope, tick_ts).await {
                    Ok(UpdateOutcome::Applied) => self.requeue(&hash_str).await,
                    Ok(UpdateOutcome::Missing) => self.retry_missing(&hash_str).await,
                    Err(err) => {
                        error!(
                            target: "txscope::resolver",
                            client = %self.client_name,
                            hash = %hash_str,
                            %err,
                            "Error updating queued transaction"
                        );
                    }
                }
            }
            Err(err) => {
                // Deliberately not requeued: a persistently failing RPC
                // would otherwise hot-loop; future websocket activity can
                // re-ingest the hash.
                error!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Error fetching transaction from mempool"
                );
            }
        }
    }

    async fn handle_mined(&self, hash_str: &str, hash: B256, receipt: ReceiptInfo) {
        let envelope = match self.rpc.transaction_by_hash(hash).await {
            Ok(Some(tx)) => Some(tx.envelope),
            Ok(None) => None,
            Err(err) => {
                error!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Error fetching mined transaction details"
                );
                return;
            }
        };

        let block_ts = match self.rpc.block_by_number(receipt.block_number).await {
            Ok(Some(block)) => block.timestamp as i64,
            Ok(None) => {
                warn!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    block_number = receipt.block_number,
                    "Including block not found"
                );
                return;
            }
            Err(err) => {
                error!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Error fetching block details"
                );
                return;
            }
        };

        let outcome = self
            .storage
            .update_mined(
                hash_str,
                envelope.as_ref(),
                block_ts,
                receipt.success,
                receipt.gas_used,
                receipt.block_number,
                &receipt.block_hash.to_string(),
            )
            .await;

        match outcome {
            Ok(UpdateOutcome::Applied) => {
                info!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    block_number = receipt.block_number,
                    "Transaction mined"
                );
            }
            Ok(UpdateOutcome::Missing) => self.retry_missing(hash_str).await,
            Err(err) => {
                error!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Error updating mined transaction"
                );
            }
        }
    }

    /// Bounded retry for updates that found no record, which happens when
    /// ingest on another client raced this resolver. Beyond the bound the
    /// hash is force-dropped instead of circulating forever.
    async fn retry_missing(&self, hash_str: &str) {
        let count = match self.store.counter_incr(&keys::retry(hash_str), RETRY_TTL).await {
            Ok(count) => count,
            Err(err) => {
                error!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    hash = %hash_str,
                    %err,
                    "Error incrementing retry counter"
                );
                return;
            }
        };

        if count <= MAX_MISSING_RECORD_RETRIES {
            self.requeue(hash_str).await;
        } else {
            warn!(
                target: "txscope::resolver",
                client = %self.client_name,
                hash = %hash_str,
                retries = count - 1,
                "Retry budget exhausted, dropping"
            );
            let _ = self.storage.update_dropped(hash_str, unix_now()).await;
        }
    }

    async fn requeue(&self, hash_str: &str) {
        if let Err(err) = self.storage.enqueue(hash_str).await {
            error!(
                target: "txscope::resolver",
                client = %self.client_name,
                hash = %hash_str,
                %err,
                "Error requeueing transaction"
            );
        }
    }

    async fn report_queue_depth(&self) {
        match self.storage.queue_depth().await {
            Ok(depth) => {
                info!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    queue = %keys::stream(&self.client_name),
                    size = depth,
                    "Queue depth"
                );
            }
            Err(err) => {
                warn!(
                    target: "txscope::resolver",
                    client = %self.client_name,
                    %err,
                    "Error reading queue depth"
                );
            }
        }
    }
}
