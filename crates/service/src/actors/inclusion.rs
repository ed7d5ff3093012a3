//! Beacon inclusion-list SSE consumer.

use crate::{Actor, config::BeaconEndpoint};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use txscope_storage::{StorageError, Store, keys};
use txscope_types::{MempoolMessage, decode_inclusion_transactions};

/// Errors that end an inclusion-stream task.
///
/// Per the supervision policy there is no in-process reconnect: a failed
/// stream ends the task and the operator restarts the process.
#[derive(Debug, Error)]
pub enum InclusionStreamError {
    /// The HTTP subscription could not be established.
    #[error("sse subscription failed")]
    Subscribe(#[from] reqwest::Error),

    /// The event stream reported an error.
    #[error("sse stream failed: {0}")]
    Stream(String),

    /// The server closed the stream.
    #[error("sse stream closed by server")]
    Closed,

    /// A cache write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// One task per beacon endpoint, consuming `block` and `inclusion_list`
/// events and keeping the most complete inclusion list seen per slot.
///
/// The per-slot score (tx count) is updated with greater-only semantics;
/// the stored transaction list changes only when the score does, so the
/// list always matches the high-water count.
#[derive(Debug)]
pub struct InclusionStreamActor<S> {
    beacon: BeaconEndpoint,
    store: Arc<S>,
    cancel_token: CancellationToken,
}

impl<S: Store + 'static> InclusionStreamActor<S> {
    /// Creates the consumer for one beacon endpoint.
    pub fn new(beacon: BeaconEndpoint, store: Arc<S>, cancel_token: CancellationToken) -> Self {
        Self { beacon, store, cancel_token }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/eth/v1/events?topics=block&topics=inclusion_list",
            self.beacon.beacon_url.trim_end_matches('/')
        )
    }

    /// Applies one SSE payload. Parse failures are logged and skipped;
    /// only cache failures propagate.
    async fn handle_event(&self, data: &str) -> Result<(), InclusionStreamError> {
        let message: MempoolMessage = match serde_json::from_str(data) {
            Ok(message) => message,
            Err(err) => {
                error!(
                    target: "txscope::inclusion",
                    beacon = %self.beacon.name,
                    %err,
                    data,
                    "Failed to parse inclusion list message"
                );
                return Ok(());
            }
        };

        let raw = &message.data.message.transactions;
        let decoded = decode_inclusion_transactions(raw);
        if decoded.len() < raw.len() {
            debug!(
                target: "txscope::inclusion",
                beacon = %self.beacon.name,
                rejected = raw.len() - decoded.len(),
                "Skipped undecodable inclusion-list entries"
            );
        }

        let slot = message.data.message.slot;
        let tx_count = decoded.len();
        if slot.is_empty() && tx_count == 0 {
            return Ok(());
        }

        let updated = self
            .store
            .sorted_add_if_greater(keys::inclusion_score(), &slot, tx_count as f64)
            .await?;
        if updated {
            let payload = serde_json::to_string(&decoded).map_err(StorageError::from)?;
            self.store.hash_set(keys::inclusion_txns(), &slot, &payload).await?;
            info!(
                target: "txscope::inclusion",
                beacon = %self.beacon.name,
                slot = %slot,
                tx_count,
                "Updated inclusion list"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Store + 'static> Actor for InclusionStreamActor<S> {
    type Error = InclusionStreamError;

    async fn start(self) -> Result<(), Self::Error> {
        let url = self.events_url();
        info!(target: "txscope::inclusion", beacon = %self.beacon.name, %url, "Connecting to beacon event stream");

        let response = reqwest::Client::new()
            .get(&url)
            .header(http::header::ACCEPT, "text/event-stream")
            .send()
            .await?
            .error_for_status()?;
        let mut events = response.bytes_stream().eventsource();

        info!(target: "txscope::inclusion", beacon = %self.beacon.name, "Subscribed to SSE stream");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!(target: "txscope::inclusion", beacon = %self.beacon.name, "Cancellation requested, stopping...");
                    return Ok(());
                }
                event = events.next() => {
                    match event {
                        Some(Ok(event)) => {
                            if event.data.is_empty() {
                                warn!(target: "txscope::inclusion", beacon = %self.beacon.name, "Received empty SSE event data");
                                continue;
                            }
                            self.handle_event(&event.data).await?;
                        }
                        Some(Err(err)) => {
                            error!(target: "txscope::inclusion", beacon = %self.beacon.name, %err, "SSE subscription error");
                            return Err(InclusionStreamError::Stream(err.to_string()));
                        }
                        None => {
                            warn!(target: "txscope::inclusion", beacon = %self.beacon.name, "SSE stream closed by server");
                            return Err(InclusionStreamError::Closed);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_consensus::{Signed, TxEnvelope, TxLegacy};
    use alloy_eips::eip2718::Encodable2718;
    use alloy_primitives::{Signature, TxKind, U256, address, hex};
    use txscope_storage::MemoryStore;

    fn encoded_legacy(nonce: u64) -> String {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce,
            gas_price: 1_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("00000000000000000000000000000000000000cc")),
            value: U256::from(1u64),
            input: Default::default(),
        };
        let envelope =
            TxEnvelope::Legacy(Signed::new_unchecked(tx, Signature::test_signature(), Default::default()));
        hex::encode_prefixed(envelope.encoded_2718())
    }

    fn payload(slot: &str, txs: &[String]) -> String {
        let txs = serde_json::to_string(txs).unwrap();
        format!(
            r#"{{"version":"electra","data":{{"message":{{"slot":"{slot}","validator_index":"1","inclusion_list_committee_root":"0x00","transactions":{txs}}},"signature":"0xsig"}}}}"#
        )
    }

    fn actor() -> (Arc<MemoryStore>, InclusionStreamActor<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let beacon =
            BeaconEndpoint { name: "lighthouse".into(), beacon_url: "http://localhost:5052".into() };
        let actor = InclusionStreamActor::new(beacon, store.clone(), CancellationToken::new());
        (store, actor)
    }

    #[tokio::test]
    async fn stores_list_and_score() {
        let (store, actor) = actor();
        let txs = vec![encoded_legacy(0), encoded_legacy(1), encoded_legacy(2)];
        actor.handle_event(&payload("77", &txs)).await.unwrap();

        assert_eq!(store.sorted_score(keys::inclusion_score(), "77").await.unwrap(), Some(3.0));
        let stored = store.hash_get(keys::inclusion_txns(), "77").await.unwrap().unwrap();
        let decoded: Vec<TxEnvelope> = serde_json::from_str(&stored).unwrap();
        assert_eq!(decoded.len(), 3);
    }

    #[tokio::test]
    async fn smaller_list_never_replaces_larger() {
        let (store, actor) = actor();
        let three = vec![encoded_legacy(0), encoded_legacy(1), encoded_legacy(2)];
        let two = vec![encoded_legacy(8), encoded_legacy(9)];

        actor.handle_event(&payload("77", &three)).await.unwrap();
        actor.handle_event(&payload("77", &two)).await.unwrap();

        assert_eq!(store.sorted_score(keys::inclusion_score(), "77").await.unwrap(), Some(3.0));
        let stored = store.hash_get(keys::inclusion_txns(), "77").await.unwrap().unwrap();
        let decoded: Vec<TxEnvelope> = serde_json::from_str(&stored).unwrap();
        // The stored list still matches the high-water event.
        assert_eq!(decoded.len(), 3);
        assert!(decoded.iter().all(|tx| {
            use alloy_consensus::Transaction;
            tx.nonce() < 3
        }));
    }

    #[tokio::test]
    async fn larger_list_replaces_smaller() {
        let (store, actor) = actor();
        actor.handle_event(&payload("9", &[encoded_legacy(0)])).await.unwrap();
        actor
            .handle_event(&payload("9", &[encoded_legacy(1), encoded_legacy(2)]))
            .await
            .unwrap();

        assert_eq!(store.sorted_score(keys::inclusion_score(), "9").await.unwrap(), Some(2.0));
    }

    #[tokio::test]
    async fn empty_slot_and_empty_list_is_ignored() {
        let (store, actor) = actor();
        actor.handle_event(&payload("", &[])).await.unwrap();
        assert!(store.hash_get_all(keys::inclusion_txns()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let (store, actor) = actor();
        actor.handle_event("{not json").await.unwrap();
        assert!(store.hash_get_all(keys::inclusion_txns()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_entries_do_not_count() {
        let (store, actor) = actor();
        let txs = vec![encoded_legacy(0), "0xdeadbeef".to_string()];
        actor.handle_event(&payload("5", &txs)).await.unwrap();

        assert_eq!(store.sorted_score(keys::inclusion_score(), "5").await.unwrap(), Some(1.0));
    }
}
