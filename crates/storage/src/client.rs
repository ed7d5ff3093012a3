use crate::{StorageError, Store, keys};
use alloy_consensus::TxEnvelope;
use std::sync::Arc;
use tracing::{debug, error};
use txscope_types::{MineStatus, StoredTransaction, TransactionStatus, structure_tx};

/// Result of a read-modify-write against a per-client record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record existed and the update was written back.
    Applied,
    /// No record existed; nothing was written. The resolver decides whether
    /// to retry via the bounded retry counter.
    Missing,
}

/// Lifecycle record operations for a single execution client.
///
/// Every update is a read-modify-write of the JSON record in the client's
/// meta hash-map followed by a refresh of the secondary indexes. Updates
/// never regress `time_pending` or `time_mined` once set and never touch
/// `time_received`; the status field is always overwritten — the terminal
/// sink rule is the resolver's responsibility.
#[derive(Debug)]
pub struct ClientStorage<S> {
    store: Arc<S>,
    client: String,
    meta_key: String,
    stream_key: String,
    gas_key: String,
    nonce_key: String,
    type_key: String,
}

impl<S: Store> ClientStorage<S> {
    /// Creates storage for `client` on top of `store`.
    pub fn new(client: &str, store: Arc<S>) -> Self {
        Self {
            store,
            client: client.to_owned(),
            meta_key: keys::meta(client),
            stream_key: keys::stream(client),
            gas_key: keys::gas_index(client),
            nonce_key: keys::nonce_index(client),
            type_key: keys::type_index(client),
        }
    }

    /// Writes a fresh received-only record, overwriting any prior one.
    pub async fn store_received(&self, hash: &str, arrival_ts: i64) -> Result<(), StorageError> {
        let record = StoredTransaction::received(hash, arrival_ts);
        let encoded = serde_json::to_string(&record)?;
        self.store.hash_set(&self.meta_key, hash, &encoded).await
    }

    /// Reads the record for `hash`, if any.
    pub async fn read(&self, hash: &str) -> Result<Option<StoredTransaction>, StorageError> {
        match self.store.hash_get(&self.meta_key, hash).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Marks the transaction pending in the mempool.
    pub async fn update_pending(
        &self,
        hash: &str,
        envelope: &TxEnvelope,
        timestamp: i64,
    ) -> Result<UpdateOutcome, StorageError> {
        let tx = structure_tx(envelope)?;
        self.update_record(hash, |record| {
            record.metadata.status = TransactionStatus::Pending;
            if record.metadata.time_pending.is_none() {
                record.metadata.time_pending = Some(timestamp);
            }
            record.tx = Some(tx);
        })
        .await
    }

    /// Marks the transaction queued (nonce gap or insufficient gas).
    pub async fn update_queued(
        &self,
        hash: &str,
        envelope: &TxEnvelope,
        timestamp: i64,
    ) -> Result<UpdateOutcome, StorageError> {
        let tx = structure_tx(envelope)?;
        self.update_record(hash, |record| {
            record.metadata.status = TransactionStatus::Queued;
            record.metadata.time_queued = timestamp;
            record.tx = Some(tx);
        })
        .await
    }

    /// Marks the transaction dropped from the mempool.
    pub async fn update_dropped(
        &self,
        hash: &str,
        timestamp: i64,
    ) -> Result<UpdateOutcome, StorageError> {
        self.update_record(hash, |record| {
            record.metadata.status = TransactionStatus::Dropped;
            record.metadata.time_dropped = timestamp;
        })
        .await
    }

    /// Marks the transaction mined.
    ///
    /// When `time_pending` was never observed, it is backfilled with the
    /// block timestamp so pending-duration queries stay well-defined.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_mined(
        &self,
        hash: &str,
        envelope: Option<&TxEnvelope>,
        block_ts: i64,
        receipt_success: bool,
        gas_used: u64,
        block_number: u64,
        block_hash: &str,
    ) -> Result<UpdateOutcome, StorageError> {
        let tx = envelope.map(structure_tx).transpose()?;
        self.update_record(hash, |record| {
            record.metadata.status = TransactionStatus::Mined;
            if record.metadata.time_mined.is_none() {
                record.metadata.time_mined = Some(block_ts);
            }
            if record.metadata.time_pending.is_none() {
                record.metadata.time_pending = Some(block_ts);
            }
            record.metadata.mine_status = Some(MineStatus::from_receipt(receipt_success));
            record.metadata.gas_used = gas_used;
            record.metadata.block_number = block_number;
            record.metadata.block_hash = block_hash.to_owned();
            if tx.is_some() {
                record.tx = tx;
            }
        })
        .await
    }

    /// Appends `client:hash` to this client's resolution queue.
    pub async fn enqueue(&self, hash: &str) -> Result<(), StorageError> {
        let entry = format!("{}:{hash}", self.client);
        self.store.queue_push_back(&self.stream_key, &entry).await
    }

    /// Pops the next queued entry, if any.
    pub async fn dequeue(&self) -> Result<Option<String>, StorageError> {
        self.store.queue_pop_front(&self.stream_key).await
    }

    /// Current depth of this client's resolution queue.
    pub async fn queue_depth(&self) -> Result<u64, StorageError> {
        self.store.queue_len(&self.stream_key).await
    }

    async fn update_record<F>(&self, hash: &str, apply: F) -> Result<UpdateOutcome, StorageError>
    where
        F: FnOnce(&mut StoredTransaction),
    {
        let Some(raw) = self.store.hash_get(&self.meta_key, hash).await? else {
            debug!(target: "txscope::storage", client = %self.client, hash, "no record to update");
            return Ok(UpdateOutcome::Missing);
        };
        let mut record: StoredTransaction = serde_json::from_str(&raw)?;

        apply(&mut record);

        let encoded = serde_json::to_string(&record)?;
        self.store.hash_set(&self.meta_key, hash, &encoded).await?;
        self.refresh_indexes(&record).await;
        Ok(UpdateOutcome::Applied)
    }

    /// Rewrites the secondary indexes for a record that carries structured
    /// transaction fields. Index writes are best-effort: a failure is logged
    /// and the record write stands, since index membership is allowed to lag.
    async fn refresh_indexes(&self, record: &StoredTransaction) {
        let Some(tx) = &record.tx else { return };

        let mut entries = Vec::with_capacity(3);
        // EIP-1559 and blob transactions carry no gas price by design.
        if let Some(gas_price) = tx.gas_price.as_ref().and_then(|price| price.parse::<f64>().ok())
        {
            entries.push((self.gas_key.clone(), record.hash.clone(), gas_price));
        }
        entries.push((self.nonce_key.clone(), record.hash.clone(), tx.nonce as f64));
        entries.push((self.type_key.clone(), record.hash.clone(), f64::from(tx.tx_type)));

        if let Err(err) = self.store.sorted_add_multi(&entries).await {
            error!(
                target: "txscope::storage",
                client = %self.client,
                hash = %record.hash,
                %err,
                "Failed to refresh secondary indexes"
            );
        }
    }
}

impl<S: Store> Clone for ClientStorage<S> {
    fn clone(&self) -> Self {
        Self::new(&self.client, self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use alloy_consensus::{Signed, TxEip1559, TxLegacy};
    use alloy_primitives::{Signature, TxKind, U256, address};

    const HASH: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    fn legacy_envelope() -> TxEnvelope {
        let tx = TxLegacy {
            chain_id: Some(1),
            nonce: 7,
            gas_price: 2_000_000_000,
            gas_limit: 21_000,
            to: TxKind::Call(address!("00000000000000000000000000000000000000bb")),
            value: U256::from(10u64),
            input: Default::default(),
        };
        TxEnvelope::Legacy(Signed::new_unchecked(tx, Signature::test_signature(), Default::default()))
    }

    fn eip1559_envelope() -> TxEnvelope {
        let tx = TxEip1559 {
            chain_id: 1,
            nonce: 2,
            gas_limit: 50_000,
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
            to: TxKind::Call(address!("00000000000000000000000000000000000000cc")),
            value: U256::ZERO,
            ..Default::default()
        };
        TxEnvelope::Eip1559(Signed::new_unchecked(tx, Signature::test_signature(), Default::default()))
    }

    fn storage() -> (Arc<MemoryStore>, ClientStorage<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let storage = ClientStorage::new("alpha", store.clone());
        (store, storage)
    }

    #[tokio::test]
    async fn store_received_overwrites_prior_record() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        storage.store_received(HASH, 200).await.unwrap();

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Received);
        assert_eq!(record.metadata.time_received, 200);
        assert!(record.tx.is_none());
    }

    #[tokio::test]
    async fn update_without_record_is_a_noop() {
        let (store, storage) = storage();
        let outcome = storage.update_dropped(HASH, 10).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Missing);
        assert!(store.hash_get(&keys::meta("alpha"), HASH).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pending_update_sets_time_once() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();

        let env = legacy_envelope();
        assert_eq!(storage.update_pending(HASH, &env, 110).await.unwrap(), UpdateOutcome::Applied);
        assert_eq!(storage.update_pending(HASH, &env, 120).await.unwrap(), UpdateOutcome::Applied);

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Pending);
        assert_eq!(record.metadata.time_pending, Some(110));
        assert_eq!(record.metadata.time_received, 100);
        assert_eq!(record.tx.as_ref().unwrap().nonce, 7);
    }

    #[tokio::test]
    async fn pending_and_queued_oscillate_without_losing_times() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        let env = legacy_envelope();

        storage.update_pending(HASH, &env, 110).await.unwrap();
        storage.update_queued(HASH, &env, 115).await.unwrap();
        storage.update_pending(HASH, &env, 130).await.unwrap();

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Pending);
        assert_eq!(record.metadata.time_pending, Some(110));
        assert_eq!(record.metadata.time_queued, 115);
    }

    #[tokio::test]
    async fn mined_update_backfills_time_pending() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();

        let env = legacy_envelope();
        let outcome = storage
            .update_mined(HASH, Some(&env), 500, true, 21_000, 42, "0xbb")
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Mined);
        assert_eq!(record.metadata.time_mined, Some(500));
        assert_eq!(record.metadata.time_pending, Some(500));
        assert_eq!(record.metadata.block_number, 42);
        assert_eq!(record.metadata.block_hash, "0xbb");
        assert_eq!(record.metadata.gas_used, 21_000);
        assert_eq!(record.metadata.mine_status, Some(MineStatus::Success));
    }

    #[tokio::test]
    async fn mined_update_never_regresses_times() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        let env = legacy_envelope();

        storage.update_pending(HASH, &env, 110).await.unwrap();
        storage.update_mined(HASH, Some(&env), 500, false, 0, 42, "0xbb").await.unwrap();
        storage.update_mined(HASH, Some(&env), 900, false, 0, 42, "0xbb").await.unwrap();

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.time_pending, Some(110));
        assert_eq!(record.metadata.time_mined, Some(500));
        assert_eq!(record.metadata.mine_status, Some(MineStatus::Failed));
    }

    #[tokio::test]
    async fn indexes_follow_structured_tx() {
        let (store, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        storage.update_pending(HASH, &legacy_envelope(), 110).await.unwrap();

        assert_eq!(
            store.sorted_score(&keys::gas_index("alpha"), HASH).await.unwrap(),
            Some(2_000_000_000.0)
        );
        assert_eq!(store.sorted_score(&keys::nonce_index("alpha"), HASH).await.unwrap(), Some(7.0));
        assert_eq!(store.sorted_score(&keys::type_index("alpha"), HASH).await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn gas_index_skips_txs_without_gas_price() {
        let (store, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        storage.update_pending(HASH, &eip1559_envelope(), 110).await.unwrap();

        assert_eq!(store.sorted_score(&keys::gas_index("alpha"), HASH).await.unwrap(), None);
        assert_eq!(store.sorted_score(&keys::type_index("alpha"), HASH).await.unwrap(), Some(2.0));
    }

    #[tokio::test]
    async fn queue_round_trip() {
        let (_, storage) = storage();
        storage.enqueue(HASH).await.unwrap();
        assert_eq!(storage.queue_depth().await.unwrap(), 1);
        assert_eq!(storage.dequeue().await.unwrap(), Some(format!("alpha:{HASH}")));
        assert_eq!(storage.dequeue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn dropped_then_mined_recovers() {
        let (_, storage) = storage();
        storage.store_received(HASH, 100).await.unwrap();
        storage.update_dropped(HASH, 150).await.unwrap();
        storage.update_mined(HASH, Some(&legacy_envelope()), 500, true, 0, 9, "0xcc").await.unwrap();

        let record = storage.read(HASH).await.unwrap().unwrap();
        assert_eq!(record.metadata.status, TransactionStatus::Mined);
        assert_eq!(record.metadata.time_dropped, 150);
    }
}
