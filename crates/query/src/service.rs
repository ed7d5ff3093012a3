//! Read-only query service over the cache store.

use crate::{DiffFields, FieldMap, FieldValues, compute_diff, flatten_metadata, flatten_tx};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::warn;
use txscope_storage::{StorageError, Store, keys};
use txscope_types::{InclusionReport, InclusionReportWithSlot, StoredTransaction};

/// Errors surfaced by read operations.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A cache read failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Slim per-transaction summary for listing endpoints, read through the
/// primary client's records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    /// Transaction hash.
    pub hash: String,
    /// Sender address, empty until the resolver has seen the signed tx.
    pub from: String,
    /// Gas consumed per the receipt, zero until mined.
    pub gas_used: u64,
    /// Sender nonce.
    pub nonce: u64,
    /// EIP-2718 type byte.
    #[serde(rename = "type")]
    pub tx_type: u8,
}

/// Fields agreeing across all clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSection {
    /// Agreed structured-transaction fields.
    pub tx: FieldMap,
    /// Agreed metadata fields.
    pub metadata: FieldMap,
}

/// Fields diverging between clients, with every client's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffSection {
    /// Diverging structured-transaction fields.
    pub tx: BTreeMap<String, FieldValues>,
    /// Diverging metadata fields.
    pub metadata: BTreeMap<String, FieldValues>,
}

/// Cross-client view of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxComparison {
    /// Transaction hash.
    pub hash: String,
    /// Clients holding a record for the hash.
    pub clients: Vec<String>,
    /// Fields common to all clients.
    pub common: ComparisonSection,
    /// Fields that diverge per client.
    pub diff: DiffSection,
}

/// Read-side service; executes on the caller's task and issues only cache
/// reads.
#[derive(Debug)]
pub struct QueryService<S> {
    store: Arc<S>,
    clients: Vec<String>,
    focil_enabled: bool,
}

impl<S: Store> QueryService<S> {
    /// Creates the service for the configured client names, in
    /// configuration order; the first entry is the primary read-through.
    pub fn new(store: Arc<S>, clients: Vec<String>, focil_enabled: bool) -> Self {
        Self { store, clients, focil_enabled }
    }

    /// Whether the inclusion-list feature is active.
    pub fn focil_enabled(&self) -> bool {
        self.focil_enabled
    }

    /// The newest `n` hashes by global arrival order, newest first.
    pub async fn latest_transactions(&self, n: usize) -> Result<Vec<String>, QueryError> {
        Ok(self.store.sorted_rev_range(keys::universal(), n).await?)
    }

    /// Every client's record for `hash`; clients without one are omitted.
    /// Returns `None` when no client has a record.
    pub async fn transaction_details(
        &self,
        hash: &str,
    ) -> Result<Option<TxComparison>, QueryError> {
        let mut records: BTreeMap<String, StoredTransaction> = BTreeMap::new();
        for client in &self.clients {
            let Some(raw) = self.store.hash_get(&keys::meta(client), hash).await? else {
                continue;
            };
            match serde_json::from_str(&raw) {
                Ok(record) => {
                    records.insert(client.clone(), record);
                }
                Err(err) => {
                    warn!(target: "txscope::query", client = %client, hash, %err, "Skipping malformed record");
                }
            }
        }
        if records.is_empty() {
            return Ok(None);
        }

        let primary = self.clients.first().map(String::as_str).unwrap_or_default();

        let tx_maps: BTreeMap<String, FieldMap> = records
            .iter()
            .map(|(client, record)| (client.clone(), flatten_tx(record.tx.as_ref())))
            .collect();
        let meta_maps: BTreeMap<String, FieldMap> = records
            .iter()
            .map(|(client, record)| (client.clone(), flatten_metadata(&record.metadata)))
            .collect();

        let DiffFields { common: tx_common, diff: tx_diff } = compute_diff(&tx_maps, primary);
        let DiffFields { common: meta_common, diff: meta_diff } =
            compute_diff(&meta_maps, primary);

        // Clients in configuration order, filtered to those with records.
        let clients =
            self.clients.iter().filter(|client| records.contains_key(*client)).cloned().collect();

        Ok(Some(TxComparison {
            hash: hash.to_owned(),
            clients,
            common: ComparisonSection { tx: tx_common, metadata: meta_common },
            diff: DiffSection { tx: tx_diff, metadata: meta_diff },
        }))
    }

    /// Slim summaries of the newest `n` arrivals, read through the primary
    /// client only. Hashes the primary has no record for are skipped.
    pub async fn latest_summaries(
        &self,
        n: usize,
    ) -> Result<Vec<TransactionSummary>, QueryError> {
        let Some(primary) = self.clients.first() else {
            return Ok(Vec::new());
        };
        let meta_key = keys::meta(primary);

        let mut summaries = Vec::new();
        for hash in self.latest_transactions(n).await? {
            let Some(raw) = self.store.hash_get(&meta_key, &hash).await? else {
                continue;
            };
            let record: StoredTransaction = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(err) => {
                    warn!(target: "txscope::query", client = %primary, hash, %err, "Skipping malformed record");
                    continue;
                }
            };
            let tx = record.tx.as_ref();
            summaries.push(TransactionSummary {
                hash,
                from: tx.map(|tx| tx.from.clone()).unwrap_or_default(),
                gas_used: record.metadata.gas_used,
                nonce: tx.map(|tx| tx.nonce).unwrap_or_default(),
                tx_type: tx.map(|tx| tx.tx_type).unwrap_or_default(),
            });
        }
        Ok(summaries)
    }

    /// All inclusion reports, sorted by slot descending. Entries with an
    /// unparseable slot or body are skipped.
    pub async fn inclusion_reports(&self) -> Result<Vec<InclusionReportWithSlot>, QueryError> {
        let entries = self.store.hash_get_all(keys::inclusion_report()).await?;

        let mut reports = Vec::with_capacity(entries.len());
        for (slot_field, raw) in entries {
            let Ok(slot) = slot_field.parse::<u64>() else {
                warn!(target: "txscope::query", slot = %slot_field, "Invalid slot key");
                continue;
            };
            let report: InclusionReport = match serde_json::from_str(&raw) {
                Ok(report) => report,
                Err(err) => {
                    warn!(target: "txscope::query", slot, %err, "Invalid inclusion report entry");
                    continue;
                }
            };
            reports.push(InclusionReportWithSlot { slot, report });
        }
        reports.sort_by(|a, b| b.slot.cmp(&a.slot));
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use txscope_storage::{ClientStorage, MemoryStore};
    use txscope_types::{InclusionSummary, StructuredTx, TransactionStatus};

    fn record(gas: u64) -> StoredTransaction {
        StoredTransaction {
            hash: "0xcc".into(),
            tx: Some(StructuredTx {
                chain_id: "1".into(),
                from: "0xF1".into(),
                to: Some("0xF2".into()),
                is_contract_creation: false,
                nonce: 7,
                value: "100".into(),
                gas,
                gas_price: Some("1000".into()),
                max_fee_per_gas: Some("1000".into()),
                max_priority_fee: None,
                max_fee_per_blob_gas: None,
                data: None,
                tx_type: 0,
            }),
            metadata: txscope_types::TransactionMetadata {
                status: TransactionStatus::Pending,
                time_received: 100,
                time_pending: Some(110),
                ..Default::default()
            },
        }
    }

    async fn seed(store: &Arc<MemoryStore>, client: &str, hash: &str, record: &StoredTransaction) {
        store
            .hash_set(&keys::meta(client), hash, &serde_json::to_string(record).unwrap())
            .await
            .unwrap();
    }

    fn service(store: Arc<MemoryStore>) -> QueryService<MemoryStore> {
        QueryService::new(store, vec!["alpha".into(), "beta".into()], true)
    }

    #[tokio::test]
    async fn latest_is_newest_first() {
        let store = Arc::new(MemoryStore::new());
        store.sorted_add_if_absent(keys::universal(), "0xa1", 100.0).await.unwrap();
        store.sorted_add_if_absent(keys::universal(), "0xa2", 300.0).await.unwrap();
        store.sorted_add_if_absent(keys::universal(), "0xa3", 200.0).await.unwrap();

        let latest = service(store).latest_transactions(2).await.unwrap();
        assert_eq!(latest, vec!["0xa2", "0xa3"]);
    }

    #[tokio::test]
    async fn details_classify_common_and_diff() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "alpha", "0xcc", &record(21_000)).await;
        seed(&store, "beta", "0xcc", &record(30_000)).await;

        let comparison = service(store).transaction_details("0xcc").await.unwrap().unwrap();
        assert_eq!(comparison.clients, vec!["alpha", "beta"]);
        // Every tx field except gas agrees.
        assert!(comparison.common.tx.contains_key("nonce"));
        assert!(comparison.common.tx.contains_key("from"));
        assert!(!comparison.common.tx.contains_key("gas"));
        let gas = &comparison.diff.tx["gas"];
        assert_eq!(gas["alpha"], json!(21_000));
        assert_eq!(gas["beta"], json!(30_000));
        assert!(comparison.diff.metadata.is_empty());
    }

    #[tokio::test]
    async fn details_omit_clients_without_records() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "beta", "0xcc", &record(21_000)).await;

        let comparison = service(store).transaction_details("0xcc").await.unwrap().unwrap();
        assert_eq!(comparison.clients, vec!["beta"]);
        assert!(comparison.diff.tx.is_empty());
    }

    #[tokio::test]
    async fn details_of_unknown_hash_are_none() {
        let store = Arc::new(MemoryStore::new());
        assert!(service(store).transaction_details("0xzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summaries_read_primary_only() {
        let store = Arc::new(MemoryStore::new());
        store.sorted_add_if_absent(keys::universal(), "0xcc", 100.0).await.unwrap();
        store.sorted_add_if_absent(keys::universal(), "0xdd", 200.0).await.unwrap();
        // Only the primary has 0xcc; only beta has 0xdd.
        seed(&store, "alpha", "0xcc", &record(21_000)).await;
        seed(&store, "beta", "0xdd", &record(21_000)).await;

        let summaries = service(store).latest_summaries(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].hash, "0xcc");
        assert_eq!(summaries[0].from, "0xF1");
        assert_eq!(summaries[0].nonce, 7);
    }

    #[tokio::test]
    async fn summary_of_received_only_record_has_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.sorted_add_if_absent(keys::universal(), "0xee", 100.0).await.unwrap();
        let storage = ClientStorage::new("alpha", store.clone());
        storage.store_received("0xee", 100).await.unwrap();

        let summaries = service(store).latest_summaries(10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].from, "");
        assert_eq!(summaries[0].nonce, 0);
    }

    #[tokio::test]
    async fn inclusion_reports_sort_by_slot_descending() {
        let store = Arc::new(MemoryStore::new());
        let report = InclusionReport {
            included: vec![],
            missing: vec![],
            summary: InclusionSummary::default(),
        };
        let raw = serde_json::to_string(&report).unwrap();
        store.hash_set(keys::inclusion_report(), "7", &raw).await.unwrap();
        store.hash_set(keys::inclusion_report(), "99", &raw).await.unwrap();
        store.hash_set(keys::inclusion_report(), "42", &raw).await.unwrap();
        store.hash_set(keys::inclusion_report(), "bogus", &raw).await.unwrap();

        let reports = service(store).inclusion_reports().await.unwrap();
        let slots: Vec<u64> = reports.iter().map(|entry| entry.slot).collect();
        assert_eq!(slots, vec![99, 42, 7]);
    }
}
