//! Per-client transaction records and their lifecycle metadata.

use alloy_consensus::{Transaction, TxEnvelope, Typed2718, crypto::RecoveryError, transaction::SignerRecoverable};
use alloy_primitives::hex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a transaction as observed by a single client.
///
/// `Mined` and `Dropped` are terminal: the resolver never requeues a hash
/// after writing either of them, though a hash marked dropped may still be
/// re-observed as mined by a later receipt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Seen on the pending-transaction stream, not yet resolved.
    #[default]
    #[display("received")]
    Received,
    /// In the mempool, executable with the current account state.
    #[display("pending")]
    Pending,
    /// In the mempool but not executable (nonce gap or insufficient gas).
    #[display("queued")]
    Queued,
    /// Included in a block.
    #[display("mined")]
    Mined,
    /// Left the mempool without a receipt.
    #[display("dropped")]
    Dropped,
}

impl TransactionStatus {
    /// Whether the status is a sink for the resolver.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Mined | Self::Dropped)
    }
}

/// Execution outcome reported by the receipt of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum MineStatus {
    /// Receipt status was success.
    #[display("success")]
    Success,
    /// Receipt status was failure.
    #[display("failed")]
    Failed,
    /// Receipt carried no interpretable status.
    #[display("unknown")]
    Unknown,
}

impl MineStatus {
    /// Classifies a boolean receipt status.
    pub const fn from_receipt(success: bool) -> Self {
        if success { Self::Success } else { Self::Failed }
    }
}

/// Timing and inclusion metadata tracked alongside the structured
/// transaction.
///
/// `time_pending` and `time_mined` are first-observation-wins: once set they
/// are never overwritten. `time_received` is written exactly once when the
/// record is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// Unix second at which this client first saw the hash.
    pub time_received: i64,
    /// Unix second at which the tx was first seen pending, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_pending: Option<i64>,
    /// Unix second of the most recent queued observation.
    #[serde(default)]
    pub time_queued: i64,
    /// Block timestamp of the including block, if mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_mined: Option<i64>,
    /// Unix second at which the tx was classified dropped.
    #[serde(default)]
    pub time_dropped: i64,
    /// Number of the including block.
    #[serde(default)]
    pub block_number: u64,
    /// Hash of the including block.
    #[serde(default)]
    pub block_hash: String,
    /// Gas consumed per the receipt.
    #[serde(default)]
    pub gas_used: u64,
    /// Receipt execution outcome, present once mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine_status: Option<MineStatus>,
}

/// Surface fields of a signed transaction, flattened for indexing and
/// cross-client comparison.
///
/// Large numerics (`value`, gas prices, fees) are decimal strings so the
/// JSON encoding never loses precision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTx {
    /// Chain id the transaction was signed for, empty for pre-EIP-155.
    #[serde(default)]
    pub chain_id: String,
    /// Sender address recovered from the signature, EIP-55 checksummed.
    pub from: String,
    /// Recipient address, absent for contract creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Whether the transaction creates a contract.
    #[serde(rename = "isContractCreation")]
    pub is_contract_creation: bool,
    /// Sender account nonce.
    pub nonce: u64,
    /// Transferred value in wei, decimal string.
    pub value: String,
    /// Gas limit.
    pub gas: u64,
    /// Gas price in wei, only present on legacy and access-list txs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    /// EIP-1559 max fee per gas (for legacy txs this echoes the gas price).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    /// EIP-1559 max priority fee per gas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee: Option<String>,
    /// Blob fee cap, only present on blob transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_blob_gas: Option<String>,
    /// Calldata, hex encoded without a `0x` prefix; absent when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// EIP-2718 transaction type byte.
    #[serde(rename = "type")]
    pub tx_type: u8,
}

/// The canonical record held per `(client, transaction hash)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    /// Transaction hash, lowercase `0x…` string.
    pub hash: String,
    /// Structured transaction fields, present once the resolver has seen
    /// the signed transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<StructuredTx>,
    /// Lifecycle metadata.
    pub metadata: TransactionMetadata,
}

impl StoredTransaction {
    /// A fresh received-only record.
    pub fn received(hash: impl Into<String>, arrival_ts: i64) -> Self {
        Self {
            hash: hash.into(),
            tx: None,
            metadata: TransactionMetadata {
                status: TransactionStatus::Received,
                time_received: arrival_ts,
                ..Default::default()
            },
        }
    }
}

/// Error raised while assembling a [`StructuredTx`] from a signed envelope.
#[derive(Debug, Error)]
pub enum TxConversionError {
    /// The signature did not yield a sender address.
    #[error("failed to recover transaction sender")]
    SenderRecovery(#[from] RecoveryError),
}

/// Extracts the surface fields of a signed transaction envelope.
///
/// The sender is derived from the signature; recovery failure is fatal to
/// the conversion so that no record ever carries a fabricated sender.
pub fn structure_tx(envelope: &TxEnvelope) -> Result<StructuredTx, TxConversionError> {
    let sender = envelope.recover_signer()?;
    let input = envelope.input();

    Ok(StructuredTx {
        chain_id: envelope.chain_id().map(|id| id.to_string()).unwrap_or_default(),
        from: sender.to_string(),
        to: envelope.to().map(|addr| addr.to_string()),
        is_contract_creation: envelope.to().is_none(),
        nonce: envelope.nonce(),
        value: envelope.value().to_string(),
        gas: envelope.gas_limit(),
        gas_price: envelope.gas_price().map(|price| price.to_string()),
        max_fee_per_gas: Some(envelope.max_fee_per_gas().to_string()),
        max_priority_fee: envelope.max_priority_fee_per_gas().map(|fee| fee.to_string()),
        max_fee_per_blob_gas: envelope.max_fee_per_blob_gas().map(|fee| fee.to_string()),
        data: (!input.is_empty()).then(|| hex::encode(input)),
        tx_type: envelope.ty(),
    })
}
