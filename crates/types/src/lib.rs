//! Core data model for the txscope mempool observatory.
//!
//! This crate holds the canonical in-memory records maintained per
//! `(client, transaction hash)` pair, the inclusion-list types fed by the
//! beacon event stream, and the JSON-RPC wire frames exchanged with
//! execution-client websockets. All records cross the cache boundary as
//! JSON; numeric fields that may exceed 64-bit precision are rendered as
//! decimal strings.

mod transaction;
pub use transaction::{
    MineStatus, StoredTransaction, StructuredTx, TransactionMetadata, TransactionStatus,
    TxConversionError, structure_tx,
};

mod inclusion;
pub use inclusion::{
    InclusionListMessage, InclusionReport, InclusionReportWithSlot, InclusionSummary,
    MempoolMessage, SignedInclusionData, decode_inclusion_transactions,
};

mod wire;
pub use wire::{JsonRpcRequest, SubscriptionFrame, SubscriptionParams};
