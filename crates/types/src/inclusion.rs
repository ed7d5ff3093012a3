//! Inclusion-list payloads and per-slot compliance reports.

use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{B256, hex};
use serde::{Deserialize, Serialize};

/// Envelope of a beacon SSE event carrying an inclusion list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolMessage {
    /// Consensus spec version the payload was produced under.
    #[serde(default)]
    pub version: String,
    /// Signed message body.
    #[serde(default)]
    pub data: SignedInclusionData,
}

/// Signed inclusion-list message as delivered on the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInclusionData {
    /// The inclusion-list message itself.
    #[serde(default)]
    pub message: InclusionListMessage,
    /// Validator signature over the message.
    #[serde(default)]
    pub signature: String,
}

/// The inclusion list a committee member broadcast for a slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionListMessage {
    /// Slot the list applies to, decimal string.
    #[serde(default)]
    pub slot: String,
    /// Index of the broadcasting validator.
    #[serde(default)]
    pub validator_index: String,
    /// Root of the inclusion-list committee.
    #[serde(default)]
    pub inclusion_list_committee_root: String,
    /// Hex-encoded signed transaction payloads.
    #[serde(default)]
    pub transactions: Vec<String>,
}

/// Decodes the hex-encoded signed transactions of an inclusion list.
///
/// Entries that fail hex or EIP-2718 decoding are skipped; callers can
/// compare the output length against the input to count rejects.
pub fn decode_inclusion_transactions(raw: &[String]) -> Vec<TxEnvelope> {
    raw.iter()
        .filter_map(|encoded| {
            let bytes = hex::decode(encoded).ok()?;
            TxEnvelope::decode_2718(&mut bytes.as_slice()).ok()
        })
        .collect()
}

/// Per-slot reconciliation of an inclusion list against the mined block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionReport {
    /// Inclusion-list transactions present in the block.
    pub included: Vec<B256>,
    /// Inclusion-list transactions absent from the block.
    pub missing: Vec<B256>,
    /// Aggregate counts.
    pub summary: InclusionSummary,
}

/// Counts summarising an [`InclusionReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionSummary {
    /// Size of the stored inclusion list.
    pub total: usize,
    /// How many of its transactions the block contained.
    pub included: usize,
    /// How many it omitted.
    pub missing: usize,
}

/// An [`InclusionReport`] paired with its slot for listing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionReportWithSlot {
    /// Beacon slot the report covers.
    pub slot: u64,
    /// The reconciliation report.
    pub report: InclusionReport,
}
