//! Read-side API for the txscope mempool observatory.
//!
//! Everything here issues only cache reads: latest arrivals from the global
//! ordering, per-hash aggregation across clients with common/diff field
//! classification, and slot-indexed inclusion reports.

mod diff;
pub use diff::{DiffFields, FieldMap, FieldValues, compute_diff, flatten_metadata, flatten_tx};

mod service;
pub use service::{
    ComparisonSection, DiffSection, QueryError, QueryService, TransactionSummary, TxComparison,
};
