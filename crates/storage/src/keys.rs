//! Cache key construction.
//!
//! The key layout is externally observable and stable; every component
//! obtains key names through these helpers.

/// Per-client FIFO of `client:hash` entries awaiting resolution.
pub fn stream(client: &str) -> String {
    format!("txpool:{client}:stream")
}

/// Per-client hash-map of `hash → JSON(StoredTransaction)`.
pub fn meta(client: &str) -> String {
    format!("txpool:{client}:meta")
}

/// Per-client sorted set of hashes scored by gas price.
pub fn gas_index(client: &str) -> String {
    format!("txpool:{client}:index:gas")
}

/// Per-client sorted set of hashes scored by nonce.
pub fn nonce_index(client: &str) -> String {
    format!("txpool:{client}:index:nonce")
}

/// Per-client sorted set of hashes scored by transaction type.
pub fn type_index(client: &str) -> String {
    format!("txpool:{client}:index:type")
}

/// Global sorted set of hashes scored by first arrival unix second.
pub const fn universal() -> &'static str {
    "txpool:universal"
}

/// Hash-map of `slot → JSON(inclusion-list transactions)`.
pub const fn inclusion_txns() -> &'static str {
    "txpool:inclusion:txns"
}

/// Sorted set of slots scored by best-known inclusion-list tx count.
pub const fn inclusion_score() -> &'static str {
    "txpool:inclusion:score"
}

/// Hash-map of `slot → JSON(InclusionReport)`.
pub const fn inclusion_report() -> &'static str {
    "txpool:inclusion:report"
}

/// Bounded retry counter for updates that found no record.
pub fn retry(hash: &str) -> String {
    format!("retry:{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(stream("geth"), "txpool:geth:stream");
        assert_eq!(meta("geth"), "txpool:geth:meta");
        assert_eq!(gas_index("reth"), "txpool:reth:index:gas");
        assert_eq!(nonce_index("reth"), "txpool:reth:index:nonce");
        assert_eq!(type_index("reth"), "txpool:reth:index:type");
        assert_eq!(universal(), "txpool:universal");
        assert_eq!(inclusion_txns(), "txpool:inclusion:txns");
        assert_eq!(inclusion_score(), "txpool:inclusion:score");
        assert_eq!(inclusion_report(), "txpool:inclusion:report");
        assert_eq!(retry("0xab"), "retry:0xab");
    }
}
