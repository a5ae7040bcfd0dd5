//! Failure vocabulary shared by every ledger-store trait.
//!
//! The backing store only needs four primitives: read-by-key, conditional
//! insert-if-absent, atomic bounded increment, and its commutative inverse.
//! Each workflow declares its own trait over those primitives; they all speak
//! this error type so services can apply one retry/fallback policy.

/// Error enumeration for ledger-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A conditional insert found an existing row for the same natural key.
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    /// A bounded participant increment would cross the program capacity.
    #[error("capacity limit reached")]
    CapacityExceeded,
    /// A bounded debit would overrun a sponsorship budget or seat allotment.
    #[error("sponsorship quota exhausted")]
    QuotaExhausted,
    /// Transient contention; safe to retry a bounded number of times.
    #[error("write conflict")]
    WriteConflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
