//! Error types for the ledger core.
//!
//! The taxonomy is deliberately small: storage faults are transient and
//! retryable, insufficient funds is a customer-facing rejection, and a
//! failed outbound delivery only matters per-recipient. An authorization
//! mismatch on the admin surface is NOT an error - it is silently ignored
//! (see [`crate::admin`]).

use thiserror::Error;

/// Storage-level fault. Callers treat every variant as transient and must
/// not assume the mutation applied.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("stored record not decodable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors surfaced by the ledger, registry and admin operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A debit would drive the balance negative. The balance is unchanged.
    #[error("insufficient funds: balance {balance}, debit {debit}")]
    InsufficientFunds { balance: u64, debit: u64 },

    /// A credit would overflow the balance, or an amount does not fit the
    /// signed delta range. The balance is unchanged.
    #[error("balance overflow")]
    Overflow,

    /// Outbound delivery to one recipient failed.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Store(StoreError::Corrupt(e))
    }
}
