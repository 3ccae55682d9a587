//! Ledger - non-negative integer balances keyed by customer id.
//!
//! Every mutation is a relative delta applied through a CAS retry loop on
//! the store, so concurrent `adjust` calls on one account never lose
//! updates: the final balance is the sum of all deltas that individually
//! reported success. Accounts are created implicitly with balance 0 on
//! first use and never deleted.
//!
//! There is no cross-account transaction. Operations touching two
//! accounts (the referral bonus) are two independent single-account
//! adjustments; exactly-once across the pair is the referral engine's
//! job, not the ledger's.

use std::sync::Arc;

use tracing::trace;

use crate::error::CoreError;
use crate::store::{ACCOUNTS, KvStore};
use crate::types::{Amount, CustomerId};

pub struct Ledger<S> {
    store: Arc<S>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current balance; an unseen account reads as 0.
    pub async fn get_balance(&self, customer_id: CustomerId) -> Result<Amount, CoreError> {
        let key = customer_id.to_string();
        match self.store.get(ACCOUNTS, &key).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(0),
        }
    }

    /// Apply a signed delta atomically, retrying on CAS contention until
    /// this call wins. A debit that would go negative is rejected with
    /// `InsufficientFunds` - the ledger never clamps.
    pub async fn adjust(&self, customer_id: CustomerId, delta: i64) -> Result<Amount, CoreError> {
        let key = customer_id.to_string();
        loop {
            let current_bytes = self.store.get(ACCOUNTS, &key).await?;
            let current: Amount = match &current_bytes {
                Some(bytes) => serde_json::from_slice(bytes)?,
                None => 0,
            };

            let next = if delta >= 0 {
                current
                    .checked_add(delta as u64)
                    .ok_or(CoreError::Overflow)?
            } else {
                let debit = delta.unsigned_abs();
                if current < debit {
                    return Err(CoreError::InsufficientFunds {
                        balance: current,
                        debit,
                    });
                }
                current - debit
            };

            let new_bytes = serde_json::to_vec(&next)?;
            if self
                .store
                .compare_and_set(ACCOUNTS, &key, current_bytes.as_deref(), &new_bytes)
                .await?
            {
                trace!(customer_id, delta, balance = next, "balance adjusted");
                return Ok(next);
            }
            // Lost the race, re-read and retry.
            tokio::task::yield_now().await;
        }
    }
}
