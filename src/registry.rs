//! User Registry - idempotent identity registration, contact verification
//! and referral bookkeeping.
//!
//! A customer id appears at most once; `register_if_absent` can be retried
//! from any number of `/start` events without overwriting anything.
//! `referrer_id` is immutable after the first successful write and
//! `verified_contact` transitions absent -> set exactly once.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::CoreError;
use crate::store::{CUSTOMERS, KvStore};
use crate::types::CustomerId;

/// Durable per-customer record. Always written as a full record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRecord {
    /// Informational only, may be stale.
    pub display_name: Option<String>,
    /// Phone-equivalent token; absent until contact verification.
    pub verified_contact: Option<String>,
    /// Set at most once, never overwritten. Never the customer itself.
    pub referrer_id: Option<CustomerId>,
    pub joined_at: DateTime<Utc>,
    /// Exactly-once guard for the referral bonus.
    pub bonus_granted: bool,
}

pub struct Registry<S> {
    store: Arc<S>,
}

impl<S> Clone for Registry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore> Registry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the record if the customer is unseen; otherwise return the
    /// existing record untouched. A later call with a different referrer
    /// never overwrites the first one. Self-referral is silently dropped.
    pub async fn register_if_absent(
        &self,
        customer_id: CustomerId,
        display_name: Option<&str>,
        referrer_id: Option<CustomerId>,
    ) -> Result<(bool, CustomerRecord), CoreError> {
        let key = customer_id.to_string();
        loop {
            if let Some(bytes) = self.store.get(CUSTOMERS, &key).await? {
                return Ok((false, serde_json::from_slice(&bytes)?));
            }

            let record = CustomerRecord {
                display_name: display_name.map(str::to_string),
                verified_contact: None,
                referrer_id: referrer_id.filter(|&r| r != customer_id),
                joined_at: Utc::now(),
                bonus_granted: false,
            };
            let bytes = serde_json::to_vec(&record)?;
            if self
                .store
                .compare_and_set(CUSTOMERS, &key, None, &bytes)
                .await?
            {
                info!(customer_id, referrer = ?record.referrer_id, "customer registered");
                return Ok((true, record));
            }
            // Another session registered this customer first; re-read it.
            tokio::task::yield_now().await;
        }
    }

    /// Set the verified contact if absent. Returns `true` only when this
    /// call performed the absent -> set transition; a repeated share (even
    /// with a different token) is a no-op and the first token wins.
    pub async fn set_verified_contact(
        &self,
        customer_id: CustomerId,
        contact: &str,
    ) -> Result<bool, CoreError> {
        let key = customer_id.to_string();
        loop {
            let Some(bytes) = self.store.get(CUSTOMERS, &key).await? else {
                debug!(customer_id, "contact share for unregistered customer ignored");
                return Ok(false);
            };
            let mut record: CustomerRecord = serde_json::from_slice(&bytes)?;
            if record.verified_contact.is_some() {
                return Ok(false);
            }
            record.verified_contact = Some(contact.to_string());

            let new_bytes = serde_json::to_vec(&record)?;
            if self
                .store
                .compare_and_set(CUSTOMERS, &key, Some(&bytes), &new_bytes)
                .await?
            {
                info!(customer_id, "contact verified");
                return Ok(true);
            }
            tokio::task::yield_now().await;
        }
    }

    /// Flip `bonus_granted` false -> true. Returns `true` only for the one
    /// caller that wins the flip; everyone else sees `false`.
    pub async fn mark_bonus_granted(&self, customer_id: CustomerId) -> Result<bool, CoreError> {
        let key = customer_id.to_string();
        loop {
            let Some(bytes) = self.store.get(CUSTOMERS, &key).await? else {
                return Ok(false);
            };
            let mut record: CustomerRecord = serde_json::from_slice(&bytes)?;
            if record.bonus_granted {
                return Ok(false);
            }
            record.bonus_granted = true;

            let new_bytes = serde_json::to_vec(&record)?;
            if self
                .store
                .compare_and_set(CUSTOMERS, &key, Some(&bytes), &new_bytes)
                .await?
            {
                return Ok(true);
            }
            tokio::task::yield_now().await;
        }
    }

    pub async fn get(&self, customer_id: CustomerId) -> Result<Option<CustomerRecord>, CoreError> {
        match self.store.get(CUSTOMERS, &customer_id.to_string()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of all registered customers, id-ordered. Consistent-enough
    /// for broadcast; not linearizable with concurrent writes.
    pub async fn all(&self) -> Result<Vec<(CustomerId, CustomerRecord)>, CoreError> {
        let snapshot = self.store.snapshot(CUSTOMERS).await?;
        let mut out = Vec::with_capacity(snapshot.len());
        for (key, bytes) in snapshot {
            let Ok(id) = key.parse::<CustomerId>() else {
                debug!(key, "skipping non-numeric customer key");
                continue;
            };
            out.push((id, serde_json::from_slice(&bytes)?));
        }
        Ok(out)
    }
}
