//! Order Workflow - per-attempt state machine from catalog selection to
//! fulfillment.
//!
//! Attempts are in-memory only: an in-flight order is trivially resumable
//! by the customer re-selecting, so nothing here touches the store. The
//! admission check is advisory (balance >= snapshotted price); no funds
//! are reserved or debited at admission time. Debiting, if desired, is an
//! admin-issued adjustment after fulfillment.
//!
//! The attempt map holds only non-terminal attempts: a denied selection
//! is never retained, and fulfillment/abandonment removes the entry, so
//! the map stays bounded by the number of orders currently awaiting the
//! admin.
//!
//! Multiple simultaneous attempts per customer are allowed by design -
//! since no funds are held, this is business behavior, not a race.
//!
//! This module also owns the session-state map: the one piece of
//! conversational state (the "contacting admin" flag) lives here with
//! explicit enter/exit transitions instead of an ad hoc global dict.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::store::KvStore;
use crate::types::{Amount, AttemptSeq, CustomerId};

/// Order attempt states.
///
/// `Browsing` is implicit (no attempt exists yet). Terminal states:
/// DENIED, FULFILLED, ABANDONED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderState {
    /// Customer picked a catalog entry; price snapshotted.
    Selected,
    /// Balance covered the price at selection time (advisory, no hold).
    Admitted,
    /// Balance short of the price. Terminal for this attempt.
    Denied,
    /// Structured notification sent to the admin boundary.
    AdminNotified,
    /// Terminal: admin confirmed delivery.
    Fulfilled,
    /// Terminal: customer never confirmed. Non-fatal.
    Abandoned,
}

impl OrderState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Denied | OrderState::Fulfilled | OrderState::Abandoned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Selected => "SELECTED",
            OrderState::Admitted => "ADMITTED",
            OrderState::Denied => "DENIED",
            OrderState::AdminNotified => "ADMIN_NOTIFIED",
            OrderState::Fulfilled => "FULFILLED",
            OrderState::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One pass through selection -> admission -> fulfillment.
#[derive(Debug, Clone)]
pub struct OrderAttempt {
    pub customer_id: CustomerId,
    pub seq: AttemptSeq,
    pub product: String,
    /// Snapshotted at selection time, never re-read.
    pub price: Amount,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
}

/// Admission outcome of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// `shortfall = price - balance`, drives the top-up/referral prompt.
    Denied { shortfall: Amount },
}

/// Everything the caller needs to answer the customer and, when admitted,
/// notify the admin.
#[derive(Debug, Clone)]
pub struct Selection {
    pub seq: AttemptSeq,
    pub product: CatalogEntry,
    pub balance: Amount,
    pub admission: Admission,
}

pub struct OrderWorkflow<S> {
    ledger: Ledger<S>,
    catalog: Arc<Catalog>,
    orders: DashMap<AttemptSeq, OrderAttempt>,
    next_seq: AtomicU64,
}

impl<S: KvStore> OrderWorkflow<S> {
    pub fn new(ledger: Ledger<S>, catalog: Arc<Catalog>) -> Self {
        Self {
            ledger,
            catalog,
            orders: DashMap::new(),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Selected -> Admitted | Denied. Returns `None` for an unknown
    /// product key.
    pub async fn select(
        &self,
        customer_id: CustomerId,
        product_key: &str,
    ) -> Result<Option<Selection>, CoreError> {
        let Some(product) = self.catalog.get(product_key).cloned() else {
            debug!(customer_id, product_key, "selection of unknown product ignored");
            return Ok(None);
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut attempt = OrderAttempt {
            customer_id,
            seq,
            product: product.key.clone(),
            price: product.price,
            state: OrderState::Selected,
            created_at: Utc::now(),
        };

        // Advisory admission guard against the snapshotted price.
        let balance = self.ledger.get_balance(customer_id).await?;
        let admission = if balance >= attempt.price {
            attempt.state = OrderState::Admitted;
            Admission::Admitted
        } else {
            attempt.state = OrderState::Denied;
            Admission::Denied {
                shortfall: attempt.price - balance,
            }
        };

        info!(customer_id, seq, product = %attempt.product, price = attempt.price, balance, state = %attempt.state, "order selected");
        // Denied is terminal: nothing ever transitions it, so it is not
        // retained. Only attempts awaiting the admin stay in the map.
        if !attempt.state.is_terminal() {
            self.orders.insert(seq, attempt);
        }

        Ok(Some(Selection {
            seq,
            product,
            balance,
            admission,
        }))
    }

    /// Admitted -> AdminNotified, after the structured admin notification
    /// went out.
    pub fn mark_admin_notified(&self, seq: AttemptSeq) {
        if let Some(mut attempt) = self.orders.get_mut(&seq)
            && attempt.state == OrderState::Admitted
        {
            attempt.state = OrderState::AdminNotified;
        }
    }

    /// AdminNotified -> Fulfilled for every pending attempt of this
    /// customer; driven by admin credential delivery. Fulfilled attempts
    /// leave the map. Returns how many were fulfilled.
    pub fn fulfill(&self, customer_id: CustomerId) -> usize {
        let seqs: Vec<AttemptSeq> = self
            .orders
            .iter()
            .filter(|e| e.customer_id == customer_id && e.state == OrderState::AdminNotified)
            .map(|e| e.seq)
            .collect();

        let mut fulfilled = 0;
        for seq in seqs {
            if let Some((_, mut attempt)) = self
                .orders
                .remove_if(&seq, |_, a| a.state == OrderState::AdminNotified)
            {
                attempt.state = OrderState::Fulfilled;
                info!(customer_id, seq, state = %attempt.state, "order fulfilled");
                fulfilled += 1;
            }
        }
        fulfilled
    }

    /// AdminNotified -> Abandoned; the attempt leaves the map. There is
    /// no automatic expiry sweep; this exists for explicit abandonment
    /// only.
    pub fn abandon(&self, seq: AttemptSeq) -> bool {
        match self
            .orders
            .remove_if(&seq, |_, a| a.state == OrderState::AdminNotified)
        {
            Some((_, mut attempt)) => {
                attempt.state = OrderState::Abandoned;
                info!(customer_id = attempt.customer_id, seq, state = %attempt.state, "order abandoned");
                true
            }
            None => false,
        }
    }

    /// Look up a pending attempt. Terminal attempts are gone.
    pub fn attempt(&self, seq: AttemptSeq) -> Option<OrderAttempt> {
        self.orders.get(&seq).map(|a| a.clone())
    }

    /// The catalog this workflow sells from, for listings.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Per-customer conversational state with explicit entry/exit.
#[derive(Default)]
pub struct SessionMap {
    contacting_admin: DashMap<CustomerId, ()>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the contact-admin flow: the customer's next free-text message
    /// will be relayed to the admin.
    pub fn enter_contacting_admin(&self, customer_id: CustomerId) {
        self.contacting_admin.insert(customer_id, ());
    }

    /// Exit the flow, returning whether the customer was in it.
    pub fn take_contacting_admin(&self, customer_id: CustomerId) -> bool {
        self.contacting_admin.remove(&customer_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn workflow() -> (Ledger<MemoryStore>, OrderWorkflow<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ledger = Ledger::new(store);
        let catalog = Arc::new(Catalog::new(vec![
            CatalogEntry {
                key: "India".to_string(),
                label: "India".to_string(),
                price: 18_000,
            },
            CatalogEntry {
                key: "USA".to_string(),
                label: "USA".to_string(),
                price: 20_000,
            },
        ]));
        let workflow = OrderWorkflow::new(ledger.clone(), catalog);
        (ledger, workflow)
    }

    #[tokio::test]
    async fn short_balance_is_denied_with_shortfall() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 10_000).await.unwrap();

        let selection = workflow.select(1, "India").await.unwrap().unwrap();
        assert_eq!(selection.admission, Admission::Denied { shortfall: 8_000 });
        // Denied is terminal and never retained.
        assert!(workflow.attempt(selection.seq).is_none());
    }

    #[tokio::test]
    async fn covered_balance_is_admitted_then_notified() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 10_000).await.unwrap();
        ledger.adjust(1, 20_000).await.unwrap();

        let selection = workflow.select(1, "India").await.unwrap().unwrap();
        assert_eq!(selection.admission, Admission::Admitted);
        assert_eq!(selection.balance, 30_000);
        // Advisory check only: nothing was debited.
        assert_eq!(ledger.get_balance(1).await.unwrap(), 30_000);

        workflow.mark_admin_notified(selection.seq);
        assert_eq!(
            workflow.attempt(selection.seq).unwrap().state,
            OrderState::AdminNotified
        );
    }

    #[tokio::test]
    async fn exact_balance_is_admitted() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 18_000).await.unwrap();
        let selection = workflow.select(1, "India").await.unwrap().unwrap();
        assert_eq!(selection.admission, Admission::Admitted);
    }

    #[tokio::test]
    async fn unknown_product_is_ignored() {
        let (_ledger, workflow) = workflow();
        assert!(workflow.select(1, "Atlantis").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fulfill_moves_only_admin_notified_attempts() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 50_000).await.unwrap();

        let a = workflow.select(1, "India").await.unwrap().unwrap();
        let b = workflow.select(1, "USA").await.unwrap().unwrap();
        workflow.mark_admin_notified(a.seq);
        // b stays Admitted (its notification never went out).

        assert_eq!(workflow.fulfill(1), 1);
        assert!(workflow.attempt(a.seq).is_none());
        assert_eq!(workflow.attempt(b.seq).unwrap().state, OrderState::Admitted);

        // Nothing left to fulfill.
        assert_eq!(workflow.fulfill(1), 0);
    }

    #[tokio::test]
    async fn terminal_attempts_leave_the_map() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 20_000).await.unwrap();

        // Denied: never stored.
        let denied = workflow.select(2, "India").await.unwrap().unwrap();
        assert!(workflow.attempt(denied.seq).is_none());

        // Fulfilled: removed on credential delivery.
        let done = workflow.select(1, "India").await.unwrap().unwrap();
        workflow.mark_admin_notified(done.seq);
        workflow.fulfill(1);
        assert!(workflow.attempt(done.seq).is_none());

        // Abandoned: removed on abandonment.
        let gone = workflow.select(1, "India").await.unwrap().unwrap();
        workflow.mark_admin_notified(gone.seq);
        workflow.abandon(gone.seq);
        assert!(workflow.attempt(gone.seq).is_none());
    }

    #[tokio::test]
    async fn concurrent_attempts_per_customer_are_allowed() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 100_000).await.unwrap();
        let a = workflow.select(1, "India").await.unwrap().unwrap();
        let b = workflow.select(1, "India").await.unwrap().unwrap();
        assert_ne!(a.seq, b.seq);
        assert_eq!(a.admission, Admission::Admitted);
        assert_eq!(b.admission, Admission::Admitted);
    }

    #[tokio::test]
    async fn abandon_only_from_admin_notified() {
        let (ledger, workflow) = workflow();
        ledger.adjust(1, 20_000).await.unwrap();
        let sel = workflow.select(1, "India").await.unwrap().unwrap();

        assert!(!workflow.abandon(sel.seq)); // still Admitted
        workflow.mark_admin_notified(sel.seq);
        assert!(workflow.abandon(sel.seq));
        assert!(workflow.attempt(sel.seq).is_none());
    }

    #[test]
    fn terminal_states() {
        assert!(OrderState::Denied.is_terminal());
        assert!(OrderState::Fulfilled.is_terminal());
        assert!(OrderState::Abandoned.is_terminal());
        assert!(!OrderState::Selected.is_terminal());
        assert!(!OrderState::Admitted.is_terminal());
        assert!(!OrderState::AdminNotified.is_terminal());
    }

    #[test]
    fn session_map_enter_and_take() {
        let sessions = SessionMap::new();
        assert!(!sessions.take_contacting_admin(1));
        sessions.enter_contacting_admin(1);
        assert!(sessions.take_contacting_admin(1));
        // Exit is one-shot.
        assert!(!sessions.take_contacting_admin(1));
    }
}
