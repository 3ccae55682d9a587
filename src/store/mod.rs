//! Persistent Store - durable key-value storage with compare-and-set.
//!
//! The sole mutation primitive is [`KvStore::compare_and_set`]; every
//! higher-level update (ledger adjust, registry writes, the referral bonus
//! guard flip) is a read-modify-CAS loop on top of it. This is what makes
//! concurrent chat sessions safe against lost updates without a global
//! lock: contention is resolved per key, optimistically.
//!
//! Values are opaque byte slices; the ledger and registry encode full
//! records as JSON (never field-level diffs), so a crash between two
//! mutations can never leave a torn record.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::StoreError;

/// Collection holding customer id -> balance.
pub const ACCOUNTS: &str = "accounts";

/// Collection holding customer id -> customer record.
pub const CUSTOMERS: &str = "customers";

/// Durable key-value storage with atomic compare-and-set.
///
/// Isolation scope is concurrent tasks within one running instance; the
/// store is not a multi-process coordination primitive.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Read the current value, `None` if the key is absent.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` = key absent). Returns whether the write applied; a lost
    /// race has no side effects. A successful write is fully persisted
    /// before this returns.
    async fn compare_and_set(
        &self,
        collection: &str,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError>;

    /// Key-ordered snapshot of a collection. Not linearizable with
    /// concurrent writes, but reflects a state that existed at some point
    /// during the call. Used for broadcast and reporting only.
    async fn snapshot(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}
