//! numshop - balance ledger & order workflow core for a virtual phone
//! number shop bot.
//!
//! # Modules
//!
//! - [`types`] - Core type aliases (CustomerId, Amount, ...)
//! - [`error`] - Error taxonomy
//! - [`config`] - YAML application config
//! - [`logging`] - Tracing subscriber setup
//! - [`store`] - Durable key-value store with compare-and-set
//! - [`ledger`] - Non-negative balances, lost-update-free adjustments
//! - [`registry`] - Idempotent customer registration & referral links
//! - [`referral`] - One-time dual referral bonus
//! - [`catalog`] - Static product catalog
//! - [`workflow`] - Order attempt state machine + session state
//! - [`admin`] - Privileged command authority
//! - [`gateway`] - Messaging platform boundary
//! - [`dispatch`] - Inbound event routing

// Core types - must be first!
pub mod types;

pub mod error;

pub mod config;
pub mod logging;

pub mod store;

pub mod catalog;
pub mod ledger;
pub mod referral;
pub mod registry;
pub mod workflow;

pub mod admin;
pub mod dispatch;
pub mod gateway;

// Convenient re-exports at crate root
pub use admin::{AdminAuthority, AdminCommand, AdminOutcome};
pub use catalog::{Catalog, CatalogEntry};
pub use config::AppConfig;
pub use dispatch::Dispatcher;
pub use error::{CoreError, StoreError};
pub use gateway::{ConsoleGateway, EventKind, Gateway, GatewayError, InboundEvent};
pub use ledger::Ledger;
pub use referral::{BonusGrant, ReferralEngine};
pub use registry::{CustomerRecord, Registry};
pub use store::{FileStore, KvStore, MemoryStore};
pub use types::{Amount, AttemptSeq, CustomerId};
pub use workflow::{Admission, OrderAttempt, OrderState, OrderWorkflow, Selection, SessionMap};
