//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Customer ID - platform-assigned, globally unique, never reused.
///
/// # Usage:
/// - Primary key for balance accounts and customer records
/// - Store key (rendered as a decimal string)
pub type CustomerId = u64;

/// Amount in the smallest currency unit.
///
/// Balances are non-negative; deltas are signed (see [`crate::ledger`]).
pub type Amount = u64;

/// Sequence number identifying one order attempt within a process lifetime.
pub type AttemptSeq = u64;
