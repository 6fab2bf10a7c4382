//! Request-scoped data models for the blob browser.
//!
//! Nothing here is cached or persisted: listings, receipts, and delete
//! reports are built fresh for each operation and serialize as JSON via
//! `serde`. The store remains the only source of truth.

pub mod listing;
pub mod transfer;
