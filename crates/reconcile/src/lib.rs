//! Periodic progress reconciliation between the embedded engine and the
//! durable torrent record store.

pub mod merge;
pub mod reconciler;

pub use merge::merge_cycle;
pub use reconciler::Reconciler;
