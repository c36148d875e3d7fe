//! Persistence layer for markings and result records
//!
//! This module provides:
//! - [`MarkingStore`] trait for claiming, flagging, and record persistence
//! - [`InMemoryMarkingStore`] for testing
//! - [`PostgresMarkingStore`] for production

mod memory;
mod postgres;
pub mod records;
mod store;

pub use memory::InMemoryMarkingStore;
pub use postgres::PostgresMarkingStore;
pub use records::ResultRecord;
pub use store::{
    MarkingRecord, MarkingStore, SelectionOrder, StoreError, SubjectMarkingRecord, WorkItem,
};
