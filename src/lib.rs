//! Embedded sync store and event extraction engine for EVM contract
//! events.
//!
//! A chain client hands the store batches of blocks, transactions, and
//! logs fetched for a filter, together with the block interval the batch
//! covers. The store records the raw data idempotently and bookkeeps
//! per-filter coverage as merged closed intervals. On demand it serves an
//! ordered, cursor-paginated stream of events joined across tables, and
//! on a reorg signal it truncates everything speculative above a pivot
//! block.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   batches + intervals   ┌──────────────────────────┐
//! │ chain client ├────────────────────────►│        SyncStore         │
//! └──────────────┘                         │  blocks / transactions   │
//!                                          │  logs / filter coverage  │
//! ┌──────────────┐   ordered event pages   │  rpc request cache       │
//! │    runner    │◄────────────────────────┤  (SQLite, one writer)    │
//! └──────────────┘                         └──────────────────────────┘
//! ```
//!
//! Coverage is tracked per *fragment*: a user filter naming several
//! addresses or topic alternatives expands into the cartesian product of
//! single-value criteria, and the filter's confirmed range is the
//! intersection of its fragments' intervals. Factory filters additionally
//! derive child contract addresses out of the factory's own announcement
//! logs, in SQL, so the event query can match children discovered at any
//! point of the scan.

pub mod encoding;
pub mod error;
pub mod events;
pub mod filter;
pub mod interval;
pub mod migrations;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use events::{FactoryChildAddresses, FactorySource, LogEventStream, LogFilterSource};
pub use filter::{
    build_factory_fragments, build_log_filter_fragments, ChildAddressLocation, FactoryCriteria,
    FactoryFragment, FilterAddress, FilterTopic, LogFilterCriteria, LogFilterFragment,
};
pub use interval::{interval_intersection_many, interval_union, BlockRange};
pub use store::SyncStore;
pub use types::*;
