//! Secondary indexes: files of fixed-size `(key, value)` entries with
//! external-memory sorting, optional grouping into posting lists, and
//! ordered lookups through the block cache.

mod indexer;

pub use indexer::{Indexer, KeyOrder, ProbeKey, ENTRY_SIZE};
