//! Record encodings: a typed codec describing each record as an ordered
//! tuple of fields, with a delimited text form (ingestion) and a
//! self-delimiting big-endian binary form (the persistent files), plus a
//! lazy view that decodes individual fields of an on-disk record through
//! the block cache.

pub mod format;
pub mod lazy;

pub use format::{AccountKind, FieldKind, Format, ListPair, Record, Value};
pub use lazy::LazyRecord;
