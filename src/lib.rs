//! A bounded-memory analytical engine over code-hosting platform data:
//! accounts, repositories and commits. Three delimited text inputs are
//! compacted into binary record files and a family of secondary
//! indexes, after which a fixed catalogue of aggregation queries runs
//! in time linear in the touched slice of the data, with residency
//! capped by a fixed-size page cache.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod date;
pub mod encoding;
pub mod error;
pub mod index;

pub use catalog::Catalog;
pub use config::CatalogConfig;
pub use error::{Error, Result};
