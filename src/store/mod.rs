//! Column state: named columns of feed sources, their snapshot persistence,
//! and the CSV import/export format.
//!
//! [`ColumnStore`] is the only mutable state in the crate. It is built once
//! at startup from a [`SnapshotBackend`] and writes the full snapshot back
//! after every successful mutation.
//!
//! # Examples
//!
//! ```
//! use feedboard::store::{ColumnStore, FeedSource, MemoryBackend};
//!
//! let mut store = ColumnStore::open(Box::new(MemoryBackend::new()), None).unwrap();
//! store.add_column("Telecoms").unwrap();
//! store
//!     .add_source(
//!         "Telecoms",
//!         FeedSource::parse("https://www.theguardian.com/technology/telecoms/rss").unwrap(),
//!     )
//!     .unwrap();
//!
//! let csv = feedboard::store::write_csv(&store.to_rows());
//! assert_eq!(
//!     csv,
//!     "Column Name,RSS Feed URL\nTelecoms,https://www.theguardian.com/technology/telecoms/rss\n"
//! );
//! ```

mod columns;
mod csv;
mod snapshot;
mod source;

pub use columns::{Column, ColumnId, ColumnStore, StoreError};
pub use csv::{parse_csv, write_csv, CsvError, CsvRow, CSV_HEADER};
pub use snapshot::{
    JsonFileBackend, MemoryBackend, PersistError, Snapshot, SnapshotBackend, SNAPSHOT_VERSION,
};
pub use source::{FeedSource, FeedSourceError};
