//! Background refresh of the published order snapshot.

mod fetcher;
mod file_source;
mod source;
mod state;

pub use fetcher::{CycleOutcome, FetcherConfig, SnapshotFetcher};
pub use file_source::{DumpHandle, JsonFileSource, OrderDump};
pub use source::{SourceClient, SourceError};
pub use state::{FetchState, FetchStateKind};
