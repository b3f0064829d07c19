//! Order snapshot model shared by the fetcher, the estimation workers and the API.
//!
//! A [`Snapshot`] is built once per refresh cycle from normalized [`OrderRecord`]s,
//! published behind an `Arc`, and never mutated afterwards. The [`codec`] module
//! turns its books into a self-describing text form that workers decode on their
//! own, and its records into the fixed-width binary layout.

pub mod codec;
mod model;
mod record;
mod snapshot;

pub use codec::{
    decode_binary, decode_text, encode_binary, encode_text, CodecError, ORDER_RECORD_LEN,
};
pub use model::{MarketBook, MarketKey, Offer, Orderbooks, Price, TokenId};
pub use record::{NormalizeError, OrderRecord, RawOrder};
pub use snapshot::{
    BuildStats, Snapshot, SnapshotBuilder, SnapshotProvider, VolumeBoundary, VolumePolicy,
    DEFAULT_MIN_TRADABLE_VOLUME,
};
