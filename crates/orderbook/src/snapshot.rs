use std::sync::Arc;

use chrono::Utc;

use crate::codec::{self, CodecError};
use crate::model::Orderbooks;
use crate::record::{OrderRecord, RawOrder};

pub const DEFAULT_MIN_TRADABLE_VOLUME: u128 = 10_000;

/// Which side of the minimum tradable volume an order sitting exactly on it falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeBoundary {
    #[default]
    KeepAtThreshold,
    DropAtThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumePolicy {
    pub min_tradable: u128,
    pub boundary: VolumeBoundary,
}

impl Default for VolumePolicy {
    fn default() -> Self {
        Self {
            min_tradable: DEFAULT_MIN_TRADABLE_VOLUME,
            boundary: VolumeBoundary::default(),
        }
    }
}

impl VolumePolicy {
    pub fn is_tradable(&self, volume: u128) -> bool {
        match self.boundary {
            VolumeBoundary::KeepAtThreshold => volume >= self.min_tradable,
            VolumeBoundary::DropAtThreshold => volume > self.min_tradable,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub seen: usize,
    pub kept: usize,
    pub malformed: usize,
    pub invalid_price: usize,
    pub low_volume: usize,
}

impl BuildStats {
    pub fn dropped(&self) -> usize {
        self.malformed + self.invalid_price + self.low_volume
    }
}

/// Immutable view of every known market at one point in time.
#[derive(Debug)]
pub struct Snapshot {
    orderbooks: Orderbooks,
    encoded_orders: Vec<u8>,
    built_at_ms: Option<i64>,
    text: Arc<str>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            orderbooks: Orderbooks::new(),
            encoded_orders: Vec::new(),
            built_at_ms: None,
            text: Arc::from("{}"),
        }
    }

    pub fn new(orderbooks: Orderbooks, encoded_orders: Vec<u8>) -> Result<Self, CodecError> {
        let text = codec::encode_text(&orderbooks)?;
        Ok(Self {
            orderbooks,
            encoded_orders,
            built_at_ms: Some(Utc::now().timestamp_millis()),
            text: Arc::from(text),
        })
    }

    pub fn orderbooks(&self) -> &Orderbooks {
        &self.orderbooks
    }

    /// Binary encoding of every normalized record, including ones filtered out of the books.
    pub fn encoded_orders(&self) -> &[u8] {
        &self.encoded_orders
    }

    pub fn record_count(&self) -> usize {
        self.encoded_orders.len() / codec::ORDER_RECORD_LEN
    }

    pub fn market_count(&self) -> usize {
        self.orderbooks.len()
    }

    /// `None` for the placeholder published before the first successful refresh.
    pub fn built_at_ms(&self) -> Option<i64> {
        self.built_at_ms
    }

    /// The text form, encoded once when the snapshot was built.
    pub fn serialized(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.orderbooks.is_empty()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Read access to whichever snapshot is currently published.
pub trait SnapshotProvider: Send + Sync {
    fn current(&self) -> Arc<Snapshot>;
}

pub struct SnapshotBuilder {
    policy: VolumePolicy,
    orderbooks: Orderbooks,
    encoded_orders: Vec<u8>,
    stats: BuildStats,
}

impl SnapshotBuilder {
    pub fn new(policy: VolumePolicy) -> Self {
        Self {
            policy,
            orderbooks: Orderbooks::new(),
            encoded_orders: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    pub fn push_raw(&mut self, raw: &RawOrder) {
        match OrderRecord::try_from(raw) {
            Ok(record) => self.push_record(&record),
            Err(_) => {
                self.stats.seen += 1;
                self.stats.malformed += 1;
            }
        }
    }

    pub fn push_record(&mut self, record: &OrderRecord) {
        self.stats.seen += 1;
        codec::encode_record(record, &mut self.encoded_orders);

        let Some(offer) = record.to_offer() else {
            self.stats.invalid_price += 1;
            return;
        };
        if !self.policy.is_tradable(offer.volume) {
            self.stats.low_volume += 1;
            return;
        }
        self.orderbooks.book_mut(record.market()).add_ask(offer);
        self.stats.kept += 1;
    }

    pub fn finish(self) -> Result<(Snapshot, BuildStats), CodecError> {
        let SnapshotBuilder {
            mut orderbooks,
            encoded_orders,
            stats,
            ..
        } = self;
        orderbooks.sort_asks();
        Ok((Snapshot::new(orderbooks, encoded_orders)?, stats))
    }
}

impl Snapshot {
    pub fn build<'a, I>(orders: I, policy: VolumePolicy) -> Result<(Snapshot, BuildStats), CodecError>
    where
        I: IntoIterator<Item = &'a RawOrder>,
    {
        let mut builder = SnapshotBuilder::new(policy);
        for raw in orders {
            builder.push_raw(raw);
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarketKey;
    use ethnum::U256;

    fn record(sell: u16, buy: u16, n: u128, d: u128, remaining: u128, balance: u128) -> OrderRecord {
        OrderRecord {
            owner: [1; 20],
            balance: U256::from(balance),
            sell_token: sell,
            buy_token: buy,
            valid_from: 0,
            valid_until: u32::MAX,
            price_numerator: n,
            price_denominator: d,
            remaining_amount: remaining,
            order_id: 0,
        }
    }

    fn build(records: &[OrderRecord], policy: VolumePolicy) -> (Snapshot, BuildStats) {
        let mut builder = SnapshotBuilder::new(policy);
        for record in records {
            builder.push_record(record);
        }
        builder.finish().expect("builds")
    }

    #[test]
    fn degenerate_prices_never_reach_a_book() {
        let (snapshot, stats) = build(
            &[
                record(1, 7, 0, 1, 50_000, 50_000),
                record(1, 7, 1, 0, 50_000, 50_000),
                record(1, 7, 2, 1, 50_000, 50_000),
            ],
            VolumePolicy::default(),
        );
        let book = snapshot
            .orderbooks()
            .get(&MarketKey::new(1, 7))
            .expect("market exists");
        assert_eq!(book.asks().len(), 1);
        assert_eq!(stats.invalid_price, 2);
        assert_eq!(stats.kept, 1);
        // every normalized record is still in the binary form
        assert_eq!(snapshot.record_count(), 3);
    }

    #[test]
    fn small_volumes_are_dropped_using_the_smaller_of_balance_and_remaining() {
        let (snapshot, stats) = build(
            &[
                record(1, 7, 2, 1, 1_000_000, 9_999),
                record(1, 7, 2, 1, 9_999, 1_000_000),
                record(2, 7, 2, 1, 10_000, 10_000),
            ],
            VolumePolicy::default(),
        );
        assert!(snapshot.orderbooks().get(&MarketKey::new(1, 7)).is_none());
        assert_eq!(snapshot.market_count(), 1);
        assert_eq!(stats.low_volume, 2);
    }

    #[test]
    fn threshold_boundary_is_configurable() {
        let at_threshold = [record(1, 7, 2, 1, 10_000, 10_000)];
        let (kept, _) = build(&at_threshold, VolumePolicy::default());
        assert_eq!(kept.market_count(), 1);

        let (dropped, stats) = build(
            &at_threshold,
            VolumePolicy {
                min_tradable: 10_000,
                boundary: VolumeBoundary::DropAtThreshold,
            },
        );
        assert!(dropped.is_empty());
        assert_eq!(stats.low_volume, 1);
    }

    #[test]
    fn groups_by_ordered_pair_and_sorts_asks() {
        let (snapshot, _) = build(
            &[
                record(1, 7, 3, 1, 20_000, 20_000),
                record(7, 1, 1, 3, 20_000, 20_000),
                record(1, 7, 2, 1, 20_000, 20_000),
            ],
            VolumePolicy::default(),
        );
        let forward = snapshot
            .orderbooks()
            .get(&MarketKey::new(1, 7))
            .expect("1-7 exists");
        let prices: Vec<u128> = forward.asks().iter().map(|o| o.price.numerator()).collect();
        assert_eq!(prices, vec![2, 3]);
        assert_eq!(
            snapshot
                .orderbooks()
                .get(&MarketKey::new(7, 1))
                .map(|b| b.asks().len()),
            Some(1)
        );
    }

    #[test]
    fn malformed_raw_orders_are_counted_not_surfaced() {
        let raw = RawOrder {
            user: "not-an-address".into(),
            sell_token_balance: "1".into(),
            buy_token: 7,
            sell_token: 1,
            valid_from: 0,
            valid_until: 0,
            price_numerator: "1".into(),
            price_denominator: "1".into(),
            remaining_amount: "1".into(),
            order_id: 0,
        };
        let (snapshot, stats) = Snapshot::build([&raw], VolumePolicy::default()).expect("builds");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.record_count(), 0);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.dropped(), 1);
    }

    #[test]
    fn serialized_form_matches_codec() {
        let (snapshot, _) = build(&[record(1, 7, 2, 1, 20_000, 20_000)], VolumePolicy::default());
        let decoded = codec::decode_text(&snapshot.serialized()).expect("decodes");
        assert_eq!(&decoded, snapshot.orderbooks());
        assert!(snapshot.built_at_ms().is_some());
        assert_eq!(&*Snapshot::empty().serialized(), "{}");
    }
}
