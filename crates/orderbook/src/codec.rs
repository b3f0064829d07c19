//! Text and binary forms of the order snapshot.
//!
//! Text form: one JSON object, keys `"<sell>-<buy>"`, values the ask list of that
//! market as `{"price": [numerator, denominator], "volume": amount}` entries:
//!
//! ```text
//! {"1-7":[{"price":[2,1],"volume":1000000000000000000}]}
//! ```
//!
//! Binary form: back-to-back big-endian records of [`ORDER_RECORD_LEN`] bytes,
//! `owner(20) | balance(32) | buyToken(2) | sellToken(2) | validFrom(4) |
//! validUntil(4) | priceNumerator(16) | priceDenominator(16) | remainingAmount(16) |
//! orderId(2)`.

use std::collections::HashSet;
use std::fmt;

use ethnum::U256;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::model::{MarketBook, MarketKey, Offer, Orderbooks, Price};
use crate::record::OrderRecord;

pub const ORDER_RECORD_LEN: usize = 20 + 32 + 2 + 2 + 4 + 4 + 16 + 16 + 16 + 2;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed snapshot text: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid market key `{key}`: {reason}")]
    InvalidMarketKey { key: String, reason: String },
    #[error("market `{0}` appears more than once")]
    DuplicateMarket(MarketKey),
    #[error("market `{market}` has an ask with a zero price component")]
    ZeroPrice { market: MarketKey },
    #[error("binary order data is {len} bytes, not a multiple of {}", ORDER_RECORD_LEN)]
    TruncatedRecord { len: usize },
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireOffer {
    price: (u128, u128),
    volume: u128,
}

/// Map entries in document order, so duplicate keys are visible to validation.
struct WireBooks(Vec<(String, Vec<WireOffer>)>);

impl<'de> Deserialize<'de> for WireBooks {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = WireBooks;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of market books")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some(entry) = map.next_entry::<String, Vec<WireOffer>>()? {
                    entries.push(entry);
                }
                Ok(WireBooks(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

struct WireBooksRef<'a>(&'a Orderbooks);

impl Serialize for WireBooksRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.0.iter().map(|book| {
            let asks: Vec<WireOffer> = book
                .asks()
                .iter()
                .map(|offer| WireOffer {
                    price: (offer.price.numerator(), offer.price.denominator()),
                    volume: offer.volume,
                })
                .collect();
            (book.key().to_string(), asks)
        }))
    }
}

pub fn encode_text(books: &Orderbooks) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&WireBooksRef(books))?)
}

pub fn decode_text(text: &str) -> Result<Orderbooks, CodecError> {
    let WireBooks(entries) = serde_json::from_str(text)?;
    let mut seen = HashSet::with_capacity(entries.len());
    let mut books = Orderbooks::new();
    for (raw_key, asks) in entries {
        let key = parse_canonical_key(&raw_key)?;
        if !seen.insert(key) {
            return Err(CodecError::DuplicateMarket(key));
        }
        let asks = asks
            .into_iter()
            .map(|wire| {
                let (numerator, denominator) = wire.price;
                Price::new(numerator, denominator)
                    .map(|price| Offer {
                        price,
                        volume: wire.volume,
                    })
                    .ok_or(CodecError::ZeroPrice { market: key })
            })
            .collect::<Result<Vec<_>, _>>()?;
        books.insert(MarketBook::with_asks(key, asks));
    }
    Ok(books)
}

// `01-7` parses to the same key as `1-7` but is never written by `encode_text`.
fn parse_canonical_key(raw: &str) -> Result<MarketKey, CodecError> {
    let key: MarketKey = raw
        .parse()
        .map_err(|reason| CodecError::InvalidMarketKey {
            key: raw.to_string(),
            reason,
        })?;
    if key.to_string() != raw {
        return Err(CodecError::InvalidMarketKey {
            key: raw.to_string(),
            reason: "not in canonical form".into(),
        });
    }
    Ok(key)
}

pub fn encode_record(record: &OrderRecord, out: &mut Vec<u8>) {
    out.extend_from_slice(&record.owner);
    out.extend_from_slice(&record.balance.to_be_bytes());
    out.extend_from_slice(&record.buy_token.to_be_bytes());
    out.extend_from_slice(&record.sell_token.to_be_bytes());
    out.extend_from_slice(&record.valid_from.to_be_bytes());
    out.extend_from_slice(&record.valid_until.to_be_bytes());
    out.extend_from_slice(&record.price_numerator.to_be_bytes());
    out.extend_from_slice(&record.price_denominator.to_be_bytes());
    out.extend_from_slice(&record.remaining_amount.to_be_bytes());
    out.extend_from_slice(&record.order_id.to_be_bytes());
}

pub fn encode_binary<'a, I>(records: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut out = Vec::new();
    for record in records {
        encode_record(record, &mut out);
    }
    out
}

pub fn decode_binary(bytes: &[u8]) -> Result<Vec<OrderRecord>, CodecError> {
    if bytes.len() % ORDER_RECORD_LEN != 0 {
        return Err(CodecError::TruncatedRecord { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(ORDER_RECORD_LEN)
        .map(decode_record)
        .collect())
}

struct FieldReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl FieldReader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut field = [0u8; N];
        field.copy_from_slice(&self.buf[self.offset..self.offset + N]);
        self.offset += N;
        field
    }
}

// `chunk` is exactly ORDER_RECORD_LEN bytes.
fn decode_record(chunk: &[u8]) -> OrderRecord {
    let mut reader = FieldReader {
        buf: chunk,
        offset: 0,
    };
    let owner = reader.take::<20>();
    let balance = U256::from_be_bytes(reader.take::<32>());
    let buy_token = u16::from_be_bytes(reader.take::<2>());
    let sell_token = u16::from_be_bytes(reader.take::<2>());
    let valid_from = u32::from_be_bytes(reader.take::<4>());
    let valid_until = u32::from_be_bytes(reader.take::<4>());
    let price_numerator = u128::from_be_bytes(reader.take::<16>());
    let price_denominator = u128::from_be_bytes(reader.take::<16>());
    let remaining_amount = u128::from_be_bytes(reader.take::<16>());
    let order_id = u16::from_be_bytes(reader.take::<2>());
    OrderRecord {
        owner,
        balance,
        sell_token,
        buy_token,
        valid_from,
        valid_until,
        price_numerator,
        price_denominator,
        remaining_amount,
        order_id,
    }
}
