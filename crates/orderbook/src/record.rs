use ethnum::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{MarketKey, Offer, Price, TokenId};

/// An open order as reported by the order source, before integer normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub user: String,
    pub sell_token_balance: String,
    pub buy_token: TokenId,
    pub sell_token: TokenId,
    pub valid_from: u32,
    pub valid_until: u32,
    pub price_numerator: String,
    pub price_denominator: String,
    pub remaining_amount: String,
    pub order_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("owner `{0}` is not a 20-byte hex address")]
    Owner(String),
    #[error("field `{field}` has non-integer or out-of-range value `{value}`")]
    Integer { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub owner: [u8; 20],
    pub balance: U256,
    pub sell_token: TokenId,
    pub buy_token: TokenId,
    pub valid_from: u32,
    pub valid_until: u32,
    pub price_numerator: u128,
    pub price_denominator: u128,
    pub remaining_amount: u128,
    pub order_id: u16,
}

impl OrderRecord {
    pub fn market(&self) -> MarketKey {
        MarketKey::new(self.sell_token, self.buy_token)
    }

    /// `min(remaining_amount, balance)`; always fits in `u128`.
    pub fn tradable_volume(&self) -> u128 {
        if U256::from(self.remaining_amount) > self.balance {
            self.balance.as_u128()
        } else {
            self.remaining_amount
        }
    }

    pub fn price(&self) -> Option<Price> {
        Price::new(self.price_numerator, self.price_denominator)
    }

    /// `None` when the price is degenerate. Volume thresholds are applied by the builder.
    pub fn to_offer(&self) -> Option<Offer> {
        self.price().map(|price| Offer {
            price,
            volume: self.tradable_volume(),
        })
    }
}

impl TryFrom<&RawOrder> for OrderRecord {
    type Error = NormalizeError;

    fn try_from(raw: &RawOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            owner: parse_owner(&raw.user)?,
            balance: parse_u256("sellTokenBalance", &raw.sell_token_balance)?,
            sell_token: raw.sell_token,
            buy_token: raw.buy_token,
            valid_from: raw.valid_from,
            valid_until: raw.valid_until,
            price_numerator: parse_u128("priceNumerator", &raw.price_numerator)?,
            price_denominator: parse_u128("priceDenominator", &raw.price_denominator)?,
            remaining_amount: parse_u128("remainingAmount", &raw.remaining_amount)?,
            order_id: raw.order_id,
        })
    }
}

fn parse_owner(value: &str) -> Result<[u8; 20], NormalizeError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(digits).map_err(|_| NormalizeError::Owner(value.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| NormalizeError::Owner(value.to_string()))
}

fn integer_error(field: &'static str, value: &str) -> NormalizeError {
    NormalizeError::Integer {
        field,
        value: value.to_string(),
    }
}

fn parse_u128(field: &'static str, value: &str) -> Result<u128, NormalizeError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex_digits) => u128::from_str_radix(hex_digits, 16),
        None => trimmed.parse::<u128>(),
    };
    parsed.map_err(|_| integer_error(field, value))
}

fn parse_u256(field: &'static str, value: &str) -> Result<U256, NormalizeError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|_| integer_error(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw() -> RawOrder {
        RawOrder {
            user: "0x00000000000000000000000000000000000000aa".into(),
            sell_token_balance: "5000000".into(),
            buy_token: 7,
            sell_token: 1,
            valid_from: 10,
            valid_until: 20,
            price_numerator: "2".into(),
            price_denominator: "0x1".into(),
            remaining_amount: "4000000".into(),
            order_id: 3,
        }
    }

    #[test]
    fn normalizes_decimal_and_hex_integers() {
        let record = OrderRecord::try_from(&raw()).expect("normalizes");
        assert_eq!(record.owner[19], 0xaa);
        assert_eq!(record.balance, U256::from(5_000_000u128));
        assert_eq!(record.price_numerator, 2);
        assert_eq!(record.price_denominator, 1);
        assert_eq!(record.market(), MarketKey::new(1, 7));
    }

    #[test]
    fn rejects_short_owner_and_bad_integers() {
        let mut short_owner = raw();
        short_owner.user = "0xaa".into();
        assert!(matches!(
            OrderRecord::try_from(&short_owner),
            Err(NormalizeError::Owner(_))
        ));

        let mut bad_amount = raw();
        bad_amount.remaining_amount = "-4".into();
        assert!(matches!(
            OrderRecord::try_from(&bad_amount),
            Err(NormalizeError::Integer {
                field: "remainingAmount",
                ..
            })
        ));
    }

    #[test]
    fn tradable_volume_is_capped_by_balance() {
        let mut record = OrderRecord::try_from(&raw()).expect("normalizes");
        assert_eq!(record.tradable_volume(), 4_000_000);

        record.balance = U256::from(1_000u128);
        assert_eq!(record.tradable_volume(), 1_000);

        record.balance = U256::MAX;
        record.remaining_amount = u128::MAX;
        assert_eq!(record.tradable_volume(), u128::MAX);
    }

    #[test]
    fn degenerate_prices_produce_no_offer() {
        let mut record = OrderRecord::try_from(&raw()).expect("normalizes");
        record.price_denominator = 0;
        assert!(record.to_offer().is_none());
    }
}
