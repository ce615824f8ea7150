//! Type-safe price representation using decimal arithmetic.
//!
//! A [`Price`] is always strictly positive. Anything that reaches the cart or
//! an order snapshot has already been validated by constructing one, so the
//! cart never has to re-check the sign of a price it is handed.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a decimal number.
    #[error("price must be a decimal number")]
    NotANumber,
    /// The amount is zero or negative.
    #[error("price must be greater than zero")]
    NonPositive,
    /// The amount has sub-cent precision.
    #[error("price must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum number of fraction digits.
        max: u32,
    },
}

/// A strictly positive unit price in the shop currency.
///
/// ## Examples
///
/// ```
/// use emporium_core::Price;
///
/// let price = Price::parse("19.99").unwrap();
/// assert_eq!(price.to_string(), "19.99");
/// assert_eq!(price.minor_units(), Some(1999));
///
/// assert!(Price::parse("0").is_err());
/// assert!(Price::parse("-5").is_err());
/// assert!(Price::parse("abc").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Maximum number of fraction digits (cents).
    pub const MAX_SCALE: u32 = 2;

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NonPositive` for zero or negative amounts and
    /// `PriceError::TooPrecise` for more than two fraction digits.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount <= Decimal::ZERO {
            return Err(PriceError::NonPositive);
        }
        let normalized = amount.normalize();
        if normalized.scale() > Self::MAX_SCALE {
            return Err(PriceError::TooPrecise {
                max: Self::MAX_SCALE,
            });
        }
        Ok(Self(normalized))
    }

    /// Parse a price from user input such as `"12.50"`.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::NotANumber` if the input is not a decimal, or any
    /// error from [`Price::new`].
    pub fn parse(s: &str) -> Result<Self, PriceError> {
        let amount = Decimal::from_str(s.trim()).map_err(|_| PriceError::NotANumber)?;
        Self::new(amount)
    }

    /// The amount as a decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// The price of `quantity` units.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Decimal {
        self.0 * Decimal::from(quantity)
    }

    /// The amount in minor currency units (e.g. cents, paise).
    ///
    /// Returns `None` if the amount does not fit in an `i64`.
    #[must_use]
    pub fn minor_units(&self) -> Option<i64> {
        use rust_decimal::prelude::ToPrimitive;
        (self.0 * Decimal::ONE_HUNDRED).to_i64()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// SQLx support (with postgres feature): stored as NUMERIC(12, 2)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Price {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Price {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::new(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_and_negative() {
        assert_eq!(Price::new(Decimal::ZERO), Err(PriceError::NonPositive));
        assert_eq!(Price::parse("-0.01"), Err(PriceError::NonPositive));
    }

    #[test]
    fn test_rejects_sub_cent_precision() {
        assert!(matches!(
            Price::parse("1.999"),
            Err(PriceError::TooPrecise { max: 2 })
        ));
        // Trailing zeros are not extra precision
        assert!(Price::parse("1.5000").is_ok());
    }

    #[test]
    fn test_times_multiplies_by_quantity() {
        let price = Price::parse("2.50").unwrap();
        assert_eq!(price.times(3), Decimal::new(750, 2));
    }

    #[test]
    fn test_display_always_shows_cents() {
        assert_eq!(Price::parse("10").unwrap().to_string(), "10.00");
        assert_eq!(Price::parse("4.5").unwrap().to_string(), "4.50");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Price = serde_json::from_str("\"12.30\"").unwrap();
        assert_eq!(ok.amount(), Decimal::new(123, 1));
        assert!(serde_json::from_str::<Price>("\"0\"").is_err());
    }
}
