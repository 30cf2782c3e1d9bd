// Currency normalization into the reporting currency

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Exchange rate unavailable for {0}")]
    RateUnavailable(String),

    #[error("Invalid amount {amount} {currency}")]
    InvalidAmount { currency: String, amount: Decimal },
}

/// Snapshot of exchange rates quoted against one base (reporting) currency.
///
/// A rate is the number of units of the foreign currency that one unit of the
/// base buys. With base `KRW`, `USD = 0.00076` means 1 KRW = 0.00076 USD, which
/// is how ExchangeRate-API reports `conversion_rates` for `latest/KRW`.
/// Converting a foreign amount back into the base is therefore `amount / rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRateTable {
    base: String,
    rates: HashMap<String, Decimal>,
    fetched_at: DateTime<Utc>,
}

impl ExchangeRateTable {
    pub fn new<I, K>(base: &str, rates: I) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: AsRef<str>,
    {
        Self::with_timestamp(base, rates, Utc::now())
    }

    pub fn with_timestamp<I, K>(base: &str, rates: I, fetched_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: AsRef<str>,
    {
        let rates = rates
            .into_iter()
            .map(|(code, rate)| (code.as_ref().trim().to_ascii_uppercase(), rate))
            .collect();

        Self {
            base: base.trim().to_ascii_uppercase(),
            rates,
            fetched_at,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn rate(&self, currency_code: &str) -> Option<Decimal> {
        self.rates
            .get(&currency_code.trim().to_ascii_uppercase())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    // Sorted copy for responses
    pub fn snapshot(&self) -> BTreeMap<String, Decimal> {
        self.rates
            .iter()
            .map(|(code, rate)| (code.clone(), *rate))
            .collect()
    }

    pub fn normalize(&self, currency_code: &str, amount: Decimal) -> Result<i64, CurrencyError> {
        normalize(currency_code, amount, self)
    }
}

/// Converts `amount` of `currency_code` into whole units of the table's base
/// currency, rounding half away from zero. Results that do not fit an `i64`
/// are rejected as invalid amounts.
pub fn normalize(
    currency_code: &str,
    amount: Decimal,
    table: &ExchangeRateTable,
) -> Result<i64, CurrencyError> {
    let code = currency_code.trim().to_ascii_uppercase();
    let invalid = |code: String| CurrencyError::InvalidAmount {
        currency: code,
        amount,
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(invalid(code));
    }

    let converted = if code == table.base() {
        amount
    } else {
        // Fail closed: a zero or negative rate is as good as no rate
        let rate = table
            .rate(&code)
            .filter(|rate| *rate > Decimal::ZERO)
            .ok_or_else(|| CurrencyError::RateUnavailable(code.clone()))?;
        amount.checked_div(rate).ok_or_else(|| invalid(code.clone()))?
    };

    converted
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| invalid(code))
}

/// Parses a provider price such as `"412.60"`. Scientific notation is accepted.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let text = text.trim();
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn krw_table() -> ExchangeRateTable {
        ExchangeRateTable::new("KRW", [("USD", dec!(0.0008)), ("jpy", dec!(0.1)), ("EUR", dec!(0))])
    }

    #[test_case(dec!(0), 0; "zero")]
    #[test_case(dec!(152300), 152_300; "whole amount")]
    #[test_case(dec!(10.49), 10; "rounds down below half")]
    #[test_case(dec!(10.5), 11; "rounds half up")]
    #[test_case(dec!(99999.99), 100_000; "rounds up near boundary")]
    fn test_reporting_currency_is_rounded_only(amount: Decimal, expected: i64) {
        let table = krw_table();
        assert_eq!(normalize("KRW", amount, &table), Ok(expected));
        assert_eq!(normalize("krw", amount, &table), Ok(expected));
    }

    #[test]
    fn test_literal_conversion_divides_by_rate() {
        let table = krw_table();

        // 1 KRW = 0.0008 USD, so USD 100 is 125,000 KRW
        assert_eq!(table.normalize("USD", dec!(100.00)), Ok(125_000));
        // 1 KRW = 0.1 JPY, so JPY 5,000 is 50,000 KRW
        assert_eq!(table.normalize("JPY", dec!(5000)), Ok(50_000));
    }

    #[test]
    fn test_conversion_rounds_decimal_half_up() {
        let table = krw_table();
        // 1.15 / 0.1 is exactly 11.5
        assert_eq!(table.normalize("JPY", dec!(1.15)), Ok(12));
        assert_eq!(table.normalize("JPY", dec!(1.14)), Ok(11));

        let table = ExchangeRateTable::new("KRW", [("GBP", dec!(0.5))]);
        assert_eq!(table.normalize("GBP", dec!(1.25)), Ok(3));
        assert_eq!(table.normalize("GBP", dec!(1.2)), Ok(2));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = krw_table();
        assert_eq!(table.rate("usd"), Some(dec!(0.0008)));
        assert_eq!(table.rate(" JPY "), Some(dec!(0.1)));
        assert_eq!(table.normalize("usd", dec!(100)), Ok(125_000));
    }

    #[test]
    fn test_missing_rate_fails_closed() {
        let table = krw_table();
        assert_eq!(
            table.normalize("thb", dec!(1000)),
            Err(CurrencyError::RateUnavailable("THB".to_string()))
        );
    }

    #[test]
    fn test_zero_rate_is_unavailable() {
        let table = krw_table();
        assert_eq!(
            table.normalize("EUR", dec!(10)),
            Err(CurrencyError::RateUnavailable("EUR".to_string()))
        );
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let table = krw_table();
        assert_eq!(
            table.normalize("USD", dec!(-1)),
            Err(CurrencyError::InvalidAmount {
                currency: "USD".to_string(),
                amount: dec!(-1),
            })
        );
    }

    #[test]
    fn test_out_of_range_result_is_rejected() {
        let table = krw_table();
        assert!(matches!(
            table.normalize("KRW", dec!(10000000000000000000)),
            Err(CurrencyError::InvalidAmount { .. })
        ));
        // Fits a Decimal, but not an i64 once divided by the rate
        assert!(matches!(
            table.normalize("USD", dec!(9000000000000000)),
            Err(CurrencyError::InvalidAmount { .. })
        ));
        assert_eq!(table.normalize("KRW", Decimal::from(i64::MAX)), Ok(i64::MAX));
    }

    #[test_case("412.60", Some(dec!(412.60)); "plain decimal")]
    #[test_case(" 5000 ", Some(dec!(5000)); "trimmed integer")]
    #[test_case("1e19", Some(dec!(10000000000000000000)); "scientific")]
    #[test_case("about 100", None; "garbage")]
    #[test_case("", None; "empty")]
    fn test_parse_amount(text: &str, expected: Option<Decimal>) {
        assert_eq!(parse_amount(text), expected);
    }

    #[test]
    fn test_snapshot_is_sorted_and_uppercased() {
        let table = krw_table();
        let codes: Vec<_> = table.snapshot().into_keys().collect();
        assert_eq!(codes, vec!["EUR", "JPY", "USD"]);
        assert_eq!(table.base(), "KRW");
        assert_eq!(table.len(), 3);
    }
}
