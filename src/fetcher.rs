// Single one-way price lookup

use crate::currency::parse_amount;
use crate::itinerary::{extract, Itinerary, MalformedOffer};
use crate::offers::FlightOffer;
use crate::providers::{AccessToken, FlightOfferProvider, OneWayQuery, ProviderError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct FareQuote {
    pub currency_code: String,
    pub total_amount: Decimal,
    pub itinerary: Itinerary,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Malformed(#[from] MalformedOffer),
}

pub struct FareQuoteFetcher<'a> {
    provider: &'a dyn FlightOfferProvider,
    token: &'a AccessToken,
    max_offers: u32,
}

impl<'a> FareQuoteFetcher<'a> {
    pub fn new(provider: &'a dyn FlightOfferProvider, token: &'a AccessToken, max_offers: u32) -> Self {
        Self {
            provider,
            token,
            max_offers: max_offers.max(1),
        }
    }

    /// Prices one leg. `Ok(None)` means the provider had no inventory, which
    /// callers treat as a skip rather than a failure.
    pub async fn fetch_one_way(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
        adults: u32,
        currency_code: &str,
    ) -> Result<Option<FareQuote>, QuoteError> {
        let query = OneWayQuery {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date: date,
            adults,
            max_offers: self.max_offers,
            currency_code: currency_code.to_string(),
        };

        let offers = self.provider.search_one_way(self.token, &query).await?;
        let Some(offer) = offers.first() else {
            debug!(origin, destination, %date, "no offers for leg");
            return Ok(None);
        };

        Ok(Some(quote_from_offer(offer, currency_code)?))
    }
}

/// Reads price and itinerary off one offer. The requested currency is assumed
/// when the offer does not state its own.
pub fn quote_from_offer(offer: &FlightOffer, requested_currency: &str) -> Result<FareQuote, MalformedOffer> {
    let total_text = offer
        .total_text()
        .ok_or_else(|| MalformedOffer::new("offer has no price total"))?;
    let total_amount = parse_amount(total_text)
        .filter(|amount| !amount.is_sign_negative() || amount.is_zero())
        .ok_or_else(|| MalformedOffer::new(format!("invalid price total {:?}", total_text)))?;

    let currency_code = offer
        .currency()
        .unwrap_or(requested_currency)
        .to_ascii_uppercase();

    Ok(FareQuote {
        currency_code,
        total_amount,
        itinerary: extract(offer)?,
    })
}
