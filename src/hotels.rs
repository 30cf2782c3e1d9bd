// Cheapest hotel stay at a recommended destination

use crate::config::SearchConfig;
use crate::currency::{parse_amount, ExchangeRateTable};
use crate::providers::{AccessToken, HotelOfferQuery, HotelProvider, LocationProvider, ProviderError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// Hotel offers are requested for at most this many ids per call
pub const MAX_HOTEL_IDS_PER_QUERY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HotelMeta {
    pub hotel_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelOffers {
    pub hotel_id: String,
    pub name: String,
    pub prices: Vec<HotelPrice>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelPrice {
    pub currency: Option<String>,
    pub total: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelCard {
    pub hotel_id: String,
    pub name: String,
    pub city_code: String,
    pub total: i64,
    pub per_night: i64,
    pub nights: i64,
}

pub fn nights_between(check_in: NaiveDate, check_out: NaiveDate) -> i64 {
    (check_out - check_in).num_days()
}

/// Picks the lowest-priced offer across all hotels, in the reporting
/// currency. Offers without a usable price or rate are ignored; the first
/// seen wins a tie.
pub fn cheapest_offer(
    city_code: &str,
    hotels: &[HotelOffers],
    nights: i64,
    rates: &ExchangeRateTable,
) -> Option<HotelCard> {
    if nights <= 0 {
        return None;
    }

    let mut best: Option<HotelCard> = None;
    for hotel in hotels {
        for price in &hotel.prices {
            let Some(total) = price_in_reporting_currency(price, rates) else {
                continue;
            };
            if total <= 0 || best.as_ref().map_or(false, |b| b.total <= total) {
                continue;
            }

            best = Some(HotelCard {
                hotel_id: hotel.hotel_id.clone(),
                name: hotel.name.clone(),
                city_code: city_code.to_string(),
                total,
                per_night: (total / nights).max(1),
                nights,
            });
        }
    }
    best
}

fn price_in_reporting_currency(price: &HotelPrice, rates: &ExchangeRateTable) -> Option<i64> {
    let currency = price.currency.as_deref()?;
    let amount = parse_amount(price.total.as_deref()?)?;
    match rates.normalize(currency, amount) {
        Ok(total) => Some(total),
        Err(e) => {
            debug!(%e, "ignoring hotel price");
            None
        }
    }
}

pub struct HotelFinder<'a> {
    locations: &'a dyn LocationProvider,
    hotels: &'a dyn HotelProvider,
    token: &'a AccessToken,
    rates: &'a ExchangeRateTable,
    config: &'a SearchConfig,
}

impl<'a> HotelFinder<'a> {
    pub fn new(
        locations: &'a dyn LocationProvider,
        hotels: &'a dyn HotelProvider,
        token: &'a AccessToken,
        rates: &'a ExchangeRateTable,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            locations,
            hotels,
            token,
            rates,
            config,
        }
    }

    /// Cheapest stay near `destination`. Hotel inventory is best-effort, so
    /// every failure is logged and reported as no hotel.
    pub async fn cheapest_stay(
        &self,
        destination: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
        adults: u32,
    ) -> Option<HotelCard> {
        match self.lookup(destination, check_in, check_out, adults).await {
            Ok(card) => card,
            Err(e) => {
                warn!(destination, error = %e, "hotel lookup failed");
                None
            }
        }
    }

    async fn lookup(
        &self,
        destination: &str,
        check_in: NaiveDate,
        check_out: NaiveDate,
        adults: u32,
    ) -> Result<Option<HotelCard>, ProviderError> {
        let nights = nights_between(check_in, check_out);
        if nights <= 0 {
            return Ok(None);
        }

        let Some(city_code) = self.locations.resolve_city_code(self.token, destination).await? else {
            debug!(destination, "no city code for destination");
            return Ok(None);
        };

        let listed = self
            .hotels
            .list_hotels_by_city(self.token, &city_code, self.config.hotels_per_city)
            .await?;
        if listed.is_empty() {
            return Ok(None);
        }

        let query = HotelOfferQuery {
            city_code: city_code.clone(),
            hotel_ids: listed
                .into_iter()
                .take(MAX_HOTEL_IDS_PER_QUERY)
                .map(|h| h.hotel_id)
                .collect(),
            check_in,
            check_out,
            adults,
        };
        let offers = self.hotels.hotel_offers(self.token, &query).await?;

        Ok(cheapest_offer(&city_code, &offers, nights, self.rates))
    }
}
