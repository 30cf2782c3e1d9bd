// Trip search entry points
//
// One search = one rate table and one access token, both fetched up front and
// lent to every collaborator call that follows.

use crate::aggregator::{rank, FareAggregator, FlightCard, TripLegs};
use crate::amadeus::AmadeusClient;
use crate::budget::{summarize, BudgetSummary};
use crate::candidates::{resolve, TripScope};
use crate::config::{ConfigError, ProviderConfig, SearchConfig};
use crate::currency::ExchangeRateTable;
use crate::exchange_rate_api::ExchangeRateApiClient;
use crate::fetcher::quote_from_offer;
use crate::hotels::{HotelCard, HotelFinder};
use crate::providers::{
    AccessToken, AuthProvider, ExchangeRateProvider, FlightOfferProvider, HotelProvider,
    LocationProvider, ProviderError, RoundTripQuery, RouteProvider,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

// Upper bound the flight-offer API accepts for `max`
const MAX_ROUND_TRIP_OFFERS: usize = 250;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSearchRequest {
    pub budget: i64,
    pub people: u32,
    pub depart_date: NaiveDate,
    pub return_date: NaiveDate,
    #[serde(default)]
    pub domestic: Option<bool>,
    #[serde(default)]
    pub origin_location_code: Option<String>,
    // Airport the inbound leg returns to
    #[serde(default)]
    pub destination_location_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSnapshot {
    pub base: String,
    pub rates: BTreeMap<String, Decimal>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExchangeRateTable> for ExchangeSnapshot {
    fn from(table: &ExchangeRateTable) -> Self {
        Self {
            base: table.base().to_string(),
            rates: table.snapshot(),
            updated_at: table.fetched_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripSearchResponse {
    pub requested: TripSearchRequest,
    pub exchange: ExchangeSnapshot,
    pub budget: BudgetSummary,
    pub flights: Vec<FlightCard>,
    pub hotels: Vec<HotelCard>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Exchange rates unavailable: {0}")]
    RatesUnavailable(String),

    #[error("Authentication failed: {0}")]
    Authentication(#[source] ProviderError),

    #[error("Route lookup failed: {0}")]
    Routes(#[source] ProviderError),

    #[error("Flight search failed: {0}")]
    Flights(#[source] ProviderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// Upstream collaborators of one service instance
#[derive(Clone)]
pub struct Providers {
    pub auth: Arc<dyn AuthProvider>,
    pub exchange_rates: Arc<dyn ExchangeRateProvider>,
    pub routes: Arc<dyn RouteProvider>,
    pub flights: Arc<dyn FlightOfferProvider>,
    pub locations: Arc<dyn LocationProvider>,
    pub hotels: Arc<dyn HotelProvider>,
}

impl Providers {
    /// Wires one travel API (auth, routes, flights, locations, hotels) with a
    /// separate exchange-rate source.
    pub fn new<T, R>(travel: Arc<T>, exchange_rates: Arc<R>) -> Self
    where
        T: AuthProvider + RouteProvider + FlightOfferProvider + LocationProvider + HotelProvider + 'static,
        R: ExchangeRateProvider + 'static,
    {
        Self {
            auth: travel.clone(),
            exchange_rates,
            routes: travel.clone(),
            flights: travel.clone(),
            locations: travel.clone(),
            hotels: travel,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let amadeus = Arc::new(AmadeusClient::new(config)?);
        let exchange_rates = Arc::new(ExchangeRateApiClient::new(config)?);
        Ok(Self::new(amadeus, exchange_rates))
    }
}

// Request after defaults and validation
#[derive(Debug, Clone)]
struct PreparedTrip {
    scope: TripScope,
    legs: TripLegs,
}

pub struct TripSearchService {
    providers: Providers,
    config: SearchConfig,
}

impl TripSearchService {
    pub fn new(providers: Providers, config: SearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { providers, config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Recommends affordable round trips from the origin to its direct
    /// destinations, cheapest first, with a hotel for the top results.
    pub async fn search(&self, request: &TripSearchRequest) -> Result<TripSearchResponse, SearchError> {
        let trip = self.prepare(request)?;
        info!(
            origin = %trip.legs.origin,
            depart = %trip.legs.depart_date,
            ret = %trip.legs.return_date,
            budget = trip.legs.budget,
            "trip search started"
        );

        let rates = self.load_rates().await?;
        let token = self.access_token().await?;

        let routes = self
            .providers
            .routes
            .direct_destinations(&token, &trip.legs.origin, self.config.route_fetch_limit)
            .await
            .map_err(|e| fatal_or(e, SearchError::Routes))?;
        let candidates = resolve(
            &routes,
            &trip.legs.origin,
            trip.scope,
            &self.config.home_country,
            self.config.max_candidates,
        );
        debug!(routes = routes.len(), candidates = candidates.len(), "candidates resolved");

        let report = FareAggregator::new(self.providers.flights.as_ref(), &token, &rates, &self.config)
            .aggregate(&candidates, &trip.legs)
            .await
            .map_err(SearchError::Authentication)?;

        let hotels = self.hotels_for(&token, &rates, &report.flights, &trip.legs).await;
        let response = self.respond(request, &rates, &trip.legs, report.flights, hotels);
        info!(
            flights = response.flights.len(),
            hotels = response.hotels.len(),
            estimated_total = response.budget.estimated_total,
            "trip search finished"
        );
        Ok(response)
    }

    /// Prices round-trip offers to one known destination. Offers are ranked
    /// and budget-cut the same way as the fan-out search.
    pub async fn search_fixed_destination(
        &self,
        request: &TripSearchRequest,
        destination: &str,
    ) -> Result<TripSearchResponse, SearchError> {
        let trip = self.prepare(request)?;
        let destination = airport_code(Some(destination), "destination")?
            .ok_or_else(|| SearchError::InvalidRequest("destination is required".to_string()))?;
        info!(origin = %trip.legs.origin, %destination, "fixed destination search started");

        let rates = self.load_rates().await?;
        let token = self.access_token().await?;

        let query = RoundTripQuery {
            origin: trip.legs.origin.clone(),
            destination: destination.clone(),
            departure_date: trip.legs.depart_date,
            return_date: trip.legs.return_date,
            adults: trip.legs.adults,
            max_offers: self.config.max_results.min(MAX_ROUND_TRIP_OFFERS) as u32,
            currency_code: rates.base().to_string(),
        };
        let offers = self
            .providers
            .flights
            .search_round_trip(&token, &query)
            .await
            .map_err(|e| fatal_or(e, SearchError::Flights))?;

        let mut priced = Vec::new();
        for (index, offer) in offers.iter().enumerate() {
            let quote = match quote_from_offer(offer, rates.base()) {
                Ok(quote) => quote,
                Err(e) => {
                    debug!(index, reason = %e, "round-trip offer skipped");
                    continue;
                }
            };
            let total = match rates.normalize(&quote.currency_code, quote.total_amount) {
                Ok(total) => total,
                Err(e) => {
                    debug!(index, reason = %e, "round-trip offer skipped");
                    continue;
                }
            };
            if trip.legs.budget > 0 && total > trip.legs.budget {
                debug!(index, total, budget = trip.legs.budget, "round-trip offer over budget");
                continue;
            }
            priced.push((index, FlightCard::from_outbound(quote, &destination, total)));
        }

        let flights = rank(priced, self.config.max_results);
        let hotels = self.hotels_for(&token, &rates, &flights, &trip.legs).await;
        Ok(self.respond(request, &rates, &trip.legs, flights, hotels))
    }

    fn prepare(&self, request: &TripSearchRequest) -> Result<PreparedTrip, SearchError> {
        if request.people < 1 {
            return Err(SearchError::InvalidRequest("people must be at least 1".to_string()));
        }
        if request.budget < 0 {
            return Err(SearchError::InvalidRequest("budget must not be negative".to_string()));
        }
        if request.return_date < request.depart_date {
            return Err(SearchError::InvalidRequest(format!(
                "return date {} is before departure date {}",
                request.return_date, request.depart_date
            )));
        }

        let origin = airport_code(request.origin_location_code.as_deref(), "origin")?
            .unwrap_or_else(|| self.config.default_origin.to_ascii_uppercase());
        let home_return = airport_code(request.destination_location_code.as_deref(), "destination")?
            .unwrap_or_else(|| origin.clone());

        Ok(PreparedTrip {
            scope: TripScope::from_domestic_flag(request.domestic.unwrap_or(false)),
            legs: TripLegs {
                origin,
                home_return,
                depart_date: request.depart_date,
                return_date: request.return_date,
                adults: request.people,
                budget: request.budget,
            },
        })
    }

    async fn load_rates(&self) -> Result<ExchangeRateTable, SearchError> {
        let rates = self
            .providers
            .exchange_rates
            .latest_rates(&self.config.reporting_currency)
            .await
            .map_err(|e| SearchError::RatesUnavailable(e.to_string()))?;
        if rates.is_empty() {
            return Err(SearchError::RatesUnavailable("rate table is empty".to_string()));
        }
        Ok(rates)
    }

    async fn access_token(&self) -> Result<AccessToken, SearchError> {
        self.providers
            .auth
            .access_token()
            .await
            .map_err(SearchError::Authentication)
    }

    // Hotel lookups never fail the search
    async fn hotels_for(
        &self,
        token: &AccessToken,
        rates: &ExchangeRateTable,
        flights: &[FlightCard],
        legs: &TripLegs,
    ) -> Vec<HotelCard> {
        if !self.config.include_hotels || self.config.hotel_destinations == 0 {
            return Vec::new();
        }

        let finder = HotelFinder::new(
            self.providers.locations.as_ref(),
            self.providers.hotels.as_ref(),
            token,
            rates,
            &self.config,
        );

        let mut destinations: Vec<&str> = Vec::new();
        for flight in flights {
            if destinations.len() == self.config.hotel_destinations {
                break;
            }
            if !destinations.contains(&flight.arrival_airport.as_str()) {
                destinations.push(&flight.arrival_airport);
            }
        }

        let lookups = destinations
            .into_iter()
            .map(|destination| finder.cheapest_stay(destination, legs.depart_date, legs.return_date, legs.adults));
        join_all(lookups).await.into_iter().flatten().collect()
    }

    fn respond(
        &self,
        request: &TripSearchRequest,
        rates: &ExchangeRateTable,
        legs: &TripLegs,
        flights: Vec<FlightCard>,
        hotels: Vec<HotelCard>,
    ) -> TripSearchResponse {
        TripSearchResponse {
            requested: request.clone(),
            exchange: ExchangeSnapshot::from(rates),
            budget: summarize(&flights, legs.budget),
            flights,
            hotels,
        }
    }
}

// A rejected token fails the search as an authentication error wherever it surfaces
fn fatal_or(error: ProviderError, otherwise: fn(ProviderError) -> SearchError) -> SearchError {
    match error {
        ProviderError::AuthError(_) => SearchError::Authentication(error),
        other => otherwise(other),
    }
}

// Trimmed, upper-cased three-letter code; `None` when absent or blank
fn airport_code(code: Option<&str>, field: &str) -> Result<Option<String>, SearchError> {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SearchError::InvalidRequest(format!(
            "{} code {:?} is not a three-letter IATA code",
            field, code
        )));
    }
    Ok(Some(code.to_ascii_uppercase()))
}
