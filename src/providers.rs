// Upstream collaborators consumed by the search engine.
// Every call takes the per-search access token explicitly; nothing here holds
// process-wide token or rate state.

use crate::candidates::RouteRecord;
use crate::currency::ExchangeRateTable;
use crate::hotels::{HotelMeta, HotelOffers};
use crate::offers::FlightOffer;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Client error: {0}")]
    ClientError(String),
}

// Opaque bearer credential, valid for one search
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneWayQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub adults: u32,
    pub max_offers: u32,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTripQuery {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub return_date: NaiveDate,
    pub adults: u32,
    pub max_offers: u32,
    pub currency_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotelOfferQuery {
    pub city_code: String,
    pub hotel_ids: Vec<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, ProviderError>;
}

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    // Rates quoted as units of each currency per one unit of `base_currency`
    async fn latest_rates(&self, base_currency: &str) -> Result<ExchangeRateTable, ProviderError>;
}

#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn direct_destinations(
        &self,
        token: &AccessToken,
        origin_code: &str,
        max_results: usize,
    ) -> Result<Vec<RouteRecord>, ProviderError>;
}

#[async_trait]
pub trait FlightOfferProvider: Send + Sync {
    async fn search_one_way(
        &self,
        token: &AccessToken,
        query: &OneWayQuery,
    ) -> Result<Vec<FlightOffer>, ProviderError>;

    async fn search_round_trip(
        &self,
        token: &AccessToken,
        query: &RoundTripQuery,
    ) -> Result<Vec<FlightOffer>, ProviderError>;
}

#[async_trait]
pub trait LocationProvider: Send + Sync {
    // City code for an airport, falling back to the airport code itself
    async fn resolve_city_code(
        &self,
        token: &AccessToken,
        iata_code: &str,
    ) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait HotelProvider: Send + Sync {
    async fn list_hotels_by_city(
        &self,
        token: &AccessToken,
        city_code: &str,
        limit: usize,
    ) -> Result<Vec<HotelMeta>, ProviderError>;

    async fn hotel_offers(
        &self,
        token: &AccessToken,
        query: &HotelOfferQuery,
    ) -> Result<Vec<HotelOffers>, ProviderError>;
}
