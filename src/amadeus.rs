// Amadeus self-service API client
//
// One reqwest client shared by every endpoint. Responses are read as text and
// handed to the pure `decode_*` functions below, so the shapes can be tested
// without a network.

use crate::candidates::RouteRecord;
use crate::config::ProviderConfig;
use crate::hotels::{HotelMeta, HotelOffers, HotelPrice};
use crate::offers::{FlightOffer, FlightOffersResponse};
use crate::providers::{
    AccessToken, AuthProvider, FlightOfferProvider, HotelOfferQuery, HotelProvider,
    LocationProvider, OneWayQuery, ProviderError, RoundTripQuery, RouteProvider,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const DIRECT_DESTINATIONS_PATH: &str = "/v1/airport/direct-destinations";
const FLIGHT_OFFERS_PATH: &str = "/v2/shopping/flight-offers";
const LOCATIONS_PATH: &str = "/v1/reference-data/locations";
const HOTELS_BY_CITY_PATH: &str = "/v1/reference-data/locations/hotels/by-city";
const HOTEL_OFFERS_PATH: &str = "/v3/shopping/hotel-offers";

const HOTEL_SEARCH_RADIUS_KM: u32 = 20;
// Error bodies are cut to this many characters in messages
const MAX_ERROR_BODY: usize = 300;

pub struct AmadeusClient {
    http: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    timeout_ms: u64,
}

impl AmadeusClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::ClientError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.amadeus_base_url.trim_end_matches('/').to_string(),
            client_id: config.amadeus_client_id.clone(),
            client_secret: config.amadeus_client_secret.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        debug!(path, "amadeus request");
        let response = self
            .http
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, token.bearer())
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_ms))?;

        read_body(path, response, self.timeout_ms).await
    }

    async fn flight_offers(
        &self,
        token: &AccessToken,
        query: Vec<(&str, String)>,
    ) -> Result<Vec<FlightOffer>, ProviderError> {
        let body = self.get(token, FLIGHT_OFFERS_PATH, &query).await?;
        decode_flight_offers(&body)
    }
}

async fn read_body(path: &str, response: reqwest::Response, timeout_ms: u64) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout_ms))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = error_message(&body);
    warn!(path, status = status.as_u16(), %message, "amadeus request failed");
    Err(status_error(status, message))
}

fn transport_error(error: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout_ms)
    } else {
        ProviderError::NetworkError(error.to_string())
    }
}

fn status_error(status: StatusCode, message: String) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthError(message),
        _ => ProviderError::ApiResponseError {
            status_code: status.as_u16(),
            message,
        },
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    title: Option<String>,
    detail: Option<String>,
}

// Human readable error from an Amadeus error body, or the raw body
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        let first = parsed
            .errors
            .into_iter()
            .find_map(|e| e.detail.or(e.title))
            .or(parsed.error_description);
        if let Some(message) = first {
            return message;
        }
    }
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

pub fn decode_token(body: &str) -> Result<AccessToken, ProviderError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("token response: {}", e)))?;
    parsed
        .access_token
        .filter(|token| !token.trim().is_empty())
        .map(AccessToken::new)
        .ok_or_else(|| ProviderError::AuthError("token response has no access_token".to_string()))
}

#[derive(Debug, Deserialize)]
struct DataList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LocationEntry {
    iata_code: Option<String>,
    address: Option<LocationAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct LocationAddress {
    country_code: Option<String>,
    city_code: Option<String>,
}

fn decode_list<T: DeserializeOwned>(body: &str, what: &str) -> Result<Vec<T>, ProviderError> {
    serde_json::from_str::<DataList<T>>(body)
        .map(|list| list.data)
        .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", what, e)))
}

pub fn decode_direct_destinations(body: &str) -> Result<Vec<RouteRecord>, ProviderError> {
    let entries: Vec<LocationEntry> = decode_list(body, "direct destinations")?;
    Ok(entries
        .into_iter()
        .map(|entry| RouteRecord {
            iata_code: entry.iata_code,
            country_code: entry.address.and_then(|a| a.country_code),
        })
        .collect())
}

pub fn decode_flight_offers(body: &str) -> Result<Vec<FlightOffer>, ProviderError> {
    serde_json::from_str::<FlightOffersResponse>(body)
        .map(|response| response.data)
        .map_err(|e| ProviderError::InvalidResponse(format!("flight offers: {}", e)))
}

/// City code of the first location match, falling back to its IATA code.
pub fn decode_city_code(body: &str) -> Result<Option<String>, ProviderError> {
    let entries: Vec<LocationEntry> = decode_list(body, "locations")?;
    let Some(first) = entries.into_iter().next() else {
        return Ok(None);
    };

    let city = first.address.and_then(|a| a.city_code);
    Ok(non_blank(city)
        .or_else(|| non_blank(first.iata_code))
        .map(|code| code.to_ascii_uppercase()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct HotelEntry {
    hotel_id: Option<String>,
    name: Option<String>,
}

pub fn decode_hotel_list(body: &str, limit: usize) -> Result<Vec<HotelMeta>, ProviderError> {
    let entries: Vec<HotelEntry> = decode_list(body, "hotel list")?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            Some(HotelMeta {
                hotel_id: non_blank(entry.hotel_id)?,
                name: entry.name.unwrap_or_default(),
            })
        })
        .take(limit)
        .collect())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HotelOffersEntry {
    hotel: HotelEntry,
    offers: Vec<RoomOffer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoomOffer {
    price: Option<RoomPrice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RoomPrice {
    currency: Option<String>,
    total: Option<String>,
}

pub fn decode_hotel_offers(body: &str) -> Result<Vec<HotelOffers>, ProviderError> {
    let entries: Vec<HotelOffersEntry> = decode_list(body, "hotel offers")?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let hotel_id = non_blank(entry.hotel.hotel_id)?;
            let prices = entry
                .offers
                .into_iter()
                .filter_map(|offer| offer.price)
                .map(|price| HotelPrice {
                    currency: price.currency,
                    total: price.total,
                })
                .collect();
            Some(HotelOffers {
                hotel_id,
                name: entry.hotel.name.unwrap_or_default(),
                prices,
            })
        })
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl AuthProvider for AmadeusClient {
    async fn access_token(&self) -> Result<AccessToken, ProviderError> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self
            .http
            .post(self.url(TOKEN_PATH))
            .form(&form)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_ms))?;

        let body = read_body(TOKEN_PATH, response, self.timeout_ms)
            .await
            .map_err(|e| match e {
                ProviderError::ApiResponseError { status_code, message } => {
                    ProviderError::AuthError(format!("{} {}", status_code, message))
                }
                other => other,
            })?;
        decode_token(&body)
    }
}

#[async_trait]
impl RouteProvider for AmadeusClient {
    async fn direct_destinations(
        &self,
        token: &AccessToken,
        origin_code: &str,
        max_results: usize,
    ) -> Result<Vec<RouteRecord>, ProviderError> {
        let mut query = vec![("departureAirportCode", origin_code.to_string())];
        if max_results > 0 {
            query.push(("max", max_results.to_string()));
        }
        let body = self.get(token, DIRECT_DESTINATIONS_PATH, &query).await?;
        decode_direct_destinations(&body)
    }
}

#[async_trait]
impl FlightOfferProvider for AmadeusClient {
    async fn search_one_way(
        &self,
        token: &AccessToken,
        query: &OneWayQuery,
    ) -> Result<Vec<FlightOffer>, ProviderError> {
        self.flight_offers(
            token,
            vec![
                ("originLocationCode", query.origin.clone()),
                ("destinationLocationCode", query.destination.clone()),
                ("departureDate", query.departure_date.to_string()),
                ("adults", query.adults.to_string()),
                ("max", query.max_offers.to_string()),
                ("currencyCode", query.currency_code.clone()),
            ],
        )
        .await
    }

    async fn search_round_trip(
        &self,
        token: &AccessToken,
        query: &RoundTripQuery,
    ) -> Result<Vec<FlightOffer>, ProviderError> {
        self.flight_offers(
            token,
            vec![
                ("originLocationCode", query.origin.clone()),
                ("destinationLocationCode", query.destination.clone()),
                ("departureDate", query.departure_date.to_string()),
                ("returnDate", query.return_date.to_string()),
                ("adults", query.adults.to_string()),
                ("max", query.max_offers.to_string()),
                ("currencyCode", query.currency_code.clone()),
            ],
        )
        .await
    }
}

#[async_trait]
impl LocationProvider for AmadeusClient {
    async fn resolve_city_code(
        &self,
        token: &AccessToken,
        iata_code: &str,
    ) -> Result<Option<String>, ProviderError> {
        let keyword = iata_code.trim().to_ascii_uppercase();
        if keyword.is_empty() {
            return Ok(None);
        }
        let query = [
            ("subType", "AIRPORT,CITY".to_string()),
            ("keyword", keyword),
            ("page[limit]", "1".to_string()),
        ];
        let body = self.get(token, LOCATIONS_PATH, &query).await?;
        decode_city_code(&body)
    }
}

#[async_trait]
impl HotelProvider for AmadeusClient {
    async fn list_hotels_by_city(
        &self,
        token: &AccessToken,
        city_code: &str,
        limit: usize,
    ) -> Result<Vec<HotelMeta>, ProviderError> {
        if city_code.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query = [
            ("cityCode", city_code.trim().to_string()),
            ("radius", HOTEL_SEARCH_RADIUS_KM.to_string()),
            ("radiusUnit", "KM".to_string()),
            ("hotelSource", "ALL".to_string()),
        ];
        let body = self.get(token, HOTELS_BY_CITY_PATH, &query).await?;
        decode_hotel_list(&body, limit)
    }

    async fn hotel_offers(
        &self,
        token: &AccessToken,
        query: &HotelOfferQuery,
    ) -> Result<Vec<HotelOffers>, ProviderError> {
        if query.hotel_ids.is_empty() {
            return Ok(Vec::new());
        }
        let params = [
            ("hotelIds", query.hotel_ids.join(",")),
            ("adults", query.adults.to_string()),
            ("checkInDate", query.check_in.to_string()),
            ("checkOutDate", query.check_out.to_string()),
        ];
        let body = self.get(token, HOTEL_OFFERS_PATH, &params).await?;
        decode_hotel_offers(&body)
    }
}

// Sample file paths, relative to the crate root
pub const SAMPLE_TOKEN_PATH: &str = "samples/amadeus_token.json";
pub const SAMPLE_DESTINATIONS_PATH: &str = "samples/direct_destinations.json";
pub const SAMPLE_FLIGHT_OFFERS_PATH: &str = "samples/flight_offers.json";
pub const SAMPLE_LOCATIONS_PATH: &str = "samples/locations.json";
pub const SAMPLE_HOTELS_PATH: &str = "samples/hotels_by_city.json";
pub const SAMPLE_HOTEL_OFFERS_PATH: &str = "samples/hotel_offers.json";
