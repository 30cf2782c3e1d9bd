// ExchangeRate-API client (`/v6/{key}/latest/{base}`)

use crate::config::ProviderConfig;
use crate::currency::ExchangeRateTable;
use crate::providers::{ExchangeRateProvider, ProviderError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    result: Option<String>,
    #[serde(rename = "error-type")]
    error_type: Option<String>,
    base_code: Option<String>,
    time_last_update_unix: Option<i64>,
    conversion_rates: Option<HashMap<String, Decimal>>,
}

pub struct ExchangeRateApiClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl ExchangeRateApiClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::ClientError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.exchange_api_base.trim_end_matches('/').to_string(),
            api_key: config.exchange_api_key.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    fn latest_url(&self, base_currency: &str) -> String {
        format!("{}/{}/latest/{}", self.base_url, self.api_key, base_currency)
    }
}

/// Decodes a `latest` response into a rate table keyed by currency code.
/// The table base is the requested currency; the provider timestamp is kept
/// when present.
pub fn decode_latest_rates(body: &str, base_currency: &str) -> Result<ExchangeRateTable, ProviderError> {
    let parsed: LatestRatesResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("exchange rates: {}", e)))?;

    if parsed.result.as_deref() == Some("error") {
        let kind = parsed.error_type.unwrap_or_else(|| "unknown".to_string());
        return Err(ProviderError::ApiResponseError {
            status_code: 200,
            message: format!("exchange rate API error: {}", kind),
        });
    }

    if let Some(base) = parsed.base_code.as_deref() {
        if !base.eq_ignore_ascii_case(base_currency) {
            return Err(ProviderError::InvalidResponse(format!(
                "requested rates for {}, got {}",
                base_currency, base
            )));
        }
    }

    let rates = parsed
        .conversion_rates
        .ok_or_else(|| ProviderError::InvalidResponse("conversion_rates missing".to_string()))?;

    let fetched_at = parsed
        .time_last_update_unix
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    Ok(ExchangeRateTable::with_timestamp(base_currency, rates, fetched_at))
}

#[async_trait]
impl ExchangeRateProvider for ExchangeRateApiClient {
    async fn latest_rates(&self, base_currency: &str) -> Result<ExchangeRateTable, ProviderError> {
        let base_currency = base_currency.trim().to_ascii_uppercase();
        debug!(base = %base_currency, "fetching exchange rates");

        let response = self
            .http
            .get(self.latest_url(&base_currency))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_ms)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        // Error responses still carry a JSON body with `error-type`
        if !status.is_success() {
            warn!(status = status.as_u16(), "exchange rate request failed");
            return match decode_latest_rates(&body, &base_currency) {
                Err(ProviderError::ApiResponseError { message, .. }) => Err(ProviderError::ApiResponseError {
                    status_code: status.as_u16(),
                    message,
                }),
                _ => Err(ProviderError::ApiResponseError {
                    status_code: status.as_u16(),
                    message: status.canonical_reason().unwrap_or("request failed").to_string(),
                }),
            };
        }

        let table = decode_latest_rates(&body, &base_currency)?;
        debug!(base = %base_currency, currencies = table.len(), "exchange rates loaded");
        Ok(table)
    }
}

pub const SAMPLE_RATES_PATH: &str = "samples/exchange_rates.json";
pub const SAMPLE_RATES_ERROR_PATH: &str = "samples/exchange_rates_error.json";
