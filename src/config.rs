// Search and provider configuration

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },
}

// Engine tuning for one deployment
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub reporting_currency: String,
    pub home_country: String,
    pub default_origin: String,
    // Route records requested from the route provider
    pub route_fetch_limit: usize,
    pub max_candidates: usize,
    pub max_results: usize,
    pub offers_per_leg: u32,
    pub max_concurrent_candidates: usize,
    pub leg_timeout: Duration,
    pub fan_out_timeout: Duration,
    pub include_hotels: bool,
    // Top-ranked destinations that get a hotel lookup
    pub hotel_destinations: usize,
    pub hotels_per_city: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            reporting_currency: "KRW".to_string(),
            home_country: "KR".to_string(),
            default_origin: "ICN".to_string(),
            route_fetch_limit: 50,
            max_candidates: 10,
            max_results: 10,
            offers_per_leg: 1,
            max_concurrent_candidates: 4,
            leg_timeout: Duration::from_secs(10),
            fan_out_timeout: Duration::from_secs(30),
            include_hotels: true,
            hotel_destinations: 1,
            hotels_per_city: 20,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_alpha_code(&self.reporting_currency, 3) {
            return Err(invalid("reporting_currency", "expected a 3-letter currency code"));
        }
        if !is_alpha_code(&self.home_country, 2) {
            return Err(invalid("home_country", "expected a 2-letter country code"));
        }
        if !is_alpha_code(&self.default_origin, 3) {
            return Err(invalid("default_origin", "expected a 3-letter IATA code"));
        }
        if self.max_results == 0 {
            return Err(invalid("max_results", "must be at least 1"));
        }
        if self.max_concurrent_candidates == 0 {
            return Err(invalid("max_concurrent_candidates", "must be at least 1"));
        }
        if self.offers_per_leg == 0 {
            return Err(invalid("offers_per_leg", "must be at least 1"));
        }
        if self.leg_timeout.is_zero() || self.fan_out_timeout.is_zero() {
            return Err(invalid("timeouts", "must be non-zero"));
        }
        Ok(())
    }
}

// Upstream endpoints and credentials
#[derive(Clone)]
pub struct ProviderConfig {
    pub amadeus_base_url: String,
    pub amadeus_client_id: String,
    pub amadeus_client_secret: String,
    pub exchange_api_base: String,
    pub exchange_api_key: String,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("amadeus_base_url", &self.amadeus_base_url)
            .field("amadeus_client_id", &self.amadeus_client_id)
            .field("amadeus_client_secret", &"***")
            .field("exchange_api_base", &self.exchange_api_base)
            .field("exchange_api_key", &"***")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

pub const DEFAULT_AMADEUS_BASE_URL: &str = "https://test.api.amadeus.com";
pub const DEFAULT_EXCHANGE_API_BASE: &str = "https://v6.exchangerate-api.com/v6";
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Base URLs and the timeout have
    /// defaults; credentials are required.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| optional(key).ok_or_else(|| ConfigError::Missing(key.to_string()));

        let timeout_ms = match optional("PROVIDER_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| invalid("PROVIDER_TIMEOUT_MS", "expected a positive integer"))?,
            None => DEFAULT_PROVIDER_TIMEOUT_MS,
        };

        Ok(Self {
            amadeus_base_url: optional("AMADEUS_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AMADEUS_BASE_URL.to_string()),
            amadeus_client_id: required("AMADEUS_CLIENT_ID")?,
            amadeus_client_secret: required("AMADEUS_CLIENT_SECRET")?,
            exchange_api_base: optional("EXCHANGE_API_BASE")
                .unwrap_or_else(|| DEFAULT_EXCHANGE_API_BASE.to_string()),
            exchange_api_key: required("EXCHANGE_API_KEY")?,
            timeout_ms,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn is_alpha_code(code: &str, len: usize) -> bool {
    code.len() == len && code.chars().all(|c| c.is_ascii_alphabetic())
}
