// Budget trip recommender: destination fan-out and fare aggregation

// Engine
pub mod aggregator;
pub mod budget;
pub mod candidates;
pub mod currency;
pub mod fetcher;
pub mod hotels;
pub mod itinerary;
pub mod offers;
pub mod search;

// Upstream seams and their HTTP implementations
pub mod amadeus;
pub mod exchange_rate_api;
pub mod providers;

pub mod config;

// Re-export key types for convenience
pub use aggregator::{AggregationReport, FareAggregator, FlightCard, SkipReason, TripLegs};
pub use budget::BudgetSummary;
pub use candidates::{DestinationCandidate, RouteRecord, TripScope};
pub use config::{ConfigError, ProviderConfig, SearchConfig};
pub use currency::{CurrencyError, ExchangeRateTable};
pub use hotels::HotelCard;
pub use providers::{AccessToken, ProviderError};
pub use search::{
    ExchangeSnapshot, Providers, SearchError, TripSearchRequest, TripSearchResponse,
    TripSearchService,
};
