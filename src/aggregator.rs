// Fare aggregation: per-candidate dual-leg pricing, budget cut, ranking

use crate::candidates::DestinationCandidate;
use crate::config::SearchConfig;
use crate::currency::{CurrencyError, ExchangeRateTable};
use crate::fetcher::{FareQuote, FareQuoteFetcher, QuoteError};
use crate::itinerary::Segment;
use crate::providers::{AccessToken, FlightOfferProvider, ProviderError};
use chrono::{NaiveDate, NaiveDateTime};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightCard {
    pub airline_code: String,
    pub total_price: i64,
    pub departure_airport: String,
    pub departure_time: NaiveDateTime,
    pub arrival_airport: String,
    pub arrival_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub stop_count: u32,
    pub segments: Vec<Segment>,
}

impl FlightCard {
    // Display fields come from the outbound leg, the price covers both legs
    pub fn from_outbound(outbound: FareQuote, destination: &str, total_price: i64) -> Self {
        let itinerary = outbound.itinerary;
        Self {
            airline_code: itinerary.airline_code,
            total_price,
            departure_airport: itinerary.departure_airport,
            departure_time: itinerary.departure_time,
            arrival_airport: destination.to_string(),
            arrival_time: itinerary.arrival_time,
            duration_minutes: itinerary.duration_minutes,
            stop_count: itinerary.stop_count,
            segments: itinerary.segments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Outbound,
    Inbound,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Outbound => f.write_str("outbound"),
            Leg::Inbound => f.write_str("inbound"),
        }
    }
}

// Why a candidate was left out of the ranking
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("no offer for {0} leg")]
    NoOffer(Leg),

    #[error("malformed {leg} offer: {reason}")]
    MalformedOffer { leg: Leg, reason: String },

    #[error("{leg} lookup failed: {message}")]
    ProviderFailure { leg: Leg, message: String },

    #[error("{0} lookup timed out")]
    LegTimeout(Leg),

    #[error(transparent)]
    Currency(#[from] CurrencyError),

    #[error("round-trip total overflows")]
    TotalOutOfRange,

    #[error("total {total} exceeds budget {budget}")]
    OverBudget { total: i64, budget: i64 },
}

// A skip drops one candidate; an abort ends the whole fan-out
enum CandidateFailure {
    Skip(SkipReason),
    Abort(ProviderError),
}

impl From<SkipReason> for CandidateFailure {
    fn from(reason: SkipReason) -> Self {
        CandidateFailure::Skip(reason)
    }
}

impl From<CurrencyError> for CandidateFailure {
    fn from(error: CurrencyError) -> Self {
        CandidateFailure::Skip(SkipReason::Currency(error))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCandidate {
    pub destination: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationReport {
    pub flights: Vec<FlightCard>,
    pub skipped: Vec<SkippedCandidate>,
    // Candidates still pending when the fan-out deadline hit
    pub abandoned: usize,
}

// Shared read-only inputs for every candidate of one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripLegs {
    pub origin: String,
    pub home_return: String,
    pub depart_date: NaiveDate,
    pub return_date: NaiveDate,
    pub adults: u32,
    pub budget: i64,
}

pub struct FareAggregator<'a> {
    provider: &'a dyn FlightOfferProvider,
    token: &'a AccessToken,
    rates: &'a ExchangeRateTable,
    config: &'a SearchConfig,
}

impl<'a> FareAggregator<'a> {
    pub fn new(
        provider: &'a dyn FlightOfferProvider,
        token: &'a AccessToken,
        rates: &'a ExchangeRateTable,
        config: &'a SearchConfig,
    ) -> Self {
        Self {
            provider,
            token,
            rates,
            config,
        }
    }

    /// Prices every candidate with at most `max_concurrent_candidates` in
    /// flight, then ranks the survivors. Candidate failures are reported as
    /// skipped and never abort the others, except a rejected access token:
    /// that stops the fan-out and is returned as the error.
    pub async fn aggregate(
        &self,
        candidates: &[DestinationCandidate],
        trip: &TripLegs,
    ) -> Result<AggregationReport, ProviderError> {
        let concurrency = self.config.max_concurrent_candidates.max(1);
        let deadline = tokio::time::sleep(self.config.fan_out_timeout);

        let settled: Vec<(usize, &DestinationCandidate, Result<FlightCard, SkipReason>)> =
            stream::iter(candidates.iter().enumerate())
                .map(|(index, candidate)| async move {
                    match self.price_candidate(candidate, trip).await {
                        Ok(card) => Ok((index, candidate, Ok(card))),
                        Err(CandidateFailure::Skip(reason)) => Ok((index, candidate, Err(reason))),
                        Err(CandidateFailure::Abort(error)) => {
                            warn!(destination = %candidate.iata_code, %error, "fan-out aborted");
                            Err(error)
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .take_until(deadline)
                .try_collect()
                .await?;

        let abandoned = candidates.len() - settled.len();
        if abandoned > 0 {
            warn!(
                abandoned,
                timeout_ms = self.config.fan_out_timeout.as_millis() as u64,
                "fan-out deadline reached, abandoning pending candidates"
            );
        }

        let mut priced = Vec::new();
        let mut skipped = Vec::new();
        for (index, candidate, outcome) in settled {
            match outcome {
                Ok(card) => priced.push((index, card)),
                Err(reason) => {
                    debug!(destination = %candidate.iata_code, %reason, "candidate skipped");
                    skipped.push((
                        index,
                        SkippedCandidate {
                            destination: candidate.iata_code.clone(),
                            reason,
                        },
                    ));
                }
            }
        }
        skipped.sort_by_key(|(index, _)| *index);

        let flights = rank(priced, self.config.max_results);
        info!(
            candidates = candidates.len(),
            ranked = flights.len(),
            skipped = skipped.len(),
            abandoned,
            "aggregated fares"
        );

        Ok(AggregationReport {
            flights,
            skipped: skipped.into_iter().map(|(_, s)| s).collect(),
            abandoned,
        })
    }

    async fn price_candidate(
        &self,
        candidate: &DestinationCandidate,
        trip: &TripLegs,
    ) -> Result<FlightCard, CandidateFailure> {
        let fetcher = FareQuoteFetcher::new(self.provider, self.token, self.config.offers_per_leg);
        let currency = self.rates.base();
        let destination = candidate.iata_code.as_str();

        let outbound = fetcher.fetch_one_way(&trip.origin, destination, trip.depart_date, trip.adults, currency);
        let inbound = fetcher.fetch_one_way(destination, &trip.home_return, trip.return_date, trip.adults, currency);
        let (outbound, inbound) = tokio::join!(
            self.bounded(Leg::Outbound, outbound),
            self.bounded(Leg::Inbound, inbound)
        );
        let (outbound, inbound) = match (outbound, inbound) {
            (Err(CandidateFailure::Abort(error)), _) | (_, Err(CandidateFailure::Abort(error))) => {
                return Err(CandidateFailure::Abort(error));
            }
            (outbound, inbound) => (outbound?, inbound?),
        };

        let total_price = self
            .rates
            .normalize(&outbound.currency_code, outbound.total_amount)?
            .checked_add(self.rates.normalize(&inbound.currency_code, inbound.total_amount)?)
            .ok_or(SkipReason::TotalOutOfRange)?;

        if trip.budget > 0 && total_price > trip.budget {
            return Err(SkipReason::OverBudget {
                total: total_price,
                budget: trip.budget,
            }
            .into());
        }

        Ok(FlightCard::from_outbound(outbound, destination, total_price))
    }

    async fn bounded<F>(&self, leg: Leg, fetch: F) -> Result<FareQuote, CandidateFailure>
    where
        F: std::future::Future<Output = Result<Option<FareQuote>, QuoteError>>,
    {
        let reason = match tokio::time::timeout(self.config.leg_timeout, fetch).await {
            Err(_) => SkipReason::LegTimeout(leg),
            Ok(Ok(Some(quote))) => return Ok(quote),
            Ok(Ok(None)) => SkipReason::NoOffer(leg),
            Ok(Err(QuoteError::Malformed(malformed))) => SkipReason::MalformedOffer {
                leg,
                reason: malformed.reason,
            },
            Ok(Err(QuoteError::Provider(error @ ProviderError::AuthError(_)))) => {
                return Err(CandidateFailure::Abort(error));
            }
            Ok(Err(QuoteError::Provider(error))) => SkipReason::ProviderFailure {
                leg,
                message: error.to_string(),
            },
        };
        Err(reason.into())
    }
}

/// Sorts priced cards by total, keeping candidate order on ties, and keeps the
/// cheapest `max_results`. Each card is paired with its candidate index.
pub fn rank(mut priced: Vec<(usize, FlightCard)>, max_results: usize) -> Vec<FlightCard> {
    priced.sort_by_key(|(index, card)| (card.total_price, *index));
    priced
        .into_iter()
        .take(max_results)
        .map(|(_, card)| card)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock_providers::{direct_offer, MockUpstream, TOKEN};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn depart() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
    }

    fn ret() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 5).unwrap()
    }

    fn trip(budget: i64) -> TripLegs {
        TripLegs {
            origin: "ICN".to_string(),
            home_return: "ICN".to_string(),
            depart_date: depart(),
            return_date: ret(),
            adults: 1,
            budget,
        }
    }

    fn candidate(code: &str) -> DestinationCandidate {
        DestinationCandidate {
            iata_code: code.to_string(),
            country_code: None,
        }
    }

    fn rates() -> ExchangeRateTable {
        ExchangeRateTable::new("KRW", [("USD", dec!(0.0008)), ("JPY", dec!(0.1))])
    }

    // Registers both legs of a round trip priced in KRW
    fn add_trip(upstream: &MockUpstream, dest: &str, outbound: &str, inbound: &str) {
        upstream.add_one_way("ICN", dest, depart(), vec![direct_offer("ICN", dest, "2026-07-01", "KRW", outbound)]);
        upstream.add_one_way(dest, "ICN", ret(), vec![direct_offer(dest, "ICN", "2026-07-05", "KRW", inbound)]);
    }

    fn codes(flights: &[FlightCard]) -> Vec<&str> {
        flights.iter().map(|f| f.arrival_airport.as_str()).collect()
    }

    #[tokio::test]
    async fn test_mixed_currency_round_trip_total() {
        let upstream = MockUpstream::new();
        upstream.add_one_way("ICN", "NRT", depart(), vec![direct_offer("ICN", "NRT", "2026-07-01", "USD", "100.00")]);
        upstream.add_one_way("NRT", "ICN", ret(), vec![direct_offer("NRT", "ICN", "2026-07-05", "JPY", "5000")]);
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[candidate("NRT")], &trip(300_000))
            .await
            .unwrap();

        assert_eq!(report.flights.len(), 1);
        let card = &report.flights[0];
        assert_eq!(card.total_price, 175_000);
        assert_eq!(card.departure_airport, "ICN");
        assert_eq!(card.arrival_airport, "NRT");
        assert_eq!(card.airline_code, "KE");
        assert_eq!(card.duration_minutes, 120);
    }

    #[tokio::test]
    async fn test_ranks_ascending_and_applies_budget() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "NRT", "150000", "140000");
        add_trip(&upstream, "FUK", "90000", "80000");
        add_trip(&upstream, "BKK", "200000", "210000");
        add_trip(&upstream, "TPE", "120000", "110000");
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let candidates = vec![candidate("NRT"), candidate("FUK"), candidate("BKK"), candidate("TPE")];
        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&candidates, &trip(300_000))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["FUK", "TPE", "NRT"]);
        assert!(report.flights.iter().all(|f| f.total_price <= 300_000));
        assert!(report
            .flights
            .windows(2)
            .all(|pair| pair[0].total_price <= pair[1].total_price));
        assert_eq!(
            report.skipped,
            vec![SkippedCandidate {
                destination: "BKK".to_string(),
                reason: SkipReason::OverBudget {
                    total: 410_000,
                    budget: 300_000
                },
            }]
        );
    }

    #[tokio::test]
    async fn test_zero_budget_disables_cut() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "LAX", "900000", "950000");
        add_trip(&upstream, "NRT", "150000", "140000");
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[candidate("LAX"), candidate("NRT")], &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["NRT", "LAX"]);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_ties_keep_candidate_order() {
        let upstream = MockUpstream::new();
        for dest in ["KIX", "OKA", "CTS", "FUK"] {
            add_trip(&upstream, dest, "100000", "100000");
        }
        upstream.slow_leg("ICN", "KIX", depart(), Duration::from_millis(30));
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let candidates = vec![candidate("KIX"), candidate("OKA"), candidate("CTS"), candidate("FUK")];
        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&candidates, &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["KIX", "OKA", "CTS", "FUK"]);
    }

    #[tokio::test]
    async fn test_partial_failures_skip_only_their_candidate() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "NRT", "150000", "140000");
        // Outbound priced, inbound missing
        upstream.add_one_way("ICN", "HND", depart(), vec![direct_offer("ICN", "HND", "2026-07-01", "KRW", "1000")]);
        // Currency without a rate
        upstream.add_one_way("ICN", "SIN", depart(), vec![direct_offer("ICN", "SIN", "2026-07-01", "SGD", "300")]);
        upstream.add_one_way("SIN", "ICN", ret(), vec![direct_offer("SIN", "ICN", "2026-07-05", "SGD", "300")]);
        // Upstream error on one leg
        upstream.fail_one_way("ICN", "HKG", depart(), ProviderError::ApiResponseError {
            status_code: 500,
            message: "boom".to_string(),
        });
        // Malformed inbound offer
        let mut broken = direct_offer("DAD", "ICN", "2026-07-05", "KRW", "100000");
        broken.itineraries[0].segments.clear();
        upstream.add_one_way("ICN", "DAD", depart(), vec![direct_offer("ICN", "DAD", "2026-07-01", "KRW", "100000")]);
        upstream.add_one_way("DAD", "ICN", ret(), vec![broken]);
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let candidates = vec![
            candidate("HND"),
            candidate("SIN"),
            candidate("NRT"),
            candidate("HKG"),
            candidate("DAD"),
        ];
        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&candidates, &trip(500_000))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["NRT"]);
        let reasons: Vec<_> = report
            .skipped
            .iter()
            .map(|s| (s.destination.as_str(), s.reason.clone()))
            .collect();
        assert_eq!(reasons[0], ("HND", SkipReason::NoOffer(Leg::Inbound)));
        assert_eq!(
            reasons[1],
            ("SIN", SkipReason::Currency(CurrencyError::RateUnavailable("SGD".to_string())))
        );
        assert!(matches!(
            reasons[2],
            ("HKG", SkipReason::ProviderFailure { leg: Leg::Outbound, .. })
        ));
        assert!(matches!(
            reasons[3],
            ("DAD", SkipReason::MalformedOffer { leg: Leg::Inbound, .. })
        ));
    }

    #[tokio::test]
    async fn test_truncates_to_max_results() {
        let upstream = MockUpstream::new();
        let destinations = ["A01", "A02", "A03", "A04", "A05", "A06"];
        for (i, dest) in destinations.iter().enumerate() {
            let price = (100_000 - i as i64 * 1_000).to_string();
            add_trip(&upstream, dest, &price, "0");
        }
        let config = SearchConfig {
            max_results: 3,
            ..SearchConfig::default()
        };
        let (token, rates) = (AccessToken::new(TOKEN), rates());

        let candidates: Vec<_> = destinations.iter().map(|d| candidate(d)).collect();
        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&candidates, &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["A06", "A05", "A04"]);
    }

    #[tokio::test]
    async fn test_fan_out_is_bounded() {
        let upstream = MockUpstream::new();
        upstream.set_delay(20);
        let candidates: Vec<_> = (0..12).map(|i| candidate(&format!("D{:02}", i))).collect();
        for c in &candidates {
            add_trip(&upstream, &c.iata_code, "100000", "100000");
        }
        let config = SearchConfig {
            max_concurrent_candidates: 3,
            max_results: 20,
            ..SearchConfig::default()
        };
        let (token, rates) = (AccessToken::new(TOKEN), rates());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&candidates, &trip(0))
            .await
            .unwrap();

        assert_eq!(report.flights.len(), 12);
        assert_eq!(upstream.one_way_calls(), 24);
        // Two legs per candidate in flight at most
        assert!(upstream.max_in_flight() <= 6, "max in flight {}", upstream.max_in_flight());
        assert!(upstream.max_in_flight() > 1, "legs should overlap");
    }

    #[tokio::test]
    async fn test_slow_leg_times_out() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "NRT", "150000", "140000");
        add_trip(&upstream, "SYD", "150000", "140000");
        upstream.slow_leg("SYD", "ICN", ret(), Duration::from_secs(5));
        let config = SearchConfig {
            leg_timeout: Duration::from_millis(50),
            ..SearchConfig::default()
        };
        let (token, rates) = (AccessToken::new(TOKEN), rates());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[candidate("SYD"), candidate("NRT")], &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["NRT"]);
        assert_eq!(report.skipped[0].reason, SkipReason::LegTimeout(Leg::Inbound));
    }

    #[tokio::test]
    async fn test_fan_out_deadline_abandons_pending_candidates() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "NRT", "150000", "140000");
        add_trip(&upstream, "JFK", "150000", "140000");
        upstream.slow_leg("ICN", "JFK", depart(), Duration::from_secs(5));
        let config = SearchConfig {
            fan_out_timeout: Duration::from_millis(100),
            ..SearchConfig::default()
        };
        let (token, rates) = (AccessToken::new(TOKEN), rates());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[candidate("JFK"), candidate("NRT")], &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["NRT"]);
        assert_eq!(report.abandoned, 1);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let upstream = MockUpstream::new();
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[], &trip(100_000))
            .await
            .unwrap();

        assert_eq!(report, AggregationReport::default());
        assert_eq!(upstream.one_way_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_token_aborts_fan_out() {
        let upstream = MockUpstream::new();
        add_trip(&upstream, "FUK", "90000", "80000");
        upstream.fail_one_way("ICN", "NRT", depart(), ProviderError::AuthError("token expired".to_string()));
        // Outbound has no offer, inbound is rejected
        upstream.fail_one_way("HND", "ICN", ret(), ProviderError::AuthError("token expired".to_string()));
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        for destination in ["NRT", "HND"] {
            let result = FareAggregator::new(&upstream, &token, &rates, &config)
                .aggregate(&[candidate("FUK"), candidate(destination)], &trip(0))
                .await;
            assert_eq!(result, Err(ProviderError::AuthError("token expired".to_string())));
        }
    }

    #[tokio::test]
    async fn test_round_trip_total_overflow_is_skipped() {
        let upstream = MockUpstream::new();
        // Each leg fits an i64, the sum does not
        add_trip(&upstream, "NRT", "5000000000000000000", "5000000000000000000");
        // Each leg alone is out of range
        add_trip(&upstream, "KIX", "1e19", "1e19");
        add_trip(&upstream, "FUK", "90000", "80000");
        let (token, rates, config) = (AccessToken::new(TOKEN), rates(), SearchConfig::default());

        let report = FareAggregator::new(&upstream, &token, &rates, &config)
            .aggregate(&[candidate("NRT"), candidate("KIX"), candidate("FUK")], &trip(0))
            .await
            .unwrap();

        assert_eq!(codes(&report.flights), vec!["FUK"]);
        assert_eq!(report.skipped[0].reason, SkipReason::TotalOutOfRange);
        assert!(matches!(
            report.skipped[1].reason,
            SkipReason::Currency(CurrencyError::InvalidAmount { .. })
        ));
    }

    fn card(destination: &str, total_price: i64) -> FlightCard {
        let at = depart().and_hms_opt(9, 0, 0).unwrap();
        FlightCard {
            airline_code: "KE".to_string(),
            total_price,
            departure_airport: "ICN".to_string(),
            departure_time: at,
            arrival_airport: destination.to_string(),
            arrival_time: at,
            duration_minutes: 60,
            stop_count: 0,
            segments: vec![],
        }
    }

    #[test]
    fn test_rank_is_stable_on_index() {
        // Arrival order differs from candidate order
        let priced = vec![
            (3, card("D", 100)),
            (0, card("A", 200)),
            (2, card("C", 100)),
            (1, card("B", 50)),
        ];
        let ranked = rank(priced, 10);
        assert_eq!(codes(&ranked), vec!["B", "C", "D", "A"]);
    }

    #[test]
    fn test_rank_zero_results() {
        assert!(rank(vec![(0, card("A", 1))], 0).is_empty());
    }
}
