// Destination candidate resolution from a provider route list

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Raw route entry as returned by the route provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RouteRecord {
    pub iata_code: Option<String>,
    pub country_code: Option<String>,
}

impl RouteRecord {
    pub fn new(iata_code: &str, country_code: Option<&str>) -> Self {
        Self {
            iata_code: Some(iata_code.to_string()),
            country_code: country_code.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationCandidate {
    pub iata_code: String,
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripScope {
    Domestic,
    International,
}

impl TripScope {
    pub fn from_domestic_flag(domestic: bool) -> Self {
        if domestic {
            TripScope::Domestic
        } else {
            TripScope::International
        }
    }

    // An unknown country never equals the home country
    fn admits(&self, country_code: Option<&str>, home_country: &str) -> bool {
        let is_home = country_code.map_or(false, |c| c.eq_ignore_ascii_case(home_country));
        match self {
            TripScope::Domestic => is_home,
            TripScope::International => !is_home,
        }
    }
}

/// Turns a route list into at most `max_candidates` destinations, in provider
/// order, excluding the origin and anything outside `scope`.
///
/// Codes are compared trimmed and upper-cased. A code that repeats is kept
/// only at its first occurrence, so the provider's duplicates never price the
/// same destination twice or use up the candidate cap.
pub fn resolve(
    routes: &[RouteRecord],
    origin_code: &str,
    scope: TripScope,
    home_country: &str,
    max_candidates: usize,
) -> Vec<DestinationCandidate> {
    let origin = origin_code.trim();
    let mut seen = HashSet::new();

    routes
        .iter()
        .filter_map(|route| {
            let iata_code = normalize_code(route.iata_code.as_deref())?;
            let country_code = normalize_code(route.country_code.as_deref());
            Some(DestinationCandidate {
                iata_code,
                country_code,
            })
        })
        .filter(|candidate| scope.admits(candidate.country_code.as_deref(), home_country))
        .filter(|candidate| !candidate.iata_code.eq_ignore_ascii_case(origin))
        .filter(|candidate| seen.insert(candidate.iata_code.clone()))
        .take(max_candidates)
        .collect()
}

fn normalize_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_ascii_uppercase)
}
