// Itinerary extraction from a typed one-way offer

use crate::offers::{FlightOffer, OfferSegment, SegmentEndpoint};
use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed offer: {reason}")]
pub struct MalformedOffer {
    pub reason: String,
}

impl MalformedOffer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub carrier_code: String,
    pub flight_number: String,
    pub from: String,
    pub to: String,
    pub departure_time: NaiveDateTime,
    pub arrival_time: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Itinerary {
    pub airline_code: String,
    pub departure_airport: String,
    pub departure_time: NaiveDateTime,
    pub arrival_airport: String,
    pub arrival_time: NaiveDateTime,
    pub duration_minutes: u32,
    pub stop_count: u32,
    pub segments: Vec<Segment>,
}

/// Builds the display itinerary from the first itinerary of `offer`.
/// Further itineraries (the return half of a round-trip offer) are ignored.
pub fn extract(offer: &FlightOffer) -> Result<Itinerary, MalformedOffer> {
    let itinerary = offer
        .itineraries
        .first()
        .ok_or_else(|| MalformedOffer::new("offer has no itineraries"))?;

    let segments = itinerary
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| extract_segment(index, segment))
        .collect::<Result<Vec<_>, _>>()?;

    let (first, last) = match (segments.first(), segments.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(MalformedOffer::new("itinerary has no segments")),
    };

    let duration = itinerary
        .duration
        .as_deref()
        .ok_or_else(|| MalformedOffer::new("itinerary duration missing"))?;
    let duration_minutes = parse_iso_duration_minutes(duration)
        .ok_or_else(|| MalformedOffer::new(format!("unparseable duration {:?}", duration)))?;

    Ok(Itinerary {
        airline_code: first.carrier_code.clone(),
        departure_airport: first.from.clone(),
        departure_time: first.departure_time,
        arrival_airport: last.to.clone(),
        arrival_time: last.arrival_time,
        duration_minutes,
        stop_count: segments.len().saturating_sub(1) as u32,
        segments,
    })
}

fn extract_segment(index: usize, segment: &OfferSegment) -> Result<Segment, MalformedOffer> {
    let carrier = required_text(segment.carrier_code.as_deref())
        .ok_or_else(|| MalformedOffer::new(format!("segment {} has no carrier code", index)))?;
    let number = segment.number.as_deref().map(str::trim).unwrap_or_default();

    let (from, departure_time) = endpoint(index, "departure", segment.departure.as_ref())?;
    let (to, arrival_time) = endpoint(index, "arrival", segment.arrival.as_ref())?;

    let carrier_code = carrier.to_ascii_uppercase();
    Ok(Segment {
        flight_number: format!("{}{}", carrier_code, number),
        carrier_code,
        from,
        to,
        departure_time,
        arrival_time,
    })
}

fn endpoint(
    index: usize,
    side: &str,
    endpoint: Option<&SegmentEndpoint>,
) -> Result<(String, NaiveDateTime), MalformedOffer> {
    let endpoint = endpoint
        .ok_or_else(|| MalformedOffer::new(format!("segment {} has no {}", index, side)))?;

    let iata = required_text(endpoint.iata_code.as_deref()).ok_or_else(|| {
        MalformedOffer::new(format!("segment {} {} has no IATA code", index, side))
    })?;

    let at = required_text(endpoint.at.as_deref()).ok_or_else(|| {
        MalformedOffer::new(format!("segment {} {} has no timestamp", index, side))
    })?;
    let at = at.parse::<NaiveDateTime>().map_err(|e| {
        MalformedOffer::new(format!("segment {} {} timestamp {:?}: {}", index, side, at, e))
    })?;

    Ok((iata.to_ascii_uppercase(), at))
}

fn required_text(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parses an ISO-8601 duration such as `PT2H35M` or `P1DT3H` into whole
/// minutes, truncating leftover seconds. Year and month designators are
/// rejected since their length is ambiguous.
pub fn parse_iso_duration_minutes(text: &str) -> Option<u32> {
    let text = text.trim().to_ascii_uppercase();
    let body = text.strip_prefix('P')?;
    if body.is_empty() {
        return None;
    }

    let (date_part, time_part) = match body.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, Some(time)),
        Some(_) => return None,
        None => (body, None),
    };

    let mut seconds = 0.0_f64;
    for (value, unit) in designators(date_part)? {
        seconds += match unit {
            'W' => value * 7.0 * 86_400.0,
            'D' => value * 86_400.0,
            _ => return None,
        };
    }
    if let Some(time_part) = time_part {
        for (value, unit) in designators(time_part)? {
            seconds += match unit {
                'H' => value * 3_600.0,
                'M' => value * 60.0,
                'S' => value,
                _ => return None,
            };
        }
    }

    let minutes = (seconds / 60.0).floor();
    if minutes.is_finite() && minutes >= 0.0 && minutes <= u32::MAX as f64 {
        Some(minutes as u32)
    } else {
        None
    }
}

// Splits "2H35M" into [(2.0, 'H'), (35.0, 'M')]
fn designators(part: &str) -> Option<Vec<(f64, char)>> {
    let mut parsed = Vec::new();
    let mut number = String::new();

    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' || ch == ',' {
            number.push(if ch == ',' { '.' } else { ch });
        } else {
            let value = number.parse::<f64>().ok()?;
            parsed.push((value, ch));
            number.clear();
        }
    }

    // Trailing digits without a designator
    if !number.is_empty() {
        return None;
    }
    Some(parsed)
}
