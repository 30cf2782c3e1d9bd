// Typed flight-offer shapes as returned by the flight-offer provider
// (Amadeus `/v2/shopping/flight-offers`). Every field is optional so that a
// sparse offer still decodes; the extractor decides what is required.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlightOffersResponse {
    pub data: Vec<FlightOffer>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlightOffer {
    pub id: Option<String>,
    pub price: Option<OfferPrice>,
    pub itineraries: Vec<OfferItinerary>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfferPrice {
    pub currency: Option<String>,
    pub total: Option<String>,
    pub grand_total: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfferItinerary {
    pub duration: Option<String>,
    pub segments: Vec<OfferSegment>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OfferSegment {
    pub departure: Option<SegmentEndpoint>,
    pub arrival: Option<SegmentEndpoint>,
    pub carrier_code: Option<String>,
    pub number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentEndpoint {
    pub iata_code: Option<String>,
    pub terminal: Option<String>,
    pub at: Option<String>,
}

impl FlightOffer {
    // Total as sent by the provider, preferring `total` over `grandTotal`
    pub fn total_text(&self) -> Option<&str> {
        let price = self.price.as_ref()?;
        price
            .total
            .as_deref()
            .or(price.grand_total.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn currency(&self) -> Option<&str> {
        self.price
            .as_ref()?
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}
