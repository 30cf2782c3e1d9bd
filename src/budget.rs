// Budget figures derived from the ranked flights

use crate::aggregator::FlightCard;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub budget: i64,
    pub estimated_total: i64,
    // Negative when even the cheapest option is over budget
    pub remaining: i64,
}

pub fn summarize(flights: &[FlightCard], budget: i64) -> BudgetSummary {
    let estimated_total = flights
        .iter()
        .map(|flight| flight.total_price)
        .min()
        .unwrap_or(0);

    BudgetSummary {
        budget,
        estimated_total,
        remaining: budget - estimated_total,
    }
}
