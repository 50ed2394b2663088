//! Travel server operations: flight search and flight details.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domains::operations::{
    HandlerError, HandlerResult, Operation, OperationHandler, Parameters, parse_params,
};

/// Cabin class of a fare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

#[derive(Debug, Clone, Serialize)]
struct FlightSegment {
    flight_number: String,
    airline_code: String,
    departure_airport: String,
    arrival_airport: String,
    departure_time: String,
    arrival_time: String,
    duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
struct Price {
    amount: f64,
    currency: String,
}

#[derive(Debug, Clone, Serialize)]
struct Flight {
    id: String,
    segments: Vec<FlightSegment>,
    price: Price,
    cabin_class: CabinClass,
    available_seats: u32,
}

fn mock_flight(
    id: &str,
    origin: &str,
    destination: &str,
    date: NaiveDate,
    cabin: CabinClass,
) -> Flight {
    Flight {
        id: id.to_string(),
        segments: vec![FlightSegment {
            flight_number: "AA123".to_string(),
            airline_code: "AA".to_string(),
            departure_airport: origin.to_string(),
            arrival_airport: destination.to_string(),
            departure_time: format!("{date}T10:00:00Z"),
            arrival_time: format!("{date}T12:00:00Z"),
            duration_minutes: 120,
        }],
        price: Price {
            amount: 299.99,
            currency: "USD".to_string(),
        },
        cabin_class: cabin,
        available_seats: 10,
    }
}

fn is_iata_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())
}

// ============================================================================
// search_flights
// ============================================================================

fn default_adults() -> u32 {
    1
}

/// Parameters for a flight search.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchFlightsParams {
    /// Origin airport IATA code (3 characters)
    pub origin: String,

    /// Destination airport IATA code (3 characters)
    pub destination: String,

    /// Flight departure date (YYYY-MM-DD)
    pub departure_date: NaiveDate,

    /// Number of adult passengers
    #[serde(default = "default_adults")]
    #[schemars(range(min = 1, max = 9))]
    pub adults: u32,

    /// Number of child passengers
    #[serde(default)]
    #[schemars(range(max = 9))]
    pub children: u32,

    /// Number of infant passengers
    #[serde(default)]
    #[schemars(range(max = 9))]
    pub infants: u32,

    /// Return flight date for round trips (YYYY-MM-DD)
    #[serde(default)]
    pub return_date: Option<NaiveDate>,

    /// Cabin class preference
    #[serde(default)]
    pub cabin_class: CabinClass,
}

/// Search available flights for a route and date.
pub struct SearchFlightsTool;

impl SearchFlightsTool {
    pub const NAME: &'static str = "search_flights";

    pub const DESCRIPTION: &'static str = "Search for available flights based on origin, destination, dates, and passenger information";

    pub fn operation() -> Operation {
        Operation::new::<SearchFlightsParams>(Self::NAME, Self)
            .with_description(Self::DESCRIPTION)
            .idempotent()
    }

    #[instrument(skip_all, fields(origin = %params.origin, destination = %params.destination))]
    pub fn execute(params: &SearchFlightsParams) -> HandlerResult {
        if !is_iata_code(&params.origin) || !is_iata_code(&params.destination) {
            return Err(HandlerError::invalid(
                "Origin and destination must be 3-letter IATA airport codes",
            ));
        }
        if params.origin.eq_ignore_ascii_case(&params.destination) {
            return Err(HandlerError::invalid("Origin and destination must differ"));
        }
        if let Some(return_date) = params.return_date {
            if return_date < params.departure_date {
                return Err(HandlerError::invalid(
                    "Return date must not be before departure date",
                ));
            }
        }
        if params.infants > params.adults {
            return Err(HandlerError::invalid(
                "Each infant must travel with an adult",
            ));
        }

        let origin = params.origin.to_ascii_uppercase();
        let destination = params.destination.to_ascii_uppercase();
        let mut flights = vec![mock_flight(
            "FL123",
            &origin,
            &destination,
            params.departure_date,
            params.cabin_class,
        )];
        if let Some(return_date) = params.return_date {
            flights.push(mock_flight(
                "FL124",
                &destination,
                &origin,
                return_date,
                params.cabin_class,
            ));
        }

        info!("Found {} flight(s)", flights.len());

        Ok(serde_json::json!({
            "total_count": flights.len(),
            "flights": serde_json::to_value(flights)?,
            "passengers": {
                "adults": params.adults,
                "children": params.children,
                "infants": params.infants,
            },
        }))
    }
}

#[async_trait::async_trait]
impl OperationHandler for SearchFlightsTool {
    async fn call(&self, params: &Parameters) -> HandlerResult {
        Self::execute(&parse_params(params)?)
    }
}

// ============================================================================
// get_flight_details
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetFlightDetailsParams {
    /// Unique identifier of the flight
    pub flight_id: String,
}

/// Fetch the details of one flight by id.
pub struct GetFlightDetailsTool;

impl GetFlightDetailsTool {
    pub const NAME: &'static str = "get_flight_details";

    pub const DESCRIPTION: &'static str = "Get detailed information about a specific flight";

    pub fn operation() -> Operation {
        Operation::new::<GetFlightDetailsParams>(Self::NAME, Self)
            .with_description(Self::DESCRIPTION)
            .idempotent()
    }

    pub fn execute(params: &GetFlightDetailsParams) -> HandlerResult {
        if params.flight_id.trim().is_empty() {
            return Err(HandlerError::invalid("Flight ID is required"));
        }
        let date = NaiveDate::from_ymd_opt(2024, 3, 15)
            .ok_or_else(|| HandlerError::internal("invalid mock date"))?;
        let flight = mock_flight(&params.flight_id, "JFK", "LAX", date, CabinClass::Economy);
        Ok(serde_json::to_value(flight)?)
    }
}

#[async_trait::async_trait]
impl OperationHandler for GetFlightDetailsTool {
    async fn call(&self, params: &Parameters) -> HandlerResult {
        Self::execute(&parse_params(params)?)
    }
}

/// All operations served by the travel server.
pub fn operations() -> Vec<Operation> {
    vec![SearchFlightsTool::operation(), GetFlightDetailsTool::operation()]
}
