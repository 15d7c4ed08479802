//! Core data types for fares

use chrono::{Days, NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::InvalidInputError;

/// The cheapest fare on one operating day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub date: NaiveDate,
    pub price: Decimal,
    pub currency: String,
    pub departure_time: Option<NaiveTime>,
    pub arrival_time: Option<NaiveTime>,
    pub available: bool,
}

/// Origin/destination pair as IATA airport codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    origin: String,
    destination: String,
}

impl Route {
    pub fn new(origin: &str, destination: &str) -> Result<Self, InvalidInputError> {
        let origin = parse_airport_code("origin", origin)?;
        let destination = parse_airport_code("destination", destination)?;
        if origin == destination {
            return Err(InvalidInputError::new(
                "destination",
                "must differ from origin",
            ));
        }
        Ok(Self { origin, destination })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.origin, self.destination)
    }
}

fn parse_airport_code(field: &'static str, raw: &str) -> Result<String, InvalidInputError> {
    let code = raw.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(InvalidInputError::new(
            field,
            format!("'{}' is not a three-letter airport code", raw),
        ));
    }
    Ok(code.to_ascii_uppercase())
}

/// The `days` operating days starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FareWindow {
    start: NaiveDate,
    days: u32,
}

impl FareWindow {
    pub fn new(start: NaiveDate, days: u32) -> Result<Self, InvalidInputError> {
        if days == 0 {
            return Err(InvalidInputError::new("window_days", "must be at least 1"));
        }
        if start.checked_add_days(Days::new(u64::from(days) - 1)).is_none() {
            return Err(InvalidInputError::new("window_days", "window ends past the calendar"));
        }
        Ok(Self { start, days })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    /// Last day covered by the window (inclusive).
    pub fn end(&self) -> NaiveDate {
        // Checked in `new`.
        self.start + Days::new(u64::from(self.days) - 1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }
}

/// Normalized result of one fetch: at most one fare per date, ordered by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FareSet {
    fares: Vec<Fare>,
    window: FareWindow,
}

impl FareSet {
    /// Sorts by date and collapses duplicate dates, preferring an available
    /// fare and then the cheaper one.
    pub fn new(window: FareWindow, mut fares: Vec<Fare>) -> Self {
        fares.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(b.available.cmp(&a.available))
                .then(a.price.cmp(&b.price))
        });
        fares.dedup_by_key(|fare| fare.date);
        Self { fares, window }
    }

    pub fn empty(window: FareWindow) -> Self {
        Self { fares: Vec::new(), window }
    }

    pub fn fares(&self) -> &[Fare] {
        &self.fares
    }

    pub fn window(&self) -> FareWindow {
        self.window
    }

    pub fn is_empty(&self) -> bool {
        self.fares.is_empty()
    }

    pub fn available(&self) -> impl Iterator<Item = &Fare> {
        self.fares.iter().filter(|fare| fare.available)
    }

    /// Cheapest available fare; the earliest date wins a tie.
    pub fn lowest(&self) -> Option<&Fare> {
        self.available()
            .min_by(|a, b| a.price.cmp(&b.price).then(a.date.cmp(&b.date)))
    }
}
