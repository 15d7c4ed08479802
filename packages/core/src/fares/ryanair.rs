//! Ryanair fare provider
//!
//! Implements `FareSource` against the public "cheapest per day" fare
//! finder endpoint.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::FetchError;
use crate::fares::{
    provider::FareSource,
    types::{Fare, FareSet, FareWindow, Route},
};

pub const DEFAULT_BASE_URL: &str = "https://www.ryanair.com/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const FALLBACK_CURRENCY: &str = "EUR";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Clone)]
pub struct RyanairFareSource {
    base_url: String,
    route: Route,
    timeout: Duration,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct CheapestPerDayResponse {
    outbound: Option<OutboundFares>,
}

#[derive(Debug, Deserialize)]
struct OutboundFares {
    #[serde(default)]
    fares: Vec<Option<RawFare>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFare {
    #[serde(alias = "date")]
    day: Option<String>,
    price: Option<RawPrice>,
    #[serde(alias = "departureTime")]
    departure_date: Option<String>,
    #[serde(alias = "arrivalTime")]
    arrival_date: Option<String>,
    unavailable: Option<bool>,
    sold_out: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPrice {
    value: Option<Decimal>,
    currency_code: Option<String>,
}

impl RyanairFareSource {
    pub fn new(
        base_url: impl Into<String>,
        route: Route,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::network(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            route,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/farfnd/v4/oneWayFares/{}/{}/cheapestPerDay",
            self.base_url,
            self.route.origin(),
            self.route.destination()
        )
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout { seconds: self.timeout.as_secs() }
        } else {
            FetchError::network(err.to_string())
        }
    }
}

/// Map one provider record onto a `Fare`, or `None` when it must be dropped.
fn convert_fare(raw: RawFare, window: &FareWindow) -> Option<Fare> {
    if raw.unavailable.unwrap_or(false) || raw.sold_out.unwrap_or(false) {
        return None;
    }

    let price = raw.price?;
    let value = price.value.filter(|value| *value > Decimal::ZERO)?;

    let day = raw.day?;
    let date = match NaiveDate::parse_from_str(&day, "%Y-%m-%d") {
        Ok(date) => date,
        Err(err) => {
            tracing::warn!("Dropping fare with invalid day '{}': {}", day, err);
            return None;
        }
    };
    if !window.contains(date) {
        tracing::debug!("Dropping fare for {} outside requested window", date);
        return None;
    }

    Some(Fare {
        date,
        price: value,
        currency: price
            .currency_code
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| FALLBACK_CURRENCY.to_string()),
        departure_time: raw.departure_date.as_deref().and_then(parse_time_of_day),
        arrival_time: raw.arrival_date.as_deref().and_then(parse_time_of_day),
        available: true,
    })
}

/// Accepts a local ISO datetime (`2025-03-01T09:35:00`) or a bare time.
fn parse_time_of_day(raw: &str) -> Option<NaiveTime> {
    if let Ok(datetime) = NaiveDateTime::from_str(raw) {
        return Some(datetime.time());
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[async_trait]
impl FareSource for RyanairFareSource {
    async fn fetch(&self, window: FareWindow) -> Result<FareSet, FetchError> {
        let date_from = window.start().format("%Y-%m-%d").to_string();
        let date_to = window.end().format("%Y-%m-%d").to_string();

        let response = self
            .http
            .get(self.endpoint())
            .query(&[
                ("outboundDateFrom", date_from.as_str()),
                ("outboundDateTo", date_to.as_str()),
            ])
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        if !response.status().is_success() {
            return Err(FetchError::Status { status: response.status().as_u16() });
        }

        let body = response.text().await.map_err(|err| self.classify(err))?;
        let parsed: CheapestPerDayResponse = serde_json::from_str(&body)
            .map_err(|err| FetchError::malformed(format!("Failed to parse fare response: {}", err)))?;

        let raw_fares = parsed.outbound.map(|outbound| outbound.fares).unwrap_or_default();
        let fares: Vec<Fare> = raw_fares
            .into_iter()
            .flatten()
            .filter_map(|raw| convert_fare(raw, &window))
            .collect();

        tracing::debug!(
            "{} returned {} usable fares for {}..={}",
            self.provider_name(),
            fares.len(),
            date_from,
            date_to
        );

        Ok(FareSet::new(window, fares))
    }

    fn provider_name(&self) -> &str {
        "Ryanair"
    }
}
