//! Read-only fare queries served from the cached snapshot.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::headers::{conditional_json, CachePolicy};
use super::ApiState;
use crate::cache::FareStats;
use crate::error::{AppError, InvalidInputError};
use crate::fares::Fare;

pub const DEFAULT_LIST_LIMIT: usize = 15;
pub const MAX_LIST_LIMIT: usize = 100;

const FARES_CACHE: CachePolicy = CachePolicy::new(60, 300);

#[derive(Debug, Serialize, Deserialize)]
pub struct LowestFareResponse {
    pub fare: Fare,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FareListQuery {
    pub limit: Option<usize>,
    pub max_price: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FareListResponse {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub count: usize,
    pub fares: Vec<Fare>,
}

#[derive(Debug, Serialize)]
pub struct FareStatsResponse {
    #[serde(flatten)]
    pub stats: FareStats,
    pub fetched_at: DateTime<Utc>,
}

fn to_body<T: Serialize>(payload: &T) -> Result<Vec<u8>, AppError> {
    serde_json::to_vec(payload)
        .map_err(|err| AppError::Config(format!("Failed to serialize response: {}", err)))
}

/// `GET /fares/lowest`: 404 until some available fare is cached.
pub async fn lowest_fare(
    State(state): State<ApiState>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let (fare, fetched_at) = state
        .engine
        .query_lowest()
        .await
        .ok_or_else(|| AppError::NotFound("No available fare is known yet".to_string()))?;

    let body = to_body(&LowestFareResponse { fare, fetched_at })?;
    Ok(conditional_json(&request_headers, body, fetched_at, FARES_CACHE))
}

/// `GET /fares`: the cheapest fares, ordered by date.
pub async fn list_fares(
    State(state): State<ApiState>,
    Query(params): Query<FareListQuery>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    if let Some(ceiling) = params.max_price {
        if ceiling < Decimal::ZERO {
            return Err(InvalidInputError::new("max_price", "must not be negative").into());
        }
    }

    let snapshot = state
        .engine
        .snapshot()
        .await
        .ok_or_else(|| AppError::NotFound("No fares fetched yet".to_string()))?;
    let fares = snapshot.cheapest(limit, params.max_price);

    let payload = FareListResponse {
        window_start: snapshot.window().start(),
        window_end: snapshot.window().end(),
        fetched_at: snapshot.fetched_at(),
        count: fares.len(),
        fares,
    };
    let body = to_body(&payload)?;
    Ok(conditional_json(&request_headers, body, snapshot.fetched_at(), FARES_CACHE))
}

/// `GET /fares/stats`: 404 while no available fare is cached.
pub async fn fare_stats(
    State(state): State<ApiState>,
    request_headers: HeaderMap,
) -> Result<Response, AppError> {
    let snapshot = state
        .engine
        .snapshot()
        .await
        .ok_or_else(|| AppError::NotFound("No fares fetched yet".to_string()))?;
    let stats = snapshot
        .stats()
        .ok_or_else(|| AppError::NotFound("No available fares in the window".to_string()))?;

    let body = to_body(&FareStatsResponse {
        stats,
        fetched_at: snapshot.fetched_at(),
    })?;
    Ok(conditional_json(&request_headers, body, snapshot.fetched_at(), FARES_CACHE))
}
