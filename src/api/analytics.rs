/// Usage statistics endpoints

use crate::{
    analytics::{Period, PeriodStats},
    api::AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub fn create_analytics_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics/stats", get(period_stats))
        .route("/analytics/periods", get(list_periods))
}

/// Statistics for one month, the current UTC month by default
///
/// GET /analytics/stats?year=2024&month=3
async fn period_stats(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PeriodQuery>,
) -> AppResult<Json<PeriodStats>> {
    let current = Period::current();
    let period = Period::new(
        query.year.unwrap_or(current.year),
        query.month.unwrap_or(current.month),
    )
    .ok_or_else(|| {
        AppError::InvalidArgument("Year must be between 1 and 9999 and month between 1 and 12".to_string())
    })?;

    Ok(Json(state.analytics.period_stats(&user.id, period).await?))
}

/// GET /analytics/periods
async fn list_periods(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<Period>>> {
    Ok(Json(state.analytics.periods(&user.id, chrono::Utc::now()).await?))
}
