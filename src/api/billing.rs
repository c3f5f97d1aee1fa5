/// Credit balance and bundle purchase endpoints

use crate::{
    api::AppState,
    auth::AuthUser,
    billing::{BundleInfo, CreditBundle, UserPurchase},
    error::AppResult,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub bundle: CreditBundle,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub purchase: UserPurchase,
    pub credits: i64,
}

pub fn create_billing_routes() -> Router<AppState> {
    Router::new()
        .route("/billing/credits", get(get_credits))
        .route("/billing/bundles", get(list_bundles))
        .route("/billing/purchase", post(purchase_bundle))
        .route("/billing/purchases", get(list_purchases))
}

/// GET /billing/credits
async fn get_credits(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<CreditsResponse>> {
    let credits = state.balances.get_credits(&user.id).await?;
    Ok(Json(CreditsResponse { credits }))
}

/// GET /billing/bundles
async fn list_bundles() -> Json<Vec<BundleInfo>> {
    Json(CreditBundle::ALL.iter().map(|bundle| bundle.info()).collect())
}

/// Grant a bundle's credits
///
/// POST /billing/purchase
/// Body: { "bundle": "SMALL" | "MEDIUM" | "LARGE" }
async fn purchase_bundle(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PurchaseRequest>,
) -> AppResult<(StatusCode, Json<PurchaseResponse>)> {
    let purchase = state.balances.purchase_bundle(&user.id, payload.bundle).await?;
    let credits = state.balances.get_credits(&user.id).await?;
    tracing::info!("💳 User {} bought {} credits", user.id, purchase.credits);

    Ok((StatusCode::CREATED, Json(PurchaseResponse { purchase, credits })))
}

/// GET /billing/purchases
async fn list_purchases(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<UserPurchase>>> {
    Ok(Json(state.balances.list_purchases(&user.id).await?))
}
