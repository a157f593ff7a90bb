use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use tinymart_proto::Purchase;

use crate::error::Result;
use crate::mutation::CreatePurchase;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/purchases", post(create_purchase))
        .route("/purchases/:id", get(get_purchase))
}

#[derive(Serialize)]
struct PurchaseResponse {
    success: bool,
    purchase: Purchase,
}

async fn create_purchase(
    State(state): State<AppState>,
    Json(request): Json<CreatePurchase>,
) -> Result<(StatusCode, Json<PurchaseResponse>)> {
    let purchase = state.deliveries.record_purchase(request)?;

    Ok((
        StatusCode::CREATED,
        Json(PurchaseResponse {
            success: true,
            purchase,
        }),
    ))
}

async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<PurchaseResponse>> {
    let purchase = state.deliveries.purchase(id)?;

    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
    }))
}
