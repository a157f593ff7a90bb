use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tinymart_core::DeliveryFilter;
use tinymart_proto::{Delivery, DeliveryStatus};

use crate::error::{Result, ServerError};
use crate::mutation::{CreateDelivery, IdInput};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/deliveries", get(list_deliveries).post(create_delivery))
        .route("/deliveries/:id", get(get_delivery))
}

#[derive(Serialize)]
struct DeliveryResponse {
    success: bool,
    delivery: Delivery,
}

#[derive(Serialize)]
struct DeliveryListResponse {
    success: bool,
    count: usize,
    deliveries: Vec<Delivery>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParams {
    purchase_id: Option<String>,
    status: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl ListParams {
    fn into_filter(self) -> Result<DeliveryFilter> {
        let mut filter = DeliveryFilter::new();
        if let Some(purchase_id) = self.purchase_id {
            filter = filter.with_purchase_id(IdInput::Text(purchase_id).parse()?);
        }
        if let Some(status) = self.status {
            let status = DeliveryStatus::from_str(&status)
                .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
            filter = filter.with_status(status);
        }
        if let Some(from) = self.from {
            filter = filter.with_from(from);
        }
        if let Some(to) = self.to {
            filter = filter.with_to(to);
        }
        Ok(filter)
    }
}

async fn create_delivery(
    State(state): State<AppState>,
    Json(request): Json<CreateDelivery>,
) -> Result<(StatusCode, Json<DeliveryResponse>)> {
    let delivery = state.deliveries.record_status(request)?;

    Ok((
        StatusCode::CREATED,
        Json(DeliveryResponse {
            success: true,
            delivery,
        }),
    ))
}

async fn list_deliveries(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<DeliveryListResponse>> {
    let filter = params.into_filter()?;
    let deliveries = state.deliveries.list(&filter);

    Ok(Json(DeliveryListResponse {
        success: true,
        count: deliveries.len(),
        deliveries,
    }))
}

async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DeliveryResponse>> {
    let delivery = state.deliveries.get(id)?;

    Ok(Json(DeliveryResponse {
        success: true,
        delivery,
    }))
}
