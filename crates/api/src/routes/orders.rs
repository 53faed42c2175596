//! Order read endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::{Order, OrderId};

use super::AppState;
use crate::error::ApiError;
use crate::queries::Sourced;

/// GET /api/queries/orders/{id}: a single order.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Sourced<Order>>, ApiError> {
    let order = state.reads.order(&OrderId::new(id)).await?;
    Ok(Json(order))
}
