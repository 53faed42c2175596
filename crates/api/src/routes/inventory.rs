//! Inventory read endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use domain::ProductId;

use super::AppState;
use crate::error::ApiError;
use crate::queries::Sourced;

/// GET /api/queries/inventory/{productId}: current stock level.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<Sourced<i64>>, ApiError> {
    let quantity = state.reads.inventory(&ProductId::new(product_id)).await?;
    Ok(Json(quantity))
}
