//! Customer read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use domain::{Customer, CustomerId, Order};

use super::{AppState, PageParams, PageResponse, query_params};
use crate::error::ApiError;
use crate::queries::Sourced;

/// GET /api/queries/customers/{id}: a single customer with order history.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Sourced<Customer>>, ApiError> {
    let customer = state.reads.customer(&CustomerId::new(id)).await?;
    Ok(Json(customer))
}

/// GET /api/queries/customers/{id}/orders: a customer's orders, paginated.
#[tracing::instrument(skip(state, params))]
pub async fn orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<Order>>, ApiError> {
    let page = query_params(params)?.into_page()?;
    let orders = state
        .reads
        .customer_orders(&CustomerId::new(id), page)
        .await?;
    Ok(Json(PageResponse::new(orders, page)))
}
