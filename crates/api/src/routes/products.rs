//! Product read and search endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use domain::{CategoryId, Product, ProductId};
use read_store::SearchHit;
use serde::{Deserialize, Serialize};

use super::{AppState, PageParams, PageResponse, query_params};
use crate::error::ApiError;
use crate::queries::{Page, Source, Sourced};

/// Query parameters for product search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub source: Source,
    pub total: usize,
    pub data: Vec<SearchHit>,
    pub page: u32,
    pub size: u32,
}

/// GET /api/queries/products/{id}: a single product.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Sourced<Product>>, ApiError> {
    let product = state.reads.product(&ProductId::new(id)).await?;
    Ok(Json(product))
}

/// GET /api/queries/products/category/{id}: products in a category, paginated.
#[tracing::instrument(skip(state, params))]
pub async fn by_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<PageResponse<Product>>, ApiError> {
    let page = query_params(params)?.into_page()?;
    let products = state
        .reads
        .products_by_category(&CategoryId::new(id), page)
        .await?;
    Ok(Json(PageResponse::new(products, page)))
}

/// GET /api/queries/products/search: free-text search over products.
#[tracing::instrument(skip(state, params))]
pub async fn search(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let params = query_params(params)?;
    let page = Page::new(
        params.page.unwrap_or(1),
        params.size.unwrap_or(Page::DEFAULT_SIZE),
    )?;
    let category = params
        .category
        .filter(|c| !c.trim().is_empty())
        .map(CategoryId::new);

    let results = state
        .reads
        .search_products(&params.q, category.as_ref(), page)
        .await?;

    Ok(Json(SearchResponse {
        source: results.source,
        total: results.data.total,
        data: results.data.hits,
        page: page.page(),
        size: page.size(),
    }))
}
