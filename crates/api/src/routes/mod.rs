//! HTTP handlers.

pub mod customers;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod products;

use axum::extract::Query;
use axum::extract::rejection::QueryRejection;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::queries::{Page, ReadService, Source, Sourced};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub reads: ReadService,
}

/// `page` and `size` query parameters, both optional.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    pub fn into_page(self) -> Result<Page, ApiError> {
        let page = Page::new(
            self.page.unwrap_or(1),
            self.size.unwrap_or(Page::DEFAULT_SIZE),
        )?;
        Ok(page)
    }
}

/// A page of a collection.
#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub source: Source,
    pub data: Vec<T>,
    pub page: u32,
    pub size: u32,
}

impl<T> PageResponse<T> {
    pub fn new(read: Sourced<Vec<T>>, page: Page) -> Self {
        Self {
            source: read.source,
            data: read.data,
            page: page.page(),
            size: page.size(),
        }
    }
}

/// Unwraps query parameters, turning a malformed query string into a 400
/// with the usual JSON error body.
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
