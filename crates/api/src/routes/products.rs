//! Catalog read endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{Category, Product, ProductId};
use serde::Deserialize;
use store::Store;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub category: Option<String>,
    pub in_stock: Option<bool>,
}

/// GET /products — list the catalog, optionally filtered.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .orders
        .store()
        .list_products()
        .await?
        .into_iter()
        .filter(|p| {
            query
                .category
                .as_deref()
                .is_none_or(|c| p.category_id.as_ref().is_some_and(|id| id.as_str() == c))
        })
        .filter(|p| query.in_stock.is_none_or(|wanted| p.in_stock == wanted))
        .collect();

    Ok(Json(products))
}

/// GET /products/{id} — load a single product.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    state
        .orders
        .store()
        .get_product(&ProductId::new(id.as_str()))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

/// GET /categories — list product categories.
#[tracing::instrument(skip(state))]
pub async fn categories<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.orders.store().list_categories().await?))
}
