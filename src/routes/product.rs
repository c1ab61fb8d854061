use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Extension, Json, Path, Query, State};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::product::{Product, ProductFilter, ProductId};
use crate::types::request::{MyProductsQuery, NewProductData};
use crate::types::response::{ApiResponse, Deleted, ProductSummary, ProductView};
use crate::types::user::Session;

#[instrument(skip(state))]
pub(crate) async fn list(
    State(state): State<AppState>,
    filter: Result<Query<ProductFilter>, QueryRejection>,
) -> Result<ApiResponse<Vec<ProductView>>, Error> {
    let Query(filter) = filter?;

    let products = state.product_controller.list(&filter).await?;

    Ok(ApiResponse::ok(products))
}

#[instrument(skip(state))]
pub(crate) async fn mine(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    query: Result<Query<MyProductsQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<ProductView>>, Error> {
    let Query(query) = query?;

    let page = state.product_controller.mine(&session, &query).await?;
    let count = page.products.len();

    Ok(ApiResponse::ok(page.products)
        .with_count(count)
        .with_total(page.total))
}

#[instrument(skip(state))]
pub(crate) async fn get(
    State(state): State<AppState>,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<ApiResponse<ProductView>, Error> {
    let Path(id) = id?;

    let product = state.product_controller.get(id).await?;

    Ok(ApiResponse::ok(product))
}

#[instrument(skip(state, payload))]
pub(crate) async fn create(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<NewProductData>, JsonRejection>,
) -> Result<ApiResponse<Product>, Error> {
    let Json(data) = payload?;

    let product = state.product_controller.create(&session, data).await?;

    Ok(ApiResponse::created(product).with_message("Product published"))
}

#[instrument(skip(state, payload))]
pub(crate) async fn update(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    id: Result<Path<ProductId>, PathRejection>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<ApiResponse<ProductSummary>, Error> {
    let Path(id) = id?;
    let Json(fields) = payload?;

    let summary = state
        .product_controller
        .update(&session, id, fields)
        .await?;

    Ok(ApiResponse::ok(summary).with_message("Product updated"))
}

#[instrument(skip(state))]
pub(crate) async fn delete(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    id: Result<Path<ProductId>, PathRejection>,
) -> Result<ApiResponse<Deleted>, Error> {
    let Path(id) = id?;

    let deleted = state.product_controller.delete(&session, id).await?;

    Ok(ApiResponse::ok(deleted).with_message("Product deleted"))
}
