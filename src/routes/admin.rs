use axum::extract::{Extension, State};
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::product::ProductFilter;
use crate::types::response::{ApiResponse, ProductView};
use crate::types::user::User;

#[instrument(skip_all)]
pub(crate) async fn list_products(
    State(state): State<AppState>,
    Extension(admin): Extension<User>,
) -> Result<ApiResponse<Vec<ProductView>>, Error> {
    tracing::debug!(admin = %admin.username, "listing all products");

    let products = state
        .product_controller
        .list(&ProductFilter::default())
        .await?;
    let count = products.len();

    Ok(ApiResponse::ok(products).with_count(count))
}
