use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use tracing::instrument;

use crate::controllers::upload::{Folder, ImageUpload};
use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::response::{ApiResponse, Upload};

#[instrument(skip_all)]
pub(crate) async fn product_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Upload>, Error> {
    let mut multipart = multipart?;
    let upload = ImageUpload::from_multipart(&mut multipart, "file").await?;

    let url = state
        .upload_controller
        .save(Folder::Products, upload)
        .await?;

    Ok(ApiResponse::ok(Upload { url }).with_message("File uploaded"))
}
