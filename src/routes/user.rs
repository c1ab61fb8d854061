use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Json, Multipart, State};
use tracing::instrument;

use crate::controllers::upload::ImageUpload;
use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::request::{ProfileData, UpdatePasswordData};
use crate::types::response::{ApiResponse, Avatar, Profile};
use crate::types::user::Session;

#[instrument(skip(state))]
pub(crate) async fn get_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<ApiResponse<Profile>, Error> {
    let profile = state.user_controller.profile(&session).await?;

    Ok(ApiResponse::ok(profile))
}

#[instrument(skip(state, payload))]
pub(crate) async fn update_profile(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<ProfileData>, JsonRejection>,
) -> Result<ApiResponse<Profile>, Error> {
    let Json(data) = payload?;

    let profile = state.user_controller.update_profile(&session, data).await?;

    Ok(ApiResponse::ok(profile).with_message("Profile updated"))
}

#[instrument(skip(state, payload))]
pub(crate) async fn change_password(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    payload: Result<Json<UpdatePasswordData>, JsonRejection>,
) -> Result<ApiResponse<()>, Error> {
    let Json(data) = payload?;

    state.user_controller.change_password(&session, data).await?;

    Ok(ApiResponse::message("Password changed"))
}

#[instrument(skip(state, multipart))]
pub(crate) async fn upload_avatar(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ApiResponse<Avatar>, Error> {
    let mut multipart = multipart?;
    let upload = ImageUpload::from_multipart(&mut multipart, "avatar").await?;

    let avatar = state.user_controller.set_avatar(&session, upload).await?;

    Ok(ApiResponse::ok(avatar))
}
