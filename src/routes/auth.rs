use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::request::{LoginData, RegisterData};
use crate::types::response::{ApiResponse, Login};

#[instrument(skip_all)]
pub(crate) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterData>, JsonRejection>,
) -> Result<ApiResponse<Login>, Error> {
    let Json(data) = payload?;

    let (user, token) = state.user_controller.register(data).await?;

    Ok(ApiResponse::created(Login::new(&user, token)).with_message("Registration successful"))
}

#[instrument(skip_all)]
pub(crate) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginData>, JsonRejection>,
) -> Result<ApiResponse<Login>, Error> {
    let Json(data) = payload?;

    let (user, token) = state.user_controller.login(data).await?;

    Ok(ApiResponse::ok(Login::new(&user, token)).with_message("Login successful"))
}
