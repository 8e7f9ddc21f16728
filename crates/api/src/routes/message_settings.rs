//! Message settings endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::message_settings::{CreditAmountRequest, UpdateMessageSettingsRequest};
use domain::models::MessageSettings;

use crate::app::AppState;
use crate::error::ApiError;

/// Create the default settings of a shop.
///
/// POST /api/v1/shops/:shop_id/message-settings
pub async fn create_settings(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
) -> Result<(StatusCode, Json<MessageSettings>), ApiError> {
    let settings = state.services.settings.create(shop_id).await?;
    Ok((StatusCode::CREATED, Json(settings)))
}

/// GET /api/v1/shops/:shop_id/message-settings
pub async fn get_settings(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
) -> Result<Json<MessageSettings>, ApiError> {
    Ok(Json(state.services.settings.get(shop_id).await?))
}

/// PUT /api/v1/shops/:shop_id/message-settings
pub async fn update_settings(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Json(request): Json<UpdateMessageSettingsRequest>,
) -> Result<Json<MessageSettings>, ApiError> {
    Ok(Json(
        state.services.settings.update_sender(shop_id, request).await?,
    ))
}

/// Add credits to the shop balance.
///
/// POST /api/v1/shops/:shop_id/message-settings/credits
pub async fn grant_credits(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Json(request): Json<CreditAmountRequest>,
) -> Result<Json<MessageSettings>, ApiError> {
    Ok(Json(state.services.settings.grant(shop_id, request).await?))
}
