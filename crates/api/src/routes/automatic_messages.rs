//! Automatic message endpoint handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::automatic_message::{
    AutomaticEventType, AutomaticMessage, RegisterAutomaticMessageRequest,
    UpdateAutomaticMessageRequest,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;

/// An event that happened to a customer, reported by the reservation or
/// sales side of the shop.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireAutomaticMessageRequest {
    pub customer_id: i64,
    pub event_type: AutomaticEventType,
}

/// POST /api/v1/shops/:shop_id/automatic-messages
pub async fn register_automatic_message(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Json(request): Json<RegisterAutomaticMessageRequest>,
) -> Result<(StatusCode, Json<AutomaticMessage>), ApiError> {
    let created = state
        .services
        .automatic_messages
        .register(shop_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/v1/shops/:shop_id/automatic-messages
pub async fn list_automatic_messages(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
) -> Result<Json<Vec<AutomaticMessage>>, ApiError> {
    Ok(Json(state.services.automatic_messages.list(shop_id).await?))
}

/// PUT /api/v1/shops/:shop_id/automatic-messages/:id
pub async fn update_automatic_message(
    State(state): State<AppState>,
    Path((shop_id, id)): Path<(i64, i64)>,
    Json(request): Json<UpdateAutomaticMessageRequest>,
) -> Result<Json<AutomaticMessage>, ApiError> {
    let updated = state
        .services
        .automatic_messages
        .update(shop_id, id, request)
        .await?;
    Ok(Json(updated))
}

/// Send the registered message for an event. Answers 204 when the shop has
/// no active registration for it.
///
/// POST /api/v1/shops/:shop_id/automatic-messages/fire
pub async fn fire_automatic_message(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Json(request): Json<FireAutomaticMessageRequest>,
) -> Result<Response, ApiError> {
    let sent = state
        .services
        .automatic_messages
        .fire(shop_id, request.customer_id, request.event_type)
        .await?;

    Ok(match sent {
        Some(response) => (StatusCode::CREATED, Json(response)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}
