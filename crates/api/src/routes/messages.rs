//! Message endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::message::{
    Message, SendMessageRequest, SendMessageResponse, UpdateReservationRequest,
};
use shared::pagination::Page;

use super::PageQuery;
use crate::app::AppState;
use crate::error::ApiError;

/// Send or reserve a message for one or more customers.
///
/// POST /api/v1/shops/:shop_id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let response = state.services.messages.send(shop_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/shops/:shop_id/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(shop_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Message>>, ApiError> {
    let page = query.page_request()?;
    Ok(Json(state.services.messages.list(shop_id, page).await?))
}

/// GET /api/v1/shops/:shop_id/messages/:message_id
pub async fn get_message(
    State(state): State<AppState>,
    Path((shop_id, message_id)): Path<(i64, i64)>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.services.messages.get(shop_id, message_id).await?))
}

/// Edit a reservation that has not gone out yet.
///
/// PUT /api/v1/shops/:shop_id/messages/:message_id
pub async fn update_reservation(
    State(state): State<AppState>,
    Path((shop_id, message_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateReservationRequest>,
) -> Result<Json<Message>, ApiError> {
    let message = state
        .services
        .messages
        .update_reservation(shop_id, message_id, request)
        .await?;
    Ok(Json(message))
}

/// POST /api/v1/shops/:shop_id/messages/:message_id/cancel
pub async fn cancel_message(
    State(state): State<AppState>,
    Path((shop_id, message_id)): Path<(i64, i64)>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(
        state.services.messages.cancel(shop_id, message_id).await?,
    ))
}
