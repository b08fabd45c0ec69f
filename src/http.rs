//! HTTP surface over the checkout and order services.
//!
//! Authentication happens upstream; the authenticated user id arrives in the
//! `X-User-Id` header.

use crate::error::CheckoutError;
use crate::models::{OrderDetail, OrderId, OrderSummary, ShippingInfo, UserId};
use crate::repositories::CheckoutStore;
use crate::services::{CheckoutService, OrderService};
use axum::async_trait;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Services shared by all handlers
pub struct AppState<S: CheckoutStore> {
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
}

impl<S: CheckoutStore> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            checkout: CheckoutService::new(store.clone()),
            orders: OrderService::new(store),
        }
    }
}

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            error: self.error_code().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// User id taken from the `X-User-Id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<St: Send + Sync> FromRequestParts<St> for CurrentUser {
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<UserId>().ok())
            .map(CurrentUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorBody {
                        error: "UNAUTHORIZED".to_string(),
                        message: "Missing or invalid user id.".to_string(),
                    }),
                )
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: String,
    pub postal_code: String,
    pub shipping_name: String,
}

impl From<CreateOrderRequest> for ShippingInfo {
    fn from(req: CreateOrderRequest) -> Self {
        Self {
            shipping_address: req.shipping_address,
            postal_code: req.postal_code,
            shipping_name: req.shipping_name,
        }
    }
}

pub fn router<S: CheckoutStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/orders", get(list_orders::<S>).post(create_order::<S>))
        .route("/orders/:id", get(order_detail::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn create_order<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetail>), CheckoutError> {
    let shipping = ShippingInfo::from(req);
    let placed = state.checkout.place_order(user_id, &shipping).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

async fn list_orders<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<Vec<OrderSummary>>, CheckoutError> {
    Ok(Json(state.orders.order_summaries(user_id).await?))
}

async fn order_detail<S: CheckoutStore + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(user_id): CurrentUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderDetail>, CheckoutError> {
    Ok(Json(state.orders.order_detail(user_id, order_id).await?))
}
