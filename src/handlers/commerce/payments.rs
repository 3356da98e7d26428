use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::{order, order_item};
use crate::handlers::commerce::coupons::CouponResponse;
use crate::handlers::common::{json_body, map_service_error, success_response, validate_input};
use crate::services::commerce::{CheckoutItem, CreateSessionInput, Reconciliation};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for hosted checkout
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout-session", post(create_checkout_session))
        .route("/checkout-success", post(checkout_success))
        .with_auth()
}

/// Open a hosted payment session for the given products
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-session",
    request_body = CheckoutSessionRequest,
    responses(
        (status = 200, description = "Session created", body = CheckoutSessionResponse),
        (status = 400, description = "Empty or malformed product list", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_checkout_session(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CheckoutSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let input = CreateSessionInput {
        products: payload
            .products
            .into_iter()
            .map(|p| CheckoutItem {
                id: p.id,
                quantity: p.quantity,
            })
            .collect(),
        coupon_code: payload.coupon_code,
    };

    let session = state
        .services
        .checkout
        .create_checkout_session(user.user_id, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CheckoutSessionResponse {
        total_amount: session.total_amount(),
        session_id: session.session_id,
        url: session.url,
    }))
}

/// Turn a completed session into an order. Safe to call repeatedly.
#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout-success",
    request_body = CheckoutSuccessRequest,
    responses(
        (status = 200, description = "Order for the session", body = CheckoutSuccessResponse),
        (status = 400, description = "Missing session id or malformed metadata", body = crate::errors::ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown session", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn checkout_success(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CheckoutSuccessRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    validate_input(&payload)?;

    let reconciled = state
        .services
        .checkout
        .confirm_checkout(user.user_id, &payload.session_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CheckoutSuccessResponse::from(reconciled)))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutProductRequest {
    pub id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    /// Missing is treated like empty and rejected by checkout
    #[serde(default)]
    pub products: Vec<CheckoutProductRequest>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResponse {
    pub session_id: String,
    pub url: String,
    /// Amount to be charged, in major units
    #[schema(value_type = String, example = "225.00")]
    pub total_amount: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSuccessRequest {
    #[serde(default)]
    #[validate(length(max = 255))]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub price: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(model: order_item::Model) -> Self {
        Self {
            product_id: model.product_id,
            quantity: model.quantity,
            price: model.unit_price,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub payment_session_id: String,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
    pub payment_status: String,
    pub coupon_code: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            payment_session_id: order.payment_session_id,
            total_amount: order.total_amount,
            payment_status: order.payment_status,
            coupon_code: order.coupon_code,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSuccessResponse {
    pub success: bool,
    pub message: String,
    pub order: OrderResponse,
    /// Present only on the call that created the order, when it earned one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward_coupon: Option<CouponResponse>,
}

impl From<Reconciliation> for CheckoutSuccessResponse {
    fn from(r: Reconciliation) -> Self {
        Self {
            success: true,
            message: "Order processed successfully".to_string(),
            order: OrderResponse::new(r.order, r.items),
            reward_coupon: r.reward_coupon.map(CouponResponse::from),
        }
    }
}
