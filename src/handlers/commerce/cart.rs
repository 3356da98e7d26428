use crate::auth::{AuthRouterExt, AuthUser};
use crate::handlers::commerce::products::ProductResponse;
use crate::handlers::common::{json_body, map_service_error, success_response, validate_input};
use crate::services::commerce::cart_service::{self, CartLine};
use crate::services::commerce::CartEntry;
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, put},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for the authenticated user's cart
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart).delete(remove_from_cart))
        .route("/all", delete(clear_cart))
        .route("/summary", get(cart_summary))
        .route("/:product_id", put(update_quantity))
        .with_auth()
}

/// Cart lines joined with their products
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    responses(
        (status = 200, description = "Cart lines", body = Vec<CartLineResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = state
        .services
        .cart
        .list_with_products(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        lines
            .into_iter()
            .map(CartLineResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Add one unit of a product
#[utoipa::path(
    post,
    path = "/api/v1/cart",
    request_body = CartProductRequest,
    responses(
        (status = 200, description = "Updated cart entries", body = Vec<CartEntryResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CartProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let entries = state
        .services
        .cart
        .add_item(user.user_id, payload.product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entry_responses(entries)))
}

/// Remove a product from the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart",
    request_body = CartProductRequest,
    responses(
        (status = 200, description = "Updated cart entries", body = Vec<CartEntryResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<CartProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let entries = state
        .services
        .cart
        .remove_item(user.user_id, payload.product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entry_responses(entries)))
}

/// Empty the cart
#[utoipa::path(
    delete,
    path = "/api/v1/cart/all",
    responses(
        (status = 200, description = "Cart emptied", body = ClearCartResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .cart
        .clear(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ClearCartResponse {
        message: "All items removed".to_string(),
        cart: Vec::new(),
    }))
}

/// Replace the quantity of a product; zero removes it
#[utoipa::path(
    put,
    path = "/api/v1/cart/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    request_body = UpdateQuantityRequest,
    responses(
        (status = 200, description = "Updated cart entries", body = Vec<CartEntryResponse>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not in cart", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn update_quantity(
    user: AuthUser,
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    payload: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    validate_input(&payload)?;

    let entries = state
        .services
        .cart
        .set_quantity(user.user_id, product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(entry_responses(entries)))
}

/// Priced cart with the user's active coupon applied
#[utoipa::path(
    get,
    path = "/api/v1/cart/summary",
    responses(
        (status = 200, description = "Cart totals", body = CartSummaryResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn cart_summary(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let lines = state
        .services
        .cart
        .list_with_products(user.user_id)
        .await
        .map_err(map_service_error)?;
    let coupon = state
        .services
        .coupons
        .get_active(user.user_id)
        .await
        .map_err(map_service_error)?;

    let summary = cart_service::summarize(lines, coupon.as_ref(), Utc::now())
        .map_err(map_service_error)?;
    debug!(user_id = %user.user_id, total = %summary.totals.total, "cart summarized");

    Ok(success_response(CartSummaryResponse {
        items: summary
            .lines
            .into_iter()
            .map(CartLineResponse::from)
            .collect(),
        subtotal: summary.totals.subtotal,
        discount: summary.totals.discount,
        total: summary.totals.total,
        discount_percentage: summary.totals.discount_percentage,
        coupon_code: summary.coupon_code,
    }))
}

fn entry_responses(entries: Vec<CartEntry>) -> Vec<CartEntryResponse> {
    entries
        .into_iter()
        .map(|e| CartEntryResponse {
            product_id: e.product_id,
            quantity: e.quantity,
        })
        .collect()
}

// Request/Response DTOs

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartProductRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0, max = 10000))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartEntryResponse {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Product fields plus the quantity held in the cart
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartLineResponse {
    #[serde(flatten)]
    pub product: ProductResponse,
    pub quantity: i32,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            product: ProductResponse::from(line.product),
            quantity: line.quantity,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ClearCartResponse {
    pub message: String,
    pub cart: Vec<CartEntryResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSummaryResponse {
    pub items: Vec<CartLineResponse>,
    #[schema(value_type = String)]
    pub subtotal: Decimal,
    #[schema(value_type = String)]
    pub discount: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percentage: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
}
