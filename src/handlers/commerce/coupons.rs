use crate::auth::{AuthRouterExt, AuthUser};
use crate::entities::commerce::{CouponModel, CouponOrigin};
use crate::handlers::common::{
    json_body, map_service_error, success_response, validate_input, MessageResponse,
};
use crate::{errors::ApiError, AppState};
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Creates the router for the authenticated user's coupon
pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_coupon).delete(delete_coupon))
        .route("/auto-generate", post(auto_generate_coupon))
        .route("/validate", post(validate_coupon))
        .with_auth()
}

/// The user's active coupon, or null
#[utoipa::path(
    get,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "Active coupon or null", body = Option<CouponResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn get_coupon(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let coupon = state
        .services
        .coupons
        .get_active(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(coupon.map(CouponResponse::from)))
}

/// Evaluate the cart against the automatic coupon threshold
#[utoipa::path(
    post,
    path = "/api/v1/coupons/auto-generate",
    responses(
        (status = 200, description = "Threshold evaluation", body = AutoCouponResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn auto_generate_coupon(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .coupons
        .evaluate_auto_coupon(user.user_id)
        .await
        .map_err(map_service_error)?;

    let coupon = outcome.coupon().cloned().map(CouponResponse::from);
    Ok(success_response(AutoCouponResponse {
        auto_applied: coupon.is_some(),
        message: outcome.message(),
        coupon,
    }))
}

/// Check a code entered by the user
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid", body = ValidCouponResponse),
        (status = 404, description = "Unknown or expired coupon", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    user: AuthUser,
    State(state): State<AppState>,
    payload: Result<Json<ValidateCouponRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    validate_input(&payload)?;

    let coupon = state
        .services
        .coupons
        .validate(user.user_id, &payload.code)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ValidCouponResponse {
        message: "Coupon is valid".to_string(),
        code: coupon.code,
        discount_percentage: coupon.discount_percentage,
    }))
}

/// Remove the user's coupon
#[utoipa::path(
    delete,
    path = "/api/v1/coupons",
    responses(
        (status = 200, description = "Coupon removed", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn delete_coupon(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .coupons
        .delete(user.user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(MessageResponse::new(
        "Coupon deleted successfully",
    )))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponResponse {
    pub code: String,
    pub discount_percentage: i32,
    pub expiration_date: DateTime<Utc>,
    pub is_active: bool,
    #[schema(value_type = String, example = "auto")]
    pub origin: CouponOrigin,
}

impl From<CouponModel> for CouponResponse {
    fn from(model: CouponModel) -> Self {
        Self {
            code: model.code,
            discount_percentage: model.discount_percentage,
            expiration_date: model.expiration_date,
            is_active: model.is_active,
            origin: model.origin,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoCouponResponse {
    pub coupon: Option<CouponResponse>,
    pub auto_applied: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidCouponResponse {
    pub message: String,
    pub code: String,
    pub discount_percentage: i32,
}
