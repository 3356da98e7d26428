use crate::auth::{AuthRouterExt, ADMIN_ROLE};
use crate::entities::commerce::ProductModel;
use crate::handlers::common::{
    created_response, json_body, map_service_error, success_response, validate_input,
    MessageResponse,
};
use crate::{
    errors::ApiError,
    services::commerce::{
        pricing_service::MAX_UNIT_PRICE,
        product_catalog_service::{CreateProductInput, RECOMMENDATION_SAMPLE_SIZE},
    },
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Json, Path, State},
    response::IntoResponse,
    routing::{get, patch},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_price(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("price_non_negative"));
    }
    if *value > MAX_UNIT_PRICE {
        return Err(ValidationError::new("price_too_large"));
    }
    Ok(())
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", patch(toggle_featured).delete(delete_product))
        .with_role(ADMIN_ROLE);

    Router::new()
        .route("/featured", get(featured_products))
        .route("/recommendations", get(recommended_products))
        .route("/category/:category", get(products_by_category))
        .route("/:id", get(get_product))
        .merge(admin)
}

/// List every product (admin)
#[utoipa::path(
    get,
    path = "/api/v1/products",
    responses(
        (status = 200, description = "All products, newest first", body = ProductListResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_all()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductListResponse {
        products: products.into_iter().map(ProductResponse::from).collect(),
    }))
}

/// Featured products
#[utoipa::path(
    get,
    path = "/api/v1/products/featured",
    responses(
        (status = 200, description = "Featured products", body = Vec<ProductResponse>)
    ),
    tag = "Products"
)]
pub async fn featured_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_featured()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Random sample of products
#[utoipa::path(
    get,
    path = "/api/v1/products/recommendations",
    responses(
        (status = 200, description = "Up to three random products", body = Vec<ProductResponse>)
    ),
    tag = "Products"
)]
pub async fn recommended_products(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .recommended(RECOMMENDATION_SAMPLE_SIZE)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Products in a category
#[utoipa::path(
    get,
    path = "/api/v1/products/category/{category}",
    params(
        ("category" = String, Path, description = "Category name, case-insensitive")
    ),
    responses(
        (status = 200, description = "Products in the category", body = Vec<ProductResponse>)
    ),
    tag = "Products"
)]
pub async fn products_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let products = state
        .services
        .catalog
        .list_by_category(&category)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(
        products
            .into_iter()
            .map(ProductResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product retrieved", body = ProductResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Create a new product (admin)
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ProductCreatedResponse),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .create(CreateProductInput::from(payload))
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProductCreatedResponse {
        product: ProductResponse::from(product),
        message: "Product created successfully".to_string(),
    }))
}

/// Flip the featured flag (admin)
#[utoipa::path(
    patch,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product with its new featured flag", body = ProductResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn toggle_featured(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .toggle_featured(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Delete a product (admin)
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product deleted", body = MessageResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .catalog
        .delete(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(MessageResponse::new(
        "Product deleted successfully",
    )))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(custom = "validate_price")]
    #[schema(value_type = String, example = "49.99")]
    pub price: Decimal,
    /// Asset reference of an already uploaded image
    #[validate(length(min = 1, max = 2048))]
    pub image: String,
    #[validate(length(min = 1, max = 64))]
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
}

impl From<CreateProductRequest> for CreateProductInput {
    fn from(req: CreateProductRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            price: req.price,
            image: req.image,
            category: req.category,
            is_featured: req.is_featured,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[schema(value_type = String, example = "49.99")]
    pub price: Decimal,
    pub image: String,
    pub category: String,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductResponse {
    fn from(model: ProductModel) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            image: model.image,
            category: model.category,
            is_featured: model.is_featured,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductCreatedResponse {
    pub product: ProductResponse,
    pub message: String,
}
