use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::commerce::{cart, coupons, payments, products};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront API

Catalog browsing, per-user carts, threshold coupons and hosted checkout.

## Authentication

Cart, coupon and payment endpoints require a JWT, sent either in the
Authorization header or in the `accessToken` cookie:

```
Authorization: Bearer <your-jwt-token>
```

Product management endpoints additionally require the `admin` role.

## Error Handling

Every failure returns the same body:

```json
{
  "error": "Not Found",
  "message": "Not found: Coupon GIFT-3K9Q2ZP0XA",
  "request_id": "7d1b1c0e-2f43-4c55-9b8e-1f0b5e3b2a10",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Catalog and product administration"),
        (name = "Cart", description = "The authenticated user's cart"),
        (name = "Coupons", description = "Per-user discount coupons"),
        (name = "Payments", description = "Hosted checkout and order reconciliation")
    ),
    paths(
        // Products
        products::list_products,
        products::featured_products,
        products::recommended_products,
        products::products_by_category,
        products::get_product,
        products::create_product,
        products::toggle_featured,
        products::delete_product,

        // Cart
        cart::get_cart,
        cart::add_to_cart,
        cart::remove_from_cart,
        cart::clear_cart,
        cart::update_quantity,
        cart::cart_summary,

        // Coupons
        coupons::get_coupon,
        coupons::auto_generate_coupon,
        coupons::validate_coupon,
        coupons::delete_coupon,

        // Payments
        payments::create_checkout_session,
        payments::checkout_success,
    ),
    components(
        schemas(
            crate::handlers::common::MessageResponse,
            crate::errors::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
