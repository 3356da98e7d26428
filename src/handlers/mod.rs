pub mod commerce;
pub mod common;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::payments::PaymentProvider;
use crate::services::commerce::{
    CartService, CheckoutService, CheckoutSettings, CouponService, ProductCatalogService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<ProductCatalogService>,
    pub cart: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Wires every service against one pool and one payment provider.
    pub fn new(
        db_pool: Arc<DbPool>,
        payments: Arc<dyn PaymentProvider>,
        config: &AppConfig,
    ) -> Self {
        let catalog = ProductCatalogService::new(db_pool.clone());
        let cart = CartService::new(db_pool.clone());
        let coupons = CouponService::new(db_pool.clone(), cart.clone());
        let checkout = CheckoutService::new(
            db_pool,
            catalog.clone(),
            payments,
            CheckoutSettings {
                success_url: config.checkout_success_url(),
                cancel_url: config.checkout_cancel_url(),
                currency: config.currency.to_lowercase(),
            },
        );

        Self {
            catalog: Arc::new(catalog),
            cart: Arc::new(cart),
            coupons: Arc::new(coupons),
            checkout: Arc::new(checkout),
        }
    }
}
