/// Commerce services module - catalog, carts, coupons and checkout
pub mod cart_service;
pub mod checkout_service;
pub mod coupon_service;
pub mod pricing_service;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_service::{CartLine, CartService, CartSummary};
pub use checkout_service::{
    CheckoutItem, CheckoutService, CheckoutSettings, CreateSessionInput, CreatedSession,
    Reconciliation,
};
pub use coupon_service::{AutoCouponOutcome, CouponService};
pub use pricing_service::{CartEntry, Totals};
pub use product_catalog_service::{CreateProductInput, ProductCatalogService};
