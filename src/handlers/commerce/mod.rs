/// Storefront API handlers module
pub mod cart;
pub mod coupons;
pub mod payments;
pub mod products;

// Re-export route builders
pub use cart::cart_routes;
pub use coupons::coupon_routes;
pub use payments::payments_routes;
pub use products::products_routes;
