/// Storefront entities owned by the catalog, cart and coupon services
pub mod cart_item;
pub mod coupon;
pub mod product;

pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{CouponOrigin, Entity as Coupon, Model as CouponModel};
pub use product::{Entity as Product, Model as ProductModel};
