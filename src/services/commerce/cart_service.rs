use crate::{
    entities::commerce::{cart_item, CartItem, CouponModel, Product, ProductModel},
    errors::ServiceError,
    services::commerce::pricing_service::{self, CartEntry, Totals},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Per-user cart ledger.
///
/// Every mutation is a single conditional statement against `cart_items`, so
/// concurrent requests for the same user cannot lose updates:
/// - add is an `INSERT .. ON CONFLICT (user_id, product_id) DO UPDATE` increment
/// - set-quantity is one `UPDATE` (or `DELETE` for zero) whose row count decides NotFound
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
}

/// Cart entry joined with its catalog product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub product: ProductModel,
    pub quantity: i32,
}

/// Priced view of a cart
#[derive(Debug, Clone)]
pub struct CartSummary {
    pub lines: Vec<CartLine>,
    pub totals: Totals,
    pub coupon_code: Option<String>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Raw entries, oldest first. Products are not checked.
    pub async fn entries(&self, user_id: Uuid) -> Result<Vec<CartEntry>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| CartEntry {
                product_id: row.product_id,
                quantity: row.quantity,
            })
            .collect())
    }

    /// Increments the entry for `product_id`, inserting it with quantity 1 if absent.
    /// The product is not required to exist.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<CartEntry>, ServiceError> {
        let now = Utc::now();
        let entry = cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };

        CartItem::insert(entry)
            .on_conflict(
                OnConflict::columns([cart_item::Column::UserId, cart_item::Column::ProductId])
                    .value(
                        cart_item::Column::Quantity,
                        Expr::col((cart_item::Entity, cart_item::Column::Quantity)).add(1),
                    )
                    .value(cart_item::Column::UpdatedAt, now)
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        info!(%user_id, %product_id, "cart item added");
        self.entries(user_id).await
    }

    /// Removes the entry; absent entries are not an error.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<Vec<CartEntry>, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected > 0 {
            info!(%user_id, %product_id, "cart item removed");
        }
        self.entries(user_id).await
    }

    /// Replaces the quantity; zero removes the entry. Fails with NotFound when
    /// the user has no entry for `product_id`.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<CartEntry>, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::InvalidInput(
                "Quantity must not be negative".to_string(),
            ));
        }

        let rows_affected = if quantity == 0 {
            CartItem::delete_many()
                .filter(cart_item::Column::UserId.eq(user_id))
                .filter(cart_item::Column::ProductId.eq(product_id))
                .exec(&*self.db)
                .await?
                .rows_affected
        } else {
            CartItem::update_many()
                .col_expr(cart_item::Column::Quantity, Expr::value(quantity))
                .col_expr(cart_item::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(cart_item::Column::UserId.eq(user_id))
                .filter(cart_item::Column::ProductId.eq(product_id))
                .exec(&*self.db)
                .await?
                .rows_affected
        };

        if rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the cart",
                product_id
            )));
        }

        info!(%user_id, %product_id, quantity, "cart quantity set");
        self.entries(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        info!(%user_id, removed = result.rows_affected, "cart cleared");
        Ok(())
    }

    /// Cart entries joined with the catalog. Entries whose product no longer
    /// exists are left out.
    #[instrument(skip(self))]
    pub async fn list_with_products(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(entry, product)| {
                product.map(|product| CartLine {
                    product,
                    quantity: entry.quantity,
                })
            })
            .collect())
    }
}

/// Prices joined cart lines against an optional coupon.
pub fn summarize(
    lines: Vec<CartLine>,
    coupon: Option<&CouponModel>,
    now: DateTime<Utc>,
) -> Result<CartSummary, ServiceError> {
    let entries: Vec<CartEntry> = lines
        .iter()
        .map(|l| CartEntry {
            product_id: l.product.id,
            quantity: l.quantity,
        })
        .collect();
    let prices: HashMap<Uuid, _> = lines.iter().map(|l| (l.product.id, l.product.price)).collect();

    let totals = pricing_service::compute_totals(&entries, &prices, coupon, now)?;
    let coupon_code = totals
        .discount_percentage
        .and(coupon.map(|c| c.code.clone()));

    Ok(CartSummary {
        lines,
        totals,
        coupon_code,
    })
}
