use crate::{
    entities::commerce::{product, Product, ProductModel},
    errors::ServiceError,
    services::commerce::pricing_service::MAX_UNIT_PRICE,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Order,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub const RECOMMENDATION_SAMPLE_SIZE: u64 = 3;

/// Read-mostly product catalog with the admin edit surface
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// All products, newest first
    #[instrument(skip(self))]
    pub async fn list_all(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_featured(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::IsFeatured.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Categories are stored lowercased, so the lookup is case-insensitive
    #[instrument(skip(self))]
    pub async fn list_by_category(&self, category: &str) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::Category.eq(category.trim().to_lowercase()))
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Uniform random sample of at most `limit` products
    #[instrument(skip(self))]
    pub async fn recommended(&self, limit: u64) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .order_by(Expr::cust("RANDOM()"), Order::Asc)
            .limit(limit)
            .all(&*self.db)
            .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(id).one(&*self.db).await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    /// Products for the given ids; unknown ids are simply absent from the result
    pub async fn find_many(&self, ids: &[Uuid]) -> Result<Vec<ProductModel>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: CreateProductInput) -> Result<ProductModel, ServiceError> {
        input.check()?;

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description.trim().to_string()),
            price: Set(input.price),
            image: Set(input.image.trim().to_string()),
            category: Set(input.category.trim().to_lowercase()),
            is_featured: Set(input.is_featured),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %model.id, "product created");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = Product::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        info!(product_id = %id, "product deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn toggle_featured(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        let existing = self.get(id).await?;
        let featured = !existing.is_featured;

        let mut active: product::ActiveModel = existing.into();
        active.is_featured = Set(featured);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(product_id = %id, featured, "product featured flag toggled");
        Ok(updated)
    }
}

/// Admin product creation input
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: String,
    pub category: String,
    #[serde(default)]
    pub is_featured: bool,
}

impl CreateProductInput {
    fn check(&self) -> Result<(), ServiceError> {
        let blank = [
            ("name", &self.name),
            ("description", &self.description),
            ("image", &self.image),
            ("category", &self.category),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect::<Vec<_>>();

        if !blank.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "All fields are required (missing: {})",
                blank.join(", ")
            )));
        }
        if self.price.is_sign_negative() {
            return Err(ServiceError::InvalidInput(
                "Price must not be negative".to_string(),
            ));
        }
        if self.price > MAX_UNIT_PRICE {
            return Err(ServiceError::InvalidInput(format!(
                "Price must not exceed {}",
                MAX_UNIT_PRICE
            )));
        }
        Ok(())
    }
}
