use crate::{
    entities::{
        commerce::{coupon, Coupon, CouponModel},
        order::{self, Entity as Order},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    payments::{CreateSessionRequest, LineItem, PaymentProvider, SessionDetails},
    services::commerce::{
        coupon_service::CouponService,
        pricing_service::{self, from_minor_units, to_minor_units},
        product_catalog_service::ProductCatalogService,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const METADATA_USER_ID: &str = "userId";
pub const METADATA_COUPON_CODE: &str = "couponCode";
/// Prefix of the numbered keys carrying the product snapshot
pub const METADATA_PRODUCTS: &str = "products";

/// Longest metadata value the payment provider accepts
const METADATA_VALUE_LIMIT: usize = 500;

/// The provider allows 50 keys; two are taken by user and coupon
const MAX_PRODUCT_CHUNKS: usize = 48;

/// Provider session ids are opaque `[A-Za-z0-9_]` tokens; anything else
/// would alter the retrieval URL path.
fn is_session_id(id: &str) -> bool {
    id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn products_key(index: usize) -> String {
    format!("{}_{}", METADATA_PRODUCTS, index)
}

/// Splits the serialized snapshot into provider-sized values under
/// `products_0..products_N`. The JSON is ASCII, so byte chunks are valid UTF-8.
fn chunk_snapshot(json: &str) -> Option<Vec<(String, String)>> {
    let chunks: Vec<(String, String)> = json
        .as_bytes()
        .chunks(METADATA_VALUE_LIMIT)
        .enumerate()
        .map(|(i, chunk)| (products_key(i), String::from_utf8_lossy(chunk).into_owned()))
        .collect();
    (chunks.len() <= MAX_PRODUCT_CHUNKS).then_some(chunks)
}

/// Redirect targets and currency for hosted checkout
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
}

/// Requested line; the price always comes from the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CheckoutItem {
    pub id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Default)]
pub struct CreateSessionInput {
    pub products: Vec<CheckoutItem>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: String,
    pub url: String,
    /// Amount the customer will be charged, in minor units
    pub total_minor: i64,
}

impl CreatedSession {
    pub fn total_amount(&self) -> Decimal {
        from_minor_units(self.total_minor)
    }
}

/// Purchase snapshot carried through the provider's session metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotLine {
    pub id: Uuid,
    pub quantity: i32,
    pub price: Decimal,
}

/// Outcome of reconciling a payment session
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    /// False when the order already existed for this session
    pub created: bool,
    pub reward_coupon: Option<CouponModel>,
}

/// Two-phase checkout: opens a hosted payment session, then turns the
/// confirmed session into exactly one order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    catalog: ProductCatalogService,
    provider: Arc<dyn PaymentProvider>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: ProductCatalogService,
        provider: Arc<dyn PaymentProvider>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            catalog,
            provider,
            settings,
        }
    }

    /// Phase 1: price the requested products and open a provider session.
    #[instrument(skip(self, input), fields(lines = input.products.len()))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        input: CreateSessionInput,
    ) -> Result<CreatedSession, ServiceError> {
        if input.products.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Invalid or empty products array".to_string(),
            ));
        }
        if let Some(bad) = input.products.iter().find(|p| p.quantity < 1) {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity for product {} must be at least 1",
                bad.id
            )));
        }

        let ids: Vec<Uuid> = input
            .products
            .iter()
            .map(|p| p.id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let catalog: HashMap<Uuid, _> = self
            .catalog
            .find_many(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut line_items = Vec::with_capacity(input.products.len());
        let mut snapshot = Vec::with_capacity(input.products.len());
        let mut total: i64 = 0;

        for item in &input.products {
            let product = catalog.get(&item.id).ok_or_else(|| {
                ServiceError::InvalidInput(format!("Product {} not found", item.id))
            })?;
            let unit_amount = to_minor_units(product.price).ok_or_else(|| {
                ServiceError::InvalidInput(format!("Price of product {} is out of range", item.id))
            })?;
            total = unit_amount
                .checked_mul(i64::from(item.quantity))
                .and_then(|line| total.checked_add(line))
                .ok_or_else(|| ServiceError::InvalidInput("Order total is out of range".into()))?;

            line_items.push(LineItem {
                name: product.name.clone(),
                image: Some(product.image.clone()),
                unit_amount,
                quantity: i64::from(item.quantity),
                currency: self.settings.currency.clone(),
            });
            snapshot.push(SnapshotLine {
                id: product.id,
                quantity: item.quantity,
                price: product.price,
            });
        }

        let mut discounts = Vec::new();
        let mut applied_code = String::new();
        if let Some(code) = input
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            match self.find_usable_coupon(user_id, code).await? {
                Some(coupon) => {
                    total = pricing_service::apply_percentage_discount_minor(
                        total,
                        coupon.discount_percentage,
                    );
                    discounts.push(
                        self.provider
                            .create_discount(coupon.discount_percentage)
                            .await?,
                    );
                    applied_code = coupon.code;
                }
                None => warn!(%user_id, code, "checkout coupon not usable; ignoring"),
            }
        }

        let products_json = serde_json::to_string(&snapshot)
            .map_err(|e| ServiceError::InternalError(e.to_string()))?;
        let chunks = chunk_snapshot(&products_json).ok_or_else(|| {
            ServiceError::InvalidInput(
                "Too many distinct products for a single checkout".to_string(),
            )
        })?;

        let mut metadata = HashMap::from([
            (METADATA_USER_ID.to_string(), user_id.to_string()),
            (METADATA_COUPON_CODE.to_string(), applied_code),
        ]);
        metadata.extend(chunks);

        let session = self
            .provider
            .create_session(CreateSessionRequest {
                line_items,
                success_url: self.settings.success_url.clone(),
                cancel_url: self.settings.cancel_url.clone(),
                discounts,
                metadata,
            })
            .await?;

        let url = session.url.ok_or_else(|| {
            ServiceError::ExternalServiceError("checkout session has no redirect url".into())
        })?;

        counter!("storefront.checkout.sessions_created", 1);
        info!(%user_id, session_id = %session.id, total_minor = total, "checkout session created");

        Ok(CreatedSession {
            session_id: session.id,
            url,
            total_minor: total,
        })
    }

    /// Phase 2: fetch the session from the provider and upsert its order.
    ///
    /// Repeated calls for the same session return the same order. The reward
    /// coupon is issued here rather than when the session is opened: only a
    /// paid session whose order is first created earns one, so abandoned or
    /// unpaid checkouts never mint coupons.
    #[instrument(skip(self))]
    pub async fn confirm_checkout(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<Reconciliation, ServiceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ServiceError::InvalidInput("Missing sessionId".to_string()));
        }
        if !is_session_id(session_id) {
            return Err(ServiceError::InvalidInput(
                "Malformed sessionId".to_string(),
            ));
        }

        let details = self.provider.retrieve_session(session_id).await?;
        let snapshot = SessionSnapshot::parse(&details)?;
        if snapshot.user_id != user_id {
            warn!(%user_id, owner = %snapshot.user_id, session_id, "checkout session belongs to another user");
            return Err(ServiceError::Forbidden(
                "Checkout session belongs to another user".to_string(),
            ));
        }
        let amount_total = details.amount_total.ok_or_else(|| {
            ServiceError::ExternalServiceError("checkout session has no amount".into())
        })?;

        let txn = self.db.begin().await?;

        let candidate_id = Uuid::new_v4();
        let insert = Order::insert(order::ActiveModel {
            id: Set(candidate_id),
            user_id: Set(user_id),
            payment_session_id: Set(details.id.clone()),
            total_amount: Set(from_minor_units(amount_total)),
            payment_status: Set(details.payment_status.clone()),
            coupon_code: Set(snapshot.coupon_code.clone()),
            created_at: Set(Utc::now()),
        })
        .on_conflict(
            OnConflict::column(order::Column::PaymentSessionId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await;
        match insert {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(ServiceError::from_db(e, "Order")),
        }

        let order = Order::find()
            .filter(order::Column::PaymentSessionId.eq(details.id.as_str()))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("order missing after upsert".into()))?;
        let created = order.id == candidate_id;

        let mut reward_coupon = None;
        if created {
            if !snapshot.lines.is_empty() {
                OrderItem::insert_many(snapshot.lines.iter().map(|line| order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order.id),
                    product_id: Set(line.id),
                    quantity: Set(line.quantity),
                    unit_price: Set(line.price),
                }))
                .exec_without_returning(&txn)
                .await?;
            }

            if details.is_paid() && pricing_service::earns_reward_coupon(snapshot.pre_discount_minor())
            {
                reward_coupon = Some(CouponService::mint_reward(&txn, user_id).await?);
            }
        }

        let items = order.find_related(OrderItem).all(&txn).await?;
        txn.commit().await?;

        if created {
            counter!("storefront.orders.reconciled", 1);
            info!(%user_id, order_id = %order.id, session_id, "order reconciled");
        } else {
            info!(order_id = %order.id, session_id, "order already reconciled");
        }

        Ok(Reconciliation {
            order,
            items,
            created,
            reward_coupon,
        })
    }

    async fn find_usable_coupon(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<CouponModel>, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        Ok(coupon.filter(|c| c.is_usable_at(Utc::now())))
    }
}

/// Metadata written in phase 1, read back in phase 2
#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionSnapshot {
    user_id: Uuid,
    coupon_code: Option<String>,
    lines: Vec<SnapshotLine>,
}

impl SessionSnapshot {
    fn parse(details: &SessionDetails) -> Result<Self, ServiceError> {
        let malformed = |what: &str| {
            ServiceError::InvalidInput(format!("Malformed checkout metadata: {}", what))
        };

        let user_id = details
            .metadata
            .get(METADATA_USER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| malformed(METADATA_USER_ID))?;

        let raw: String = (0..MAX_PRODUCT_CHUNKS)
            .map_while(|i| details.metadata.get(&products_key(i)))
            .map(String::as_str)
            .collect();
        let lines: Vec<SnapshotLine> = if raw.is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&raw).map_err(|_| malformed(METADATA_PRODUCTS))?
        };
        if lines.iter().any(|l| l.quantity < 1 || l.price.is_sign_negative()) {
            return Err(malformed(METADATA_PRODUCTS));
        }

        let coupon_code = details
            .metadata
            .get(METADATA_COUPON_CODE)
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(Self {
            user_id,
            coupon_code,
            lines,
        })
    }

    fn pre_discount_minor(&self) -> i64 {
        self.lines
            .iter()
            .filter_map(|l| {
                to_minor_units(l.price).map(|unit| unit.saturating_mul(i64::from(l.quantity)))
            })
            .fold(0, i64::saturating_add)
    }
}
