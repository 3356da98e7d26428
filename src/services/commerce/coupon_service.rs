use crate::{
    entities::commerce::{coupon, Coupon, CouponModel, CouponOrigin},
    errors::ServiceError,
    services::commerce::{
        cart_service::CartService,
        pricing_service::{
            self, AUTO_COUPON_PERCENTAGE, AUTO_COUPON_VALIDITY_DAYS, REWARD_COUPON_PERCENTAGE,
            REWARD_COUPON_VALIDITY_DAYS,
        },
    },
};
use chrono::{Duration, Utc};
use metrics::counter;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const COUPON_CODE_PREFIX: &str = "GIFT-";
const COUPON_CODE_LEN: usize = 10;
const MAX_CODE_ATTEMPTS: usize = 3;

/// Result of evaluating a cart against the automatic coupon threshold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoCouponOutcome {
    /// A new coupon was issued by this call
    Generated(CouponModel),
    /// The user already holds a usable coupon; nothing changed
    Existing(CouponModel),
    /// Below the threshold; auto-issued coupons were withdrawn
    NotEligible { subtotal: Decimal },
}

impl AutoCouponOutcome {
    pub fn coupon(&self) -> Option<&CouponModel> {
        match self {
            Self::Generated(c) | Self::Existing(c) => Some(c),
            Self::NotEligible { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Generated(_) => "Coupon generated successfully".to_string(),
            Self::Existing(_) => "Coupon already exists".to_string(),
            Self::NotEligible { subtotal } if subtotal.is_zero() => "Cart is empty".to_string(),
            Self::NotEligible { subtotal } => format!(
                "Add ${:.2} more to get a {}% discount!",
                pricing_service::amount_needed(*subtotal),
                AUTO_COUPON_PERCENTAGE
            ),
        }
    }
}

/// Issues, validates and withdraws per-user coupons.
///
/// `coupons.user_id` is unique, so a user owns at most one coupon row and
/// therefore at most one active coupon. Issuance is an upsert on that key.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    cart: CartService,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, cart: CartService) -> Self {
        Self { db, cart }
    }

    /// The user's coupon if it is active and not expired
    #[instrument(skip(self))]
    pub async fn get_active(&self, user_id: Uuid) -> Result<Option<CouponModel>, ServiceError> {
        let coupon = Coupon::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?;
        Ok(coupon.filter(|c| c.is_usable_at(Utc::now())))
    }

    /// Re-evaluates the threshold coupon against the user's current cart.
    ///
    /// Idempotent while eligible: an existing usable coupon is returned as is.
    #[instrument(skip(self))]
    pub async fn evaluate_auto_coupon(
        &self,
        user_id: Uuid,
    ) -> Result<AutoCouponOutcome, ServiceError> {
        let lines = self.cart.list_with_products(user_id).await?;
        let subtotal =
            pricing_service::checked_subtotal(lines.iter().map(|l| (l.product.price, l.quantity)))
                .ok_or_else(|| {
                    ServiceError::InvalidInput("Cart total is out of range".to_string())
                })?;

        if !pricing_service::is_auto_coupon_eligible(subtotal) {
            let removed = Coupon::delete_many()
                .filter(coupon::Column::UserId.eq(user_id))
                .filter(coupon::Column::Origin.eq(CouponOrigin::Auto))
                .exec(&*self.db)
                .await?
                .rows_affected;
            if removed > 0 {
                info!(%user_id, %subtotal, "auto coupon withdrawn below threshold");
            }
            return Ok(AutoCouponOutcome::NotEligible { subtotal });
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        if let Some(current) = Coupon::find()
            .filter(coupon::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
        {
            if current.is_usable_at(now) {
                txn.commit().await?;
                return Ok(AutoCouponOutcome::Existing(current));
            }
            if current.is_active {
                deactivate(&txn, current.id).await?;
            }
        }

        let issued = issue_coupon(
            &txn,
            user_id,
            AUTO_COUPON_PERCENTAGE,
            Duration::days(AUTO_COUPON_VALIDITY_DAYS),
            CouponOrigin::Auto,
            true,
        )
        .await?;
        txn.commit().await?;

        Ok(match issued {
            Issued::New(c) => {
                info!(%user_id, code = %c.code, "auto coupon generated");
                AutoCouponOutcome::Generated(c)
            }
            Issued::Existing(c) => AutoCouponOutcome::Existing(c),
        })
    }

    /// Checks a code entered by the user.
    ///
    /// Unknown, foreign or inactive codes are NotFound. A code past its
    /// expiration date is deactivated and reported as expired, so a retry
    /// then sees NotFound.
    #[instrument(skip(self))]
    pub async fn validate(&self, user_id: Uuid, code: &str) -> Result<CouponModel, ServiceError> {
        let code = code.trim();
        let coupon = Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .filter(coupon::Column::UserId.eq(user_id))
            .filter(coupon::Column::IsActive.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {}", code)))?;

        if coupon.is_expired_at(Utc::now()) {
            deactivate(&*self.db, coupon.id).await?;
            info!(%user_id, code = %coupon.code, "expired coupon deactivated");
            return Err(ServiceError::CouponExpired);
        }

        Ok(coupon)
    }

    /// Removes every coupon the user holds. Idempotent.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid) -> Result<(), ServiceError> {
        let result = Coupon::delete_many()
            .filter(coupon::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;
        if result.rows_affected > 0 {
            info!(%user_id, "coupon deleted");
        }
        Ok(())
    }

    /// Issues the post-purchase reward coupon, replacing whatever the user
    /// held. Runs on the caller's connection so it commits with the order.
    pub async fn mint_reward<C>(conn: &C, user_id: Uuid) -> Result<CouponModel, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let issued = issue_coupon(
            conn,
            user_id,
            REWARD_COUPON_PERCENTAGE,
            Duration::days(REWARD_COUPON_VALIDITY_DAYS),
            CouponOrigin::Manual,
            false,
        )
        .await?;
        let coupon = issued.into_inner();
        info!(%user_id, code = %coupon.code, "reward coupon issued");
        Ok(coupon)
    }
}

enum Issued {
    New(CouponModel),
    Existing(CouponModel),
}

impl Issued {
    fn into_inner(self) -> CouponModel {
        match self {
            Issued::New(c) | Issued::Existing(c) => c,
        }
    }
}

/// `GIFT-` followed by random uppercase alphanumerics
pub fn generate_coupon_code() -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(COUPON_CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}{}", COUPON_CODE_PREFIX, suffix)
}

async fn deactivate<C: ConnectionTrait>(conn: &C, coupon_id: Uuid) -> Result<(), ServiceError> {
    Coupon::update_many()
        .col_expr(coupon::Column::IsActive, Expr::value(false))
        .filter(coupon::Column::Id.eq(coupon_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Upserts the user's coupon row with a fresh code.
///
/// With `only_replace_inactive` the row is rewritten only if the stored coupon
/// is inactive, so concurrent callers converge on a single live coupon. Each
/// attempt runs in a savepoint; a code collision rolls it back and retries.
async fn issue_coupon<C>(
    conn: &C,
    user_id: Uuid,
    percentage: i32,
    validity: Duration,
    origin: CouponOrigin,
    only_replace_inactive: bool,
) -> Result<Issued, ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let mut attempt = 0;
    let code = loop {
        attempt += 1;
        let now = Utc::now();
        let code = generate_coupon_code();
        let row = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_percentage: Set(percentage),
            expiration_date: Set(now + validity),
            is_active: Set(true),
            user_id: Set(user_id),
            origin: Set(origin),
            created_at: Set(now),
        };

        let mut on_conflict = OnConflict::column(coupon::Column::UserId);
        on_conflict.update_columns([
            coupon::Column::Code,
            coupon::Column::DiscountPercentage,
            coupon::Column::ExpirationDate,
            coupon::Column::IsActive,
            coupon::Column::Origin,
            coupon::Column::CreatedAt,
        ]);
        if only_replace_inactive {
            on_conflict.action_and_where(
                Expr::col((coupon::Entity, coupon::Column::IsActive)).eq(false),
            );
        }

        let savepoint = conn.begin().await?;
        match Coupon::insert(row)
            .on_conflict(on_conflict)
            .exec_without_returning(&savepoint)
            .await
        {
            Ok(_) | Err(DbErr::RecordNotInserted) => {
                savepoint.commit().await?;
                break code;
            }
            Err(e) => {
                savepoint.rollback().await?;
                let err = ServiceError::from_db(e, "Coupon code");
                if err.is_conflict() && attempt < MAX_CODE_ATTEMPTS {
                    warn!(%user_id, attempt, "coupon code collision, retrying");
                    continue;
                }
                return Err(err);
            }
        }
    };

    let stored = Coupon::find()
        .filter(coupon::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError("coupon row missing after upsert".into()))?;

    if stored.code == code {
        counter!("storefront.coupons.minted", 1);
        Ok(Issued::New(stored))
    } else {
        Ok(Issued::Existing(stored))
    }
}
