//! Coupon engine over HTTP: threshold issuance, validation, expiry and the
//! one-coupon-per-user invariant.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::TestApp;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use storefront_api::entities::commerce::{coupon, Coupon, CouponModel, CouponOrigin};
use uuid::Uuid;

async fn fill_cart(app: &TestApp, price: Decimal) {
    let product = app.seed_product("Bundle", price).await;
    let response = app
        .request_authenticated(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "productId": product.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

async fn seed_coupon(
    app: &TestApp,
    code: &str,
    expires_in: Duration,
    origin: CouponOrigin,
) -> CouponModel {
    let now = Utc::now();
    coupon::ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code.to_string()),
        discount_percentage: Set(15),
        expiration_date: Set(now + expires_in),
        is_active: Set(true),
        user_id: Set(app.user_id),
        origin: Set(origin),
        created_at: Set(now),
    }
    .insert(app.state.db.as_ref())
    .await
    .expect("seed coupon")
}

async fn coupon_rows(app: &TestApp) -> u64 {
    Coupon::find()
        .filter(coupon::Column::UserId.eq(app.user_id))
        .count(app.state.db.as_ref())
        .await
        .unwrap()
}

#[tokio::test]
async fn empty_cart_is_not_eligible() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "coupon": null, "autoApplied": false, "message": "Cart is empty" })
    );
}

#[tokio::test]
async fn below_threshold_reports_amount_needed() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(150)).await;

    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["coupon"], json!(null));
    assert_eq!(body["message"], "Add $50.00 more to get a 10% discount!");
}

#[tokio::test]
async fn just_under_threshold_is_not_eligible() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(199.5)).await;

    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["autoApplied"], false);
    assert_eq!(coupon_rows(&app).await, 0);
}

#[tokio::test]
async fn threshold_coupon_is_issued_once() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(200)).await;

    let (status, first) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["message"], "Coupon generated successfully");
    assert_eq!(first["autoApplied"], true);
    assert_eq!(first["coupon"]["discountPercentage"], 10);
    assert_eq!(first["coupon"]["origin"], "auto");
    let code = first["coupon"]["code"].as_str().unwrap().to_string();
    assert!(code.starts_with("GIFT-"));

    let (_, second) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(second["message"], "Coupon already exists");
    assert_eq!(second["coupon"]["code"], code.as_str());

    let (_, active) = app
        .json(Method::GET, "/api/v1/coupons", None, Some(app.token()))
        .await;
    assert_eq!(active["code"], code.as_str());
}

#[tokio::test]
async fn concurrent_auto_generation_converges_on_one_coupon() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(250)).await;

    let calls = (0..6).map(|_| {
        app.json(
            Method::POST,
            "/api/v1/coupons/auto-generate",
            None,
            Some(app.token()),
        )
    });
    let bodies = join_all(calls).await;

    let codes: std::collections::HashSet<String> = bodies
        .iter()
        .map(|(status, body)| {
            assert_eq!(*status, StatusCode::OK);
            body["coupon"]["code"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(codes.len(), 1);
    assert_eq!(coupon_rows(&app).await, 1);
}

#[tokio::test]
async fn auto_coupon_is_withdrawn_when_cart_drops_below_threshold() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(220)).await;
    app.request_authenticated(Method::POST, "/api/v1/coupons/auto-generate", None)
        .await;

    app.request_authenticated(Method::DELETE, "/api/v1/cart/all", None)
        .await;
    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["message"], "Cart is empty");

    let (_, active) = app
        .json(Method::GET, "/api/v1/coupons", None, Some(app.token()))
        .await;
    assert_eq!(active, json!(null));
    assert_eq!(coupon_rows(&app).await, 0);
}

#[tokio::test]
async fn manual_coupon_survives_cart_dropping_below_threshold() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-REWARD0001", Duration::days(30), CouponOrigin::Manual).await;

    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["autoApplied"], false);

    let (_, active) = app
        .json(Method::GET, "/api/v1/coupons", None, Some(app.token()))
        .await;
    assert_eq!(active["code"], "GIFT-REWARD0001");
    assert_eq!(active["origin"], "manual");
}

#[tokio::test]
async fn existing_usable_coupon_is_kept_when_eligible() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-KEEPME0001", Duration::days(3), CouponOrigin::Manual).await;
    fill_cart(&app, dec!(300)).await;

    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["message"], "Coupon already exists");
    assert_eq!(body["coupon"]["code"], "GIFT-KEEPME0001");
}

#[tokio::test]
async fn expired_coupon_is_replaced_when_eligible() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-STALE00001", -Duration::days(1), CouponOrigin::Auto).await;
    fill_cart(&app, dec!(200)).await;

    let (_, body) = app
        .json(Method::POST, "/api/v1/coupons/auto-generate", None, Some(app.token()))
        .await;
    assert_eq!(body["message"], "Coupon generated successfully");
    assert_ne!(body["coupon"]["code"], "GIFT-STALE00001");
    assert_eq!(coupon_rows(&app).await, 1);
}

#[tokio::test]
async fn validate_returns_discount_for_own_active_coupon() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-VALID00001", Duration::days(2), CouponOrigin::Manual).await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "GIFT-VALID00001" })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "message": "Coupon is valid", "code": "GIFT-VALID00001", "discountPercentage": 15 })
    );
}

#[tokio::test]
async fn validate_rejects_codes_of_other_users() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-MINE000001", Duration::days(2), CouponOrigin::Manual).await;

    let other = app.token_for(Uuid::new_v4());
    let (status, _) = app
        .json(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "GIFT-MINE000001" })),
            Some(&other),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validating_expired_coupon_deactivates_it() {
    let app = TestApp::new().await;
    let seeded =
        seed_coupon(&app, "GIFT-EXPIRED001", -Duration::hours(1), CouponOrigin::Auto).await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "GIFT-EXPIRED001" })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Coupon expired");

    let stored = Coupon::find_by_id(seeded.id)
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/coupons/validate",
            Some(json!({ "code": "GIFT-EXPIRED001" })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_ne!(body["message"], "Coupon expired");
}

#[tokio::test]
async fn expired_coupon_is_hidden_from_get() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-OLD0000001", -Duration::days(2), CouponOrigin::Manual).await;

    let (_, active) = app
        .json(Method::GET, "/api/v1/coupons", None, Some(app.token()))
        .await;
    assert_eq!(active, json!(null));
}

#[tokio::test]
async fn delete_is_idempotent() {
    let app = TestApp::new().await;
    seed_coupon(&app, "GIFT-DELETE0001", Duration::days(2), CouponOrigin::Manual).await;

    for _ in 0..2 {
        let (status, body) = app
            .json(Method::DELETE, "/api/v1/coupons", None, Some(app.token()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Coupon deleted successfully");
    }
    assert_eq!(coupon_rows(&app).await, 0);
}

#[tokio::test]
async fn summary_applies_active_coupon() {
    let app = TestApp::new().await;
    fill_cart(&app, dec!(200)).await;
    app.request_authenticated(Method::POST, "/api/v1/coupons/auto-generate", None)
        .await;

    let (_, summary) = app
        .json(Method::GET, "/api/v1/cart/summary", None, Some(app.token()))
        .await;
    assert_eq!(common::decimal(&summary["subtotal"]), dec!(200));
    assert_eq!(common::decimal(&summary["total"]), dec!(180));
    assert_eq!(summary["discountPercentage"], 10);
    assert!(summary["couponCode"].as_str().unwrap().starts_with("GIFT-"));
}
