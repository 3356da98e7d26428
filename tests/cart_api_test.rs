//! Cart ledger over HTTP: increments, quantity updates, removal and the
//! priced summary.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use futures::future::join_all;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn adding_the_same_product_twice_increments_quantity() {
    let app = TestApp::new().await;
    let product = app.seed_product("Beanie", dec!(30)).await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "productId": product.id })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "productId": product.id, "quantity": 1 }]));

    let (_, body) = app
        .json(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "productId": product.id })),
            Some(app.token()),
        )
        .await;
    assert_eq!(body, json!([{ "productId": product.id, "quantity": 2 }]));

    let (status, summary) = app
        .json(Method::GET, "/api/v1/cart/summary", None, Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&summary["subtotal"]), dec!(60));
    assert_eq!(decimal(&summary["total"]), dec!(60));
    assert!(summary.get("couponCode").is_none());
}

#[tokio::test]
async fn concurrent_adds_are_not_lost() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sock", dec!(5)).await;

    let adds = (0..8).map(|_| {
        app.request_authenticated(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "productId": product.id })),
        )
    });
    for response in join_all(adds).await {
        assert_eq!(response.status(), StatusCode::OK);
    }

    let (_, lines) = app
        .json(Method::GET, "/api/v1/cart", None, Some(app.token()))
        .await;
    assert_eq!(lines[0]["quantity"], 8);
}

#[tokio::test]
async fn cart_lines_carry_product_fields() {
    let app = TestApp::new().await;
    let product = app.seed_product("Parka", dec!(120)).await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "productId": product.id })),
    )
    .await;

    let (status, lines) = app
        .json(Method::GET, "/api/v1/cart", None, Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines[0]["id"], json!(product.id));
    assert_eq!(lines[0]["name"], "Parka");
    assert_eq!(decimal(&lines[0]["price"]), dec!(120));
    assert_eq!(lines[0]["quantity"], 1);
}

#[tokio::test]
async fn set_quantity_replaces_and_zero_removes() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mug", dec!(12)).await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "productId": product.id })),
    )
    .await;

    let uri = format!("/api/v1/cart/{}", product.id);
    let (status, body) = app
        .json(Method::PUT, &uri, Some(json!({ "quantity": 5 })), Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "productId": product.id, "quantity": 5 }]));

    let (status, body) = app
        .json(Method::PUT, &uri, Some(json!({ "quantity": 0 })), Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn set_quantity_on_absent_product_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::PUT,
            &format!("/api/v1/cart/{}", Uuid::new_v4()),
            Some(json!({ "quantity": 2 })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("is not in the cart"));
}

#[tokio::test]
async fn negative_quantity_is_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Pen", dec!(2)).await;

    let response = app
        .request_authenticated(
            Method::PUT,
            &format!("/api/v1/cart/{}", product.id),
            Some(json!({ "quantity": -1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn removing_absent_product_is_a_no_op() {
    let app = TestApp::new().await;
    let kept = app.seed_product("Cap", dec!(18)).await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "productId": kept.id })),
    )
    .await;

    let (status, body) = app
        .json(
            Method::DELETE,
            "/api/v1/cart",
            Some(json!({ "productId": Uuid::new_v4() })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{ "productId": kept.id, "quantity": 1 }]));

    let (_, body) = app
        .json(
            Method::DELETE,
            "/api/v1/cart",
            Some(json!({ "productId": kept.id })),
            Some(app.token()),
        )
        .await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn clear_empties_the_cart() {
    let app = TestApp::new().await;
    for name in ["A", "B"] {
        let p = app.seed_product(name, dec!(10)).await;
        app.request_authenticated(Method::POST, "/api/v1/cart", Some(json!({ "productId": p.id })))
            .await;
    }

    let (status, body) = app
        .json(Method::DELETE, "/api/v1/cart/all", None, Some(app.token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "All items removed", "cart": [] }));

    let (_, lines) = app
        .json(Method::GET, "/api/v1/cart", None, Some(app.token()))
        .await;
    assert_eq!(lines, json!([]));
}

#[tokio::test]
async fn deleted_products_drop_out_of_the_cart_view() {
    let app = TestApp::new().await;
    let gone = app.seed_product("Discontinued", dec!(40)).await;
    let kept = app.seed_product("Classic", dec!(25)).await;
    for p in [&gone, &kept] {
        app.request_authenticated(Method::POST, "/api/v1/cart", Some(json!({ "productId": p.id })))
            .await;
    }

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/products/{}", gone.id),
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, lines) = app
        .json(Method::GET, "/api/v1/cart", None, Some(app.token()))
        .await;
    let lines = lines.as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["id"], json!(kept.id));
}

#[tokio::test]
async fn carts_are_isolated_per_user() {
    let app = TestApp::new().await;
    let product = app.seed_product("Scarf", dec!(22)).await;
    app.request_authenticated(
        Method::POST,
        "/api/v1/cart",
        Some(json!({ "productId": product.id })),
    )
    .await;

    let other = app.token_for(Uuid::new_v4());
    let (_, lines) = app
        .json(Method::GET, "/api/v1/cart", None, Some(&other))
        .await;
    assert_eq!(lines, json!([]));
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/v1/cart",
            Some(json!({ "productId": "not-a-uuid" })),
            Some(app.token()),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn cart_requires_authentication() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
