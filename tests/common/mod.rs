#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db::{self, DbConfig},
    entities::commerce::ProductModel,
    payments::{
        CheckoutSession, CreateSessionRequest, PaymentProvider, PaymentProviderError,
        SessionDetails,
    },
    services::commerce::{pricing_service, CreateProductInput},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Stored view of a session opened through [`FakePayments`]
#[derive(Debug, Clone)]
pub struct FakeSession {
    pub request: CreateSessionRequest,
    pub amount_total: i64,
    pub payment_status: String,
}

/// In-process payment provider. Sessions are paid unless marked otherwise.
#[derive(Default)]
pub struct FakePayments {
    sessions: Mutex<HashMap<String, FakeSession>>,
    discounts: Mutex<HashMap<String, i32>>,
    counter: AtomicUsize,
}

impl FakePayments {
    pub fn session(&self, id: &str) -> Option<FakeSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn set_payment_status(&self, id: &str, status: &str) {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(id) {
            s.payment_status = status.to_string();
        }
    }

    /// Rewrites one metadata entry, as a tampered or foreign session would carry.
    pub fn set_metadata(&self, id: &str, key: &str, value: &str) {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(id) {
            s.request.metadata.insert(key.to_string(), value.to_string());
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}_test_{}", prefix, n)
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentProviderError> {
        let mut amount: i64 = request
            .line_items
            .iter()
            .map(|l| l.unit_amount * l.quantity)
            .sum();
        {
            let discounts = self.discounts.lock().unwrap();
            for id in &request.discounts {
                let pct = discounts.get(id).copied().ok_or_else(|| PaymentProviderError::Api {
                    status: 400,
                    message: format!("No such coupon: {}", id),
                })?;
                amount = pricing_service::apply_percentage_discount_minor(amount, pct);
            }
        }

        let id = self.next_id("cs");
        self.sessions.lock().unwrap().insert(
            id.clone(),
            FakeSession {
                request,
                amount_total: amount,
                payment_status: "paid".to_string(),
            },
        );

        Ok(CheckoutSession {
            url: Some(format!("https://checkout.example.com/pay/{}", id)),
            id,
        })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<SessionDetails, PaymentProviderError> {
        let session = self
            .session(session_id)
            .ok_or_else(|| PaymentProviderError::Api {
                status: 404,
                message: format!("No such checkout.session: '{}'", session_id),
            })?;

        Ok(SessionDetails {
            id: session_id.to_string(),
            amount_total: Some(session.amount_total),
            payment_status: session.payment_status,
            metadata: session.request.metadata,
        })
    }

    async fn create_discount(&self, percent_off: i32) -> Result<String, PaymentProviderError> {
        let id = self.next_id("co");
        self.discounts
            .lock()
            .unwrap()
            .insert(id.clone(), percent_off);
        Ok(id)
    }
}

/// Helper harness for spinning up the application against an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub payments: Arc<FakePayments>,
    pub user_id: Uuid,
    token: String,
    admin_token: String,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig::single_connection(
            cfg.database_url.clone(),
        ))
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let payments = Arc::new(FakePayments::default());
        let state = AppState::new(Arc::new(pool), cfg, payments.clone());

        let user_id = Uuid::new_v4();
        let token = issue(&state, user_id, &[]);
        let admin_token = issue(&state, Uuid::new_v4(), &["admin"]);

        Self {
            router: storefront_api::app_router(state.clone()),
            state,
            payments,
            user_id,
            token,
            admin_token,
        }
    }

    /// Bearer token for the default customer.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Bearer token carrying the admin role.
    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// Token for another, freshly invented customer.
    pub fn token_for(&self, user_id: Uuid) -> String {
        issue(&self.state, user_id, &[])
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    /// Send a fully built request, for tests that need custom headers.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for requests as the default customer.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(self.token())).await
    }

    /// Sends the request and decodes the JSON body.
    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> ProductModel {
        self.state
            .services
            .catalog
            .create(CreateProductInput {
                name: name.to_string(),
                description: format!("{} seeded for integration tests", name),
                price,
                image: format!("https://img.example.com/{}.png", name.to_lowercase()),
                category: "tests".to_string(),
                is_featured: false,
            })
            .await
            .expect("seed product for tests")
    }
}

fn issue(state: &AppState, user_id: Uuid, roles: &[&str]) -> String {
    state
        .auth
        .issue_token(
            user_id,
            None,
            roles.iter().map(|r| r.to_string()).collect(),
            Duration::from_secs(3600),
        )
        .expect("encode access token")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized as a JSON string.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse::<Decimal>().ok())
        .unwrap_or_else(|| panic!("expected decimal string, got {}", value))
}
