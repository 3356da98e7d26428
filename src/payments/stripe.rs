use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{
    CheckoutSession, CreateSessionRequest, PaymentProvider, PaymentProviderError, SessionDetails,
};
use crate::config::AppConfig;

/// Stripe Checkout over its form-encoded REST API
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct StripeCoupon {
    id: String,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(api_base, secret_key, client))
    }

    /// Build from an existing client (useful for testing).
    pub fn with_client(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        client: Client,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, PaymentProviderError> {
        let key = cfg
            .stripe_secret_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(PaymentProviderError::NotConfigured)?;
        Self::new(cfg.stripe_api_base.clone(), key, cfg.payment_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(
        response: Response,
    ) -> Result<T, PaymentProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorBody>(&body)
                .ok()
                .map(|b| {
                    let kind = b.error.kind.unwrap_or_else(|| "api_error".into());
                    match b.error.message {
                        Some(msg) => format!("{}: {}", kind, msg),
                        None => kind,
                    }
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            warn!(status = status.as_u16(), %message, "stripe request failed");
            return Err(PaymentProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PaymentProviderError::Decode(e.to_string()))
    }
}

/// Flattens a session request into Stripe's bracketed form keys.
fn session_form(request: &CreateSessionRequest) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            item.currency.clone(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        if let Some(image) = item.image.as_ref().filter(|s| !s.is_empty()) {
            form.push((
                format!("{}[price_data][product_data][images][0]", prefix),
                image.clone(),
            ));
        }
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    for (i, coupon) in request.discounts.iter().enumerate() {
        form.push((format!("discounts[{}][coupon]", i), coupon.clone()));
    }

    let mut keys: Vec<&String> = request.metadata.keys().collect();
    keys.sort();
    for key in keys {
        form.push((format!("metadata[{}]", key), request.metadata[key].clone()));
    }

    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentProviderError> {
        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&session_form(&request))
            .send()
            .await?;

        let session: CheckoutSession = Self::decode(response).await?;
        debug!(session_id = %session.id, "stripe checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> Result<SessionDetails, PaymentProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/checkout/sessions/{}", session_id)))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::decode(response).await
    }

    #[instrument(skip(self))]
    async fn create_discount(&self, percent_off: i32) -> Result<String, PaymentProviderError> {
        let form = [
            ("percent_off", percent_off.to_string()),
            ("duration", "once".to_string()),
        ];
        let response = self
            .client
            .post(self.url("/v1/coupons"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        let coupon: StripeCoupon = Self::decode(response).await?;
        Ok(coupon.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::LineItem;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::collections::HashMap;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> StripeClient {
        StripeClient::new(server.uri(), "sk_test_123", Duration::from_secs(5)).unwrap()
    }

    fn request() -> CreateSessionRequest {
        CreateSessionRequest {
            line_items: vec![LineItem {
                name: "Denim Jacket".into(),
                image: Some("https://img.example.com/j.png".into()),
                unit_amount: 4999,
                quantity: 2,
                currency: "usd".into(),
            }],
            success_url: "https://shop.example.com/ok".into(),
            cancel_url: "https://shop.example.com/cancel".into(),
            discounts: vec!["co_abc".into()],
            metadata: HashMap::from([("userId".to_string(), "u-1".to_string())]),
        }
    }

    #[test]
    fn session_form_uses_bracketed_keys() {
        let form = session_form(&request());
        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("4999"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(
            get("line_items[0][price_data][product_data][images][0]"),
            Some("https://img.example.com/j.png")
        );
        assert_eq!(get("discounts[0][coupon]"), Some("co_abc"));
        assert_eq!(get("metadata[userId]"), Some("u-1"));
    }

    #[tokio::test]
    async fn create_session_posts_form_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", "Bearer sk_test_123"))
            .and(body_string_contains("mode=payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1",
                "object": "checkout.session"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server).create_session(request()).await.unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(
            session.url.as_deref(),
            Some("https://checkout.stripe.com/c/pay/cs_test_1")
        );
    }

    #[tokio::test]
    async fn retrieve_session_decodes_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_test_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_2",
                "amount_total": 22500,
                "payment_status": "paid",
                "metadata": {"userId": "u-1", "couponCode": ""}
            })))
            .mount(&server)
            .await;

        let details = client(&server).retrieve_session("cs_test_2").await.unwrap();
        assert_eq!(details.amount_total, Some(22500));
        assert!(details.is_paid());
        assert_eq!(details.metadata.get("userId").map(String::as_str), Some("u-1"));
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": "No such checkout.session: 'cs_missing'"}
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .retrieve_session("cs_missing")
            .await
            .unwrap_err();
        assert_matches!(err, PaymentProviderError::Api { status: 404, ref message } if message.contains("No such checkout.session"));
    }

    #[tokio::test]
    async fn create_discount_returns_coupon_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/coupons"))
            .and(body_string_contains("percent_off=10"))
            .and(body_string_contains("duration=once"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "co_10"})))
            .mount(&server)
            .await;

        let id = client(&server).create_discount(10).await.unwrap();
        assert_eq!(id, "co_10");
    }

    #[test]
    fn missing_secret_key_is_not_configured() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "a_production_grade_secret_with_enough_entropy_42".into(),
            "127.0.0.1".into(),
            8080,
            "development".into(),
        );
        assert_matches!(
            StripeClient::from_config(&cfg),
            Err(PaymentProviderError::NotConfigured)
        );
    }
}
