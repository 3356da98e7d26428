//! Hosted-checkout payment provider abstraction.
//!
//! Checkout talks to the provider only through [`PaymentProvider`], so the
//! orchestration can be exercised against mocks or an in-process fake.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::errors::ServiceError;

pub mod stripe;

pub use stripe::StripeClient;

/// One purchasable line as the provider displays it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub image: Option<String>,
    /// Unit price in minor currency units
    pub unit_amount: i64,
    pub quantity: i64,
    pub currency: String,
}

/// Everything needed to open a hosted checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionRequest {
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Provider-side discount references (see [`PaymentProvider::create_discount`])
    pub discounts: Vec<String>,
    /// Opaque key/value pairs echoed back by [`PaymentProvider::retrieve_session`]
    pub metadata: HashMap<String, String>,
}

/// Newly created session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Provider's canonical view of a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionDetails {
    pub id: String,
    /// Amount charged in minor units, after discounts
    pub amount_total: Option<i64>,
    pub payment_status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl SessionDetails {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

#[derive(Debug, Error)]
pub enum PaymentProviderError {
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected payment provider response: {0}")]
    Decode(String),

    #[error("payment provider is not configured")]
    NotConfigured,
}

impl From<PaymentProviderError> for ServiceError {
    fn from(err: PaymentProviderError) -> Self {
        match err {
            PaymentProviderError::Api { status: 404, message } => {
                ServiceError::NotFound(format!("Checkout session: {}", message))
            }
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentProviderError>;

    async fn retrieve_session(&self, session_id: &str)
        -> Result<SessionDetails, PaymentProviderError>;

    /// Creates a single-use percentage discount and returns its reference
    async fn create_discount(&self, percent_off: i32) -> Result<String, PaymentProviderError>;
}
