//! Payment authorization behind a substitutable gateway contract.
//!
//! The simulated gateway stands in for a real processor: it validates the
//! card fields and then draws against a configured approval rate. Tests
//! pin the rate to 1.0 or 0.0 to force either outcome.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentDetails {
    pub payment_method: Option<String>,
    pub card_number: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<u32>,
    pub cvv: Option<String>,
}

impl PaymentDetails {
    pub fn method(&self) -> &str {
        self.payment_method.as_deref().unwrap_or("credit_card")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Called exactly once per placement attempt, after assembly and
    /// before commit.
    async fn authorize(&self, details: &PaymentDetails) -> PaymentOutcome;
}

#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    approval_rate: f64,
}

impl SimulatedGateway {
    pub fn new(approval_rate: f64) -> Self {
        Self { approval_rate }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(&self, details: &PaymentDetails) -> PaymentOutcome {
        if details.method() == "credit_card" {
            let card_number = details.card_number.as_deref().unwrap_or("");
            if card_number.replace(' ', "").len() < 16 {
                return PaymentOutcome::Declined {
                    reason: "Invalid card number".into(),
                };
            }
            if details.expiry_month.is_none() || details.expiry_year.is_none() {
                return PaymentOutcome::Declined {
                    reason: "Invalid expiry date".into(),
                };
            }
            if details.cvv.as_deref().unwrap_or("").len() < 3 {
                return PaymentOutcome::Declined {
                    reason: "Invalid CVV".into(),
                };
            }
        }

        if rand::thread_rng().gen::<f64>() < self.approval_rate {
            PaymentOutcome::Approved {
                transaction_id: Uuid::new_v4().to_string(),
            }
        } else {
            PaymentOutcome::Declined {
                reason: "Payment processing failed".into(),
            }
        }
    }
}
