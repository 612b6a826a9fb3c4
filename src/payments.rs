//! Credit purchase flow: a fixed package catalog, checkout initiation for
//! the configured gateway widgets, and server-side transaction verification
//! before any credits are granted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AdminConfig;

pub const CHECKOUT_CURRENCY: &str = "USD";

const PAYSTACK_VERIFY_URL: &str = "https://api.paystack.co/transaction/verify";
const FLUTTERWAVE_VERIFY_URL: &str =
    "https://api.flutterwave.com/v3/transactions/verify_by_reference";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditPackage {
    pub id: &'static str,
    pub credits: u32,
    pub price_usd: u32,
}

pub const CREDIT_PACKAGES: [CreditPackage; 4] = [
    CreditPackage { id: "starter", credits: 50, price_usd: 5 },
    CreditPackage { id: "basic", credits: 120, price_usd: 10 },
    CreditPackage { id: "pro", credits: 300, price_usd: 20 },
    CreditPackage { id: "business", credits: 1000, price_usd: 50 },
];

pub fn find_package(id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|package| package.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    Paystack,
    Flutterwave,
}

impl Gateway {
    fn label(self) -> &'static str {
        match self {
            Gateway::Paystack => "paystack",
            Gateway::Flutterwave => "flutterwave",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("unknown credit package: {0}")]
    UnknownPackage(String),
    #[error("the {} gateway is not configured", .0.label())]
    GatewayNotConfigured(Gateway),
    #[error("unknown checkout reference")]
    UnknownReference,
    #[error("payment not confirmed: {0}")]
    Unverified(String),
    #[error("gateway verification request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Everything the checkout widget needs to open. Amounts follow each
/// gateway's convention: Paystack bills in minor units, Flutterwave in
/// major units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutIntent {
    pub reference: String,
    pub gateway: Gateway,
    pub public_key: String,
    pub email: String,
    pub amount: u64,
    pub currency: &'static str,
    pub credits: u32,
}

pub fn checkout_amount(gateway: Gateway, price_usd: u32) -> u64 {
    match gateway {
        Gateway::Paystack => u64::from(price_usd) * 100,
        Gateway::Flutterwave => u64::from(price_usd),
    }
}

pub fn begin_checkout(
    config: &AdminConfig,
    email: &str,
    package: &CreditPackage,
    gateway: Gateway,
    nonce: i64,
) -> Result<CheckoutIntent, PaymentError> {
    let public_key = match gateway {
        Gateway::Paystack => config.paystack_public_key.trim(),
        Gateway::Flutterwave => config.flutterwave_public_key.trim(),
    };
    if public_key.is_empty() {
        return Err(PaymentError::GatewayNotConfigured(gateway));
    }

    let local_part = email.split('@').next().unwrap_or(email);
    Ok(CheckoutIntent {
        reference: format!("studio-{local_part}-{nonce}"),
        gateway,
        public_key: public_key.to_string(),
        email: email.to_string(),
        amount: checkout_amount(gateway, package.price_usd),
        currency: CHECKOUT_CURRENCY,
        credits: package.credits,
    })
}

/// Confirms a checkout reference against the gateway before the ledger is
/// credited. The widget callback alone is never trusted.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(
        &self,
        config: &AdminConfig,
        gateway: Gateway,
        reference: &str,
        expected_usd: u32,
    ) -> Result<(), PaymentError>;
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyResponse {
    data: Option<PaystackTransaction>,
}

#[derive(Debug, Deserialize)]
struct PaystackTransaction {
    status: Option<String>,
    amount: Option<u64>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveVerifyResponse {
    data: Option<FlutterwaveTransaction>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveTransaction {
    status: Option<String>,
    amount: Option<f64>,
    currency: Option<String>,
}

#[derive(Default)]
pub struct GatewayVerifier {
    http: reqwest::Client,
}

impl GatewayVerifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentVerifier for GatewayVerifier {
    async fn verify(
        &self,
        config: &AdminConfig,
        gateway: Gateway,
        reference: &str,
        expected_usd: u32,
    ) -> Result<(), PaymentError> {
        match gateway {
            Gateway::Paystack => {
                let secret = config.paystack_secret_key.trim();
                if secret.is_empty() {
                    return Err(PaymentError::GatewayNotConfigured(gateway));
                }
                let response = self
                    .http
                    .get(format!("{PAYSTACK_VERIFY_URL}/{reference}"))
                    .bearer_auth(secret)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(PaymentError::Unverified(format!(
                        "gateway responded with status {}",
                        response.status().as_u16()
                    )));
                }
                let payload: PaystackVerifyResponse = response.json().await?;
                let transaction = payload
                    .data
                    .ok_or_else(|| PaymentError::Unverified("no transaction data".to_string()))?;
                check_transaction(
                    transaction.status.as_deref(),
                    "success",
                    transaction.amount,
                    checkout_amount(gateway, expected_usd),
                    transaction.currency.as_deref(),
                )
            }
            Gateway::Flutterwave => {
                let secret = config.flutterwave_secret_key.trim();
                if secret.is_empty() {
                    return Err(PaymentError::GatewayNotConfigured(gateway));
                }
                let response = self
                    .http
                    .get(FLUTTERWAVE_VERIFY_URL)
                    .query(&[("tx_ref", reference)])
                    .bearer_auth(secret)
                    .send()
                    .await?;
                if !response.status().is_success() {
                    return Err(PaymentError::Unverified(format!(
                        "gateway responded with status {}",
                        response.status().as_u16()
                    )));
                }
                let payload: FlutterwaveVerifyResponse = response.json().await?;
                let transaction = payload
                    .data
                    .ok_or_else(|| PaymentError::Unverified("no transaction data".to_string()))?;
                check_transaction(
                    transaction.status.as_deref(),
                    "successful",
                    transaction.amount.map(|amount| amount.round() as u64),
                    checkout_amount(gateway, expected_usd),
                    transaction.currency.as_deref(),
                )
            }
        }
    }
}

fn check_transaction(
    status: Option<&str>,
    expected_status: &str,
    amount: Option<u64>,
    expected_amount: u64,
    currency: Option<&str>,
) -> Result<(), PaymentError> {
    match status {
        Some(value) if value == expected_status => {}
        other => {
            return Err(PaymentError::Unverified(format!(
                "transaction status is {}",
                other.unwrap_or("missing")
            )));
        }
    }
    if amount != Some(expected_amount) {
        return Err(PaymentError::Unverified("amount mismatch".to_string()));
    }
    if let Some(currency) = currency {
        if currency != CHECKOUT_CURRENCY {
            return Err(PaymentError::Unverified(format!(
                "unexpected currency {currency}"
            )));
        }
    }
    Ok(())
}
