// src/api/wompi_client.rs
//
// Client for the Wompi Colombia REST API (https://docs.wompi.co).
// Auth: Bearer public key for checkout-side calls, private key only for
// transaction status queries. No retry loop here; callers own retry policy.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::signature::integrity_signature;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Sandbox fixtures from the Wompi docs. Any other card/phone yields ERROR.
pub const SANDBOX_CARD_APPROVED: &str = "4242424242424242";
pub const SANDBOX_CARD_DECLINED: &str = "4111111111111111";
pub const SANDBOX_NEQUI_APPROVED: &str = "3991111111";
pub const SANDBOX_NEQUI_DECLINED: &str = "3992222222";
pub const SANDBOX_PSE_BANK_APPROVED: &str = "1";
pub const SANDBOX_PSE_BANK_DECLINED: &str = "2";

#[derive(Debug)]
pub enum WompiError {
    /// Network failure or timeout. Safe to retry later; the local payment
    /// stays PENDING so a webhook or reprocess can still resolve it.
    Unavailable(reqwest::Error),
    /// Non-2xx with a parsed business reason. Terminal for this attempt.
    Rejected {
        status: u16,
        error_type: String,
        reason: String,
    },
    /// Edge firewall served an HTML block page instead of the API. An
    /// infrastructure problem, not a customer decline.
    Blocked { status: u16 },
    /// 2xx with a body we could not interpret.
    InvalidResponse(String),
}

impl fmt::Display for WompiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WompiError::Unavailable(e) => write!(f, "gateway unavailable: {e}"),
            WompiError::Rejected {
                status,
                error_type,
                reason,
            } => write!(f, "gateway rejected status={status} {error_type}: {reason}"),
            WompiError::Blocked { status } => {
                write!(f, "gateway request blocked by edge firewall status={status}")
            }
            WompiError::InvalidResponse(e) => write!(f, "invalid gateway response: {e}"),
        }
    }
}

impl From<reqwest::Error> for WompiError {
    fn from(value: reqwest::Error) -> Self {
        Self::Unavailable(value)
    }
}

/// payment_method object of a transaction-creation request, one validated
/// variant per rail.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethodPayload {
    Card {
        token: String,
        installments: u32,
    },
    Pse {
        user_type: u8,
        user_legal_id_type: String,
        user_legal_id: String,
        financial_institution_code: String,
        payment_description: String,
    },
    Nequi {
        phone_number: String,
    },
    BancolombiaTransfer {
        payment_description: String,
    },
}

impl PaymentMethodPayload {
    pub fn card(token: String, installments: u32) -> Self {
        PaymentMethodPayload::Card { token, installments }
    }

    pub fn pse(
        user_type: u8,
        user_legal_id_type: String,
        user_legal_id: String,
        financial_institution_code: String,
        payment_description: &str,
    ) -> Self {
        // Wompi caps PSE descriptions at 30 characters
        PaymentMethodPayload::Pse {
            user_type,
            user_legal_id_type,
            user_legal_id,
            financial_institution_code,
            payment_description: truncate_chars(payment_description, 30),
        }
    }

    pub fn nequi(phone_number: String) -> Self {
        PaymentMethodPayload::Nequi { phone_number }
    }

    pub fn bancolombia_transfer(payment_description: &str) -> Self {
        PaymentMethodPayload::BancolombiaTransfer {
            payment_description: truncate_chars(payment_description, 64),
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// customer_data block, mandatory for PSE.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerData {
    pub phone_number: String,
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTransactionRequest {
    pub amount_in_cents: i64,
    pub currency: String,
    pub customer_email: String,
    pub payment_method: PaymentMethodPayload,
    pub reference: String,
    pub acceptance_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_data: Option<CustomerData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Acceptance {
    pub acceptance_token: String,
}

#[derive(Debug, Clone)]
pub struct CardToken {
    pub token: String,
    pub brand: Option<String>,
    pub last_four: Option<String>,
}

/// The gateway-side view of one transaction, as returned by both the
/// creation call and the status query.
#[derive(Debug, Clone)]
pub struct GatewayTransaction {
    pub id: String,
    pub status: String,
    pub reference: Option<String>,
    pub async_payment_url: Option<String>,
    pub raw: Value,
}

impl GatewayTransaction {
    fn from_data(data: Value) -> Result<Self, WompiError> {
        let id = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WompiError::InvalidResponse("transaction without id".to_string()))?
            .to_string();
        let status = data
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("PENDING")
            .to_string();
        let reference = data
            .get("reference")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let async_payment_url = data
            .get("payment_method")
            .and_then(|m| m.get("extra").and_then(|e| e.get("async_payment_url")).or_else(|| m.get("async_payment_url")))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        Ok(GatewayTransaction {
            id,
            status,
            reference,
            async_payment_url,
            raw: data,
        })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PseInstitution {
    #[serde(rename = "financial_institution_code")]
    pub code: String,
    #[serde(rename = "financial_institution_name")]
    pub name: String,
}

#[derive(Clone)]
pub struct WompiClient {
    base_url: String,
    public_key: String,
    private_key: String,
    integrity_secret: Option<String>,
    environment: String,
    http: reqwest::Client,
}

impl WompiClient {
    pub fn new(
        base_url: String,
        public_key: String,
        private_key: String,
        integrity_secret: Option<String>,
        environment: String,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        WompiClient {
            base_url,
            public_key,
            private_key,
            integrity_secret,
            environment,
            http,
        }
    }

    pub fn is_sandbox(&self) -> bool {
        self.public_key.to_lowercase().contains("test")
            || self.environment.eq_ignore_ascii_case("sandbox")
    }

    fn auth_key(&self, use_private_key: bool) -> &str {
        if use_private_key {
            &self.private_key
        } else {
            &self.public_key
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, use_private_key: bool) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(self.auth_key(use_private_key))
            .header("Accept", "application/json")
            // Browser-like headers; the gateway's WAF drops bare clients
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .header("Accept-Language", "es-CO,es;q=0.9,en;q=0.8")
            .header("Origin", "https://comercios.wompi.co")
            .header("Referer", "https://comercios.wompi.co/")
    }

    async fn execute(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
        use_private_key: bool,
    ) -> Result<Value, WompiError> {
        let mut req = self.request(method.clone(), path, use_private_key);
        if let Some(body) = body {
            req = req.json(body);
        }

        log::info!("wompi api: {method} {path}");
        let resp = req.send().await?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = resp.text().await?;

        // WAF block page: HTML instead of JSON on 403/429/503
        if content_type.contains("text/html") && matches!(status, 403 | 429 | 503) {
            log::error!("wompi request blocked by waf status={status}");
            return Err(WompiError::Blocked { status });
        }

        if matches!(status, 200 | 201) {
            return serde_json::from_str(&text).map_err(|e| {
                WompiError::InvalidResponse(format!("{e}; body={}", truncate_chars(&text, 200)))
            });
        }

        let (error_type, reason) = match serde_json::from_str::<Value>(&text) {
            Ok(v) => (
                v.pointer("/error/type")
                    .and_then(|t| t.as_str())
                    .unwrap_or("UNKNOWN_ERROR")
                    .to_string(),
                v.pointer("/error/reason")
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            Err(_) => (
                format!("HTTP_{status}"),
                truncate_chars(&text, 200),
            ),
        };
        log::error!("wompi api error status={status} {error_type}: {reason}");
        Err(WompiError::Rejected {
            status,
            error_type,
            reason,
        })
    }

    /// Terms-acceptance token, mandatory before creating any transaction.
    pub async fn get_acceptance_token(&self) -> Result<Acceptance, WompiError> {
        let body = self
            .execute(
                reqwest::Method::GET,
                &format!("/merchants/{}", self.public_key),
                None,
                false,
            )
            .await?;

        let presigned = body
            .pointer("/data/presigned_acceptance")
            .ok_or_else(|| WompiError::InvalidResponse("missing presigned_acceptance".to_string()))?;
        let acceptance_token = presigned
            .get("acceptance_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WompiError::InvalidResponse("missing acceptance_token".to_string()))?
            .to_string();
        Ok(Acceptance { acceptance_token })
    }

    /// Exchanges raw card fields for an opaque token. The raw number and cvc
    /// only transit here; callers persist the token plus brand/last-four.
    pub async fn tokenize_card(
        &self,
        card_number: &str,
        cvc: &str,
        exp_month: &str,
        exp_year: &str,
        card_holder: &str,
    ) -> Result<CardToken, WompiError> {
        // Last two chars, not bytes; expiry fields come straight from user input
        let skip = exp_year.chars().count().saturating_sub(2);
        let two_digit_year: String = exp_year.chars().skip(skip).collect();
        let body = json!({
            "number": card_number.replace(' ', ""),
            "cvc": cvc,
            "exp_month": format!("{:0>2}", exp_month),
            "exp_year": two_digit_year,
            "card_holder": card_holder.to_uppercase(),
        });

        let resp = self
            .execute(reqwest::Method::POST, "/tokens/cards", Some(&body), false)
            .await?;

        let data = resp
            .get("data")
            .ok_or_else(|| WompiError::InvalidResponse("token response without data".to_string()))?;
        let token = data
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| WompiError::InvalidResponse("token response without id".to_string()))?
            .to_string();
        Ok(CardToken {
            token,
            brand: data.get("brand").and_then(|v| v.as_str()).map(str::to_string),
            last_four: data
                .get("last_four")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    /// Creates a transaction. The integrity signature is attached
    /// automatically when a secret is configured; otherwise the degraded mode
    /// is logged rather than silently skipped.
    pub async fn create_transaction(
        &self,
        mut req: CreateTransactionRequest,
    ) -> Result<GatewayTransaction, WompiError> {
        if req.signature.is_none() {
            match &self.integrity_secret {
                Some(secret) => {
                    req.signature = Some(integrity_signature(
                        &req.reference,
                        req.amount_in_cents,
                        &req.currency,
                        secret,
                    ));
                }
                None => {
                    log::warn!(
                        "no integrity secret configured, transaction {} sent unsigned",
                        req.reference
                    );
                }
            }
        }

        let body = serde_json::to_value(&req)
            .map_err(|e| WompiError::InvalidResponse(format!("request serialization: {e}")))?;
        let resp = self
            .execute(reqwest::Method::POST, "/transactions", Some(&body), false)
            .await?;

        let data = resp
            .get("data")
            .cloned()
            .ok_or_else(|| WompiError::InvalidResponse("transaction response without data".to_string()))?;
        GatewayTransaction::from_data(data)
    }

    /// Current gateway-side status of a transaction. Drives both the redirect
    /// callback and manual reconciliation.
    pub async fn get_transaction(&self, transaction_id: &str) -> Result<GatewayTransaction, WompiError> {
        let resp = self
            .execute(
                reqwest::Method::GET,
                &format!("/transactions/{transaction_id}"),
                None,
                true,
            )
            .await?;
        let data = resp
            .get("data")
            .cloned()
            .ok_or_else(|| WompiError::InvalidResponse("transaction response without data".to_string()))?;
        GatewayTransaction::from_data(data)
    }

    /// Banks available for PSE redirects. Availability changes, so this is
    /// fetched fresh on every call.
    pub async fn list_pse_institutions(&self) -> Result<Vec<PseInstitution>, WompiError> {
        let resp = self
            .execute(reqwest::Method::GET, "/pse/financial_institutions", None, false)
            .await?;
        let data = resp
            .get("data")
            .cloned()
            .unwrap_or_else(|| Value::Array(vec![]));
        serde_json::from_value(data)
            .map_err(|e| WompiError::InvalidResponse(format!("institution list: {e}")))
    }
}
