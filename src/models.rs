// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Order lifecycle. CANCELLED is only reachable through the explicit cancel
/// endpoint, never from gateway events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OrderStatus::Pending),
            "PROCESSING" => Some(OrderStatus::Processing),
            "PAID" => Some(OrderStatus::Paid),
            "FAILED" => Some(OrderStatus::Failed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            "REFUNDED" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

/// Payment status as stored locally. PROCESSING is our alias for
/// "submitted, awaiting async confirmation"; the gateway itself only ever
/// reports PENDING / APPROVED / DECLINED / ERROR / VOIDED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Approved,
    Declined,
    Error,
    Voided,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Declined => "DECLINED",
            PaymentStatus::Error => "ERROR",
            PaymentStatus::Voided => "VOIDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "PROCESSING" => Some(PaymentStatus::Processing),
            "APPROVED" => Some(PaymentStatus::Approved),
            "DECLINED" => Some(PaymentStatus::Declined),
            "ERROR" => Some(PaymentStatus::Error),
            "VOIDED" => Some(PaymentStatus::Voided),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Approved
                | PaymentStatus::Declined
                | PaymentStatus::Error
                | PaymentStatus::Voided
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentMethod {
    Card,
    Pse,
    Nequi,
    BancolombiaTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Pse => "PSE",
            PaymentMethod::Nequi => "NEQUI",
            PaymentMethod::BancolombiaTransfer => "BANCOLOMBIA_TRANSFER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CARD" => Some(PaymentMethod::Card),
            "PSE" => Some(PaymentMethod::Pse),
            "NEQUI" => Some(PaymentMethod::Nequi),
            "BANCOLOMBIA_TRANSFER" => Some(PaymentMethod::BancolombiaTransfer),
            _ => None,
        }
    }

    /// Card is the only method whose creation response is near-final;
    /// everything else resolves through a webhook or a status poll.
    pub fn is_async(&self) -> bool {
        !matches!(self, PaymentMethod::Card)
    }
}

#[derive(Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub total: i64,
    pub status: String,
    pub shipping_address: Option<serde_json::Value>,
    pub notes: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OrderItem {
    pub id: i32,
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Serialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub transaction_id: Option<String>,
    pub reference: String,
    pub method: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub method_data: serde_json::Value,
    pub gateway_response: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub transaction_id: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub payment_id: Option<Uuid>,
    pub received_at: Option<DateTime<Utc>>,
}

/// Human-readable order number, e.g. `GW-1700000000-3FA2B1`. The random
/// suffix keeps it unique; immutable once stored.
pub fn generate_order_number() -> String {
    let ts = Utc::now().timestamp();
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("GW-{ts}-{suffix}")
}

/// Gateway reference for payment attempt `attempt` (1-based) against an
/// order. The first attempt reuses the order number; retries get a suffix so
/// references never collide across attempts.
pub fn payment_reference(order_number: &str, attempt: i64) -> String {
    if attempt <= 1 {
        order_number.to_string()
    } else {
        format!("{order_number}-R{attempt}")
    }
}
