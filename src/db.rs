// src/db.rs

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Order, OrderItem, Payment, WebhookEvent};

pub fn order_from_row(r: &PgRow) -> Order {
    Order {
        id: r.get("id"),
        order_number: r.get("order_number"),
        user_id: r.get("user_id"),
        customer_name: r.get("customer_name"),
        customer_email: r.get("customer_email"),
        customer_phone: r.get("customer_phone"),
        subtotal: r.get("subtotal"),
        tax: r.get("tax"),
        shipping: r.get("shipping"),
        total: r.get("total"),
        status: r.get("status"),
        shipping_address: r.get("shipping_address"),
        notes: r.get("notes"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        paid_at: r.get("paid_at"),
    }
}

pub fn payment_from_row(r: &PgRow) -> Payment {
    Payment {
        id: r.get("id"),
        order_id: r.get("order_id"),
        transaction_id: r.get("transaction_id"),
        reference: r.get("reference"),
        method: r.get("method"),
        amount: r.get("amount"),
        currency: r.get("currency"),
        status: r.get("status"),
        method_data: r.get("method_data"),
        gateway_response: r.get("gateway_response"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

pub fn event_from_row(r: &PgRow) -> WebhookEvent {
    WebhookEvent {
        id: r.get("id"),
        event_type: r.get("event_type"),
        transaction_id: r.get("transaction_id"),
        payload: r.get("payload"),
        processed: r.get("processed"),
        processed_at: r.get("processed_at"),
        error_message: r.get("error_message"),
        payment_id: r.get("payment_id"),
        received_at: r.get("received_at"),
    }
}

const ORDER_COLUMNS: &str = "id, order_number, user_id, customer_name, customer_email, customer_phone, \
     subtotal, tax, shipping, total, status, shipping_address, notes, \
     created_at, updated_at, paid_at";

const PAYMENT_COLUMNS: &str = "id, order_id, transaction_id, reference, method, amount, currency, status, \
     method_data, gateway_response, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, event_type, transaction_id, payload, processed, processed_at, \
     error_message, payment_id, received_at";

pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub subtotal: i64,
    pub tax: i64,
    pub shipping: i64,
    pub total: i64,
    pub shipping_address: Option<serde_json::Value>,
}

pub struct NewOrderItem {
    pub product_id: Option<Uuid>,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i32,
    pub unit_price: i64,
}

pub async fn create_order(
    pool: &PgPool,
    order: NewOrder,
    items: &[NewOrderItem],
) -> Result<Order, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        r#"INSERT INTO orders
               (order_number, user_id, customer_name, customer_email, customer_phone,
                subtotal, tax, shipping, total, status, shipping_address)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', $10)
           RETURNING {ORDER_COLUMNS}"#
    ))
    .bind(&order.order_number)
    .bind(order.user_id)
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .bind(order.subtotal)
    .bind(order.tax)
    .bind(order.shipping)
    .bind(order.total)
    .bind(&order.shipping_address)
    .fetch_one(&mut *tx)
    .await?;

    let created = order_from_row(&row);

    for item in items {
        sqlx::query(
            r#"INSERT INTO order_items
                   (order_id, product_id, product_name, product_sku, quantity, unit_price)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(created.id)
        .bind(item.product_id)
        .bind(&item.product_name)
        .bind(&item.product_sku)
        .bind(item.quantity)
        .bind(item.unit_price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(created)
}

pub async fn get_order(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(order_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| order_from_row(&r)))
}

pub async fn list_order_items(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, order_id, product_id, product_name, product_sku, quantity, unit_price
           FROM order_items
           WHERE order_id = $1
           ORDER BY id"#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OrderItem {
            id: r.get("id"),
            order_id: r.get("order_id"),
            product_id: r.get("product_id"),
            product_name: r.get("product_name"),
            product_sku: r.get("product_sku"),
            quantity: r.get("quantity"),
            unit_price: r.get("unit_price"),
        })
        .collect())
}

pub async fn update_order_status(
    pool: &PgPool,
    order_id: Uuid,
    status: &str,
    set_paid_at: bool,
) -> Result<(), sqlx::Error> {
    if set_paid_at {
        sqlx::query(
            r#"UPDATE orders
               SET status = $1, paid_at = COALESCE(paid_at, NOW()), updated_at = NOW()
               WHERE id = $2"#,
        )
        .bind(status)
        .bind(order_id)
        .execute(pool)
        .await?;
    } else {
        sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(order_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn count_payments_for_order(pool: &PgPool, order_id: Uuid) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub struct NewPayment {
    pub order_id: Uuid,
    pub reference: String,
    pub method: String,
    pub amount: i64,
    pub currency: String,
    pub method_data: serde_json::Value,
}

pub async fn insert_payment(pool: &PgPool, payment: NewPayment) -> Result<Payment, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"INSERT INTO payments
               (order_id, reference, method, amount, currency, status, method_data)
           VALUES ($1, $2, $3, $4, $5, 'PENDING', $6)
           RETURNING {PAYMENT_COLUMNS}"#
    ))
    .bind(payment.order_id)
    .bind(&payment.reference)
    .bind(&payment.method)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.method_data)
    .fetch_one(pool)
    .await?;
    Ok(payment_from_row(&row))
}

/// Records the immediate gateway creation response against a payment row.
/// Status never moves here; transitions go through the guarded update
/// routine so an earlier webhook result cannot be overwritten.
pub async fn record_gateway_response(
    pool: &PgPool,
    payment_id: Uuid,
    transaction_id: Option<&str>,
    response: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE payments
           SET transaction_id = COALESCE($1, transaction_id),
               gateway_response = $2,
               updated_at = NOW()
           WHERE id = $3"#,
    )
    .bind(transaction_id)
    .bind(response)
    .bind(payment_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Flags an unresolved payment as ERROR. Returns false when the payment was
/// already resolved, so callers can skip the order write-back.
pub async fn mark_payment_error(pool: &PgPool, payment_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE payments
           SET status = 'ERROR', updated_at = NOW()
           WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')"#,
    )
    .bind(payment_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Cancels an order only while it is still unresolved. Returns false when a
/// concurrent transition (or a terminal state) got there first.
pub async fn cancel_order_if_open(pool: &PgPool, order_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE orders
           SET status = 'CANCELLED', updated_at = NOW()
           WHERE id = $1 AND status IN ('PENDING', 'PROCESSING')"#,
    )
    .bind(order_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_payment_by_transaction_id(
    pool: &PgPool,
    transaction_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
    ))
    .bind(transaction_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| payment_from_row(&r)))
}

pub async fn find_payment_by_reference(
    pool: &PgPool,
    reference: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1"
    ))
    .bind(reference)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| payment_from_row(&r)))
}

pub async fn latest_payment_for_order(
    pool: &PgPool,
    order_id: Uuid,
) -> Result<Option<Payment>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {PAYMENT_COLUMNS} FROM payments
           WHERE order_id = $1
           ORDER BY created_at DESC
           LIMIT 1"#
    ))
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| payment_from_row(&r)))
}

/// Append the forensic event row. Always done before any processing so a
/// crash mid-processing still leaves a trail.
pub async fn insert_webhook_event(
    pool: &PgPool,
    event_type: &str,
    transaction_id: &str,
    payload: &serde_json::Value,
) -> Result<Uuid, sqlx::Error> {
    let row = sqlx::query(
        r#"INSERT INTO webhook_events (event_type, transaction_id, payload)
           VALUES ($1, $2, $3)
           RETURNING id"#,
    )
    .bind(event_type)
    .bind(transaction_id)
    .bind(payload)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

pub async fn mark_event_processed(
    pool: &PgPool,
    event_id: Uuid,
    payment_id: Option<Uuid>,
    error_message: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE webhook_events
           SET processed = TRUE,
               processed_at = NOW(),
               payment_id = COALESCE($1, payment_id),
               error_message = $2
           WHERE id = $3"#,
    )
    .bind(payment_id)
    .bind(error_message)
    .bind(event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Used for rejected deliveries (bad checksum): the row stays unprocessed but
/// carries the reason.
pub async fn mark_event_error(
    pool: &PgPool,
    event_id: Uuid,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE webhook_events SET error_message = $1 WHERE id = $2")
        .bind(error_message)
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_webhook_event(
    pool: &PgPool,
    event_id: Uuid,
) -> Result<Option<WebhookEvent>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| event_from_row(&r)))
}

pub async fn list_webhook_events(
    pool: &PgPool,
    only_unprocessed: bool,
    only_errored: bool,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"SELECT {EVENT_COLUMNS} FROM webhook_events
           WHERE ($1 = FALSE OR processed = FALSE)
             AND ($2 = FALSE OR error_message IS NOT NULL)
           ORDER BY received_at DESC
           LIMIT 200"#
    ))
    .bind(only_unprocessed)
    .bind(only_errored)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(event_from_row).collect())
}
