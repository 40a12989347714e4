// src/reconcile.rs
//
// The single update routine every asynchronous status source converges on:
// webhook push, redirect-callback poll, and manual event reprocessing. All
// of them must be idempotent and safe against duplicated or out-of-order
// delivery, so the decision logic lives in pure functions here and the write
// happens under one database transaction with the payment row locked.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db;
use crate::models::{OrderStatus, PaymentStatus};
use crate::notify::{NotificationKind, Notifier};

/// Gateway status -> order status mapping. PENDING keeps the order in
/// PROCESSING (submitted, awaiting confirmation); VOIDED is the explicit
/// refund path out of PAID.
pub fn order_status_for(incoming: PaymentStatus) -> Option<OrderStatus> {
    match incoming {
        PaymentStatus::Approved => Some(OrderStatus::Paid),
        PaymentStatus::Pending | PaymentStatus::Processing => Some(OrderStatus::Processing),
        PaymentStatus::Declined | PaymentStatus::Error => Some(OrderStatus::Failed),
        PaymentStatus::Voided => Some(OrderStatus::Refunded),
    }
}

/// Whether `incoming` may overwrite `current` on the payment row.
///
/// Non-terminal states accept any real change. Terminal states are frozen,
/// with one exception: APPROVED -> VOIDED, the explicit refund transition.
/// In particular a stale PENDING arriving after APPROVED is ignored.
pub fn should_apply(current: PaymentStatus, incoming: PaymentStatus) -> bool {
    if current == incoming {
        return false;
    }
    if !current.is_terminal() {
        return true;
    }
    current == PaymentStatus::Approved && incoming == PaymentStatus::Voided
}

/// Forward-only order transitions reachable from gateway events. CANCELLED
/// is deliberately absent on both sides: only the cancel endpoint produces
/// it, and a cancelled order is never revived by an event.
fn order_transition_allowed(current: OrderStatus, next: OrderStatus) -> bool {
    matches!(
        (current, next),
        (OrderStatus::Pending, OrderStatus::Processing)
            | (OrderStatus::Pending, OrderStatus::Paid)
            | (OrderStatus::Pending, OrderStatus::Failed)
            | (OrderStatus::Processing, OrderStatus::Paid)
            | (OrderStatus::Processing, OrderStatus::Failed)
            | (OrderStatus::Paid, OrderStatus::Refunded)
    )
}

#[derive(Debug)]
pub struct UpdateOutcome {
    pub applied: bool,
    pub payment_status: PaymentStatus,
    pub order_id: Uuid,
    pub order_status: OrderStatus,
}

/// Applies one gateway-reported status to a payment and its order as a
/// single atomic unit: re-read current state under a row lock, decide, write
/// payment, write order, and (when this update came from a webhook) mark the
/// event row processed, all in one transaction. Notifications fire after
/// commit.
pub async fn apply_transaction_update(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    payment_id: Uuid,
    incoming: PaymentStatus,
    gateway_payload: &serde_json::Value,
    event_id: Option<Uuid>,
) -> Result<UpdateOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let payment_row = sqlx::query(
        "SELECT id, order_id, status FROM payments WHERE id = $1 FOR UPDATE",
    )
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;
    let order_id: Uuid = payment_row.get("order_id");
    let current_payment = PaymentStatus::parse(payment_row.get::<String, _>("status").as_str())
        .unwrap_or(PaymentStatus::Pending);

    let order_row = sqlx::query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_one(&mut *tx)
        .await?;
    let current_order = OrderStatus::parse(order_row.get::<String, _>("status").as_str())
        .unwrap_or(OrderStatus::Pending);

    if !should_apply(current_payment, incoming) {
        if let Some(event_id) = event_id {
            mark_event_in_tx(&mut tx, event_id, Some(payment_id), None).await?;
        }
        tx.commit().await?;
        log::info!(
            "payment {payment_id} update ignored: {} -> {} is not a forward transition",
            current_payment.as_str(),
            incoming.as_str()
        );
        return Ok(UpdateOutcome {
            applied: false,
            payment_status: current_payment,
            order_id,
            order_status: current_order,
        });
    }

    sqlx::query(
        r#"UPDATE payments
           SET status = $1, gateway_response = $2, updated_at = NOW()
           WHERE id = $3"#,
    )
    .bind(incoming.as_str())
    .bind(gateway_payload)
    .bind(payment_id)
    .execute(&mut *tx)
    .await?;

    let target_order = order_status_for(incoming).unwrap_or(current_order);
    let order_moves = order_transition_allowed(current_order, target_order);
    let final_order = if order_moves { target_order } else { current_order };

    if order_moves {
        if final_order == OrderStatus::Paid {
            // paid_at is set exactly once and survives a later refund
            sqlx::query(
                r#"UPDATE orders
                   SET status = $1, paid_at = COALESCE(paid_at, NOW()), updated_at = NOW()
                   WHERE id = $2"#,
            )
            .bind(final_order.as_str())
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(final_order.as_str())
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    if let Some(event_id) = event_id {
        mark_event_in_tx(&mut tx, event_id, Some(payment_id), None).await?;
    }

    tx.commit().await?;

    log::info!(
        "payment {payment_id} updated {} -> {}, order {order_id} {} -> {}",
        current_payment.as_str(),
        incoming.as_str(),
        current_order.as_str(),
        final_order.as_str()
    );

    if order_moves {
        if let Some(order) = db::get_order(pool, order_id).await? {
            match (current_order, final_order) {
                (_, OrderStatus::Paid) => {
                    notifier.notify(&order, NotificationKind::PaymentApproved)
                }
                (OrderStatus::Pending, OrderStatus::Processing) => {
                    notifier.notify(&order, NotificationKind::Confirmation)
                }
                _ => {}
            }
        }
    }

    Ok(UpdateOutcome {
        applied: true,
        payment_status: incoming,
        order_id,
        order_status: final_order,
    })
}

async fn mark_event_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
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
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// How a webhook payload was disposed of. Everything here answers 200; the
/// distinction only matters for the response body and the event row.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookDisposition {
    Applied,
    Ignored,
    PaymentNotFound,
    NotHandled,
    BadStatus,
}

/// Shared webhook-processing routine, used both for live deliveries and for
/// operator reprocessing of stored payloads. The event row must already
/// exist; this flips its processed/error fields exactly once per attempt.
pub async fn process_webhook_payload(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event_id: Uuid,
    payload: &serde_json::Value,
) -> Result<WebhookDisposition, sqlx::Error> {
    let event_type = payload.get("event").and_then(|v| v.as_str()).unwrap_or("");

    if event_type != "transaction.updated" {
        db::mark_event_processed(
            pool,
            event_id,
            None,
            Some(&format!("event not handled: {event_type}")),
        )
        .await?;
        log::info!("webhook event not handled: {event_type}");
        return Ok(WebhookDisposition::NotHandled);
    }

    let transaction = payload
        .pointer("/data/transaction")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let transaction_id = transaction.get("id").and_then(|v| v.as_str()).unwrap_or("");
    let reference = transaction
        .get("reference")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let status_str = transaction
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("");

    let Some(incoming) = PaymentStatus::parse(status_str) else {
        db::mark_event_processed(
            pool,
            event_id,
            None,
            Some(&format!("unrecognized transaction status: {status_str}")),
        )
        .await?;
        log::warn!("webhook with unrecognized status {status_str} tx={transaction_id}");
        return Ok(WebhookDisposition::BadStatus);
    };

    // Primary lookup by gateway transaction id, fallback by our reference
    // (the id may not have been recorded if the creation call timed out).
    let mut payment = if transaction_id.is_empty() {
        None
    } else {
        db::find_payment_by_transaction_id(pool, transaction_id).await?
    };
    if payment.is_none() && !reference.is_empty() {
        payment = db::find_payment_by_reference(pool, reference).await?;
    }

    let Some(payment) = payment else {
        db::mark_event_processed(
            pool,
            event_id,
            None,
            Some(&format!(
                "payment not found: transaction_id={transaction_id} reference={reference}"
            )),
        )
        .await?;
        log::warn!("webhook for unknown payment tx={transaction_id} reference={reference}");
        return Ok(WebhookDisposition::PaymentNotFound);
    };

    // Late-bind the transaction id when the payment was matched by reference.
    if payment.transaction_id.is_none() && !transaction_id.is_empty() {
        sqlx::query(
            "UPDATE payments SET transaction_id = $1, updated_at = NOW() WHERE id = $2 AND transaction_id IS NULL",
        )
        .bind(transaction_id)
        .bind(payment.id)
        .execute(pool)
        .await?;
    }

    let outcome = apply_transaction_update(
        pool,
        notifier,
        payment.id,
        incoming,
        &transaction,
        Some(event_id),
    )
    .await?;

    Ok(if outcome.applied {
        WebhookDisposition::Applied
    } else {
        WebhookDisposition::Ignored
    })
}

/// Operator-driven reprocessing of a stored delivery. Runs the exact same
/// routine against the stored payload (no network), so it is safe to run
/// any number of times.
pub async fn reprocess_event(
    pool: &PgPool,
    notifier: &Arc<dyn Notifier>,
    event_id: Uuid,
) -> Result<Option<WebhookDisposition>, sqlx::Error> {
    let Some(event) = db::get_webhook_event(pool, event_id).await? else {
        return Ok(None);
    };
    let disposition = process_webhook_payload(pool, notifier, event_id, &event.payload).await?;
    Ok(Some(disposition))
}
