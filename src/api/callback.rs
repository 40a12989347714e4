// src/api/callback.rs
//
// Browser redirect back from the gateway: `GET /payments/callback?id=...`.
// This is the synchronous pull counterpart of the webhook: poll the gateway
// for the transaction and feed the result through the same update routine,
// then 302 the browser to an outcome page.

use actix_web::{get, web, HttpResponse, Responder};
use serde::Deserialize;

use crate::db;
use crate::models::{OrderStatus, PaymentStatus};
use crate::reconcile;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: Option<String>,
}

fn redirect_to(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header(("Location", location))
        .finish()
}

fn outcome_page(base: &str, status: OrderStatus, order_id: uuid::Uuid) -> HttpResponse {
    let page = match status {
        OrderStatus::Paid => "success",
        OrderStatus::Failed | OrderStatus::Cancelled => "failed",
        _ => "pending",
    };
    redirect_to(format!("{base}/payments/{page}/{order_id}"))
}

#[get("/payments/callback")]
pub async fn payment_callback(
    state: web::Data<AppState>,
    query: web::Query<CallbackQuery>,
) -> impl Responder {
    let Some(transaction_id) = query.id.clone().filter(|id| !id.is_empty()) else {
        log::warn!("payment callback without transaction id");
        return redirect_to(format!("{}/checkout", state.redirect_base_url));
    };

    let payment = match db::find_payment_by_transaction_id(&state.pool, &transaction_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            // The payment row may not exist yet (widget flows, creation
            // timeouts). Not an error page: send the customer back to
            // checkout to finish the flow.
            log::warn!("callback for unknown transaction {transaction_id}");
            return redirect_to(format!("{}/checkout", state.redirect_base_url));
        }
        Err(e) => {
            log::error!("find_payment_by_transaction_id error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let polled = match state.wompi.get_transaction(&transaction_id).await {
        Ok(t) => t,
        Err(e) => {
            // Cannot confirm right now; the webhook will. Pending, not error.
            log::error!("status poll failed for {transaction_id}: {e}");
            return outcome_page(
                &state.redirect_base_url,
                OrderStatus::Processing,
                payment.order_id,
            );
        }
    };

    let incoming = match PaymentStatus::parse(&polled.status) {
        Some(s) => s,
        None => {
            log::warn!("poll returned unrecognized status {}", polled.status);
            return outcome_page(
                &state.redirect_base_url,
                OrderStatus::Processing,
                payment.order_id,
            );
        }
    };

    match reconcile::apply_transaction_update(
        &state.pool,
        &state.notifier,
        payment.id,
        incoming,
        &polled.raw,
        None,
    )
    .await
    {
        Ok(outcome) => outcome_page(
            &state.redirect_base_url,
            outcome.order_status,
            outcome.order_id,
        ),
        Err(e) => {
            log::error!("callback update error: {e}");
            outcome_page(
                &state.redirect_base_url,
                OrderStatus::Processing,
                payment.order_id,
            )
        }
    }
}
