// src/api/webhooks.rs
//
// Wompi event webhook. The delivery contract: 200 for anything we managed to
// log (including "not handled" and "payment not found", so the gateway does
// not retry forever), 401 on checksum mismatch, 400 on unparsable JSON, 500
// only when we could not even record the delivery.

use actix_web::{post, web, HttpResponse};
use serde_json::json;
use utoipa::ToSchema;

use crate::api::signature::{verify_webhook_checksum, ChecksumOutcome};
use crate::db;
use crate::reconcile::{self, WebhookDisposition};
use crate::AppState;

/// Documented shape of a Wompi event body. The handler itself works on raw
/// JSON so that unknown fields and event types are preserved verbatim in the
/// event log.
#[derive(Debug, serde::Deserialize, ToSchema)]
pub struct WompiEventBody {
    pub event: String,
    pub timestamp: Option<i64>,
    pub data: serde_json::Value,
    pub signature: Option<serde_json::Value>,
}

#[utoipa::path(
    post,
    path = "/webhook/wompi",
    tag = "webhooks",
    request_body = WompiEventBody,
    responses(
        (status = 200, description = "Delivery logged (processed or recorded as unhandled)"),
        (status = 400, description = "Malformed JSON body"),
        (status = 401, description = "Checksum mismatch"),
        (status = 500, description = "Delivery could not be recorded")
    )
)]
#[post("/webhook/wompi")]
pub async fn wompi_webhook(body: web::Bytes, state: web::Data<AppState>) -> HttpResponse {
    // Manual parse: on failure there is no transaction id to log against, so
    // no event row can exist and 400 is all we can say.
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("webhook body is not valid json: {e}");
            return HttpResponse::BadRequest().json(json!({"error": "invalid json"}));
        }
    };

    let event_type = payload
        .get("event")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let transaction_id = payload
        .pointer("/data/transaction/id")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    log::info!("webhook received event={event_type} transaction={transaction_id}");

    // Forensic row first, before any processing, so a crash still leaves a
    // trail and manual reprocessing has the verbatim payload.
    let event_id = match db::insert_webhook_event(
        &state.pool,
        &event_type,
        &transaction_id,
        &payload,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            log::error!("insert_webhook_event error: {e}");
            return HttpResponse::InternalServerError().finish();
        }
    };

    match verify_webhook_checksum(&payload, state.events_secret.as_deref()) {
        ChecksumOutcome::Valid => {}
        ChecksumOutcome::NotConfigured => {
            log::warn!("no events secret configured, webhook checksum not verified");
        }
        ChecksumOutcome::Invalid { reason } => {
            log::warn!("webhook checksum rejected: {reason} transaction={transaction_id}");
            if let Err(e) = db::mark_event_error(
                &state.pool,
                event_id,
                &format!("signature invalid: {reason}"),
            )
            .await
            {
                log::error!("mark_event_error error: {e}");
            }
            return HttpResponse::Unauthorized().json(json!({"error": "invalid signature"}));
        }
    }

    match reconcile::process_webhook_payload(&state.pool, &state.notifier, event_id, &payload).await
    {
        Ok(disposition) => {
            let status = match disposition {
                WebhookDisposition::Applied => "processed",
                WebhookDisposition::Ignored => "ignored",
                WebhookDisposition::PaymentNotFound => "payment_not_found",
                WebhookDisposition::NotHandled => "event_not_handled",
                WebhookDisposition::BadStatus => "unrecognized_status",
            };
            HttpResponse::Ok().json(json!({"status": status, "event_id": event_id}))
        }
        Err(e) => {
            // Processing failed but the delivery is logged; record the error
            // on the row and answer 200 so the gateway does not storm us.
            log::error!("webhook processing error: {e} event_id={event_id}");
            let _ = db::mark_event_error(&state.pool, event_id, &format!("processing error: {e}"))
                .await;
            HttpResponse::Ok().json(json!({"status": "error_recorded", "event_id": event_id}))
        }
    }
}
