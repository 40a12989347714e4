// src/api/admin.rs
//
// Operator view of the event log plus manual reprocessing. Reprocessing
// re-runs the shared update routine against the stored payload, so it is
// idempotent and never calls the gateway.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::db;
use crate::reconcile;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub unprocessed: bool,
    #[serde(default)]
    pub errored: bool,
}

#[get("/admin/webhook-events")]
pub async fn list_events(
    state: web::Data<AppState>,
    query: web::Query<EventFilter>,
) -> impl Responder {
    match db::list_webhook_events(&state.pool, query.unprocessed, query.errored).await {
        Ok(events) => HttpResponse::Ok().json(json!({"events": events})),
        Err(e) => {
            log::error!("list_webhook_events error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[post("/admin/webhook-events/{event_id}/reprocess")]
pub async fn reprocess_event(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> impl Responder {
    let event_id = path.into_inner();
    match reconcile::reprocess_event(&state.pool, &state.notifier, event_id).await {
        Ok(Some(disposition)) => HttpResponse::Ok().json(json!({
            "event_id": event_id,
            "disposition": format!("{disposition:?}"),
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({"error": "event not found"})),
        Err(e) => {
            log::error!("reprocess_event error: {e}");
            HttpResponse::InternalServerError().finish()
        }
    }
}
