// src/main.rs
use std::env;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use wompi_checkout::api::wompi_client::WompiClient;
use wompi_checkout::notify::LogNotifier;
use wompi_checkout::{api, docs, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let wompi_base_url = env::var("WOMPI_API_BASE_URL")
        .unwrap_or_else(|_| "https://sandbox.wompi.co/v1".to_string());
    let wompi_public_key = env::var("WOMPI_PUBLIC_KEY").expect("WOMPI_PUBLIC_KEY required");
    let wompi_private_key = env::var("WOMPI_PRIVATE_KEY").expect("WOMPI_PRIVATE_KEY required");
    let wompi_integrity_secret = env::var("WOMPI_INTEGRITY_KEY").ok();
    let wompi_events_secret = env::var("WOMPI_EVENTS_SECRET").ok();
    let wompi_environment =
        env::var("WOMPI_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());

    let callback_base_url =
        env::var("CALLBACK_BASE_URL").unwrap_or_else(|_| "https://your-domain.com".to_string());
    let redirect_base_url =
        env::var("REDIRECT_BASE_URL").unwrap_or_else(|_| callback_base_url.clone());

    if wompi_integrity_secret.is_none() {
        log::warn!("WOMPI_INTEGRITY_KEY not set, outbound transactions will be unsigned");
    }
    if wompi_events_secret.is_none() {
        log::warn!("WOMPI_EVENTS_SECRET not set, webhook checksums will not be verified");
    }

    let wompi = WompiClient::new(
        wompi_base_url,
        wompi_public_key,
        wompi_private_key,
        wompi_integrity_secret,
        wompi_environment,
    );
    log::info!("wompi client configured, sandbox={}", wompi.is_sandbox());

    let state = web::Data::new(AppState {
        pool,
        wompi,
        events_secret: wompi_events_secret,
        callback_base_url,
        redirect_base_url,
        notifier: Arc::new(LogNotifier),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            .service(
                web::scope("/api")
                    .service(api::checkout::checkout)
                    .service(api::checkout::retry_payment)
                    .service(api::checkout::order_view)
                    .service(api::checkout::cancel_order)
                    .service(api::checkout::tokenize_card)
                    .service(api::checkout::pse_banks)
                    .service(api::admin::list_events)
                    .service(api::admin::reprocess_event),
            )
            // Public gateway-facing endpoints
            .service(api::webhooks::wompi_webhook)
            .service(api::callback::payment_callback)
    })
    .bind(("0.0.0.0", 8065))?
    .run()
    .await
}
