pub mod api;
pub mod db;
pub mod docs;
pub mod models;
pub mod notify;
pub mod reconcile;

use std::sync::Arc;

use sqlx::PgPool;

use crate::api::wompi_client::WompiClient;
use crate::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub wompi: WompiClient,
    /// Secret for inbound webhook checksums. None means the check is skipped
    /// (sandbox/test configuration only).
    pub events_secret: Option<String>,
    /// Public base URL of this service, used to build the gateway's
    /// redirect_url back to our callback endpoint.
    pub callback_base_url: String,
    /// Storefront base URL for the success/pending/failed outcome pages.
    pub redirect_base_url: String,
    pub notifier: Arc<dyn Notifier>,
}
