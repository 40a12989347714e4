#![allow(dead_code)]

use sqlx::PgPool;
use std::env;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::{Mutex, MutexGuard};

use wompi_checkout::api::wompi_client::WompiClient;
use wompi_checkout::models::Order;
use wompi_checkout::notify::{LogNotifier, NotificationKind, Notifier};
use wompi_checkout::AppState;

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) =
        split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url)
        .await
        .expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url)
        .await
        .expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb { pool, _guard: guard }
}

/// AppState with the gateway pointed at a dead address: webhook-side tests
/// must never reach the network.
pub fn build_state(pool: PgPool, events_secret: Option<&str>) -> AppState {
    build_state_with(pool, "http://127.0.0.1:1", events_secret, Arc::new(LogNotifier))
}

pub fn build_state_with(
    pool: PgPool,
    gateway_base_url: &str,
    events_secret: Option<&str>,
    notifier: Arc<dyn Notifier>,
) -> AppState {
    let wompi = WompiClient::new(
        gateway_base_url.to_string(),
        "pub_test_key".to_string(),
        "prv_test_key".to_string(),
        Some("test_integrity_secret".to_string()),
        "sandbox".to_string(),
    );

    AppState {
        pool,
        wompi,
        events_secret: events_secret.map(str::to_string),
        callback_base_url: "http://localhost".to_string(),
        redirect_base_url: "http://localhost".to_string(),
        notifier,
    }
}

/// Captures notification kinds so tests can assert on delivery counts.
#[derive(Default)]
pub struct RecordingNotifier(pub StdMutex<Vec<&'static str>>);

impl RecordingNotifier {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.0.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, _order: &Order, kind: NotificationKind) {
        self.0.lock().expect("notifier lock").push(kind.as_str());
    }
}
