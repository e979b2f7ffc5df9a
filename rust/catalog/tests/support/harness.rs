use axum::{
    body::{self, Body},
    http::{self, Request, StatusCode},
    Router,
};
use catalog::{
    config::{AppConfig, PostgresConfig, StoreConfig},
    server::Server,
};
use serde_json::Value;
use std::{env, future::Future, path::PathBuf, sync::Once};
use tokio::{task::JoinHandle, time::sleep};
use tokio_postgres::{Client, NoTls};
use tower::ServiceExt;

pub const DATABASE_URL_VAR: &str = "CATALOG_TEST_DATABASE_URL";
const DB_CONNECT_RETRIES: usize = 40;
const DB_CONNECT_DELAY_MS: u64 = 250;
const FIXTURE_LOCK_ID: i64 = 7_310_224;

const DROP_SQL: &str = include_str!("../../migrations/2024-01-01-000000_create_catalog/down.sql");
const SCHEMA_SQL: &str = include_str!("../../migrations/2024-01-01-000000_create_catalog/up.sql");
const SEED_SQL: &str = include_str!("../fixtures/seed.sql");

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/catalog.json")
}

/// Runs a test closure against a catalog served from the JSON fixture.
#[allow(dead_code)]
pub async fn with_fixture_harness<F, Fut>(test: F)
where
    F: FnOnce(CatalogTestHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();

    let config = AppConfig::embedded(StoreConfig::Fixture(fixture_path()));
    let server = Server::new(config)
        .await
        .expect("failed to boot catalog from fixture");

    test(CatalogTestHarness {
        router: server.router(),
    })
    .await;
}

/// Runs a test closure against a catalog backed by a freshly seeded Postgres
/// database. Skipped when `CATALOG_TEST_DATABASE_URL` is unset.
#[allow(dead_code)]
pub async fn with_postgres_harness<F, Fut>(test: F)
where
    F: FnOnce(CatalogTestHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    init_tracing();

    let Some(database_url) = env::var(DATABASE_URL_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
    else {
        eprintln!("[catalog-test] skipping Postgres harness: {DATABASE_URL_VAR} is not set");
        return;
    };

    let (client, _task) = connect(&database_url)
        .await
        .expect("failed to connect to test database");
    client
        .execute("SELECT pg_advisory_lock($1)", &[&FIXTURE_LOCK_ID])
        .await
        .expect("failed to acquire fixture lock");
    client
        .batch_execute(DROP_SQL)
        .await
        .expect("failed to drop catalog tables");
    client
        .batch_execute(SCHEMA_SQL)
        .await
        .expect("failed to create catalog tables");
    client
        .batch_execute(SEED_SQL)
        .await
        .expect("failed to seed catalog tables");

    let config = AppConfig::embedded(StoreConfig::Postgres(PostgresConfig {
        database_url,
        max_pool_size: 2,
        ssl_root_cert: None,
        ssl_cert: None,
        ssl_key: None,
    }));
    let server = Server::new(config)
        .await
        .expect("failed to boot catalog against Postgres");

    test(CatalogTestHarness {
        router: server.router(),
    })
    .await;

    let _ = client
        .execute("SELECT pg_advisory_unlock($1)", &[&FIXTURE_LOCK_ID])
        .await;
}

async fn connect(database_url: &str) -> anyhow::Result<(Client, JoinHandle<()>)> {
    let mut attempts = 0usize;
    loop {
        match tokio_postgres::connect(database_url, NoTls).await {
            Ok((client, connection)) => {
                let task = tokio::spawn(async move {
                    if let Err(err) = connection.await {
                        eprintln!("[catalog-test] fixture connection closed: {err}");
                    }
                });
                return Ok((client, task));
            }
            Err(err) if attempts < DB_CONNECT_RETRIES => {
                attempts += 1;
                eprintln!("[catalog-test] connect attempt {attempts} failed: {err}");
                sleep(std::time::Duration::from_millis(DB_CONNECT_DELAY_MS)).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Clone)]
pub struct CatalogTestHarness {
    router: Router,
}

impl CatalogTestHarness {
    pub async fn get(&self, uri: &str) -> http::Response<Body> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .expect("failed to build harness request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should handle harness request")
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        read_json(self.get(uri).await).await
    }
}

pub async fn read_json(response: http::Response<Body>) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("response body should deserialize");
    let value =
        serde_json::from_slice::<Value>(&bytes).expect("response body should be valid JSON");
    (status, value)
}

/// Values of `field` across a list response's `data`, in order.
#[allow(dead_code)]
pub fn column(body: &Value, field: &str) -> Vec<Value> {
    body["data"]
        .as_array()
        .expect("data should be an array")
        .iter()
        .map(|row| row[field].clone())
        .collect()
}
