use crate::query::LimitPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    env,
    net::{SocketAddr, ToSocketAddrs},
    path::PathBuf,
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub store: StoreConfig,
    pub base_url: String,
    pub allowed_origins: Option<Vec<String>>,
    pub list_limits: LimitPolicy,
    pub ranking_limits: LimitPolicy,
    pub request_timeout: Duration,
}

/// Where records come from. A fixture path wins over a database URL.
#[derive(Debug, Clone)]
pub enum StoreConfig {
    Postgres(PostgresConfig),
    Fixture(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub database_url: String,
    pub max_pool_size: u32,
    pub ssl_root_cert: Option<String>,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    catalog_listen_addr: Option<String>,
    #[serde(default)]
    catalog_listen_host: Option<String>,
    #[serde(default)]
    catalog_listen_port: Option<u16>,
    #[serde(default)]
    catalog_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default)]
    catalog_fixture_path: Option<PathBuf>,
    #[serde(default = "default_pool_size")]
    catalog_max_pool_size: u32,
    #[serde(default)]
    pgsslrootcert: Option<String>,
    #[serde(default)]
    pgsslcert: Option<String>,
    #[serde(default)]
    pgsslkey: Option<String>,
    #[serde(default = "default_base_url")]
    catalog_base_url: String,
    #[serde(default)]
    catalog_allowed_origins: Option<String>,
    #[serde(default = "default_list_limit")]
    catalog_list_default_limit: i64,
    #[serde(default = "default_ranking_limit")]
    catalog_ranking_default_limit: i64,
    #[serde(default = "default_max_limit")]
    catalog_max_limit: i64,
    #[serde(default = "default_timeout_secs")]
    catalog_request_timeout_secs: u64,
}

const fn default_pool_size() -> u32 {
    10
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

const fn default_list_limit() -> i64 {
    50
}

const fn default_ranking_limit() -> i64 {
    10
}

const fn default_max_limit() -> i64 {
    100
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig =
            envy::from_env().context("failed to parse CATALOG_* environment variables")?;
        Self::from_raw(raw)
    }

    /// Defaults for everything except the store; used by tests and tools that
    /// build a router without touching the environment.
    pub fn embedded(store: StoreConfig) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            store,
            base_url: default_base_url(),
            allowed_origins: None,
            list_limits: LimitPolicy::new(default_list_limit(), default_max_limit()),
            ranking_limits: LimitPolicy::new(default_ranking_limit(), default_max_limit()),
            request_timeout: Duration::from_secs(default_timeout_secs()),
        }
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.catalog_listen_addr,
            raw.catalog_listen_host,
            raw.catalog_listen_port,
        )?;

        let store = match raw.catalog_fixture_path {
            Some(path) => StoreConfig::Fixture(path),
            None => {
                let database_url = raw
                    .catalog_database_url
                    .or(raw.database_url)
                    .or_else(|| env::var("DATABASE_URL").ok())
                    .context(
                        "CATALOG_DATABASE_URL or DATABASE_URL must be set (or CATALOG_FIXTURE_PATH)",
                    )?;
                StoreConfig::Postgres(PostgresConfig {
                    database_url,
                    max_pool_size: raw.catalog_max_pool_size.max(1),
                    ssl_root_cert: raw.pgsslrootcert,
                    ssl_cert: raw.pgsslcert,
                    ssl_key: raw.pgsslkey,
                })
            }
        };

        Ok(Self {
            listen_addr,
            store,
            base_url: raw.catalog_base_url.trim_end_matches('/').to_string(),
            allowed_origins: raw.catalog_allowed_origins.and_then(parse_origins),
            list_limits: LimitPolicy::new(raw.catalog_list_default_limit, raw.catalog_max_limit),
            ranking_limits: LimitPolicy::new(
                raw.catalog_ranking_default_limit,
                raw.catalog_max_limit,
            ),
            request_timeout: Duration::from_secs(raw.catalog_request_timeout_secs.max(1)),
        })
    }
}

fn parse_origins(csv: String) -> Option<Vec<String>> {
    let origins: Vec<_> = csv
        .split(',')
        .filter_map(|part| {
            let entry = part.trim();
            if entry.is_empty() {
                None
            } else {
                Some(entry.to_string())
            }
        })
        .collect();
    if origins.is_empty() {
        None
    } else {
        Some(origins)
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid CATALOG_LISTEN_ADDR value")?
            .next()
            .context("CATALOG_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8000);
    let combined = format!("{}:{}", host, port);
    combined
        .to_socket_addrs()
        .context("invalid catalog listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
