use crate::config::PostgresConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use std::{fs::File, io::BufReader};
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info};

pub type PgPool = Pool<PgConnectionManager>;

pub async fn connect_pool(config: &PostgresConfig) -> Result<PgPool> {
    let manager = PgConnectionManager::new(config)?;
    let pool = Pool::builder()
        .max_size(config.max_pool_size)
        .build(manager)
        .await
        .context("failed to build catalog connection pool")?;

    match pool.get().await {
        Ok(_) => info!(pool_size = config.max_pool_size, "catalog database reachable"),
        Err(err) => error!(error = ?err, "catalog database unreachable at startup"),
    }

    Ok(pool)
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: Option<MakeRustlsConnect>,
}

impl PgConnectionManager {
    pub fn new(config: &PostgresConfig) -> Result<Self> {
        let pg = config
            .database_url
            .parse::<PgConfig>()
            .context("invalid CATALOG_DATABASE_URL")?;

        let tls = TlsFiles::from_config(config)?
            .map(|files| files.connector())
            .transpose()?;

        Ok(Self { config: pg, tls })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = AsyncPgConnection;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let conn = match &self.tls {
            None => {
                let (client, connection) = self.config.connect(NoTls).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
            Some(connector) => {
                let (client, connection) = self.config.connect(connector.clone()).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection).await
            }
        };
        conn.map_err(|err| anyhow::anyhow!(err))
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

/// PEM files named by `PGSSLROOTCERT`, `PGSSLCERT` and `PGSSLKEY`.
struct TlsFiles<'a> {
    root_cert: &'a str,
    client: Option<(&'a str, &'a str)>,
}

impl<'a> TlsFiles<'a> {
    /// `None` when no root certificate is configured (plain TCP).
    fn from_config(config: &'a PostgresConfig) -> Result<Option<Self>> {
        let client = match (config.ssl_cert.as_deref(), config.ssl_key.as_deref()) {
            (None, None) => None,
            (Some(cert), Some(key)) => Some((cert, key)),
            _ => bail!("PGSSLCERT and PGSSLKEY must both be set (or neither)"),
        };

        match config.ssl_root_cert.as_deref() {
            Some(root_cert) => Ok(Some(Self { root_cert, client })),
            None if client.is_some() => bail!("PGSSLCERT/PGSSLKEY require PGSSLROOTCERT"),
            None => Ok(None),
        }
    }

    fn connector(&self) -> Result<MakeRustlsConnect> {
        let mut roots = RootCertStore::empty();
        for cert in read_certs(self.root_cert, "PGSSLROOTCERT")? {
            roots
                .add(cert)
                .map_err(|_| anyhow::anyhow!("invalid certificate in PGSSLROOTCERT"))?;
        }

        let builder = ClientConfig::builder().with_root_certificates(roots);
        let client_config = match self.client {
            None => builder.with_no_client_auth(),
            Some((cert, key)) => builder
                .with_client_auth_cert(read_certs(cert, "PGSSLCERT")?, read_key(key)?)
                .context("failed to build client TLS config")?,
        };

        Ok(MakeRustlsConnect::new(client_config))
    }
}

fn read_certs(path: &str, var: &str) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open {var} file '{path}'"))?,
    );

    let chain = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("failed to parse {var}"))?;
    if chain.is_empty() {
        bail!("{var} contained no certificates");
    }

    Ok(chain)
}

fn read_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open PGSSLKEY file '{path}'"))?,
    );

    rustls_pemfile::private_key(&mut reader)
        .context("failed to parse PGSSLKEY")?
        .context("PGSSLKEY contained no private keys")
}
