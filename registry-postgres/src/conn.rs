//! Pooled connection and transaction handles (C2, §4.2).
//!
//! Mirrors `PostgresMetadataPool`/`PostgresMetadataConn`/`PostgresMetadataTx`
//! in `portfolio_postgres-s3/src/metadata/postgres.rs`: a pool wrapper that
//! hands out either a bare connection or a transaction, both of which expose
//! the same store methods by delegating into free functions parametric over
//! `&mut PgConnection` (one module per entity -- `blobs`, `manifests`, etc).
//! This is what makes store code "parametric over which connection" per
//! §4.2's uniform query capability.

use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{Pool, Transaction};

use registry_core::{Error, Result};

/// A connected pool. `get_conn` hands out a single pooled connection for
/// reads that don't need a transaction; `get_tx` opens one for writes that
/// must observe read-your-writes consistency (§5).
#[derive(Clone)]
pub struct PgMetadataPool {
    pool: Pool<Postgres>,
}

impl PgMetadataPool {
    pub(crate) fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Connect directly from a libpq DSN, bypassing `PostgresConfig`. Used
    /// by the test suite, which points at a throwaway database named by
    /// `DATABASE_URL` rather than the structured config a deployed backend
    /// loads from file.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(dsn).await?;
        Ok(Self::from_pool(pool))
    }

    pub async fn get_conn(&self) -> Result<PgMetadataConn> {
        Ok(PgMetadataConn {
            conn: self.pool.acquire().await?,
        })
    }

    pub async fn get_tx(&self) -> Result<PgMetadataTx<'static>> {
        Ok(PgMetadataTx {
            tx: Some(self.pool.begin().await?),
        })
    }

    pub async fn migrate_up(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

pub struct PgMetadataConn {
    pub(crate) conn: PoolConnection<Postgres>,
}

/// Wrapper around a Postgres transaction. `commit` is idempotent -- calling
/// it twice is a no-op, mirroring the teacher's `if let Some(t) =
/// self.tx.take()` pattern -- and every store method that needs the
/// transaction returns `Error::TxAborted` once it has been taken.
pub struct PgMetadataTx<'a> {
    pub(crate) tx: Option<Transaction<'a, Postgres>>,
}

impl<'a> PgMetadataTx<'a> {
    pub async fn commit(mut self) -> Result<()> {
        if let Some(t) = self.tx.take() {
            t.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if let Some(t) = self.tx.take() {
            t.rollback().await?;
        }
        Ok(())
    }

    /// Escape hatch to the underlying transaction connection, for the same
    /// reasons as `PgMetadataConn::conn_mut`.
    pub fn conn_mut(&mut self) -> Result<&mut sqlx::PgConnection> {
        self.tx.as_deref_mut().ok_or(Error::TxAborted)
    }
}

impl PgMetadataConn {
    /// Escape hatch to the underlying connection for callers that need a
    /// raw query this crate's store modules don't expose (migrations,
    /// test fixtures).
    pub fn conn_mut(&mut self) -> &mut sqlx::PgConnection {
        &mut self.conn
    }
}
