//! Blob entity store (C3, §3 "Blob", §4.3).
//!
//! `create_or_find` is the atomic upsert §4.3 requires: "insert ... on
//! conflict do nothing returning ..." with a follow-up `find_by_digest` on
//! no-row-returned, rather than the insert-then-fallback race the teacher's
//! caller used to perform by hand around `insert_blob`/`get_blob`.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;

use registry_core::{Digest, Error, Result};

use crate::conn::{PgMetadataConn, PgMetadataTx};
use crate::types::{Blob, Blobs};

pub async fn find_by_digest(executor: &mut PgConnection, digest: &Digest) -> Result<Option<Blob>> {
    let (sql, values) = Query::select()
        .from(Blobs::Table)
        .columns([
            Blobs::Digest,
            Blobs::MediaType,
            Blobs::Size,
            Blobs::CreatedAt,
            Blobs::MarkedAt,
        ])
        .and_where(Expr::col(Blobs::Digest).eq(digest.encode()))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Blob, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn count(executor: &mut PgConnection) -> Result<i64> {
    let (sql, values) = Query::select()
        .from(Blobs::Table)
        .expr(Expr::col(Blobs::Digest).count())
        .build_sqlx(PostgresQueryBuilder);
    let row: (i64,) = sqlx::query_as_with(&sql, values).fetch_one(executor).await?;
    Ok(row.0)
}

/// Fails with `Error::Conflict` on a pre-existing digest; callers that want
/// upsert semantics use `create_or_find` instead (§4.3).
pub async fn create(executor: &mut PgConnection, digest: &Digest, media_type: &str, size: i64) -> Result<Blob> {
    let (sql, values) = Query::insert()
        .into_table(Blobs::Table)
        .columns([Blobs::Digest, Blobs::MediaType, Blobs::Size])
        .values([digest.encode().into(), media_type.into(), size.into()])?
        .returning(Query::returning().columns([
            Blobs::Digest,
            Blobs::MediaType,
            Blobs::Size,
            Blobs::CreatedAt,
            Blobs::MarkedAt,
        ]))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Blob, _>(&sql, values)
        .fetch_one(executor)
        .await?)
}

pub async fn create_or_find(
    executor: &mut PgConnection,
    digest: &Digest,
    media_type: &str,
    size: i64,
) -> Result<Blob> {
    let (sql, values) = Query::insert()
        .into_table(Blobs::Table)
        .columns([Blobs::Digest, Blobs::MediaType, Blobs::Size])
        .values([digest.encode().into(), media_type.into(), size.into()])?
        .on_conflict(OnConflict::column(Blobs::Digest).do_nothing().to_owned())
        .returning(Query::returning().columns([
            Blobs::Digest,
            Blobs::MediaType,
            Blobs::Size,
            Blobs::CreatedAt,
            Blobs::MarkedAt,
        ]))
        .build_sqlx(PostgresQueryBuilder);

    match sqlx::query_as_with::<_, Blob, _>(&sql, values)
        .fetch_optional(executor)
        .await?
    {
        Some(row) => Ok(row),
        None => find_by_digest(executor, digest)
            .await?
            .ok_or_else(|| Error::statement_failed(sqlx::Error::RowNotFound)),
    }
}

pub async fn mark(executor: &mut PgConnection, digest: &Digest) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Blobs::Table)
        .value(Blobs::MarkedAt, Expr::current_timestamp())
        .and_where(Expr::col(Blobs::Digest).eq(digest.encode()))
        .build_sqlx(PostgresQueryBuilder);
    let result = sqlx::query_with(&sql, values).execute(executor).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// Fails with `Error::Conflict` if a foreign key still references this
/// digest (invariant 4): the caller should have used the GC worker's
/// `IsDangling` check first.
pub async fn delete(executor: &mut PgConnection, digest: &Digest) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(Blobs::Table)
        .and_where(Expr::col(Blobs::Digest).eq(digest.encode()))
        .build_sqlx(PostgresQueryBuilder);

    let result = sqlx::query_with(&sql, values).execute(executor).await;
    match result {
        Ok(r) if r.rows_affected() == 0 => Err(Error::NotFound),
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(dberr))
            if dberr.kind() == sqlx::error::ErrorKind::ForeignKeyViolation =>
        {
            tracing::debug!(error = %dberr, "blob delete blocked by foreign key");
            Err(Error::Conflict(dberr.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

impl PgMetadataConn {
    pub async fn find_blob_by_digest(&mut self, digest: &Digest) -> Result<Option<Blob>> {
        find_by_digest(self.conn_mut(), digest).await
    }

    pub async fn count_blobs(&mut self) -> Result<i64> {
        count(self.conn_mut()).await
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn find_blob_by_digest(&mut self, digest: &Digest) -> Result<Option<Blob>> {
        find_by_digest(self.conn_mut()?, digest).await
    }

    pub async fn create_blob(&mut self, digest: &Digest, media_type: &str, size: i64) -> Result<Blob> {
        create(self.conn_mut()?, digest, media_type, size).await
    }

    pub async fn create_or_find_blob(
        &mut self,
        digest: &Digest,
        media_type: &str,
        size: i64,
    ) -> Result<Blob> {
        create_or_find(self.conn_mut()?, digest, media_type, size).await
    }

    pub async fn mark_blob(&mut self, digest: &Digest) -> Result<()> {
        mark(self.conn_mut()?, digest).await
    }

    pub async fn delete_blob(&mut self, digest: &Digest) -> Result<()> {
        delete(self.conn_mut()?, digest).await
    }
}
