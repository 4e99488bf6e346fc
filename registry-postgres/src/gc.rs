//! GC review-queue stores (C5, §4.5): the worker-facing poll protocol.
//!
//! `next_blob_task`/`next_manifest_task` drop to a hand-written SQL string
//! for the `FOR UPDATE SKIP LOCKED` clause -- sea-query has no
//! locking-clause builder in the pinned version, the same reason the
//! teacher's own `repository_exists`/`get_referrers` escape to raw
//! `EXISTS`/join SQL where sea-query doesn't model a construct well.

use chrono::Duration as ChronoDuration;
use sea_query::{Expr, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use registry_core::{Digest, Error, Result};

use crate::conn::PgMetadataTx;
use crate::types::{BlobTask, BlobTasks, ConfigLinks, LayerLinks, ManifestTask, ManifestTasks};

/// `SELECT ... WHERE review_after < now() ORDER BY review_after FOR UPDATE
/// SKIP LOCKED LIMIT 1` (§4.5). The row is locked for the lifetime of the
/// caller's transaction; `SKIP LOCKED` means a busy queue never stalls a
/// worker -- `None` is returned when every due row is already held.
pub async fn next_blob_task(executor: &mut PgConnection) -> Result<Option<BlobTask>> {
    let row = sqlx::query_as::<_, BlobTask>(
        r#"
        SELECT digest, review_after, review_count
        FROM blob_task
        WHERE review_after < now()
        ORDER BY review_after
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

pub async fn next_manifest_task(executor: &mut PgConnection) -> Result<Option<ManifestTask>> {
    let row = sqlx::query_as::<_, ManifestTask>(
        r#"
        SELECT repository_id, manifest_id, review_after, review_count
        FROM manifest_task
        WHERE review_after < now()
        ORDER BY review_after
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .fetch_optional(executor)
    .await?;
    Ok(row)
}

/// `review_after' = review_after + delta`, `review_count' += 1` (§4.5).
/// Fails with `NotFound` if the row is already gone -- a race with another
/// worker that processed and deleted it first. Written as raw SQL: sea-query
/// has no builder for adding an interval to a column in place.
pub async fn postpone_blob_task(executor: &mut PgConnection, digest: &Digest, delta: ChronoDuration) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE blob_task
        SET review_after = review_after + make_interval(secs => $1),
            review_count = review_count + 1
        WHERE digest = $2
        "#,
    )
    .bind(delta.num_seconds() as f64)
    .bind(digest.encode())
    .execute(executor)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

pub async fn postpone_manifest_task(
    executor: &mut PgConnection,
    repository_id: Uuid,
    manifest_id: Uuid,
    delta: ChronoDuration,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE manifest_task
        SET review_after = review_after + make_interval(secs => $1),
            review_count = review_count + 1
        WHERE repository_id = $2 AND manifest_id = $3
        "#,
    )
    .bind(delta.num_seconds() as f64)
    .bind(repository_id)
    .bind(manifest_id)
    .execute(executor)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// True iff no row in `config_link` or `layer_link` references this digest
/// (§4.5, invariant 4). Runs in the worker's transaction so the result
/// reflects the locked view of the row returned by `next_blob_task`.
pub async fn blob_is_dangling(executor: &mut PgConnection, digest: &Digest) -> Result<bool> {
    let (config_sql, config_values) = Query::select()
        .expr_as(
            Expr::exists(
                Query::select()
                    .from(ConfigLinks::Table)
                    .column(ConfigLinks::BlobDigest)
                    .and_where(Expr::col(ConfigLinks::BlobDigest).eq(digest.encode()))
                    .to_owned(),
            ),
            sea_query::Alias::new("exists"),
        )
        .build_sqlx(PostgresQueryBuilder);
    let config_referenced: bool = sqlx::query_with(&config_sql, config_values)
        .fetch_one(&mut *executor)
        .await?
        .try_get("exists")?;

    if config_referenced {
        return Ok(false);
    }

    let (layer_sql, layer_values) = Query::select()
        .expr_as(
            Expr::exists(
                Query::select()
                    .from(LayerLinks::Table)
                    .column(LayerLinks::BlobDigest)
                    .and_where(Expr::col(LayerLinks::BlobDigest).eq(digest.encode()))
                    .to_owned(),
            ),
            sea_query::Alias::new("exists"),
        )
        .build_sqlx(PostgresQueryBuilder);
    let layer_referenced: bool = sqlx::query_with(&layer_sql, layer_values)
        .fetch_one(executor)
        .await?
        .try_get("exists")?;

    Ok(!layer_referenced)
}

/// True iff no row in `tags` or `manifest_references.child_manifest_id`
/// points at `(repository_id, manifest_id)` (§4.5, invariant 4).
pub async fn manifest_is_dangling(executor: &mut PgConnection, manifest_id: Uuid) -> Result<bool> {
    let row = sqlx::query(
        r#"
        SELECT
            EXISTS(SELECT 1 FROM tags WHERE manifest_id = $1) AS tagged,
            EXISTS(SELECT 1 FROM manifest_references WHERE child_manifest_id = $1) AS referenced
        "#,
    )
    .bind(manifest_id)
    .fetch_one(executor)
    .await?;

    let tagged: bool = row.try_get("tagged")?;
    let referenced: bool = row.try_get("referenced")?;
    Ok(!tagged && !referenced)
}

pub async fn delete_blob_task(executor: &mut PgConnection, digest: &Digest) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(BlobTasks::Table)
        .and_where(Expr::col(BlobTasks::Digest).eq(digest.encode()))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

pub async fn delete_manifest_task(executor: &mut PgConnection, repository_id: Uuid, manifest_id: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(ManifestTasks::Table)
        .and_where(Expr::col(ManifestTasks::RepositoryId).eq(repository_id))
        .and_where(Expr::col(ManifestTasks::ManifestId).eq(manifest_id))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

/// Exponential-style backoff used by the prescriptive worker loop (§4.5
/// step 4): doubles per review, capped so a long-neglected task is still
/// re-examined at most once a day.
pub fn backoff(review_count: i32) -> ChronoDuration {
    let hours = 1i64.saturating_shl(review_count.max(0) as u32).min(24);
    ChronoDuration::hours(hours)
}

impl<'a> PgMetadataTx<'a> {
    pub async fn next_blob_task(&mut self) -> Result<Option<BlobTask>> {
        next_blob_task(self.conn_mut()?).await
    }

    pub async fn next_manifest_task(&mut self) -> Result<Option<ManifestTask>> {
        next_manifest_task(self.conn_mut()?).await
    }

    pub async fn postpone_blob_task(&mut self, digest: &Digest, delta: ChronoDuration) -> Result<()> {
        postpone_blob_task(self.conn_mut()?, digest, delta).await
    }

    pub async fn postpone_manifest_task(
        &mut self,
        repository_id: Uuid,
        manifest_id: Uuid,
        delta: ChronoDuration,
    ) -> Result<()> {
        postpone_manifest_task(self.conn_mut()?, repository_id, manifest_id, delta).await
    }

    pub async fn blob_is_dangling(&mut self, digest: &Digest) -> Result<bool> {
        blob_is_dangling(self.conn_mut()?, digest).await
    }

    pub async fn manifest_is_dangling(&mut self, manifest_id: Uuid) -> Result<bool> {
        manifest_is_dangling(self.conn_mut()?, manifest_id).await
    }

    pub async fn delete_blob_task(&mut self, digest: &Digest) -> Result<()> {
        delete_blob_task(self.conn_mut()?, digest).await
    }

    pub async fn delete_manifest_task(&mut self, repository_id: Uuid, manifest_id: Uuid) -> Result<()> {
        delete_manifest_task(self.conn_mut()?, repository_id, manifest_id).await
    }
}
