//! Manifest entity store (C3, §3 "Manifest").
//!
//! `find_by_ref` mirrors the teacher's `get_manifest(repository_id,
//! ManifestRef)` join-on-tags pattern in
//! `portfolio_postgres-s3/src/metadata/postgres.rs`.

use sea_query::{Expr, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Digest, Error, Result};

use crate::conn::{PgMetadataConn, PgMetadataTx};
use crate::types::{Manifest, Manifests, Tags};

pub enum ManifestRef<'a> {
    Digest(&'a Digest),
    Tag(&'a str),
}

const MANIFEST_COLUMNS: [Manifests; 8] = [
    Manifests::Id,
    Manifests::RepositoryId,
    Manifests::SchemaVersion,
    Manifests::MediaType,
    Manifests::Digest,
    Manifests::Payload,
    Manifests::CreatedAt,
    Manifests::MarkedAt,
];

pub async fn find_by_digest(executor: &mut PgConnection, digest: &Digest) -> Result<Option<Manifest>> {
    let (sql, values) = Query::select()
        .from(Manifests::Table)
        .columns(MANIFEST_COLUMNS)
        .and_where(Expr::col(Manifests::Digest).eq(digest.encode()))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Manifest, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn find_by_ref(
    executor: &mut PgConnection,
    repository_id: Uuid,
    manifest_ref: &ManifestRef<'_>,
) -> Result<Option<Manifest>> {
    let mut builder = Query::select();
    builder
        .from(Manifests::Table)
        .columns([
            (Manifests::Table, Manifests::Id),
            (Manifests::Table, Manifests::RepositoryId),
            (Manifests::Table, Manifests::SchemaVersion),
            (Manifests::Table, Manifests::MediaType),
            (Manifests::Table, Manifests::Digest),
            (Manifests::Table, Manifests::Payload),
            (Manifests::Table, Manifests::CreatedAt),
            (Manifests::Table, Manifests::MarkedAt),
        ])
        .and_where(Expr::col((Manifests::Table, Manifests::RepositoryId)).eq(repository_id));

    match manifest_ref {
        ManifestRef::Digest(d) => {
            builder.and_where(Expr::col((Manifests::Table, Manifests::Digest)).eq(d.encode()));
        }
        ManifestRef::Tag(name) => {
            builder
                .left_join(
                    Tags::Table,
                    Expr::col((Tags::Table, Tags::ManifestId)).equals((Manifests::Table, Manifests::Id)),
                )
                .and_where(Expr::col((Tags::Table, Tags::Name)).eq(*name))
                .and_where(Expr::col((Tags::Table, Tags::RepositoryId)).eq(repository_id));
        }
    }

    let (sql, values) = builder.build_sqlx(PostgresQueryBuilder);
    Ok(sqlx::query_as_with::<_, Manifest, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn find_all(executor: &mut PgConnection, repository_id: Uuid) -> Result<Vec<Manifest>> {
    let (sql, values) = Query::select()
        .from(Manifests::Table)
        .columns(MANIFEST_COLUMNS)
        .and_where(Expr::col(Manifests::RepositoryId).eq(repository_id))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Manifest, _>(&sql, values)
        .fetch_all(executor)
        .await?)
}

pub async fn count(executor: &mut PgConnection, repository_id: Uuid) -> Result<i64> {
    let (sql, values) = Query::select()
        .from(Manifests::Table)
        .expr(Expr::col(Manifests::Id).count())
        .and_where(Expr::col(Manifests::RepositoryId).eq(repository_id))
        .build_sqlx(PostgresQueryBuilder);
    let row: (i64,) = sqlx::query_as_with(&sql, values).fetch_one(executor).await?;
    Ok(row.0)
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    executor: &mut PgConnection,
    repository_id: Uuid,
    schema_version: i32,
    media_type: &str,
    digest: &Digest,
    payload: &[u8],
) -> Result<Manifest> {
    let (sql, values) = Query::insert()
        .into_table(Manifests::Table)
        .columns([
            Manifests::Id,
            Manifests::RepositoryId,
            Manifests::SchemaVersion,
            Manifests::MediaType,
            Manifests::Digest,
            Manifests::Payload,
        ])
        .values([
            Uuid::new_v4().into(),
            repository_id.into(),
            schema_version.into(),
            media_type.into(),
            digest.encode().into(),
            payload.to_vec().into(),
        ])?
        .returning(Query::returning().columns(MANIFEST_COLUMNS))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Manifest, _>(&sql, values)
        .fetch_one(executor)
        .await?)
}

pub async fn mark(executor: &mut PgConnection, id: Uuid) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Manifests::Table)
        .value(Manifests::MarkedAt, Expr::current_timestamp())
        .and_where(Expr::col(Manifests::Id).eq(id))
        .build_sqlx(PostgresQueryBuilder);
    let result = sqlx::query_with(&sql, values).execute(executor).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

/// Safe iff no `tags` and no `manifest_references.child_id` point at it
/// (invariant 4); those foreign keys are `ON DELETE RESTRICT` so a
/// still-referenced manifest surfaces as a foreign-key violation here.
pub async fn delete(executor: &mut PgConnection, id: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(Manifests::Table)
        .and_where(Expr::col(Manifests::Id).eq(id))
        .build_sqlx(PostgresQueryBuilder);

    match sqlx::query_with(&sql, values).execute(executor).await {
        Ok(r) if r.rows_affected() == 0 => Err(Error::NotFound),
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(dberr))
            if dberr.kind() == sqlx::error::ErrorKind::ForeignKeyViolation =>
        {
            tracing::debug!(error = %dberr, "manifest delete blocked by foreign key");
            Err(Error::Conflict(dberr.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

impl PgMetadataConn {
    pub async fn find_manifest_by_digest(&mut self, digest: &Digest) -> Result<Option<Manifest>> {
        find_by_digest(self.conn_mut(), digest).await
    }

    pub async fn find_manifest_by_ref(
        &mut self,
        repository_id: Uuid,
        manifest_ref: &ManifestRef<'_>,
    ) -> Result<Option<Manifest>> {
        find_by_ref(self.conn_mut(), repository_id, manifest_ref).await
    }

    pub async fn find_all_manifests(&mut self, repository_id: Uuid) -> Result<Vec<Manifest>> {
        find_all(self.conn_mut(), repository_id).await
    }

    pub async fn count_manifests(&mut self, repository_id: Uuid) -> Result<i64> {
        count(self.conn_mut(), repository_id).await
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn find_manifest_by_digest(&mut self, digest: &Digest) -> Result<Option<Manifest>> {
        find_by_digest(self.conn_mut()?, digest).await
    }

    pub async fn find_manifest_by_ref(
        &mut self,
        repository_id: Uuid,
        manifest_ref: &ManifestRef<'_>,
    ) -> Result<Option<Manifest>> {
        find_by_ref(self.conn_mut()?, repository_id, manifest_ref).await
    }

    pub async fn create_manifest(
        &mut self,
        repository_id: Uuid,
        schema_version: i32,
        media_type: &str,
        digest: &Digest,
        payload: &[u8],
    ) -> Result<Manifest> {
        create(self.conn_mut()?, repository_id, schema_version, media_type, digest, payload).await
    }

    pub async fn mark_manifest(&mut self, id: Uuid) -> Result<()> {
        mark(self.conn_mut()?, id).await
    }

    pub async fn delete_manifest(&mut self, id: Uuid) -> Result<()> {
        delete(self.conn_mut()?, id).await
    }
}
