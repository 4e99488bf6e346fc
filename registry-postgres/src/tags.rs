//! Tag entity store (C3, §3 "Tag").
//!
//! `upsert` is grounded on the teacher's `upsert_tag`:
//! `OnConflict::columns([RepositoryId, Name]).update_columns([ManifestId])`.

use sea_query::{Expr, OnConflict, Order, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::PgConnection;
use uuid::Uuid;

use registry_core::{Error, Result};

use crate::conn::{PgMetadataConn, PgMetadataTx};
use crate::types::{Manifests, Tag, Tags};

pub async fn find_by_name(executor: &mut PgConnection, repository_id: Uuid, name: &str) -> Result<Option<Tag>> {
    let (sql, values) = Query::select()
        .from(Tags::Table)
        .columns([
            (Tags::Table, Tags::RepositoryId),
            (Tags::Table, Tags::Name),
            (Tags::Table, Tags::ManifestId),
            (Tags::Table, Tags::CreatedAt),
            (Tags::Table, Tags::UpdatedAt),
        ])
        .column((Manifests::Table, Manifests::Digest))
        .left_join(
            Manifests::Table,
            Expr::col((Tags::Table, Tags::ManifestId)).equals((Manifests::Table, Manifests::Id)),
        )
        .and_where(Expr::col((Tags::Table, Tags::RepositoryId)).eq(repository_id))
        .and_where(Expr::col((Tags::Table, Tags::Name)).eq(name))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Tag, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn find_all(executor: &mut PgConnection, repository_id: Uuid) -> Result<Vec<Tag>> {
    let (sql, values) = Query::select()
        .from(Tags::Table)
        .columns([
            (Tags::Table, Tags::RepositoryId),
            (Tags::Table, Tags::Name),
            (Tags::Table, Tags::ManifestId),
            (Tags::Table, Tags::CreatedAt),
            (Tags::Table, Tags::UpdatedAt),
        ])
        .column((Manifests::Table, Manifests::Digest))
        .left_join(
            Manifests::Table,
            Expr::col((Tags::Table, Tags::ManifestId)).equals((Manifests::Table, Manifests::Id)),
        )
        .and_where(Expr::col((Tags::Table, Tags::RepositoryId)).eq(repository_id))
        .order_by(Tags::Name, Order::Asc)
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Tag, _>(&sql, values)
        .fetch_all(executor)
        .await?)
}

/// Updating a tag updates `updated_at` (§3). Atomic on `(repository, name)`.
pub async fn upsert(executor: &mut PgConnection, repository_id: Uuid, name: &str, manifest_id: Uuid) -> Result<()> {
    let (sql, values) = Query::insert()
        .into_table(Tags::Table)
        .columns([Tags::RepositoryId, Tags::Name, Tags::ManifestId])
        .values([repository_id.into(), name.into(), manifest_id.into()])?
        .on_conflict(
            OnConflict::columns([Tags::RepositoryId, Tags::Name])
                .update_columns([Tags::ManifestId])
                .value(Tags::UpdatedAt, Expr::current_timestamp())
                .to_owned(),
        )
        .build_sqlx(PostgresQueryBuilder);

    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

pub async fn delete(executor: &mut PgConnection, repository_id: Uuid, name: &str) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(Tags::Table)
        .and_where(Expr::col(Tags::RepositoryId).eq(repository_id))
        .and_where(Expr::col(Tags::Name).eq(name))
        .build_sqlx(PostgresQueryBuilder);
    let result = sqlx::query_with(&sql, values).execute(executor).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

pub async fn delete_by_manifest(executor: &mut PgConnection, manifest_id: Uuid) -> Result<()> {
    let (sql, values) = Query::delete()
        .from_table(Tags::Table)
        .and_where(Expr::col(Tags::ManifestId).eq(manifest_id))
        .build_sqlx(PostgresQueryBuilder);
    sqlx::query_with(&sql, values).execute(executor).await?;
    Ok(())
}

impl PgMetadataConn {
    pub async fn find_tag_by_name(&mut self, repository_id: Uuid, name: &str) -> Result<Option<Tag>> {
        find_by_name(self.conn_mut(), repository_id, name).await
    }

    pub async fn find_all_tags(&mut self, repository_id: Uuid) -> Result<Vec<Tag>> {
        find_all(self.conn_mut(), repository_id).await
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn find_tag_by_name(&mut self, repository_id: Uuid, name: &str) -> Result<Option<Tag>> {
        find_by_name(self.conn_mut()?, repository_id, name).await
    }

    pub async fn upsert_tag(&mut self, repository_id: Uuid, name: &str, manifest_id: Uuid) -> Result<()> {
        upsert(self.conn_mut()?, repository_id, name, manifest_id).await
    }

    pub async fn delete_tag(&mut self, repository_id: Uuid, name: &str) -> Result<()> {
        delete(self.conn_mut()?, repository_id, name).await
    }

    pub async fn delete_tags_by_manifest(&mut self, manifest_id: Uuid) -> Result<()> {
        delete_by_manifest(self.conn_mut()?, manifest_id).await
    }
}
