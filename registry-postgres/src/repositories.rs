//! Repository entity store (C3, §3 "Repository", §4.3 "Repository tree
//! operations").
//!
//! Grounded on the teacher's `insert_repository`/`get_repository`/
//! `repository_exists` trio (`portfolio_postgres-s3/src/metadata/postgres.rs`),
//! generalized from a flat `name` column to a `path` column plus a
//! self-referential `parent_id`.

use sea_query::{Expr, OnConflict, PostgresQueryBuilder, Query};
use sea_query_binder::SqlxBinder;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use registry_core::{Error, Result};

use crate::conn::{PgMetadataConn, PgMetadataTx};
use crate::types::{Repositories, Repository};

pub async fn find_by_path(executor: &mut PgConnection, path: &str) -> Result<Option<Repository>> {
    let (sql, values) = Query::select()
        .from(Repositories::Table)
        .columns([
            Repositories::Id,
            Repositories::NamespaceId,
            Repositories::ParentId,
            Repositories::Path,
            Repositories::Name,
            Repositories::CreatedAt,
            Repositories::DeletedAt,
        ])
        .and_where(Expr::col(Repositories::Path).eq(path))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Repository, _>(&sql, values)
        .fetch_optional(executor)
        .await?)
}

pub async fn exists(executor: &mut PgConnection, path: &str) -> Result<bool> {
    let (sql, values) = Query::select()
        .expr_as(
            sea_query::Expr::exists(
                Query::select()
                    .from(Repositories::Table)
                    .column(Repositories::Id)
                    .and_where(Expr::col(Repositories::Path).eq(path))
                    .to_owned(),
            ),
            sea_query::Alias::new("exists"),
        )
        .build_sqlx(PostgresQueryBuilder);
    let row = sqlx::query_with(&sql, values).fetch_one(executor).await?;
    Ok(row.try_get("exists")?)
}

async fn create_or_find_one(
    executor: &mut PgConnection,
    namespace_id: Uuid,
    parent_id: Option<Uuid>,
    path: &str,
    name: &str,
) -> Result<Repository> {
    let (sql, values) = Query::insert()
        .into_table(Repositories::Table)
        .columns([
            Repositories::NamespaceId,
            Repositories::ParentId,
            Repositories::Path,
            Repositories::Name,
        ])
        .values([
            namespace_id.into(),
            parent_id.into(),
            path.into(),
            name.into(),
        ])?
        .on_conflict(OnConflict::column(Repositories::Path).do_nothing().to_owned())
        .returning(Query::returning().columns([
            Repositories::Id,
            Repositories::NamespaceId,
            Repositories::ParentId,
            Repositories::Path,
            Repositories::Name,
            Repositories::CreatedAt,
            Repositories::DeletedAt,
        ]))
        .build_sqlx(PostgresQueryBuilder);

    match sqlx::query_as_with::<_, Repository, _>(&sql, values)
        .fetch_optional(executor)
        .await?
    {
        Some(row) => Ok(row),
        None => find_by_path(executor, path)
            .await?
            .ok_or_else(|| Error::statement_failed(sqlx::Error::RowNotFound)),
    }
}

async fn create_one(
    executor: &mut PgConnection,
    namespace_id: Uuid,
    parent_id: Option<Uuid>,
    path: &str,
    name: &str,
) -> Result<Repository> {
    let (sql, values) = Query::insert()
        .into_table(Repositories::Table)
        .columns([
            Repositories::NamespaceId,
            Repositories::ParentId,
            Repositories::Path,
            Repositories::Name,
        ])
        .values([
            namespace_id.into(),
            parent_id.into(),
            path.into(),
            name.into(),
        ])?
        .returning(Query::returning().columns([
            Repositories::Id,
            Repositories::NamespaceId,
            Repositories::ParentId,
            Repositories::Path,
            Repositories::Name,
            Repositories::CreatedAt,
            Repositories::DeletedAt,
        ]))
        .build_sqlx(PostgresQueryBuilder);

    Ok(sqlx::query_as_with::<_, Repository, _>(&sql, values)
        .fetch_one(executor)
        .await?)
}

/// Strict form of `create_or_find_by_path` (§4.3's `Create` vs `CreateOrFind`:
/// `Create` fails with `Conflict` on a unique-constraint violation rather
/// than returning the existing row). Ancestors are still materialized
/// idempotently via `create_or_find_one` -- only the leaf segment is
/// created strictly, so calling this against a path whose ancestors already
/// exist (the common case) still succeeds; it's only the leaf repository
/// itself that must not already exist.
pub async fn create_by_path(executor: &mut PgConnection, path: &str) -> Result<Repository> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Error::InvalidInput("repository path must not be empty".to_string()));
    }

    let namespace = crate::namespaces::create_or_find(executor, segments[0]).await?;

    let last = segments.len() - 1;
    let mut parent_id: Option<Uuid> = None;
    let mut prefix = String::new();
    let mut repository = None;
    for (i, segment) in segments.iter().enumerate() {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);

        let row = if i == last {
            create_one(executor, namespace.id, parent_id, &prefix, segment).await?
        } else {
            create_or_find_one(executor, namespace.id, parent_id, &prefix, segment).await?
        };
        parent_id = Some(row.id);
        repository = Some(row);
    }

    Ok(repository.expect("segments is non-empty"))
}

/// Materializes every missing ancestor of `path` (§4.3: "split path on `/`,
/// upsert each prefix with its parent id"). The first segment also
/// create-or-finds the owning `namespace` row (§3 "Namespace").
pub async fn create_or_find_by_path(executor: &mut PgConnection, path: &str) -> Result<Repository> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Error::InvalidInput("repository path must not be empty".to_string()));
    }

    let namespace = crate::namespaces::create_or_find(executor, segments[0]).await?;

    let mut parent_id: Option<Uuid> = None;
    let mut prefix = String::new();
    let mut repository = None;
    for segment in &segments {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);

        let row = create_or_find_one(executor, namespace.id, parent_id, &prefix, segment).await?;
        parent_id = Some(row.id);
        repository = Some(row);
    }

    Ok(repository.expect("segments is non-empty"))
}

pub async fn find_descendants_of(executor: &mut PgConnection, path: &str) -> Result<Vec<Repository>> {
    let sql = r#"
        WITH RECURSIVE descendants AS (
            SELECT * FROM repositories WHERE path = $1
            UNION ALL
            SELECT r.* FROM repositories r
            JOIN descendants d ON r.parent_id = d.id
        )
        SELECT id, namespace_id, parent_id, path, name, created_at, deleted_at
        FROM descendants WHERE path <> $1
        ORDER BY path
    "#;
    Ok(sqlx::query_as::<_, Repository>(sql)
        .bind(path)
        .fetch_all(executor)
        .await?)
}

pub async fn find_ancestors_of(executor: &mut PgConnection, path: &str) -> Result<Vec<Repository>> {
    let sql = r#"
        WITH RECURSIVE ancestors AS (
            SELECT * FROM repositories WHERE path = $1
            UNION ALL
            SELECT r.* FROM repositories r
            JOIN ancestors a ON r.id = a.parent_id
        )
        SELECT id, namespace_id, parent_id, path, name, created_at, deleted_at
        FROM ancestors WHERE path <> $1
        ORDER BY path
    "#;
    Ok(sqlx::query_as::<_, Repository>(sql)
        .bind(path)
        .fetch_all(executor)
        .await?)
}

pub async fn find_siblings_of(executor: &mut PgConnection, path: &str) -> Result<Vec<Repository>> {
    let sql = r#"
        SELECT s.id, s.namespace_id, s.parent_id, s.path, s.name, s.created_at, s.deleted_at
        FROM repositories s
        JOIN repositories r ON r.path = $1
        WHERE s.parent_id IS NOT DISTINCT FROM r.parent_id AND s.path <> r.path
        ORDER BY s.path
    "#;
    Ok(sqlx::query_as::<_, Repository>(sql)
        .bind(path)
        .fetch_all(executor)
        .await?)
}

/// Administrative soft-delete (§9: "soft-delete is administrative; GC is
/// physical" -- this never cascades to blobs/manifests).
pub async fn soft_delete(executor: &mut PgConnection, id: Uuid) -> Result<()> {
    let (sql, values) = Query::update()
        .table(Repositories::Table)
        .value(Repositories::DeletedAt, Expr::current_timestamp())
        .and_where(Expr::col(Repositories::Id).eq(id))
        .build_sqlx(PostgresQueryBuilder);
    let result = sqlx::query_with(&sql, values).execute(executor).await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound);
    }
    Ok(())
}

impl PgMetadataConn {
    pub async fn find_repository_by_path(&mut self, path: &str) -> Result<Option<Repository>> {
        find_by_path(self.conn_mut(), path).await
    }

    pub async fn repository_exists(&mut self, path: &str) -> Result<bool> {
        exists(self.conn_mut(), path).await
    }

    pub async fn find_descendant_repositories(&mut self, path: &str) -> Result<Vec<Repository>> {
        find_descendants_of(self.conn_mut(), path).await
    }

    pub async fn find_ancestor_repositories(&mut self, path: &str) -> Result<Vec<Repository>> {
        find_ancestors_of(self.conn_mut(), path).await
    }

    pub async fn find_sibling_repositories(&mut self, path: &str) -> Result<Vec<Repository>> {
        find_siblings_of(self.conn_mut(), path).await
    }
}

impl<'a> PgMetadataTx<'a> {
    pub async fn find_repository_by_path(&mut self, path: &str) -> Result<Option<Repository>> {
        find_by_path(self.conn_mut()?, path).await
    }

    pub async fn create_repository_by_path(&mut self, path: &str) -> Result<Repository> {
        create_by_path(self.conn_mut()?, path).await
    }

    pub async fn create_or_find_repository_by_path(&mut self, path: &str) -> Result<Repository> {
        create_or_find_by_path(self.conn_mut()?, path).await
    }

    pub async fn soft_delete_repository(&mut self, id: Uuid) -> Result<()> {
        soft_delete(self.conn_mut()?, id).await
    }
}
