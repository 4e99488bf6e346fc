//! End-to-end coverage of the filesystem-to-database bootstrap (§4.6)
//! against a real migrated database, driven through `Importer::run` rather
//! than the individual `registry_postgres` stores directly.

mod common;
mod fixtures;

use std::sync::Arc;

use registry_core::Digest;
use registry_importer::{Importer, ImporterConfig};

use fixtures::{build_image_manifest, build_index_manifest, schema1_manifest_bytes, EmptyContentStore, FakeSource, RecordingTransfer};

#[tokio::test]
async fn tagged_image_import_creates_expected_rows() {
    let pool = common::pool().await;
    let (manifest_bytes, manifest_digest, config_bytes, layer_bytes) = build_image_manifest();

    let mut source = FakeSource::default();
    source.add_repository("library/alpine");
    source.add_tag("library/alpine", "latest", &manifest_digest);
    source.add_manifest(&manifest_digest, manifest_bytes);

    let transfer = Arc::new(RecordingTransfer::default());
    let importer = Importer::new(
        pool.clone(),
        Arc::new(EmptyContentStore),
        Some(transfer.clone()),
        Arc::new(source),
        ImporterConfig::default(),
    );

    let counts = importer.run().await.expect("import succeeds");
    assert_eq!(counts.repositories, 1);
    assert_eq!(counts.manifests, 1);
    assert_eq!(counts.tags, 1);
    // config blob + layer blob
    assert_eq!(counts.blobs, 2);

    let layer_digest = Digest::compute_sha256(&layer_bytes);
    assert_eq!(transfer.transferred.lock().unwrap().as_slice(), &[layer_digest]);

    let mut tx = pool.get_tx().await.unwrap();
    let repo = tx.create_or_find_repository_by_path("library/alpine").await.unwrap();
    let tag = tx.find_tag_by_name(repo.id, "latest").await.unwrap().expect("tag exists");
    let manifest = tx.find_manifest_by_digest(&manifest_digest).await.unwrap().expect("manifest exists");
    assert_eq!(tag.manifest_id, manifest.id);

    let config_digest = Digest::compute_sha256(&config_bytes);
    let config_blob = tx.find_blob_by_digest(&config_digest).await.unwrap();
    assert!(config_blob.is_some(), "config blob was created");

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn reimporting_the_same_source_is_a_no_op() {
    let pool = common::pool().await;
    let (manifest_bytes, manifest_digest, _config_bytes, _layer_bytes) = build_image_manifest();

    let mut source = FakeSource::default();
    source.add_repository("library/alpine");
    source.add_tag("library/alpine", "latest", &manifest_digest);
    source.add_manifest(&manifest_digest, manifest_bytes);
    let source = Arc::new(source);

    let importer = Importer::new(
        pool.clone(),
        Arc::new(EmptyContentStore),
        None,
        source.clone(),
        ImporterConfig::default(),
    );
    let first = importer.run().await.expect("first import succeeds");

    let importer_again = Importer::new(pool.clone(), Arc::new(EmptyContentStore), None, source, ImporterConfig::default());
    let second = importer_again.run().await.expect("second import succeeds");

    assert_eq!(first, second, "re-running over an unchanged source creates nothing new");
}

#[tokio::test]
async fn index_import_recurses_into_child_manifest() {
    let pool = common::pool().await;
    let (child_bytes, child_digest, _config_bytes, _layer_bytes) = build_image_manifest();
    let (index_bytes, index_digest) = build_index_manifest(&child_bytes);

    let mut source = FakeSource::default();
    source.add_repository("library/multiarch");
    source.add_tag("library/multiarch", "latest", &index_digest);
    source.add_manifest(&index_digest, index_bytes);
    source.add_manifest(&child_digest, child_bytes);

    let importer = Importer::new(
        pool.clone(),
        Arc::new(EmptyContentStore),
        None,
        Arc::new(source),
        ImporterConfig::default(),
    );
    let counts = importer.run().await.expect("import succeeds");
    assert_eq!(counts.manifests, 2, "the index and its child manifest");
    assert_eq!(counts.tags, 1, "only the index is tagged");

    let mut tx = pool.get_tx().await.unwrap();
    let index_manifest = tx.find_manifest_by_digest(&index_digest).await.unwrap().expect("index was imported");
    let child_manifest = tx.find_manifest_by_digest(&child_digest).await.unwrap().expect("child was imported");
    let child_id: uuid::Uuid =
        sqlx::query_scalar("SELECT child_manifest_id FROM manifest_references WHERE parent_manifest_id = $1")
            .bind(index_manifest.id)
            .fetch_one(tx.conn_mut().unwrap())
            .await
            .unwrap();
    assert_eq!(child_id, child_manifest.id);

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn schema1_manifest_is_skipped_without_aborting_the_repository() {
    let pool = common::pool().await;
    let (good_bytes, good_digest, _config_bytes, _layer_bytes) = build_image_manifest();
    let legacy_bytes = schema1_manifest_bytes();
    let legacy_digest = Digest::compute_sha256(&legacy_bytes);

    let mut source = FakeSource::default();
    source.add_repository("library/mixed");
    source.add_tag("library/mixed", "latest", &good_digest);
    source.add_tag("library/mixed", "legacy", &legacy_digest);
    source.add_manifest(&good_digest, good_bytes);
    source.add_manifest(&legacy_digest, legacy_bytes);

    let importer = Importer::new(
        pool.clone(),
        Arc::new(EmptyContentStore),
        None,
        Arc::new(source),
        ImporterConfig::default(),
    );
    let counts = importer.run().await.expect("import succeeds despite the schema-1 manifest");
    assert_eq!(counts.manifests, 1, "only the non-schema-1 manifest was imported");
    assert_eq!(counts.tags, 1, "the legacy tag has nothing to point at and is skipped");

    let mut tx = pool.get_tx().await.unwrap();
    let repo = tx.create_or_find_repository_by_path("library/mixed").await.unwrap();
    assert!(tx.find_tag_by_name(repo.id, "legacy").await.unwrap().is_none());
    assert!(tx.find_tag_by_name(repo.id, "latest").await.unwrap().is_some());

    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn dry_run_leaves_no_trace() {
    let pool = common::pool().await;
    let (manifest_bytes, manifest_digest, _config_bytes, _layer_bytes) = build_image_manifest();

    let mut source = FakeSource::default();
    source.add_repository("library/alpine");
    source.add_tag("library/alpine", "latest", &manifest_digest);
    source.add_manifest(&manifest_digest, manifest_bytes);

    let config = ImporterConfig { dry_run: true, ..Default::default() };
    let importer = Importer::new(pool.clone(), Arc::new(EmptyContentStore), None, Arc::new(source), config);
    let counts = importer.run().await.expect("dry run succeeds");
    assert_eq!(counts.repositories, 0, "nothing committed");
    assert_eq!(counts.manifests, 0);
    assert_eq!(counts.tags, 0);
}

#[tokio::test]
async fn require_empty_database_aborts_when_rows_already_exist() {
    let pool = common::pool().await;
    let mut seed_tx = pool.get_tx().await.unwrap();
    seed_tx.create_or_find_repository_by_path("preexisting").await.unwrap();
    seed_tx.commit().await.unwrap();

    let source = FakeSource::default();
    let config = ImporterConfig { require_empty_database: true, ..Default::default() };
    let importer = Importer::new(pool.clone(), Arc::new(EmptyContentStore), None, Arc::new(source), config);

    let err = importer.run().await.expect_err("must refuse to import into a non-empty database");
    assert!(matches!(err, registry_importer::Error::Core(registry_core::Error::InvalidInput(_))));
}
