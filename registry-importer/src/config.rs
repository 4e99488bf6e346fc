//! Importer options (§4.6): `{ import-dangling-manifests,
//! import-dangling-blobs, require-empty-database, dry-run }`. The fifth
//! option the spec enumerates, `blob-transfer-service`, is a consumed
//! collaborator (`registry_core::BlobTransfer`) rather than a config field.

use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ImporterConfig {
    /// Walk every manifest in a repository, not just tagged ones (§4.6
    /// step 4).
    #[serde(default)]
    pub import_dangling_manifests: bool,

    /// Track blobs that aren't yet referenced by any manifest or repository
    /// link (§3 "Blob": "independently tracked (dangling-blob import
    /// mode)").
    #[serde(default)]
    pub import_dangling_blobs: bool,

    /// Abort rather than import into a database that already has rows
    /// (§4.6 step 1).
    #[serde(default)]
    pub require_empty_database: bool,

    /// Run the whole import inside one outer transaction and roll it back
    /// at the end instead of committing per repository (§4.6 step 3).
    #[serde(default)]
    pub dry_run: bool,
}
