//! The legacy registry layout the importer walks, separate from the blob
//! byte store (`registry_core::ContentStore`): this trait answers "what
//! repositories/tags/manifests exist", the byte store answers "what's in
//! this blob". Shape grounded on `portfolio_objectstore::ObjectStore` --
//! async-trait, read-only, `Result` wrapping the shared error type.

use async_trait::async_trait;

use registry_core::{Digest, Result};

/// One manifest payload as read off the source layout, ahead of JSON
/// dispatch (§4.6 step 5).
#[derive(Clone)]
pub struct ManifestPayload {
    pub digest: Digest,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Read-only view over a legacy on-disk registry layout. Implementations
/// are expected to return `Error::RepositoryUnknown` for a path this source
/// has no record of, and `Error::PathNotFound` for a path that should exist
/// but doesn't on disk -- both demoted to warnings by the importer (§4.6
/// step 7).
#[async_trait]
pub trait RepositorySource: Send + Sync + 'static {
    /// Every repository path known to the source, in any order.
    async fn repositories(&self) -> Result<Vec<String>>;

    /// `(tag name, manifest digest)` pairs for one repository.
    async fn tags(&self, repository: &str) -> Result<Vec<(String, Digest)>>;

    /// Every manifest digest stored under a repository, tagged or not.
    /// Used only when `import_dangling_manifests` is set (§4.6 step 4).
    async fn manifest_digests(&self, repository: &str) -> Result<Vec<Digest>>;

    async fn manifest(&self, repository: &str, digest: &Digest) -> Result<ManifestPayload>;
}
