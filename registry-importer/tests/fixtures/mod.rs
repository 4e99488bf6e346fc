//! In-memory stand-ins for the importer's two consumed interfaces, built
//! from a handful of OCI manifests constructed with `oci_spec`'s builders
//! (the same builder calls `oci-distribution-test` uses to synthesize test
//! images: `schema_version`, `media_type`, `config`, `layers`).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use oci_spec::image::{Descriptor, DescriptorBuilder, ImageIndexBuilder, ImageManifestBuilder, MediaType};

use registry_core::{
    BlobTransfer, ContentStore, Descriptor as StoreDescriptor, Digest, Error as CoreError, ObjectBody,
    Result as CoreResult,
};
use registry_importer::source::ManifestPayload;
use registry_importer::RepositorySource;

pub struct EmptyContentStore;

#[async_trait]
impl ContentStore for EmptyContentStore {
    async fn enumerate(&self, _callback: &mut (dyn FnMut(StoreDescriptor) + Send)) -> CoreResult<()> {
        Ok(())
    }

    async fn stat(&self, _digest: &Digest) -> CoreResult<StoreDescriptor> {
        Err(registry_core::Error::NotFound)
    }

    async fn get(&self, _digest: &Digest) -> CoreResult<ObjectBody> {
        Err(registry_core::Error::NotFound)
    }
}

#[derive(Default)]
pub struct RecordingTransfer {
    pub transferred: Mutex<Vec<Digest>>,
}

#[async_trait]
impl BlobTransfer for RecordingTransfer {
    async fn transfer(&self, digest: &Digest) -> CoreResult<()> {
        self.transferred.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

fn descriptor_for(bytes: &[u8], media_type: MediaType) -> Descriptor {
    let digest = Digest::compute_sha256(bytes);
    DescriptorBuilder::default()
        .media_type(media_type)
        .digest(String::from(&digest))
        .size(bytes.len() as i64)
        .build()
        .expect("all required descriptor fields set")
}

/// Builds a single-arch image manifest referencing one config blob and one
/// layer blob, returning `(manifest_bytes, manifest_digest, config_bytes,
/// layer_bytes)` so a test can seed both the manifest and the blobs it
/// references.
pub fn build_image_manifest() -> (Vec<u8>, Digest, Vec<u8>, Vec<u8>) {
    let config_bytes = br#"{"architecture":"amd64","os":"linux"}"#.to_vec();
    let layer_bytes = b"layer contents".to_vec();

    let config_descriptor = descriptor_for(&config_bytes, MediaType::ImageConfig);
    let layer_descriptor = descriptor_for(&layer_bytes, MediaType::ImageLayerGzip);

    let manifest = ImageManifestBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageManifest)
        .config(config_descriptor)
        .layers(vec![layer_descriptor])
        .build()
        .expect("all required manifest fields set");

    let manifest_bytes = serde_json::to_vec(&manifest).expect("manifest serializes");
    let digest = Digest::compute_sha256(&manifest_bytes);
    (manifest_bytes, digest, config_bytes, layer_bytes)
}

/// Builds an index referencing the single-arch manifest produced by
/// `build_image_manifest`.
pub fn build_index_manifest(child_bytes: &[u8]) -> (Vec<u8>, Digest) {
    let child_descriptor = descriptor_for(child_bytes, MediaType::ImageManifest);

    let index = ImageIndexBuilder::default()
        .schema_version(2u32)
        .media_type(MediaType::ImageIndex)
        .manifests(vec![child_descriptor])
        .build()
        .expect("all required index fields set");

    let index_bytes = serde_json::to_vec(&index).expect("index serializes");
    let digest = Digest::compute_sha256(&index_bytes);
    (index_bytes, digest)
}

pub fn schema1_manifest_bytes() -> Vec<u8> {
    br#"{"schemaVersion":1,"name":"library/legacy","tag":"latest","fsLayers":[],"history":[]}"#.to_vec()
}

#[derive(Default)]
pub struct FakeSource {
    repos: Vec<String>,
    tags: HashMap<String, Vec<(String, Digest)>>,
    manifests: HashMap<Digest, ManifestPayload>,
}

impl FakeSource {
    pub fn add_repository(&mut self, path: &str) {
        self.repos.push(path.to_string());
        self.tags.entry(path.to_string()).or_default();
    }

    pub fn add_tag(&mut self, path: &str, name: &str, digest: &Digest) {
        self.tags.entry(path.to_string()).or_default().push((name.to_string(), digest.clone()));
    }

    pub fn add_manifest(&mut self, digest: &Digest, bytes: Vec<u8>) {
        self.manifests.insert(
            digest.clone(),
            ManifestPayload {
                digest: digest.clone(),
                media_type: None,
                bytes,
            },
        );
    }
}

#[async_trait]
impl RepositorySource for FakeSource {
    async fn repositories(&self) -> CoreResult<Vec<String>> {
        Ok(self.repos.clone())
    }

    async fn tags(&self, repository: &str) -> CoreResult<Vec<(String, Digest)>> {
        Ok(self.tags.get(repository).cloned().unwrap_or_default())
    }

    async fn manifest_digests(&self, repository: &str) -> CoreResult<Vec<Digest>> {
        Ok(self
            .tags
            .get(repository)
            .map(|tags| tags.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default())
    }

    async fn manifest(&self, _repository: &str, digest: &Digest) -> CoreResult<ManifestPayload> {
        self.manifests
            .get(digest)
            .cloned()
            .ok_or_else(|| CoreError::PathNotFound(digest.to_string()))
    }
}
