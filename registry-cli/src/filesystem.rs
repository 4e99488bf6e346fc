//! A concrete, on-disk implementation of the importer's two consumed
//! interfaces (§6), grounded on the classic distribution registry layout:
//!
//! ```text
//! <root>/blobs/<algorithm>/<first two hex chars>/<hex>/data
//! <root>/repositories/<name>/_manifests/tags/<tag>/link
//! <root>/repositories/<name>/_manifests/revisions/<algorithm>/<hex>/link
//! ```
//!
//! `link` files hold the textual `algo:hex` digest they point at; blob
//! bytes -- manifests included, since a manifest is content-addressed like
//! any other blob -- live under `blobs/` keyed by that same digest.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use registry_core::{
    BlobTransfer, ContentStore, Descriptor, Digest, Error, ObjectBody, Result,
};
use registry_importer::{ManifestPayload, RepositorySource};

fn blob_path(root: &Path, digest: &Digest) -> PathBuf {
    let text = digest.to_string();
    let (algo, hex) = text.split_once(':').expect("Digest::to_string is always algo:hex");
    root.join("blobs").join(algo).join(&hex[..2]).join(hex).join("data")
}

async fn read_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::PathNotFound(path.display().to_string())
        } else {
            Error::statement_failed(e)
        }
    })
}

async fn read_link_digest(path: &Path) -> Result<Digest> {
    let contents = read_file(path).await?;
    let text = String::from_utf8(contents).map_err(|e| Error::InvalidDigest(e.to_string()))?;
    Digest::try_from(text.trim())
}

pub struct FilesystemContentStore {
    root: PathBuf,
}

impl FilesystemContentStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    async fn enumerate(&self, callback: &mut (dyn FnMut(Descriptor) + Send)) -> Result<()> {
        let blobs_root = self.root.join("blobs");
        let mut algo_dirs = match tokio::fs::read_dir(&blobs_root).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::statement_failed(e)),
        };

        while let Some(algo_dir) = algo_dirs.next_entry().await.map_err(Error::statement_failed)? {
            let mut shard_dirs = tokio::fs::read_dir(algo_dir.path()).await.map_err(Error::statement_failed)?;
            while let Some(shard_dir) = shard_dirs.next_entry().await.map_err(Error::statement_failed)? {
                let mut digest_dirs =
                    tokio::fs::read_dir(shard_dir.path()).await.map_err(Error::statement_failed)?;
                while let Some(digest_dir) = digest_dirs.next_entry().await.map_err(Error::statement_failed)? {
                    let data_path = digest_dir.path().join("data");
                    let metadata = match tokio::fs::metadata(&data_path).await {
                        Ok(m) => m,
                        Err(_) => continue,
                    };

                    let algo = algo_dir.file_name();
                    let hex = digest_dir.file_name();
                    let text = format!("{}:{}", algo.to_string_lossy(), hex.to_string_lossy());
                    let digest = match Digest::try_from(text.as_str()) {
                        Ok(d) => d,
                        Err(_) => continue,
                    };

                    callback(Descriptor {
                        digest,
                        media_type: "application/octet-stream".to_string(),
                        size: metadata.len(),
                    });
                }
            }
        }

        Ok(())
    }

    async fn stat(&self, digest: &Digest) -> Result<Descriptor> {
        let path = blob_path(&self.root, digest);
        let metadata = tokio::fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::PathNotFound(path.display().to_string())
            } else {
                Error::statement_failed(e)
            }
        })?;
        Ok(Descriptor {
            digest: digest.clone(),
            media_type: "application/octet-stream".to_string(),
            size: metadata.len(),
        })
    }

    async fn get(&self, digest: &Digest) -> Result<ObjectBody> {
        let bytes = read_file(&blob_path(&self.root, digest)).await?;
        Ok(Box::pin(stream::once(async move { Ok(Bytes::from(bytes)) })))
    }
}

/// Copies blob bytes from a `FilesystemContentStore` into a second,
/// identically-laid-out tree. Used when the importer's `destination_root`
/// differs from its source (the common case: bootstrapping a registry
/// backed by the new datastore from a legacy on-disk registry).
pub struct FilesystemBlobTransfer {
    source: Arc<FilesystemContentStore>,
    destination_root: PathBuf,
}

impl FilesystemBlobTransfer {
    pub fn new(source: Arc<FilesystemContentStore>, destination_root: PathBuf) -> Self {
        Self { source, destination_root }
    }
}

#[async_trait]
impl BlobTransfer for FilesystemBlobTransfer {
    async fn transfer(&self, digest: &Digest) -> Result<()> {
        use futures::StreamExt;

        let mut body = self.source.get(digest).await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        let dest_path = blob_path(&self.destination_root, digest);
        if let Some(parent) = dest_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(Error::statement_failed)?;
        }
        tokio::fs::write(&dest_path, bytes).await.map_err(Error::statement_failed)
    }
}

pub struct FilesystemRepositorySource {
    root: PathBuf,
}

impl FilesystemRepositorySource {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn repositories_root(&self) -> PathBuf {
        self.root.join("repositories")
    }

    /// Recursively walks `repositories/`, treating any directory that
    /// contains a `_manifests` child as a repository leaf (mirrors the
    /// nested `a/b/c` repository paths §4.6 step 4 creates via
    /// `CreateOrFindByPath`). Boxed because an `async fn` can't call itself
    /// directly.
    fn walk_repositories<'a>(
        &'a self,
        dir: PathBuf,
        prefix: String,
        out: &'a mut Vec<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if tokio::fs::metadata(dir.join("_manifests")).await.is_ok() {
                out.push(prefix.clone());
            }

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(Error::statement_failed(e)),
            };

            while let Some(entry) = entries.next_entry().await.map_err(Error::statement_failed)? {
                if entry.file_name() == "_manifests" {
                    continue;
                }
                let file_type = entry.file_type().await.map_err(Error::statement_failed)?;
                if !file_type.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_prefix = if prefix.is_empty() { name.clone() } else { format!("{prefix}/{name}") };
                self.walk_repositories(entry.path(), child_prefix, out).await?;
            }

            Ok(())
        })
    }

    fn repo_dir(&self, repository: &str) -> PathBuf {
        self.repositories_root().join(repository)
    }
}

#[async_trait]
impl RepositorySource for FilesystemRepositorySource {
    async fn repositories(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.walk_repositories(self.repositories_root(), String::new(), &mut out).await?;
        Ok(out)
    }

    async fn tags(&self, repository: &str) -> Result<Vec<(String, Digest)>> {
        let tags_dir = self.repo_dir(repository).join("_manifests").join("tags");
        let mut entries = match tokio::fs::read_dir(&tags_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::RepositoryUnknown(repository.to_string()))
            }
            Err(e) => return Err(Error::statement_failed(e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(Error::statement_failed)? {
            let tag = entry.file_name().to_string_lossy().into_owned();
            let link = entry.path().join("link");
            out.push((tag, read_link_digest(&link).await?));
        }
        Ok(out)
    }

    async fn manifest_digests(&self, repository: &str) -> Result<Vec<Digest>> {
        let revisions_dir = self.repo_dir(repository).join("_manifests").join("revisions");
        let mut algo_dirs = match tokio::fs::read_dir(&revisions_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::RepositoryUnknown(repository.to_string()))
            }
            Err(e) => return Err(Error::statement_failed(e)),
        };

        let mut out = Vec::new();
        while let Some(algo_dir) = algo_dirs.next_entry().await.map_err(Error::statement_failed)? {
            let mut digest_dirs =
                tokio::fs::read_dir(algo_dir.path()).await.map_err(Error::statement_failed)?;
            while let Some(digest_dir) = digest_dirs.next_entry().await.map_err(Error::statement_failed)? {
                let link = digest_dir.path().join("link");
                out.push(read_link_digest(&link).await?);
            }
        }
        Ok(out)
    }

    async fn manifest(&self, _repository: &str, digest: &Digest) -> Result<ManifestPayload> {
        let bytes = read_file(&blob_path(&self.root, digest)).await?;
        Ok(ManifestPayload {
            digest: digest.clone(),
            media_type: None,
            bytes,
        })
    }
}
