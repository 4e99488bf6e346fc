//! Consumed interfaces (§6): the external blob content driver the importer
//! enumerates from, and the blob transfer service it streams bytes through.
//!
//! Both are pure trait objects here -- this datastore never stores or reads
//! blob bytes itself (§1 Non-goals). Shape grounded on
//! `portfolio_objectstore::ObjectStore`: async-trait, a validated `Key`-like
//! addressing type (here just the content digest), `Result` wrapping a
//! crate-local error.

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

use crate::digest::Digest;
use crate::Result;

pub type ObjectBody = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Metadata the content store returns for one stored object, ahead of
/// fetching its bytes.
#[derive(Clone, Debug)]
pub struct Descriptor {
    pub digest: Digest,
    pub media_type: String,
    pub size: u64,
}

/// The legacy blob-store layout the filesystem importer (C6) walks.
///
/// `PathNotFound` (via `Error::NotFound`, see the importer's own
/// classification) distinguishes "this repository's folder is missing" --
/// soft-skip -- from any other failure, which aborts the run (§7).
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Walk every object in the store, invoking `callback` once per
    /// descriptor found. Implementations stream rather than buffer the full
    /// listing in memory.
    async fn enumerate(
        &self,
        callback: &mut (dyn FnMut(Descriptor) + Send),
    ) -> Result<()>;

    async fn stat(&self, digest: &Digest) -> Result<Descriptor>;

    async fn get(&self, digest: &Digest) -> Result<ObjectBody>;
}

/// Copies blob bytes from the content store to the destination object
/// store once the importer has upserted the corresponding row (§4.6 step 2).
///
/// Transfer failures abort the current repository import (§6).
#[async_trait]
pub trait BlobTransfer: Send + Sync + 'static {
    async fn transfer(&self, digest: &Digest) -> Result<()>;
}
