//! Destination store abstraction.
//!
//! The [`DestinationStore`] trait is the only way the pipelines talk to the
//! headless backend. Two implementations ship:
//!
//! - [`http::HttpStore`]: the real HTTP API (query, mutate, asset upload).
//! - [`memory::InMemoryStore`]: a process-local store for tests and
//!   rehearsals, with failure injection.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod http;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    ArticleField, ArticleRef, AssetHandle, DestinationAuthor, NewAuthor, Transaction,
};

/// Result of an author creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The document was created with this id.
    Created(String),
    /// A document with the same id or slug already exists.
    SlugTaken,
}

/// Abstract destination backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_authors`](DestinationStore::list_authors) | All authors, to seed the author map |
/// | [`find_author_by_slug`](DestinationStore::find_author_by_slug) | Fallback after a creation conflict |
/// | [`create_author`](DestinationStore::create_author) | Create one author, refusing duplicates |
/// | [`articles_missing`](DestinationStore::articles_missing) | Articles whose field is still unset |
/// | [`commit`](DestinationStore::commit) | Apply a transaction atomically |
/// | [`upload_image`](DestinationStore::upload_image) | Store a binary, return its handle |
#[async_trait]
pub trait DestinationStore: Send + Sync {
    async fn list_authors(&self) -> Result<Vec<DestinationAuthor>>;

    async fn find_author_by_slug(&self, slug: &str) -> Result<Option<DestinationAuthor>>;

    /// Create an author. A duplicate id or slug must come back as
    /// [`CreateOutcome::SlugTaken`], not as an error.
    async fn create_author(&self, author: &NewAuthor) -> Result<CreateOutcome>;

    async fn articles_missing(&self, field: ArticleField) -> Result<Vec<ArticleRef>>;

    /// Commit every patch in `tx` or none of them.
    async fn commit(&self, tx: &Transaction) -> Result<()>;

    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<AssetHandle>;
}
