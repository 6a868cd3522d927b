//! Entity resolution: author names → author ids, media ids → image URLs.
//!
//! The resolver owns the run's author map (derived slug → destination id).
//! It is seeded once from every author already in the destination and
//! grows as new authors are created, so within a run each slug is created
//! at most once. Across runs, creation uses the deterministic id
//! `author-<slug>`; a second creation is refused by the store and resolved
//! by fetching the existing document by slug.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::author_cache::AuthorNames;
use crate::models::{NewAuthor, SourceRecord};
use crate::outcome::SkipReason;
use crate::slug::derive_slug;
use crate::source::SourceClient;
use crate::store::{CreateOutcome, DestinationStore};

pub struct EntityResolver {
    store: Arc<dyn DestinationStore>,
    source: SourceClient,
    names: AuthorNames,
    authors: HashMap<String, String>,
    seeded: bool,
    created: u64,
}

impl EntityResolver {
    /// Build a resolver with the author map seeded from the destination.
    ///
    /// # Errors
    ///
    /// Fails if the destination cannot list authors; without the seed the
    /// run would create duplicates, so this is not recoverable by skipping.
    pub async fn load(
        store: Arc<dyn DestinationStore>,
        source: SourceClient,
        names: AuthorNames,
    ) -> Result<Self> {
        let mut existing = store.list_authors().await?;
        existing.sort_by(|a, b| a.id.cmp(&b.id));

        let mut authors = HashMap::with_capacity(existing.len());
        for author in existing {
            let slug = derive_slug(&author.slug);
            if let Some(kept) = authors.get(&slug) {
                warn!(
                    %slug,
                    kept = %kept,
                    duplicate = %author.id,
                    "destination already holds duplicate author slug"
                );
                continue;
            }
            authors.insert(slug, author.id);
        }
        info!(authors = authors.len(), "author map seeded");

        Ok(Self {
            store,
            source,
            names,
            authors,
            seeded: true,
            created: 0,
        })
    }

    /// A resolver for media only. Skips the author listing; author
    /// resolution on it always fails.
    pub fn media_only(store: Arc<dyn DestinationStore>, source: SourceClient) -> Self {
        Self {
            store,
            source,
            names: AuthorNames::default(),
            authors: HashMap::new(),
            seeded: false,
            created: 0,
        }
    }

    /// The display name to attribute a record to.
    ///
    /// Prefers the embedded author; falls back to the persisted id → name
    /// cache.
    pub fn author_name<'a>(&'a self, record: &'a SourceRecord) -> Result<&'a str, SkipReason> {
        if let Some(name) = record.embedded_author_name() {
            return Ok(name);
        }
        match record.author {
            Some(id) => self.names.name_for(id).ok_or_else(|| {
                SkipReason::AuthorUnresolved(format!("no name known for author id {}", id))
            }),
            None => Err(SkipReason::AuthorUnresolved("record has no author".to_string())),
        }
    }

    /// Resolve a display name to a destination author id, creating the
    /// author on first sight.
    pub async fn resolve_author(&mut self, name: &str) -> Result<String, SkipReason> {
        if !self.seeded {
            return Err(SkipReason::AuthorUnresolved(
                "author map was not loaded for this run".to_string(),
            ));
        }
        let slug = derive_slug(name);
        if slug.is_empty() {
            return Err(SkipReason::AuthorUnresolved(format!(
                "name {:?} has no usable characters",
                name
            )));
        }

        if let Some(id) = self.authors.get(&slug) {
            debug!(%slug, %id, "author map hit");
            return Ok(id.clone());
        }

        let author = NewAuthor {
            id: format!("author-{}", slug),
            name: name.trim().to_string(),
            slug: slug.clone(),
        };

        let id = match self.store.create_author(&author).await {
            Ok(CreateOutcome::Created(id)) => {
                self.created += 1;
                info!(%slug, %id, name = %author.name, "created author");
                id
            }
            Ok(CreateOutcome::SlugTaken) => self.fetch_existing(&slug).await?,
            Err(e) => {
                return Err(SkipReason::AuthorUnresolved(format!(
                    "create failed: {:#}",
                    e
                )))
            }
        };

        self.authors.insert(slug, id.clone());
        Ok(id)
    }

    async fn fetch_existing(&self, slug: &str) -> Result<String, SkipReason> {
        match self.store.find_author_by_slug(slug).await {
            Ok(Some(existing)) => {
                info!(%slug, id = %existing.id, "author already existed, reusing");
                Ok(existing.id)
            }
            Ok(None) => Err(SkipReason::AuthorUnresolved(format!(
                "author id for {} is taken but no author has that slug",
                slug
            ))),
            Err(e) => Err(SkipReason::AuthorUnresolved(format!(
                "lookup after conflict failed: {:#}",
                e
            ))),
        }
    }

    /// Resolve a media id to the URL of its image.
    pub async fn resolve_media(&self, media_id: u64) -> Result<String, SkipReason> {
        self.source
            .fetch_media(media_id)
            .await
            .and_then(|item| item.best_url())
            .ok_or(SkipReason::MediaUnresolved(media_id))
    }

    /// Authors created by this resolver during the run.
    pub fn authors_created(&self) -> u64 {
        self.created
    }

    pub fn known_authors(&self) -> usize {
        self.authors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::store::memory::InMemoryStore;
    use mockito::{Matcher, Server};

    fn offline_source() -> SourceClient {
        SourceClient::new(&SourceConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap()
    }

    async fn resolver_over(store: Arc<InMemoryStore>) -> EntityResolver {
        EntityResolver::load(store, offline_source(), AuthorNames::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_slug_resolves_to_one_author() {
        let store = Arc::new(InMemoryStore::new());
        let mut resolver = resolver_over(store.clone()).await;

        let a = resolver.resolve_author("Jane Doe").await.unwrap();
        let b = resolver.resolve_author("jane   doe!!").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a, "author-jane-doe");
        assert_eq!(store.authors().len(), 1);
        assert_eq!(resolver.authors_created(), 1);
    }

    #[tokio::test]
    async fn seeded_authors_are_reused() {
        let store = Arc::new(InMemoryStore::new());
        store.add_author("legacy-42", "Jane Doe", "jane-doe");
        let mut resolver = resolver_over(store.clone()).await;

        assert_eq!(resolver.resolve_author("JANE DOE").await.unwrap(), "legacy-42");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn creation_conflict_falls_back_to_existing() {
        let store = Arc::new(InMemoryStore::new());
        let mut resolver = resolver_over(store.clone()).await;

        // Another run created the author after our map was seeded.
        store.add_author("other-run", "O'Brien & Sons", "o-brien-sons");

        let id = resolver.resolve_author("O'Brien & Sons").await.unwrap();
        assert_eq!(id, "other-run");
        assert_eq!(store.authors().len(), 1);
        assert_eq!(resolver.authors_created(), 0);
    }

    #[tokio::test]
    async fn blank_names_do_not_create_authors() {
        let store = Arc::new(InMemoryStore::new());
        let mut resolver = resolver_over(store.clone()).await;
        let err = resolver.resolve_author(" ?! ").await.unwrap_err();
        assert!(matches!(err, SkipReason::AuthorUnresolved(_)));
        assert!(store.authors().is_empty());
    }

    #[tokio::test]
    async fn author_name_prefers_embed_then_cache() {
        let store = Arc::new(InMemoryStore::new());
        let mut names = AuthorNames::default();
        names.insert(7, "Cached Name");
        let resolver = EntityResolver::load(store, offline_source(), names)
            .await
            .unwrap();

        let embedded: SourceRecord = serde_json::from_value(serde_json::json!({
            "slug": "a", "author": 7, "_embedded": { "author": [ { "name": "Inline Name" } ] }
        }))
        .unwrap();
        let by_id: SourceRecord =
            serde_json::from_value(serde_json::json!({ "slug": "b", "author": 7 })).unwrap();
        let unknown: SourceRecord =
            serde_json::from_value(serde_json::json!({ "slug": "c", "author": 8 })).unwrap();

        assert_eq!(resolver.author_name(&embedded).unwrap(), "Inline Name");
        assert_eq!(resolver.author_name(&by_id).unwrap(), "Cached Name");
        assert!(resolver.author_name(&unknown).is_err());
    }

    #[tokio::test]
    async fn media_resolves_direct_or_rendition() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/media/5")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"source_url":"https://x/img.jpg"}"#)
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/media/6")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "source_url": null,
                    "media_details": { "sizes": { "large": {
                        "source_url": "https://x/large.jpg", "width": 1024, "height": 768
                    } } }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _m = server
            .mock("GET", "/media/7")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let source = SourceClient::new(&SourceConfig {
            base_url: server.url(),
            page_delay_ms: 0,
            ..Default::default()
        })
        .unwrap();
        let resolver = EntityResolver::load(
            Arc::new(InMemoryStore::new()),
            source,
            AuthorNames::default(),
        )
        .await
        .unwrap();

        assert_eq!(resolver.resolve_media(5).await.unwrap(), "https://x/img.jpg");
        assert_eq!(resolver.resolve_media(6).await.unwrap(), "https://x/large.jpg");
        assert_eq!(
            resolver.resolve_media(7).await.unwrap_err(),
            SkipReason::MediaUnresolved(7)
        );
    }

    #[tokio::test]
    async fn media_only_resolver_never_creates_authors() {
        let store = Arc::new(InMemoryStore::new());
        let mut resolver = EntityResolver::media_only(store.clone(), offline_source());
        let err = resolver.resolve_author("Jane Doe").await.unwrap_err();
        assert!(matches!(err, SkipReason::AuthorUnresolved(_)));
        assert!(store.authors().is_empty());
    }
}
