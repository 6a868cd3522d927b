//! In-memory [`DestinationStore`] for tests and rehearsals.
//!
//! Holds articles, authors, and assets behind a single `Mutex`. Author ids
//! and slugs are unique, assets are content-addressed (re-uploading the
//! same bytes returns the same handle), and transactions are all-or-nothing.
//! Commit and upload failures can be injected to exercise recovery paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{
    ArticleField, ArticleRef, AssetHandle, DestinationArticle, DestinationAuthor, NewAuthor,
    Reference, Transaction, DRAFT_PREFIX,
};

use super::{CreateOutcome, DestinationStore};

#[derive(Default)]
struct State {
    articles: BTreeMap<String, DestinationArticle>,
    authors: Vec<DestinationAuthor>,
    /// content hash → (asset id, filename)
    assets: HashMap<String, (String, String)>,
    writes: u64,
    commit_attempts: u64,
    /// commit attempt → injected failure message
    failing_commits: HashMap<u64, String>,
    fail_uploads: bool,
    fail_author_listing: bool,
}

/// In-memory destination store.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an article that an earlier import step would have created.
    pub fn add_article(&self, id: &str, slug: &str) {
        self.state().articles.insert(
            id.to_string(),
            DestinationArticle {
                id: id.to_string(),
                slug: slug.to_string(),
                ..Default::default()
            },
        );
    }

    /// Seed an existing author. Does not count as a pipeline write.
    pub fn add_author(&self, id: &str, name: &str, slug: &str) {
        self.state().authors.push(DestinationAuthor {
            id: id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            bio: None,
        });
    }

    pub fn article(&self, id: &str) -> Option<DestinationArticle> {
        self.state().articles.get(id).cloned()
    }

    pub fn authors(&self) -> Vec<DestinationAuthor> {
        self.state().authors.clone()
    }

    pub fn asset_count(&self) -> usize {
        self.state().assets.len()
    }

    /// Number of successful mutations (creates, commits, new uploads).
    pub fn writes(&self) -> u64 {
        self.state().writes
    }

    /// Make the `n`-th commit attempt (1-based, counted across the store's
    /// lifetime) fail.
    pub fn fail_commit_attempt(&self, n: u64) {
        self.fail_commit_attempt_with(n, &format!("injected failure on commit #{n}"));
    }

    /// Like [`fail_commit_attempt`](Self::fail_commit_attempt), with the
    /// store's error message chosen by the caller.
    pub fn fail_commit_attempt_with(&self, n: u64, message: &str) {
        self.state().failing_commits.insert(n, message.to_string());
    }

    pub fn fail_author_listing(&self, fail: bool) {
        self.state().fail_author_listing = fail;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.state().fail_uploads = fail;
    }
}

fn apply_field(article: &mut DestinationArticle, key: &str, value: &Value) -> Result<()> {
    match key {
        "author" => {
            let reference: Reference = serde_json::from_value(value.clone())?;
            article.author = Some(reference);
        }
        "mainImage" => article.main_image = Some(value.clone()),
        "heroImageUrl" => {
            let url = value
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("heroImageUrl must be a string"))?;
            article.hero_image_url = Some(url.to_string());
        }
        other => bail!("unknown article field: {}", other),
    }
    Ok(())
}

#[async_trait]
impl DestinationStore for InMemoryStore {
    async fn list_authors(&self) -> Result<Vec<DestinationAuthor>> {
        let state = self.state();
        if state.fail_author_listing {
            bail!("author query failed (HTTP 503)");
        }
        Ok(state.authors.clone())
    }

    async fn find_author_by_slug(&self, slug: &str) -> Result<Option<DestinationAuthor>> {
        Ok(self.state().authors.iter().find(|a| a.slug == slug).cloned())
    }

    async fn create_author(&self, author: &NewAuthor) -> Result<CreateOutcome> {
        let mut state = self.state();
        if state
            .authors
            .iter()
            .any(|a| a.id == author.id || a.slug == author.slug)
        {
            return Ok(CreateOutcome::SlugTaken);
        }
        state.authors.push(DestinationAuthor {
            id: author.id.clone(),
            name: author.name.clone(),
            slug: author.slug.clone(),
            bio: Some(String::new()),
        });
        state.writes += 1;
        Ok(CreateOutcome::Created(author.id.clone()))
    }

    async fn articles_missing(&self, field: ArticleField) -> Result<Vec<ArticleRef>> {
        let state = self.state();
        let mut refs: Vec<ArticleRef> = state
            .articles
            .values()
            .filter(|a| !a.id.starts_with(DRAFT_PREFIX))
            .filter(|a| match field {
                ArticleField::Author => a.author.is_none(),
                ArticleField::MainImage => a.main_image.is_none(),
            })
            .map(|a| ArticleRef {
                id: a.id.clone(),
                slug: a.slug.clone(),
            })
            .collect();
        refs.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(refs)
    }

    async fn commit(&self, tx: &Transaction) -> Result<()> {
        let mut state = self.state();
        state.commit_attempts += 1;
        let attempt = state.commit_attempts;
        if let Some(message) = state.failing_commits.get(&attempt) {
            bail!("transaction rejected by store: {}", message);
        }

        // Validate against a scratch copy so a bad patch leaves nothing applied.
        let mut staged = state.articles.clone();
        for patch in tx.patches() {
            let article = staged
                .get_mut(&patch.id)
                .ok_or_else(|| anyhow::anyhow!("document not found: {}", patch.id))?;
            for (key, value) in &patch.set {
                apply_field(article, key, value)?;
            }
        }

        state.articles = staged;
        state.writes += 1;
        Ok(())
    }

    async fn upload_image(&self, bytes: Vec<u8>, filename: &str) -> Result<AssetHandle> {
        let mut state = self.state();
        if state.fail_uploads {
            bail!("asset upload rejected (HTTP 413)");
        }
        let hash = hex::encode(Sha256::digest(&bytes));
        if let Some((id, _)) = state.assets.get(&hash) {
            return Ok(AssetHandle(id.clone()));
        }
        let id = format!("image-{}", &hash[..24]);
        state
            .assets
            .insert(hash, (id.clone(), filename.to_string()));
        state.writes += 1;
        Ok(AssetHandle(id))
    }
}
