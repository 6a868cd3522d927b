//! Batch commit and the remaining-work set.
//!
//! One page of source records becomes one [`StagedBatch`]; the committer
//! turns it into a single transaction. Local state follows the store, never
//! leads it: slugs leave the remaining-work set only after the store has
//! confirmed the commit. A rejected batch changes nothing locally, so its
//! slugs are still pending for the next page that mentions them and for the
//! next run.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{ArticleRef, Transaction, DRAFT_PREFIX};
use crate::outcome::{truncate_reason, RunTally, SkipReason, MAX_REASON_CHARS};
use crate::store::DestinationStore;

/// Articles still missing the target field, keyed by source slug.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemainingWork {
    pending: BTreeMap<String, String>,
}

impl RemainingWork {
    /// Build the set from the destination's answer.
    ///
    /// Two articles sharing a slug cannot both be matched to one source
    /// record. The published id (no `drafts.` prefix) is kept over a draft,
    /// otherwise the smaller id; the collision is logged either way.
    pub fn from_articles(articles: Vec<ArticleRef>) -> Self {
        let mut pending: BTreeMap<String, String> = BTreeMap::new();
        for article in articles {
            let Some(kept) = pending.get(&article.slug) else {
                pending.insert(article.slug, article.id);
                continue;
            };
            let keep_new = preferred(&article.id, kept);
            let (winner, loser) = if keep_new {
                (&article.id, kept)
            } else {
                (kept, &article.id)
            };
            warn!(
                slug = %article.slug,
                kept = %winner,
                dropped = %loser,
                "several articles share a slug"
            );
            if keep_new {
                pending.insert(article.slug, article.id);
            }
        }
        Self { pending }
    }

    pub fn article_for(&self, slug: &str) -> Option<&str> {
        self.pending.get(slug).map(String::as_str)
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.pending.contains_key(slug)
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn complete(&mut self, slug: &str) {
        self.pending.remove(slug);
    }
}

fn is_draft(id: &str) -> bool {
    id.starts_with(DRAFT_PREFIX)
}

/// Whether `candidate` should replace `current` for the same slug.
fn preferred(candidate: &str, current: &str) -> bool {
    match (is_draft(candidate), is_draft(current)) {
        (false, true) => true,
        (true, false) => false,
        _ => candidate < current,
    }
}

struct StagedPatch {
    slug: String,
    article_id: String,
    set: Map<String, Value>,
}

/// Patches resolved for one page, in source order.
#[derive(Default)]
pub struct StagedBatch {
    patches: Vec<StagedPatch>,
}

impl StagedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a patch. Staging the same slug twice keeps the later fields.
    pub fn stage(&mut self, slug: &str, article_id: &str, set: Map<String, Value>) {
        if let Some(existing) = self.patches.iter_mut().find(|p| p.slug == slug) {
            existing.article_id = article_id.to_string();
            existing.set = set;
            return;
        }
        self.patches.push(StagedPatch {
            slug: slug.to_string(),
            article_id: article_id.to_string(),
            set,
        });
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn transaction(&self) -> Transaction {
        let mut tx = Transaction::new();
        for p in &self.patches {
            tx.patch(&p.article_id, p.set.clone());
        }
        tx
    }
}

/// What happened to one staged batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing was staged; no round trip was made.
    Empty,
    Committed(usize),
    Failed { staged: usize, reason: String },
}

pub struct BatchCommitter {
    store: Arc<dyn DestinationStore>,
    remaining: RemainingWork,
}

impl BatchCommitter {
    pub fn new(store: Arc<dyn DestinationStore>, remaining: RemainingWork) -> Self {
        Self { store, remaining }
    }

    /// Destination article id still waiting on `slug`.
    pub fn pending_article(&self, slug: &str) -> Result<String, SkipReason> {
        self.remaining
            .article_for(slug)
            .map(str::to_string)
            .ok_or(SkipReason::ArticleNotPending)
    }

    pub fn remaining(&self) -> &RemainingWork {
        &self.remaining
    }

    /// Commit `batch` as one transaction and fold the result into `tally`.
    pub async fn commit(&mut self, batch: StagedBatch, tally: &mut RunTally) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::Empty;
        }

        let staged = batch.len();
        match self.store.commit(&batch.transaction()).await {
            Ok(()) => {
                for p in &batch.patches {
                    self.remaining.complete(&p.slug);
                }
                tally.updated += staged as u64;
                tally.batches_committed += 1;
                info!(
                    patched = staged,
                    remaining = self.remaining.len(),
                    "batch committed"
                );
                BatchOutcome::Committed(staged)
            }
            Err(e) => {
                let reason = truncate_reason(&format!("{:#}", e), MAX_REASON_CHARS);
                tally.failed += staged as u64;
                tally.batches_failed += 1;
                warn!(
                    staged,
                    remaining = self.remaining.len(),
                    %reason,
                    "batch commit failed, slugs stay pending"
                );
                BatchOutcome::Failed { staged, reason }
            }
        }
    }
}
