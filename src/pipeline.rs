//! Pipeline orchestration.
//!
//! Coordinates one run: remaining-work set → paginator → per-record
//! resolution → one transaction per page. Two targets share the loop:
//!
//! | Target | Field filled | Relation resolved |
//! |--------|--------------|-------------------|
//! | [`Target::Authors`] | `author` | embedded author name → author id |
//! | [`Target::Images`] | `mainImage`, `heroImageUrl` | media id → URL → uploaded asset |
//!
//! The run walks `STARTING → (FETCH_PAGE → RESOLVE_BATCH → COMMIT_BATCH)* → DONE`
//! and stops as soon as the paginator is exhausted or nothing is left to
//! patch. There is no failed state: record and batch failures land in the
//! tally and the run carries on.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::author_cache::AuthorNames;
use crate::committer::{BatchCommitter, RemainingWork, StagedBatch};
use crate::models::{ArticleField, AssetHandle, Reference, SourceRecord};
use crate::outcome::{RunTally, SkipReason};
use crate::progress::{SyncProgressEvent, SyncProgressReporter};
use crate::resolver::EntityResolver;
use crate::slug::derive_slug;
use crate::source::SourceClient;
use crate::store::DestinationStore;
use crate::transcoder::AssetTranscoder;

/// Which article field a run fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Authors,
    Images,
}

impl Target {
    pub fn field(&self) -> ArticleField {
        match self {
            Target::Authors => ArticleField::Author,
            Target::Images => ArticleField::MainImage,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Authors => "authors",
            Target::Images => "images",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Starting,
    FetchPage,
    ResolveBatch,
    CommitBatch,
    Done,
}

/// Everything a run mutates, owned in one place.
pub struct SyncContext {
    target: Target,
    resolver: EntityResolver,
    transcoder: AssetTranscoder,
    committer: BatchCommitter,
    tally: RunTally,
    phase: RunPhase,
}

impl SyncContext {
    /// Load the remaining-work set and, for the authors target, seed the
    /// author map.
    pub async fn load(
        store: Arc<dyn DestinationStore>,
        source: &SourceClient,
        names: AuthorNames,
        target: Target,
    ) -> Result<Self> {
        let pending = store
            .articles_missing(target.field())
            .await
            .with_context(|| format!("Failed to list articles missing {}", target.field()))?;
        let remaining = RemainingWork::from_articles(pending);
        info!(
            pipeline = target.name(),
            remaining = remaining.len(),
            "remaining-work set loaded"
        );

        let resolver = match target {
            Target::Authors => EntityResolver::load(store.clone(), source.clone(), names)
                .await
                .context("Failed to seed author map")?,
            Target::Images => EntityResolver::media_only(store.clone(), source.clone()),
        };
        let transcoder = AssetTranscoder::new(source.http().clone(), store.clone());
        let committer = BatchCommitter::new(store, remaining);

        Ok(Self {
            target,
            resolver,
            transcoder,
            committer,
            tally: RunTally::default(),
            phase: RunPhase::Starting,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn tally(&self) -> &RunTally {
        &self.tally
    }

    pub fn remaining(&self) -> &RemainingWork {
        self.committer.remaining()
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(pipeline = self.target.name(), from = ?self.phase, to = ?phase, "phase");
        self.phase = phase;
    }

    /// Resolve every record of a page into a staged batch, counting skips.
    async fn resolve_page(&mut self, records: &[SourceRecord]) -> StagedBatch {
        let mut batch = StagedBatch::new();
        for record in records {
            match self.resolve_record(record).await {
                Ok((article_id, set)) => batch.stage(&record.slug, &article_id, set),
                Err(reason) => self.skip(record, &reason),
            }
        }
        batch
    }

    async fn resolve_record(
        &mut self,
        record: &SourceRecord,
    ) -> Result<(String, Map<String, Value>), SkipReason> {
        let article_id = self.committer.pending_article(&record.slug)?;
        let set = match self.target {
            Target::Authors => {
                let name = self.resolver.author_name(record)?.to_string();
                let author_id = self.resolver.resolve_author(&name).await?;
                author_fields(&author_id)
            }
            Target::Images => {
                let media_id = record.media_id().ok_or(SkipReason::NoMedia)?;
                let url = self.resolver.resolve_media(media_id).await?;
                let asset = self.transcoder.transcode(&url).await?;
                image_fields(&asset, &url)
            }
        };
        Ok((article_id, set))
    }

    /// Check a record the way a real run would, without any write.
    async fn plan_record(&self, record: &SourceRecord) -> Result<(), SkipReason> {
        self.committer.pending_article(&record.slug)?;
        match self.target {
            Target::Authors => {
                let name = self.resolver.author_name(record)?;
                if derive_slug(name).is_empty() {
                    return Err(SkipReason::AuthorUnresolved(format!(
                        "name {:?} has no usable characters",
                        name
                    )));
                }
            }
            Target::Images => {
                let media_id = record.media_id().ok_or(SkipReason::NoMedia)?;
                self.resolver.resolve_media(media_id).await?;
            }
        }
        Ok(())
    }

    fn skip(&mut self, record: &SourceRecord, reason: &SkipReason) {
        self.tally.record_skip(reason);
        match reason {
            SkipReason::NoMedia | SkipReason::ArticleNotPending => {
                info!(slug = %record.slug, %reason, "skipped")
            }
            _ => warn!(slug = %record.slug, %reason, "record failed"),
        }
    }

    fn report_page(&self, progress: &dyn SyncProgressReporter, page: u64) {
        progress.report(SyncProgressEvent::Page {
            pipeline: self.target.name().to_string(),
            page,
            updated: self.tally.updated,
            failed: self.tally.failed,
            remaining: self.remaining().len() as u64,
        });
    }
}

/// `author` set to a typed reference.
pub fn author_fields(author_id: &str) -> Map<String, Value> {
    let mut set = Map::new();
    set.insert(
        ArticleField::Author.as_str().to_string(),
        serde_json::json!(Reference::to(author_id)),
    );
    set
}

/// `mainImage` set to an image pointing at the uploaded asset, plus the
/// original URL as `heroImageUrl`.
pub fn image_fields(asset: &AssetHandle, source_url: &str) -> Map<String, Value> {
    let mut set = Map::new();
    set.insert(
        ArticleField::MainImage.as_str().to_string(),
        serde_json::json!({
            "_type": "image",
            "asset": Reference::to(asset.as_str()),
        }),
    );
    set.insert("heroImageUrl".to_string(), Value::from(source_url));
    set
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub target: Target,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u128,
    pub tally: RunTally,
    /// Records a dry run would have patched.
    pub planned: u64,
    pub authors_created: u64,
    pub remaining: usize,
}

impl RunSummary {
    /// Operator-facing summary, ending in `ok`.
    pub fn render(&self) -> String {
        let t = &self.tally;
        let mut out = String::new();
        if self.dry_run {
            out.push_str(&format!("{} (dry-run)\n", self.target.name()));
        } else {
            out.push_str(&format!("{}\n", self.target.name()));
        }
        out.push_str(&format!(
            "  started: {}\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("  pages: {}, records: {}\n", t.pages, t.records));
        if self.dry_run {
            out.push_str(&format!("  would update: {}\n", self.planned));
        }
        out.push_str(&format!(
            "  updated: {}, failed: {}, skipped: {}\n",
            t.updated, t.failed, t.skipped
        ));
        out.push_str(&format!("  not found: {}\n", t.not_found));
        out.push_str(&format!(
            "  batches: {} committed, {} failed\n",
            t.batches_committed, t.batches_failed
        ));
        if self.target == Target::Authors {
            out.push_str(&format!("  authors created: {}\n", self.authors_created));
        }
        out.push_str(&format!("  remaining: {}\n", self.remaining));
        out.push_str(&format!("  elapsed: {}ms\n", self.elapsed_ms));
        out.push_str("ok\n");
        out
    }
}

/// Run one pipeline to completion.
///
/// # Errors
///
/// Only setup failures propagate: the remaining-work query or the author
/// listing. Once the loop starts, every failure is counted instead.
pub async fn run_pipeline(
    store: Arc<dyn DestinationStore>,
    source: &SourceClient,
    names: AuthorNames,
    target: Target,
    dry_run: bool,
    progress: &dyn SyncProgressReporter,
) -> Result<RunSummary> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let mut ctx = SyncContext::load(store, source, names, target).await?;
    progress.report(SyncProgressEvent::Starting {
        pipeline: target.name().to_string(),
        remaining: ctx.remaining().len() as u64,
    });

    let mut planned = 0u64;
    let mut posts = source.posts();

    loop {
        if ctx.remaining().is_empty() {
            info!(pipeline = target.name(), "no articles left to patch");
            break;
        }

        ctx.enter(RunPhase::FetchPage);
        let Some(records) = posts.next_page().await else {
            break;
        };
        ctx.tally.pages += 1;
        ctx.tally.records += records.len() as u64;
        let page = ctx.tally.pages;

        ctx.enter(RunPhase::ResolveBatch);
        if dry_run {
            for record in &records {
                match ctx.plan_record(record).await {
                    Ok(()) => planned += 1,
                    Err(reason) => ctx.skip(record, &reason),
                }
            }
            ctx.report_page(progress, page);
            continue;
        }
        let batch = ctx.resolve_page(&records).await;

        ctx.enter(RunPhase::CommitBatch);
        ctx.committer.commit(batch, &mut ctx.tally).await;

        info!(
            pipeline = target.name(),
            page,
            updated = ctx.tally.updated,
            failed = ctx.tally.failed,
            skipped = ctx.tally.skipped,
            remaining = ctx.remaining().len(),
            "page done"
        );
        ctx.report_page(progress, page);
    }

    ctx.enter(RunPhase::Done);

    Ok(RunSummary {
        target,
        dry_run,
        started_at,
        elapsed_ms: clock.elapsed().as_millis(),
        planned,
        authors_created: ctx.resolver.authors_created(),
        remaining: ctx.remaining().len(),
        tally: ctx.tally,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_patch_is_a_reference() {
        let set = author_fields("author-jane-doe");
        assert_eq!(
            set["author"],
            serde_json::json!({ "_type": "reference", "_ref": "author-jane-doe" })
        );
    }

    #[test]
    fn image_patch_sets_both_fields() {
        let set = image_fields(&AssetHandle("image-abc".into()), "https://x/a.jpg");
        assert_eq!(set["mainImage"]["_type"], "image");
        assert_eq!(set["mainImage"]["asset"]["_ref"], "image-abc");
        assert_eq!(set["heroImageUrl"], "https://x/a.jpg");
    }

    #[test]
    fn summary_carries_the_core_counters() {
        let summary = RunSummary {
            target: Target::Images,
            dry_run: false,
            started_at: Utc::now(),
            elapsed_ms: 12,
            tally: RunTally {
                pages: 1,
                records: 2,
                updated: 1,
                skipped: 1,
                batches_committed: 1,
                ..Default::default()
            },
            planned: 0,
            authors_created: 0,
            remaining: 0,
        };
        let text = summary.render();
        assert!(text.starts_with("images\n"));
        assert!(text.contains("updated: 1, failed: 0, skipped: 1"));
        assert!(!text.contains("authors created"));
        assert!(text.ends_with("ok\n"));
    }
}
