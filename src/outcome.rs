//! Per-record outcomes and the run tally.
//!
//! Every stage that can decline to produce a patch returns
//! `Result<T, SkipReason>`. The reason decides which counter the record
//! lands in, so "nothing to do" and "should have worked but did not" never
//! share a bucket.

use serde::Serialize;
use thiserror::Error;

/// Why a record produced no patch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    /// The source record carries no featured media.
    #[error("no media")]
    NoMedia,
    /// No destination article is waiting on this slug (absent or already done).
    #[error("no pending article for slug")]
    ArticleNotPending,
    /// The media id did not resolve to any URL.
    #[error("media {0} did not resolve")]
    MediaUnresolved(u64),
    /// No usable author name could be found for the record.
    #[error("author unresolved: {0}")]
    AuthorUnresolved(String),
    /// Fetching the binary from the source failed.
    #[error("asset fetch failed: {0}")]
    AssetFetch(String),
    /// Uploading the binary to the destination failed.
    #[error("asset upload failed: {0}")]
    AssetUpload(String),
}

/// Tally bucket a [`SkipReason`] is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCategory {
    Skipped,
    NotFound,
    Failed,
}

impl SkipReason {
    pub fn category(&self) -> SkipCategory {
        match self {
            SkipReason::NoMedia => SkipCategory::Skipped,
            SkipReason::ArticleNotPending => SkipCategory::NotFound,
            SkipReason::MediaUnresolved(_)
            | SkipReason::AuthorUnresolved(_)
            | SkipReason::AssetFetch(_)
            | SkipReason::AssetUpload(_) => SkipCategory::Failed,
        }
    }
}

/// Aggregate counters for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTally {
    pub pages: u64,
    pub records: u64,
    pub updated: u64,
    pub failed: u64,
    pub skipped: u64,
    pub not_found: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
}

impl RunTally {
    pub fn record_skip(&mut self, reason: &SkipReason) {
        match reason.category() {
            SkipCategory::Skipped => self.skipped += 1,
            SkipCategory::NotFound => self.not_found += 1,
            SkipCategory::Failed => self.failed += 1,
        }
    }
}

/// Maximum characters of a failure reason echoed to the operator.
pub const MAX_REASON_CHARS: usize = 200;

/// Shorten an error message for log readability, respecting char boundaries.
pub fn truncate_reason(reason: &str, max_chars: usize) -> String {
    let flat = reason.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
