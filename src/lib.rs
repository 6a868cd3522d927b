//! # press-sync
//!
//! Batched, idempotent synchronization of WordPress content into a headless
//! CMS document store.
//!
//! Reads paginated posts from the source REST API, resolves and
//! deduplicates related entities (authors, media), uploads images, and
//! commits one patch transaction per page. Failures are absorbed into
//! counters; re-running converges on the same end state.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Paginator  │──▶│   Resolver   │──▶│  Transcoder  │──▶│  Committer   │
//! │ /posts     │   │ author/media │   │ fetch+upload │   │ 1 tx / page  │
//! └────────────┘   └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!                         └──────────────────┴──────────────────┤
//!                                                               ▼
//!                                                   ┌──────────────────┐
//!                                                   │ DestinationStore │
//!                                                   │  HTTP / memory   │
//!                                                   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Source records, destination documents, transactions |
//! | [`slug`] | Author slug derivation |
//! | [`outcome`] | Per-record skip reasons and the run tally |
//! | [`source`] | WordPress client and paginator |
//! | [`store`] | Destination store trait, HTTP and in-memory backends |
//! | [`author_cache`] | Persisted author id → name map |
//! | [`resolver`] | Author and media resolution |
//! | [`transcoder`] | Image fetch and re-upload |
//! | [`committer`] | Remaining-work set and batch commit |
//! | [`pipeline`] | Run orchestration for the authors and images targets |
//! | [`progress`] | Progress reporting on stderr |
//! | [`remaining`] | Listing articles still missing a field |

pub mod author_cache;
pub mod committer;
pub mod config;
pub mod models;
pub mod outcome;
pub mod pipeline;
pub mod progress;
pub mod remaining;
pub mod resolver;
pub mod slug;
pub mod source;
pub mod store;
pub mod transcoder;
