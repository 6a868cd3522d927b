//! Run progress reporting.
//!
//! Reports observable progress during `press-sync authors` and
//! `press-sync images` so operators see which page is being worked, how many
//! articles are still waiting, and how the run is going. Progress is emitted
//! on **stderr** so the final summary on stdout stays parseable for scripts.

use std::io::Write;

/// A single progress event for a pipeline run.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// The remaining-work set has been loaded; no page fetched yet.
    Starting { pipeline: String, remaining: u64 },
    /// A page has been resolved and its batch committed (or rejected).
    Page {
        pipeline: String,
        page: u64,
        updated: u64,
        failed: u64,
        remaining: u64,
    },
}

/// Reports run progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline loop.
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "images  page 12  updated 1,100  failed 3  remaining 240".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Starting {
                pipeline,
                remaining,
            } => {
                format!(
                    "{}  starting  {} articles pending\n",
                    pipeline,
                    format_number(*remaining)
                )
            }
            SyncProgressEvent::Page {
                pipeline,
                page,
                updated,
                failed,
                remaining,
            } => format!(
                "{}  page {}  updated {}  failed {}  remaining {}\n",
                pipeline,
                page,
                format_number(*updated),
                format_number(*failed),
                format_number(*remaining)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Starting {
                pipeline,
                remaining,
            } => serde_json::json!({
                "event": "progress",
                "pipeline": pipeline,
                "phase": "starting",
                "remaining": remaining
            }),
            SyncProgressEvent::Page {
                pipeline,
                page,
                updated,
                failed,
                remaining,
            } => serde_json::json!({
                "event": "progress",
                "pipeline": pipeline,
                "phase": "page",
                "page": page,
                "updated": updated,
                "failed": failed,
                "remaining": remaining
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
