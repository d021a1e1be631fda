//! Progress reporting and cooperative cancellation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Stage of an image load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    ReadingImage,
    FindingDefinition,
    Populating,
    Finalizing,
    ValidatingChecksum,
    Done,
}

impl Phase {
    /// Percentage at which the phase starts.
    pub fn percent(&self) -> u8 {
        match self {
            Phase::ReadingImage => 0,
            Phase::FindingDefinition => 10,
            Phase::Populating => 50,
            Phase::Finalizing => 90,
            Phase::ValidatingChecksum => 95,
            Phase::Done => 100,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::ReadingImage => "Reading image",
            Phase::FindingDefinition => "Finding ECU definition",
            Phase::Populating => "Populating tables",
            Phase::Finalizing => "Finalizing",
            Phase::ValidatingChecksum => "Validating checksum",
            Phase::Done => "Done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-candidate observations made during a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent {
    /// The candidate's backing resource does not exist.
    CandidateMissing { candidate: String },
    /// The candidate parsed but describes a different image.
    CandidateRejected { candidate: String },
    /// The candidate failed fatally; the search stops here.
    Aborted { candidate: String, error: String },
    Matched { candidate: String, xmlid: String },
}

/// Receiver for progress updates. Purely observational.
pub trait ProgressSink {
    fn report(&self, percent: u8, phase: Phase);

    fn notify(&self, _event: &ResolveEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(u8, Phase),
{
    fn report(&self, percent: u8, phase: Phase) {
        self(percent, phase)
    }
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: u8, _phase: Phase) {}
}

/// Forwards to a sink while keeping percentages non-decreasing and at
/// most 100.
pub struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: AtomicU8,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Report `percent`, raised to the last reported value if lower.
    pub fn report(&self, percent: u8, phase: Phase) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::Relaxed);
        self.sink.report(percent.max(previous), phase);
    }

    pub fn enter(&self, phase: Phase) {
        self.report(phase.percent(), phase);
    }

    pub fn notify(&self, event: &ResolveEvent) {
        self.sink.notify(event);
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Percentage for candidate `index` of `total` within `[from, to]`.
pub(crate) fn interpolate(from: u8, to: u8, index: usize, total: usize) -> u8 {
    if total == 0 || to <= from {
        return to;
    }
    let span = (to - from) as usize;
    let step = span * index.min(total) / total;
    from + step as u8
}

/// Shared flag polled between units of work.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
