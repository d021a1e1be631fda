//! Search an ordered candidate list for the definition of an image.
//!
//! Each candidate is normalized and handed to the model builder. A missing
//! candidate or one that describes another image is skipped; any other
//! failure stops the search, since later candidates are lower priority
//! and silently falling through to them could bind the wrong layout.

use crate::config::LoaderConfig;
use crate::definition::{DefinitionCandidate, DefinitionNormalizer};
use crate::error::{Result, RomError};
use crate::model::{BuildOutcome, ModelBuilder, Rom};
use crate::progress::{interpolate, CancelFlag, Phase, ProgressSink, ProgressTracker, ResolveEvent};
use crate::{log_error, span_trace};
use tracing::{debug, info, warn};

const SEARCH_START: u8 = 10;
const SEARCH_END: u8 = 50;

/// Result of a search.
#[derive(Debug)]
pub enum Resolution {
    Found(Rom),
    /// No candidate describes the image.
    NotFound,
    /// A candidate failed fatally.
    Aborted(RomError),
    Cancelled,
}

impl Resolution {
    pub fn rom(&self) -> Option<&Rom> {
        match self {
            Resolution::Found(rom) => Some(rom),
            _ => None,
        }
    }

    pub fn into_rom(self) -> Option<Rom> {
        match self {
            Resolution::Found(rom) => Some(rom),
            _ => None,
        }
    }
}

/// How a single attempt ended, before it is folded into a [`Resolution`].
enum Attempt {
    Missing,
    Rejected,
    Matched(Rom),
}

#[derive(Debug)]
pub struct DefinitionResolver {
    normalizer: DefinitionNormalizer,
    builder: ModelBuilder,
    cancel: CancelFlag,
}

impl Default for DefinitionResolver {
    fn default() -> Self {
        Self::new(&LoaderConfig::default())
    }
}

impl DefinitionResolver {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            normalizer: DefinitionNormalizer::new(config),
            builder: ModelBuilder::new(&config.inheritance),
            cancel: CancelFlag::new(),
        }
    }

    /// Use a custom normalizer, e.g. one with extra conversion layers.
    pub fn with_normalizer(mut self, normalizer: DefinitionNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Try every candidate in order and return the first match.
    ///
    /// Only resource exhaustion is returned as `Err`; every other fatal
    /// candidate error ends the search as [`Resolution::Aborted`].
    pub fn resolve(
        &self,
        image: &[u8],
        candidates: &[DefinitionCandidate],
        progress: &dyn ProgressSink,
    ) -> Result<Resolution> {
        let tracker = ProgressTracker::new(progress);
        self.resolve_tracked(image, candidates, &tracker)
    }

    pub(crate) fn resolve_tracked(
        &self,
        image: &[u8],
        candidates: &[DefinitionCandidate],
        tracker: &ProgressTracker<'_>,
    ) -> Result<Resolution> {
        let total = candidates.len();
        tracker.report(SEARCH_START, Phase::FindingDefinition);
        info!(candidates = total, image_len = image.len(), "Searching for definition");

        for (index, candidate) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(index, "Definition search cancelled");
                return Ok(Resolution::Cancelled);
            }

            let identity = candidate.identity();
            let span = span_trace!("candidate", index, candidate = %identity);
            let _guard = span.enter();

            match self.attempt(candidate, image) {
                Ok(Attempt::Missing) => {
                    warn!(candidate = %identity, "Definition missing, skipped");
                    tracker.notify(&ResolveEvent::CandidateMissing {
                        candidate: identity,
                    });
                }
                Ok(Attempt::Rejected) => {
                    debug!(candidate = %identity, "Definition does not describe image");
                    tracker.notify(&ResolveEvent::CandidateRejected {
                        candidate: identity,
                    });
                }
                Ok(Attempt::Matched(rom)) => {
                    tracker.notify(&ResolveEvent::Matched {
                        candidate: identity,
                        xmlid: rom.id.xmlid.clone(),
                    });
                    tracker.report(SEARCH_END, Phase::FindingDefinition);
                    return Ok(Resolution::Found(rom));
                }
                Err(err) if err.is_resource_exhausted() => {
                    return Err(log_error!(err, "Resource limit hit during definition search"));
                }
                Err(err) => {
                    let err = log_error!(err, "Definition search aborted");
                    tracker.notify(&ResolveEvent::Aborted {
                        candidate: identity,
                        error: err.to_string(),
                    });
                    return Ok(Resolution::Aborted(err));
                }
            }

            tracker.report(
                interpolate(SEARCH_START, SEARCH_END, index + 1, total),
                Phase::FindingDefinition,
            );
        }

        info!("No definition matches image");
        Ok(Resolution::NotFound)
    }

    fn attempt(&self, candidate: &DefinitionCandidate, image: &[u8]) -> Result<Attempt> {
        if !candidate.is_present() {
            return Ok(Attempt::Missing);
        }
        let tree = match self.normalizer.normalize(candidate) {
            Ok(tree) => tree,
            // removed between the presence check and opening
            Err(RomError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Attempt::Missing)
            }
            Err(e) => return Err(e),
        };
        Ok(match self.builder.build(tree, image)? {
            BuildOutcome::Matched(rom) => Attempt::Matched(rom),
            BuildOutcome::NoMatch => Attempt::Rejected,
        })
    }
}
