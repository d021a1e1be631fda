//! End-to-end image loading: read, resolve, populate, validate.

use crate::checksum::ChecksumOutcome;
use crate::config::LoaderConfig;
use crate::definition::{DefinitionCandidate, DefinitionNormalizer};
use crate::error::{Result, RomError};
use crate::io::read_image;
use crate::model::Rom;
use crate::progress::{CancelFlag, Phase, ProgressSink, ProgressTracker};
use crate::resolver::{DefinitionResolver, Resolution};
use crate::log_error;
use std::path::Path;
use tracing::{info, warn};

/// A rom model together with the image it was built from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub rom: Rom,
    pub image: Vec<u8>,
    /// `None` when validation is disabled or the rom has no checksum table.
    pub checksum: Option<ChecksumOutcome>,
}

impl LoadedImage {
    /// Recompute the checksum records of the owned image.
    pub fn update_checksum(&mut self) -> Result<bool> {
        let updated = self.rom.update_checksum(&mut self.image)?;
        if updated {
            self.checksum = self.rom.validate_checksum(&self.image)?;
        }
        Ok(updated)
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(LoadedImage),
    NotFound,
    Aborted(RomError),
    Cancelled,
}

impl LoadOutcome {
    pub fn loaded(self) -> Option<LoadedImage> {
        match self {
            LoadOutcome::Loaded(loaded) => Some(loaded),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ImageLoader {
    config: LoaderConfig,
    resolver: DefinitionResolver,
}

impl ImageLoader {
    pub fn new(config: LoaderConfig) -> Self {
        let resolver = DefinitionResolver::new(&config);
        Self { config, resolver }
    }

    pub fn with_normalizer(mut self, normalizer: DefinitionNormalizer) -> Self {
        self.resolver = self.resolver.with_normalizer(normalizer);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.resolver = self.resolver.with_cancel_flag(cancel);
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read an image file and load it.
    pub fn load_path<P: AsRef<Path>>(
        &self,
        path: P,
        candidates: &[DefinitionCandidate],
        progress: &dyn ProgressSink,
    ) -> Result<LoadOutcome> {
        let tracker = ProgressTracker::new(progress);
        tracker.enter(Phase::ReadingImage);
        let path = path.as_ref();
        let image = read_image(path, &self.config.io)?;
        info!(path = %path.display(), size = image.len(), "Image read");
        self.load_tracked(image, candidates, &tracker)
    }

    /// Load an image already in memory.
    pub fn load_bytes(
        &self,
        image: Vec<u8>,
        candidates: &[DefinitionCandidate],
        progress: &dyn ProgressSink,
    ) -> Result<LoadOutcome> {
        let tracker = ProgressTracker::new(progress);
        tracker.enter(Phase::ReadingImage);
        self.load_tracked(image, candidates, &tracker)
    }

    fn load_tracked(
        &self,
        image: Vec<u8>,
        candidates: &[DefinitionCandidate],
        tracker: &ProgressTracker<'_>,
    ) -> Result<LoadOutcome> {
        let mut rom = match self.resolver.resolve_tracked(&image, candidates, tracker)? {
            Resolution::Found(rom) => rom,
            Resolution::NotFound => return Ok(LoadOutcome::NotFound),
            Resolution::Aborted(err) => return Ok(LoadOutcome::Aborted(err)),
            Resolution::Cancelled => return Ok(LoadOutcome::Cancelled),
        };

        tracker.enter(Phase::Populating);
        if let Err(err) = rom.populate(&image) {
            return abort(err);
        }

        tracker.enter(Phase::Finalizing);
        if rom.id.obsolete {
            warn!(xmlid = %rom.id.xmlid, "Definition is marked obsolete");
        }

        let checksum = if self.config.checksum.validate_on_load {
            tracker.enter(Phase::ValidatingChecksum);
            let outcome = match rom.validate_checksum(&image) {
                Ok(outcome) => outcome,
                Err(err) => return abort(err),
            };
            match outcome {
                Some(ChecksumOutcome::Invalid(k)) => {
                    warn!(xmlid = %rom.id.xmlid, record = k, "Checksum invalid")
                }
                Some(ChecksumOutcome::AllDisabled) => {
                    info!(xmlid = %rom.id.xmlid, "Checksums disabled")
                }
                _ => {}
            }
            outcome
        } else {
            None
        };

        tracker.enter(Phase::Done);
        info!(xmlid = %rom.id.xmlid, candidate = %rom.candidate, "Image loaded");
        Ok(LoadOutcome::Loaded(LoadedImage {
            rom,
            image,
            checksum,
        }))
    }
}

/// Fatal errors after a match end the load as `Aborted`; only resource
/// exhaustion is returned as `Err`.
fn abort(err: RomError) -> Result<LoadOutcome> {
    if err.is_resource_exhausted() {
        return Err(log_error!(err, "Resource limit hit while loading image"));
    }
    Ok(LoadOutcome::Aborted(log_error!(err, "Image load aborted")))
}
