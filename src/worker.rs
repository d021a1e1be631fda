//! Background loading with an optional timeout.
//!
//! The loader is synchronous; it runs on tokio's blocking pool so the
//! caller's runtime stays responsive. On timeout the cancel flag is
//! tripped, so the loader stops at its next candidate boundary.

use crate::config::LoaderConfig;
use crate::definition::DefinitionCandidate;
use crate::error::{Result, RomError};
use crate::loader::{ImageLoader, LoadOutcome};
use crate::progress::{CancelFlag, ProgressSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error};

/// Default timeout duration in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;

/// Timeout configuration for a background load
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub duration: Duration,
    /// Whether to log an error when the timeout fires
    pub log_warnings: bool,
}

impl TimeoutConfig {
    pub fn new(seconds: u64) -> Self {
        Self::from_duration(Duration::from_secs(seconds))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            duration,
            log_warnings: true,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS)
    }
}

/// What to load.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub image: ImageSource,
    pub candidates: Vec<DefinitionCandidate>,
    pub config: LoaderConfig,
}

impl LoadRequest {
    pub fn from_path(path: impl Into<PathBuf>, candidates: Vec<DefinitionCandidate>) -> Self {
        Self {
            image: ImageSource::Path(path.into()),
            candidates,
            config: LoaderConfig::default(),
        }
    }

    pub fn from_bytes(image: Vec<u8>, candidates: Vec<DefinitionCandidate>) -> Self {
        Self {
            image: ImageSource::Bytes(image),
            candidates,
            config: LoaderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }
}

/// Run a load on the blocking pool.
pub async fn load_in_background(
    request: LoadRequest,
    progress: Arc<dyn ProgressSink + Send + Sync>,
    cancel: CancelFlag,
    limit: Option<TimeoutConfig>,
) -> Result<LoadOutcome> {
    let worker_cancel = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let LoadRequest {
            image,
            candidates,
            config,
        } = request;
        let loader = ImageLoader::new(config).with_cancel_flag(worker_cancel);
        match image {
            ImageSource::Path(path) => loader.load_path(path, &candidates, progress.as_ref()),
            ImageSource::Bytes(bytes) => loader.load_bytes(bytes, &candidates, progress.as_ref()),
        }
    });

    let Some(limit) = limit else {
        return handle.await.map_err(|e| RomError::Worker(e.to_string()))?;
    };

    debug!(seconds = limit.duration.as_secs_f64(), "Starting background load");
    match timeout(limit.duration, handle).await {
        Ok(joined) => joined.map_err(|e| RomError::Worker(e.to_string()))?,
        Err(_) => {
            cancel.cancel();
            if limit.log_warnings {
                error!(
                    seconds = limit.duration.as_secs_f64(),
                    "Background load timed out"
                );
            }
            Err(RomError::Timeout {
                seconds: limit.duration.as_secs(),
            })
        }
    }
}
