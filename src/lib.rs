//! ECU firmware image definitions: resolve which definition describes an
//! image, build its table model, and validate or repair its checksums.

/// Byte/integer conversion
pub mod codec;
/// Segmented checksum engine
pub mod checksum;
/// Loader configuration
pub mod config;
/// Definition candidates, dialects and normalization
pub mod definition;
/// Error types
pub mod error;
/// Bounded file access
pub mod io;
/// End-to-end image loading
pub mod loader;
/// Logging and tracing setup
pub mod logging;
/// Rom and table model
pub mod model;
/// Progress reporting and cancellation
pub mod progress;
/// Definition search
pub mod resolver;
/// Background loading
pub mod worker;

pub use checksum::{ChecksumOutcome, CHECK_TOTAL};
pub use config::LoaderConfig;
pub use definition::{DefinitionCandidate, DefinitionNormalizer, Dialect, NormalizedTree};
pub use error::{Result, RomError};
pub use loader::{ImageLoader, LoadOutcome, LoadedImage};
pub use model::{BuildOutcome, ModelBuilder, Rom, RomId, Table};
pub use progress::{CancelFlag, NoProgress, Phase, ProgressSink, ResolveEvent};
pub use resolver::{DefinitionResolver, Resolution};
