//! Conversion layers for non-native definition dialects.
//!
//! Each layer claims one dialect and turns the raw candidate bytes into a
//! [`NormalizedTree`] shaped exactly like a native `<roms>` document, so the
//! model builder never needs to know where a tree came from.

pub mod xdf;

pub use xdf::XdfConversionLayer;

use super::{DefinitionCandidate, Dialect, NormalizedTree};
use crate::config::ParserConfig;
use crate::error::Result;

/// A dialect-specific conversion strategy.
pub trait ConversionLayer: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// The dialect this layer converts.
    fn dialect(&self) -> Dialect;

    /// Convert candidate content into a native-shaped tree.
    ///
    /// Content the layer cannot make sense of is reported as
    /// `RomError::UnsupportedFormat`.
    fn convert(
        &self,
        candidate: &DefinitionCandidate,
        content: &[u8],
        parser: &ParserConfig,
    ) -> Result<NormalizedTree>;
}

/// Layers registered by default.
pub fn default_layers() -> Vec<Box<dyn ConversionLayer>> {
    vec![Box::new(XdfConversionLayer)]
}

/// Select the layer for a dialect.
pub fn layer_for<'a>(
    layers: &'a [Box<dyn ConversionLayer>],
    dialect: &Dialect,
) -> Option<&'a dyn ConversionLayer> {
    layers
        .iter()
        .find(|layer| &layer.dialect() == dialect)
        .map(|layer| layer.as_ref())
}
