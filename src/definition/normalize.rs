//! Turn a definition candidate into a [`NormalizedTree`].

use super::convert::{default_layers, layer_for, ConversionLayer};
use super::tree::parse_xml;
use super::{DefinitionCandidate, NormalizedTree};
use crate::config::{LoaderConfig, ParserConfig};
use crate::error::{Result, RomError};
use tracing::debug;

/// Parses native candidates and dispatches everything else to the
/// registered conversion layers.
pub struct DefinitionNormalizer {
    layers: Vec<Box<dyn ConversionLayer>>,
    parser: ParserConfig,
    max_definition_size: u64,
}

impl Default for DefinitionNormalizer {
    fn default() -> Self {
        Self::new(&LoaderConfig::default())
    }
}

impl std::fmt::Debug for DefinitionNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionNormalizer")
            .field(
                "layers",
                &self.layers.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .field("parser", &self.parser)
            .field("max_definition_size", &self.max_definition_size)
            .finish()
    }
}

impl DefinitionNormalizer {
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            layers: default_layers(),
            parser: config.parser.clone(),
            max_definition_size: config.io.max_definition_size,
        }
    }

    /// Register an additional layer. A later layer never shadows an
    /// earlier one for the same dialect.
    pub fn with_layer(mut self, layer: Box<dyn ConversionLayer>) -> Self {
        self.layers.push(layer);
        self
    }

    /// True when the candidate is not in the native dialect.
    pub fn needs_conversion(&self, candidate: &DefinitionCandidate) -> bool {
        !candidate.dialect().is_native()
    }

    pub fn normalize(&self, candidate: &DefinitionCandidate) -> Result<NormalizedTree> {
        let id = candidate.identity();

        let layer = if self.needs_conversion(candidate) {
            let layer = layer_for(&self.layers, candidate.dialect()).ok_or_else(|| {
                RomError::unsupported(
                    &id,
                    format!("no conversion layer for dialect '{}'", candidate.dialect()),
                )
            })?;
            Some(layer)
        } else {
            None
        };

        let content = candidate.open(self.max_definition_size)?;
        let bytes = content.as_slice();
        debug!(candidate = %id, size_bytes = bytes.len(), dialect = %candidate.dialect(), "Normalizing definition");

        match layer {
            Some(layer) => layer.convert(candidate, bytes, &self.parser),
            None => self.parse_native(&id, bytes),
        }
    }

    fn parse_native(&self, id: &str, bytes: &[u8]) -> Result<NormalizedTree> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RomError::malformed(id, format!("not UTF-8 text: {}", e)))?;

        let root = parse_xml(text, &self.parser).map_err(|e| match e {
            roxmltree::Error::NodesLimitReached => RomError::ResourceExhausted {
                resource: "definition nodes".to_string(),
                used: self.parser.nodes_limit as u64,
                limit: self.parser.nodes_limit as u64,
            },
            other => RomError::malformed(id, other.to_string()),
        })?;

        if root.name != "roms" || root.namespace.is_some() {
            return Err(RomError::malformed(
                id,
                format!("root element is <{}>, expected <roms>", root.name),
            ));
        }

        Ok(NormalizedTree {
            root,
            dialect: super::Dialect::Native,
            source: id.to_string(),
        })
    }
}
