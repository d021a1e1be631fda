//! Definition candidates and their normalization into a common tree.
//!
//! A candidate is one definition source (a file, or named in-memory content)
//! plus a dialect marker. Native definitions are parsed directly; every other
//! dialect goes through a [`convert::ConversionLayer`] that produces the same
//! [`NormalizedTree`] shape.

pub mod convert;
pub mod normalize;
pub mod tree;

pub use normalize::DefinitionNormalizer;
pub use tree::{Node, NormalizedTree};

use crate::error::Result;
use crate::io::SafeReader;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Dialect marker of a definition source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// `<roms>` ECU definition XML, parsed as-is.
    Native,
    /// TunerPro `XDFFORMAT` definition.
    TunerProXdf,
    /// Any other marker; only usable if a conversion layer claims it.
    Other(String),
}

impl Dialect {
    /// Detect the dialect from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "xml" => Dialect::Native,
            "xdf" => Dialect::TunerProXdf,
            other => Dialect::Other(other.to_string()),
        }
    }

    /// Dialect of a file, detected from its extension.
    pub fn from_path(path: &Path) -> Self {
        Self::from_extension(path.extension().and_then(|e| e.to_str()).unwrap_or(""))
    }

    /// True for `<roms>` documents that need no conversion.
    pub fn is_native(&self) -> bool {
        matches!(self, Dialect::Native)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Native => write!(f, "native"),
            Dialect::TunerProXdf => write!(f, "xdf"),
            Dialect::Other(marker) => write!(f, "{}", marker),
        }
    }
}

/// Where a candidate's bytes come from.
#[derive(Debug, Clone)]
pub enum DefinitionSource {
    File(PathBuf),
    Memory { name: String, content: Bytes },
}

/// One definition considered during resolution.
#[derive(Debug, Clone)]
pub struct DefinitionCandidate {
    source: DefinitionSource,
    dialect: Dialect,
}

impl DefinitionCandidate {
    /// A file candidate whose dialect is detected from its extension.
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let dialect = Dialect::from_path(&path);
        Self {
            source: DefinitionSource::File(path),
            dialect,
        }
    }

    /// An in-memory candidate; `name` is its identity in logs and errors.
    pub fn from_bytes(name: impl Into<String>, content: impl Into<Bytes>, dialect: Dialect) -> Self {
        Self {
            source: DefinitionSource::Memory {
                name: name.into(),
                content: content.into(),
            },
            dialect,
        }
    }

    /// Override the detected dialect.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Dialect used to pick a conversion layer.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Where the content is read from.
    pub fn source(&self) -> &DefinitionSource {
        &self.source
    }

    /// Name used in logs and error messages.
    pub fn identity(&self) -> String {
        match &self.source {
            DefinitionSource::File(path) => path.display().to_string(),
            DefinitionSource::Memory { name, .. } => name.clone(),
        }
    }

    /// Short name without directories or extension.
    pub fn stem(&self) -> String {
        match &self.source {
            DefinitionSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.identity()),
            DefinitionSource::Memory { name, .. } => name.clone(),
        }
    }

    /// Whether the backing resource exists. In-memory content always does.
    pub fn is_present(&self) -> bool {
        match &self.source {
            DefinitionSource::File(path) => path.is_file(),
            DefinitionSource::Memory { .. } => true,
        }
    }

    /// Open the content for one resolution attempt.
    pub(crate) fn open(&self, max_size: u64) -> Result<DefinitionContent> {
        match &self.source {
            DefinitionSource::File(path) => Ok(DefinitionContent::Mapped(SafeReader::open(
                path, max_size,
            )?)),
            DefinitionSource::Memory { content, .. } => {
                if content.len() as u64 > max_size {
                    return Err(crate::error::RomError::ResourceExhausted {
                        resource: "definition size".to_string(),
                        used: content.len() as u64,
                        limit: max_size,
                    });
                }
                Ok(DefinitionContent::Shared(content.clone()))
            }
        }
    }
}

/// Candidate bytes held for the duration of one attempt.
pub(crate) enum DefinitionContent {
    Mapped(SafeReader),
    Shared(Bytes),
}

impl DefinitionContent {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            DefinitionContent::Mapped(reader) => reader.as_slice(),
            DefinitionContent::Shared(bytes) => bytes,
        }
    }
}
