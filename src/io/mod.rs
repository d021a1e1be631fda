//! Bounded file access for firmware images and definition files.
//!
//! Definition files can be large and many of them may be tried for a single
//! image, so they are memory-mapped for the duration of one attempt and
//! unmapped as soon as the reader is dropped. Images are copied out into an
//! owned buffer because checksum repair mutates them.

pub mod error;

use crate::io::error::{IoError, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Defines the size limits for files opened by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOLimits {
    /// Largest firmware image that will be read.
    pub max_image_size: u64,
    /// Largest definition file that will be mapped.
    pub max_definition_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_image_size: 16 * 1024 * 1024,       // 16MB
            max_definition_size: 256 * 1024 * 1024, // 256MB
        }
    }
}

/// A size-checked, read-only memory map of a file.
pub struct SafeReader {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl SafeReader {
    /// Opens and maps a file, failing if it is larger than `max_size`.
    pub fn open<P: AsRef<Path>>(path: P, max_size: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = max_size,
            "Opening file for safe reading"
        );

        if file_size > max_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = max_size,
                "File is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: max_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; the map is dropped with the reader.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the total size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// The whole mapped file.
    pub fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// Read a firmware image into an owned, mutable buffer.
pub fn read_image<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Vec<u8>> {
    let reader = SafeReader::open(path, limits.max_image_size)?;
    Ok(reader.as_slice().to_vec())
}
