//! Store configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! [vfs]
//! max_refs = 1024
//!
//! [index]
//! batch_records = 4096
//! min_version = 1
//! max_version = 3
//!
//! [archive]
//! formats = ["kar", "tar"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveFormat;
use crate::error::{Error, Result};
use crate::vfs::DEFAULT_MAX_REFS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub vfs: VfsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Handle limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    /// Reference ceiling per handle.
    #[serde(default = "default_max_refs")]
    pub max_refs: u32,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            max_refs: default_max_refs(),
        }
    }
}

fn default_max_refs() -> u32 {
    DEFAULT_MAX_REFS
}

/// Level-1 index loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Records read per I/O call.
    #[serde(default = "default_batch_records")]
    pub batch_records: usize,
    /// Oldest accepted format version.
    #[serde(default = "default_min_version")]
    pub min_version: u32,
    /// Newest accepted format version.
    #[serde(default = "default_max_version")]
    pub max_version: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            batch_records: default_batch_records(),
            min_version: default_min_version(),
            max_version: default_max_version(),
        }
    }
}

fn default_batch_records() -> usize {
    1024
}

fn default_min_version() -> u32 {
    1
}

fn default_max_version() -> u32 {
    3
}

/// Archive probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Formats tried, in order, when a file is classified or opened.
    /// Empty disables archive unwrapping.
    #[serde(default = "default_formats")]
    pub formats: Vec<ArchiveFormat>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
        }
    }
}

fn default_formats() -> Vec<ArchiveFormat> {
    vec![ArchiveFormat::Kar, ArchiveFormat::Tar]
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vfs.max_refs == 0 {
            return Err(Error::Config("vfs.max_refs must be at least 1".into()));
        }
        if self.index.batch_records == 0 {
            return Err(Error::Config("index.batch_records must be at least 1".into()));
        }
        if self.index.min_version == 0 || self.index.min_version > self.index.max_version {
            return Err(Error::Config(format!(
                "index version range {}..={} is empty",
                self.index.min_version, self.index.max_version
            )));
        }
        Ok(())
    }
}
