//! Configuration types shared by the export pipeline

use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default rate limit for progress callbacks
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(50);

/// Options forwarded untouched to the container decoder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Game environment the bundles were built for
    pub env: Option<String>,
    /// Key for encrypted (UnityCN) bundles
    pub decrypt_key: Option<String>,
}

impl DecodeOptions {
    pub fn with_env<S: Into<String>>(mut self, env: S) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_decrypt_key<S: Into<String>>(mut self, key: S) -> Self {
        self.decrypt_key = Some(key.into());
        self
    }
}

/// PNG deflate effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PngCompression {
    #[default]
    Fast,
    Balanced,
    Best,
}

/// PNG encoding options used by the image conversion pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PngOptions {
    pub compression: PngCompression,
}

/// Compression applied to archive entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArchiveCompression {
    Stored,
    #[default]
    Deflated,
}

/// Archive generation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArchiveOptions {
    pub compression: ArchiveCompression,
}

/// Destination path convention for batch exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupMethod {
    /// Everything in the destination root
    #[default]
    Flat,
    /// One directory per container path recorded in the bundle
    ContainerPath,
    /// One directory per Unity class name
    TypeName,
    /// One directory per source file name
    SourceFile,
}

impl FromStr for GroupMethod {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" | "none" => Ok(Self::Flat),
            "container" | "container-path" => Ok(Self::ContainerPath),
            "type" | "type-name" => Ok(Self::TypeName),
            "source" | "source-file" => Ok(Self::SourceFile),
            other => Err(ExportError::Config(format!(
                "unknown group method '{}'",
                other
            ))),
        }
    }
}

/// Worker count for I/O-bound export writes
pub fn default_export_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// Worker count for CPU-bound image conversion, leaving one core to the caller
pub fn default_converter_threads() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
