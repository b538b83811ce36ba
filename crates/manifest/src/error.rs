//! Error types for manifest reading and planning.

use std::path::PathBuf;

/// Errors produced while reading manifests and building install plans.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("illegal line in metadata file: {line:?}")]
    MalformedLine { line: String },

    #[error("app ships no native libraries for any device ABI (device supports {device_abis:?})")]
    NoCompatibleAbi { device_abis: Vec<String> },
}
