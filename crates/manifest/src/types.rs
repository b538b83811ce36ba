//! Manifest blocks and install plans.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Desired state for one install: up to three optional asset-class blocks.
///
/// An app with no blocks at all is a plain monolithic install and the
/// staging area is left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExoManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dex: Option<DexBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesBlock>,
}

impl ExoManifest {
    /// True when at least one asset class lives outside the main APK.
    pub fn is_exopackage(&self) -> bool {
        self.dex.is_some() || self.native.is_some() || self.resources.is_some()
    }
}

/// Secondary dex files: a metadata file of `<filename> <hash>` entries whose
/// file names resolve against `dex_directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexBlock {
    pub metadata: PathBuf,
    pub dex_directory: PathBuf,
}

/// Native libraries: one metadata file per ABI the app ships. Library names
/// resolve against each metadata file's parent directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeBlock {
    pub abi_metadata: BTreeMap<String, PathBuf>,
}

/// Resource archives with precomputed content hashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesBlock {
    pub archives: Vec<ResourceArchive>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceArchive {
    pub source: PathBuf,
    pub hash: String,
}

/// What one asset class wants on the device.
#[derive(Debug, Clone, Default)]
pub struct ExoFilePlan {
    /// Device-relative path → local source file.
    pub files: BTreeMap<String, PathBuf>,
    /// Device-relative path → literal file contents.
    pub metadata: BTreeMap<String, Vec<u8>>,
}
