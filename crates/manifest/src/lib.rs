//! Desired-state planning for exopackage staging areas.
//!
//! Each asset class (secondary dex, native libraries, resources) turns its
//! block of the manifest into two maps: files to install (device-relative
//! path → local source) and metadata to install (device-relative path →
//! literal bytes). Device-relative paths are plain `/`-separated strings,
//! so plans come out identical on every host platform.
//!
//! File names embed the content hash, which is what makes installs
//! incremental: a path that already exists on the device is up to date by
//! construction.

pub mod dex;
pub mod error;
pub mod metadata;
pub mod native;
pub mod resources;
pub mod types;

pub use dex::dex_plan;
pub use error::ManifestError;
pub use metadata::{parse_exopackage_metadata, parse_exopackage_metadata_file};
pub use native::native_plan;
pub use resources::resources_plan;
pub use types::{DexBlock, ExoFilePlan, ExoManifest, NativeBlock, ResourceArchive, ResourcesBlock};

/// Directory for secondary dex files under the staging root.
pub const SECONDARY_DEX_DIR: &str = "secondary-dex";

/// Directory for native libraries under the staging root.
pub const NATIVE_LIBS_DIR: &str = "native-libs";

/// Directory for resource archives under the staging root.
pub const RESOURCES_DIR: &str = "resources";

/// Name of the metadata file written at each level.
pub const METADATA_FILE: &str = "metadata.txt";
