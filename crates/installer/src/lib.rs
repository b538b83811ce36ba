//! Incremental exopackage installs: per-device synchronization of a
//! content-addressed staging area plus the decision whether the main APK
//! itself needs a reinstall.
//!
//! This crate implements the **install logic**. Devices are reached through
//! the [`ExoDevice`] capability trait; [`AdbDevice`] is the adb-backed
//! implementation and tests substitute an in-memory recording device.
//!
//! # Per-device pipeline
//!
//! 1. **List** — snapshot the staging area under the package's root
//! 2. **Plan** — compute desired files and metadata per asset class
//! 3. **Push** — missing files only; hashes in names make presence proof of
//!    content
//! 4. **Delete** — anything unwanted except the `lock` sentinel
//! 5. **Reinstall** — only when the local and installed APK signatures differ
//! 6. **Kill** — restart the app so it picks up the new assets

pub mod agent;
pub mod device;
pub mod error;
pub mod events;
pub mod install;
pub mod real;
pub mod signature;
pub mod sync;

#[cfg(test)]
pub(crate) mod mock;

pub use device::{ExoDevice, KillOutcome};
pub use error::InstallError;
pub use events::InstallEvent;
pub use install::{DeviceResult, ExoInstaller, InstallConfig};
pub use real::AdbDevice;

/// Root of all exopackage staging areas on a device.
pub const EXOPACKAGE_INSTALL_ROOT: &str = "/data/local/tmp/exopackage";

/// First TCP port used for agent transfers; each device install draws the
/// next port from the facade's counter.
pub const AGENT_PORT_BASE: u16 = 2828;
