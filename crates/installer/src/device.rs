//! Device capabilities used by the synchronization engine.
//!
//! The trait mirrors what the engine actually needs from a device so tests
//! can provide an in-memory implementation that records commands and serves
//! canned output.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use exodeploy_adb::PackageInfo;

use crate::error::InstallError;

/// Boxed future returned by [`ExoDevice`] methods.
pub type DeviceFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, InstallError>> + Send + 'a>>;

/// Result of a targeted process kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The process existed and was signalled.
    Killed,
    /// No process matched; the caller decides whether that matters.
    NotRunning,
}

/// One device the installer can drive.
pub trait ExoDevice: Send + Sync {
    /// Stable identifier for logs and results.
    fn serial(&self) -> &str;

    /// Lists every regular file under `root`, device-relative.
    fn list_dir_recursive<'a>(&'a self, root: &'a str) -> DeviceFuture<'a, BTreeSet<String>>;

    /// Reads a system property, trimmed.
    fn get_property<'a>(&'a self, name: &'a str) -> DeviceFuture<'a, String>;

    /// Looks up install details for a package; `None` when absent.
    fn get_package_info<'a>(&'a self, package: &'a str)
    -> DeviceFuture<'a, Option<PackageInfo>>;

    /// Asks the agent for the signature of an on-device APK.
    fn get_signature<'a>(&'a self, device_path: &'a str) -> DeviceFuture<'a, String>;

    /// Creates `path` and its parents with permissive modes.
    fn mk_dir_p<'a>(&'a self, path: &'a str) -> DeviceFuture<'a, ()>;

    /// Deletes `files` inside `dir_path`.
    fn rm_files<'a>(&'a self, dir_path: &'a str, files: &'a [String]) -> DeviceFuture<'a, ()>;

    /// Forwards host TCP `port` to the device.
    fn create_forward(&self, port: u16) -> DeviceFuture<'_, ()>;

    /// Removes the forward for `port`.
    fn remove_forward(&self, port: u16) -> DeviceFuture<'_, ()>;

    /// Pushes one file to an absolute device path through the agent.
    fn install_file<'a>(
        &'a self,
        port: u16,
        device_path: &'a str,
        source: &'a Path,
    ) -> DeviceFuture<'a, ()>;

    /// Installs (or replaces) the main APK.
    fn install_apk<'a>(&'a self, apk: &'a Path) -> DeviceFuture<'a, ()>;

    /// Force-stops everything in a package.
    fn stop_package<'a>(&'a self, package: &'a str) -> DeviceFuture<'a, ()>;

    /// Kills one named process inside a package.
    fn kill_process<'a>(&'a self, process: &'a str) -> DeviceFuture<'a, KillOutcome>;
}
