//! Install error types.

use exodeploy_adb::AdbError;
use exodeploy_agent_channel::AgentChannelError;
use exodeploy_manifest::ManifestError;

/// Errors produced during an exopackage install.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Adb(#[from] AdbError),

    #[error(transparent)]
    Agent(#[from] AgentChannelError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("invalid APK: {0}")]
    Apk(#[from] zip::result::ZipError),

    #[error("invalid package name: {0:?}")]
    InvalidPackageName(String),

    #[error("unexpected get-signature output: {0:?}")]
    SignatureFormat(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("cancelled")]
    Cancelled,
}
