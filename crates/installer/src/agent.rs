//! On-device agent bootstrap.
//!
//! The agent is a helper app that receives files and answers signature
//! queries. It is installed lazily on first use and persists across
//! installs; presence is probed with a package lookup.

use std::path::Path;

use exodeploy_adb::{AdbShell, PackageInfo, parse_path_and_package_info};
use tracing::{debug, info};

use crate::error::InstallError;

/// Package name the agent APK installs under.
pub const AGENT_PACKAGE_NAME: &str = "com.exodeploy.agent";

/// Agent version this installer speaks the protocol of.
pub const AGENT_VERSION_CODE: &str = "12";

/// Resolved on-device agent installation.
#[derive(Debug, Clone)]
pub struct ExopackageAgent {
    command: String,
}

impl ExopackageAgent {
    /// Probes for the agent and installs the bundled APK when it is missing
    /// or has the wrong version. The result is memoized per device by the
    /// caller.
    pub async fn install_if_necessary(
        shell: &AdbShell,
        agent_apk: &Path,
    ) -> Result<Self, InstallError> {
        if let Some(installed) = Self::query(shell).await? {
            if installed.version_code == AGENT_VERSION_CODE {
                debug!(serial = shell.serial(), "agent already installed");
                return Ok(Self::from_package_info(&installed));
            }
            info!(
                serial = shell.serial(),
                installed = %installed.version_code,
                wanted = AGENT_VERSION_CODE,
                "replacing out-of-date agent"
            );
        } else {
            info!(serial = shell.serial(), "installing agent");
        }

        shell.install_apk(agent_apk).await?;
        let installed = Self::query(shell).await?.ok_or_else(|| {
            InstallError::Device("agent package missing after install".to_string())
        })?;
        Ok(Self::from_package_info(&installed))
    }

    async fn query(shell: &AdbShell) -> Result<Option<PackageInfo>, InstallError> {
        let output = shell
            .shell_checked(&format!(
                "pm path {AGENT_PACKAGE_NAME}; dumpsys package {AGENT_PACKAGE_NAME}"
            ))
            .await?;
        Ok(parse_path_and_package_info(AGENT_PACKAGE_NAME, &output)?)
    }

    fn from_package_info(info: &PackageInfo) -> Self {
        Self {
            command: format!("{}/libagent.so", info.native_library_path),
        }
    }

    /// Invocation prefix for agent verbs.
    pub fn command(&self) -> &str {
        &self.command
    }
}
