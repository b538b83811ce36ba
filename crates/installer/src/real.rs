//! adb-backed device implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use exodeploy_adb::{
    AdbError, AdbShell, PackageInfo, parse_ls_recursive, parse_path_and_package_info,
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::agent::ExopackageAgent;
use crate::device::{DeviceFuture, ExoDevice, KillOutcome};
use crate::error::InstallError;

/// A real device reached through `adb`, with the agent installed lazily on
/// first use.
pub struct AdbDevice {
    shell: AdbShell,
    agent_apk: PathBuf,
    agent: OnceCell<ExopackageAgent>,
    cancel: CancellationToken,
}

impl AdbDevice {
    pub fn new(
        shell: AdbShell,
        agent_apk: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            shell,
            agent_apk: agent_apk.into(),
            agent: OnceCell::new(),
            cancel,
        }
    }

    async fn agent(&self) -> Result<&ExopackageAgent, InstallError> {
        self.agent
            .get_or_try_init(|| ExopackageAgent::install_if_necessary(&self.shell, &self.agent_apk))
            .await
    }
}

impl ExoDevice for AdbDevice {
    fn serial(&self) -> &str {
        self.shell.serial()
    }

    fn list_dir_recursive<'a>(&'a self, root: &'a str) -> DeviceFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            let output = self.shell.shell_checked(&format!("ls -R {root} | cat")).await?;
            Ok(parse_ls_recursive(root, &output)?)
        })
    }

    fn get_property<'a>(&'a self, name: &'a str) -> DeviceFuture<'a, String> {
        Box::pin(async move {
            let output = self.shell.shell_checked(&format!("getprop {name}")).await?;
            Ok(output.trim().to_string())
        })
    }

    fn get_package_info<'a>(
        &'a self,
        package: &'a str,
    ) -> DeviceFuture<'a, Option<PackageInfo>> {
        Box::pin(async move {
            // pm path comes first because the package dump stays valid for
            // apps uninstalled with their data kept.
            let output = self
                .shell
                .shell_checked(&format!("pm path {package}; dumpsys package {package}"))
                .await?;
            Ok(parse_path_and_package_info(package, &output)?)
        })
    }

    fn get_signature<'a>(&'a self, device_path: &'a str) -> DeviceFuture<'a, String> {
        Box::pin(async move {
            let agent = self.agent().await?;
            Ok(self
                .shell
                .shell_checked(&format!("{} get-signature {device_path}", agent.command()))
                .await?)
        })
    }

    fn mk_dir_p<'a>(&'a self, path: &'a str) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            // The shell's own mkdir cannot set permissions reliably, so
            // directory creation goes through the agent.
            let agent = self.agent().await?;
            self.shell
                .shell_checked(&format!("umask 022 && {} mkdir-p {path}", agent.command()))
                .await?;
            Ok(())
        })
    }

    fn rm_files<'a>(&'a self, dir_path: &'a str, files: &'a [String]) -> DeviceFuture<'a, ()> {
        Box::pin(async move { Ok(self.shell.rm_files(dir_path, files).await?) })
    }

    fn create_forward(&self, port: u16) -> DeviceFuture<'_, ()> {
        Box::pin(async move { Ok(self.shell.create_forward(port).await?) })
    }

    fn remove_forward(&self, port: u16) -> DeviceFuture<'_, ()> {
        Box::pin(async move { Ok(self.shell.remove_forward(port).await?) })
    }

    fn install_file<'a>(
        &'a self,
        port: u16,
        device_path: &'a str,
        source: &'a Path,
    ) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            let agent = self.agent().await?;
            exodeploy_agent_channel::install_file(
                &self.shell,
                agent.command(),
                port,
                device_path,
                source,
                &self.cancel,
            )
            .await?;
            Ok(())
        })
    }

    fn install_apk<'a>(&'a self, apk: &'a Path) -> DeviceFuture<'a, ()> {
        Box::pin(async move { Ok(self.shell.install_apk(apk).await?) })
    }

    fn stop_package<'a>(&'a self, package: &'a str) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.shell
                .shell_checked(&format!("am force-stop {package}"))
                .await?;
            Ok(())
        })
    }

    fn kill_process<'a>(&'a self, process: &'a str) -> DeviceFuture<'a, KillOutcome> {
        Box::pin(async move {
            let package = process.split_once(':').map_or(process, |(package, _)| package);
            match self
                .shell
                .shell_checked(&format!("run-as {package} killall {process}"))
                .await
            {
                Ok(_) => Ok(KillOutcome::Killed),
                Err(AdbError::ShellStatus { output, .. })
                    if output.contains("No such process") =>
                {
                    Ok(KillOutcome::NotRunning)
                }
                Err(e) => Err(e.into()),
            }
        })
    }
}
