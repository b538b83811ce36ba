//! Shell command execution against a single device.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::MAX_ADB_COMMAND_SIZE;
use crate::chunk::chunk_args;
use crate::error::AdbError;

/// Suffix appended to commands that need explicit exit-status checking.
pub const EXIT_STATUS_SUFFIX: &str = " ; echo -n :$?";

/// Handle for running commands on one device through the `adb` binary.
#[derive(Debug, Clone)]
pub struct AdbShell {
    adb_path: PathBuf,
    serial: String,
}

impl AdbShell {
    pub fn new(adb_path: impl Into<PathBuf>, serial: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Runs a raw shell command on the device and returns its output.
    pub async fn shell(&self, command: &str) -> Result<String, AdbError> {
        debug!(serial = %self.serial, command, "adb shell");
        let output = Command::new(&self.adb_path)
            .arg("-s")
            .arg(&self.serial)
            .arg("shell")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::CommandFailed {
                command: command.to_string(),
                output: format!("{stdout}{stderr}"),
            });
        }
        Ok(stdout)
    }

    /// Runs a shell command with an exit-status marker appended, verifies the
    /// marker and strips it, failing when the device-side command exited
    /// non-zero.
    pub async fn shell_checked(&self, command: &str) -> Result<String, AdbError> {
        let full = format!("{command}{EXIT_STATUS_SUFFIX}");
        let output = self.shell(&full).await?;
        check_status_output(command, &output)
    }

    /// Spawns a shell command with piped stdout for incremental reads.
    pub fn spawn_shell(&self, command: &str) -> Result<Child, AdbError> {
        debug!(serial = %self.serial, command, "adb shell (streaming)");
        let child = Command::new(&self.adb_path)
            .arg("-s")
            .arg(&self.serial)
            .arg("shell")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(child)
    }

    /// Forwards host TCP `port` to the same port on the device.
    pub async fn create_forward(&self, port: u16) -> Result<(), AdbError> {
        self.adb(&["forward", &format!("tcp:{port}"), &format!("tcp:{port}")])
            .await
            .map(|_| ())
    }

    /// Removes a forward previously created with
    /// [`create_forward`](Self::create_forward).
    pub async fn remove_forward(&self, port: u16) -> Result<(), AdbError> {
        self.adb(&["forward", "--remove", &format!("tcp:{port}")])
            .await
            .map(|_| ())
    }

    /// Installs an APK, replacing any existing install.
    pub async fn install_apk(&self, apk: &Path) -> Result<(), AdbError> {
        let apk_str = apk.to_string_lossy();
        let output = self.adb(&["install", "-r", "-d", apk_str.as_ref()]).await?;
        if !output.contains("Success") {
            return Err(AdbError::CommandFailed {
                command: format!("install -r -d {apk_str}"),
                output,
            });
        }
        Ok(())
    }

    /// Deletes `files` inside `dir_path`, chunking the argument list so every
    /// command stays within the shell command cap.
    pub async fn rm_files(&self, dir_path: &str, files: &[String]) -> Result<(), AdbError> {
        for command in rm_commands(dir_path, files) {
            self.shell_checked(&command).await?;
        }
        Ok(())
    }

    async fn adb(&self, args: &[&str]) -> Result<String, AdbError> {
        debug!(serial = %self.serial, ?args, "adb");
        let output = Command::new(&self.adb_path)
            .arg("-s")
            .arg(&self.serial)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdbError::CommandFailed {
                command: args.join(" "),
                output: format!("{stdout}{stderr}"),
            });
        }
        Ok(stdout)
    }
}

/// Builds the `cd <dir> && rm <files...>` command sequence for a bulk
/// delete, keeping every command within [`MAX_ADB_COMMAND_SIZE`].
pub fn rm_commands(dir_path: &str, files: &[String]) -> Vec<String> {
    let prefix = format!("cd {dir_path} && rm ");
    // Fudge factor for separators and the status-check suffix.
    let overhead = prefix.len() + 100;
    chunk_args(
        files.iter().cloned(),
        MAX_ADB_COMMAND_SIZE.saturating_sub(overhead),
    )
    .into_iter()
    .map(|chunk| format!("{prefix}{}", chunk.join(" ")))
    .collect()
}

/// Verifies the `:<status>` marker at the end of `output` and strips it.
pub fn check_status_output(command: &str, output: &str) -> Result<String, AdbError> {
    let Some(idx) = output.rfind(':') else {
        return Err(AdbError::MissingStatusMarker {
            command: command.to_string(),
            output: output.to_string(),
        });
    };
    let (body, marker) = output.split_at(idx);
    let Ok(status) = marker[1..].trim().parse::<i32>() else {
        return Err(AdbError::MissingStatusMarker {
            command: command.to_string(),
            output: output.to_string(),
        });
    };
    if status != 0 {
        return Err(AdbError::ShellStatus {
            command: command.to_string(),
            status,
            output: body.to_string(),
        });
    }
    Ok(body.to_string())
}
