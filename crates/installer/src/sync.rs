//! Per-device synchronization engine.
//!
//! A device install is strictly sequential: directory creation happens
//! before any push into that directory, pushes happen before deletions (a
//! crash mid-install leaves the device with a superset of the old state,
//! never a subset), and metadata is written last so it never advertises a
//! file that is not present yet.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;

use exodeploy_manifest::{ExoFilePlan, dex_plan, native_plan, resources_plan};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::EXOPACKAGE_INSTALL_ROOT;
use crate::device::{ExoDevice, KillOutcome};
use crate::error::InstallError;
use crate::install::InstallConfig;
use crate::signature::local_apk_signature;

/// Name of the sentinel file the installer must never delete.
const LOCK_FILE_NAME: &str = "lock";

/// State for one install on one device.
pub(crate) struct DeviceInstall {
    device: Arc<dyn ExoDevice>,
    config: Arc<InstallConfig>,
    data_root: String,
    agent_port: u16,
    cancel: CancellationToken,
}

struct ClassPlan {
    class: &'static str,
    prefix: &'static str,
    plan: ExoFilePlan,
    pushed: bool,
}

impl DeviceInstall {
    pub(crate) fn new(
        device: Arc<dyn ExoDevice>,
        config: Arc<InstallConfig>,
        ports: &AtomicU16,
        cancel: CancellationToken,
    ) -> Self {
        let data_root = format!("{EXOPACKAGE_INSTALL_ROOT}/{}", config.package_name);
        let agent_port = ports.fetch_add(1, Ordering::SeqCst);
        Self {
            device,
            config,
            data_root,
            agent_port,
            cancel,
        }
    }

    /// Runs one complete install against this device.
    pub(crate) async fn run(&self, process_name: Option<&str>) -> Result<(), InstallError> {
        if self.config.manifest.is_exopackage() {
            self.sync_staging_area().await?;
        }

        let reinstalled = if self.should_app_be_installed().await? {
            timed("install_exo_apk", self.device.install_apk(&self.config.apk)).await?;
            true
        } else {
            false
        };

        self.check_cancelled()?;
        let kill_started = Instant::now();
        // With a full reinstall, or without a process filter, everything in
        // the package gets stopped.
        if reinstalled || process_name.is_none() {
            self.device.stop_package(&self.config.package_name).await?;
        } else if let Some(process) = process_name {
            match self.device.kill_process(process).await? {
                KillOutcome::Killed => {}
                KillOutcome::NotRunning => {
                    warn!(process, "no matching process; it was not running or does not exist");
                }
            }
        }
        debug!(
            scope = "kill_app",
            elapsed_ms = kill_started.elapsed().as_millis() as u64,
            "perf scope"
        );
        Ok(())
    }

    /// Brings the staging area in line with the manifest.
    async fn sync_staging_area(&self) -> Result<(), InstallError> {
        self.check_cancelled()?;
        self.device.mk_dir_p(&self.data_root).await?;
        let present = self.device.list_dir_recursive(&self.data_root).await?;
        debug!(
            serial = self.device.serial(),
            present = present.len(),
            "listed staging area"
        );

        let mut classes = self.build_plans().await?;

        // Wanted covers data files and metadata files; metadata paths are
        // stable across runs and must survive the deletion pass.
        let mut wanted: BTreeSet<String> = BTreeSet::new();
        for class in &classes {
            wanted.extend(class.plan.files.keys().cloned());
            wanted.extend(class.plan.metadata.keys().cloned());
        }

        for class in &mut classes {
            let missing: BTreeMap<String, PathBuf> = class
                .plan
                .files
                .iter()
                .filter(|(path, _)| !present.contains(*path))
                .map(|(path, source)| (path.clone(), source.clone()))
                .collect();
            class.pushed = !missing.is_empty();
            timed(
                &format!("multi_install_{}", class.class),
                self.install_files(&missing),
            )
            .await?;
        }

        let deleted = self.delete_unwanted_files(&present, &wanted).await?;

        // Rewrite metadata only where the class changed; untouched classes
        // keep their bytes so a re-run against the same manifest is a no-op.
        let mut metadata: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for class in &classes {
            let dirty = class.pushed
                || deleted.iter().any(|path| path.starts_with(class.prefix))
                || class.plan.metadata.keys().any(|path| !present.contains(path));
            if dirty {
                metadata.extend(
                    class
                        .plan
                        .metadata
                        .iter()
                        .map(|(path, bytes)| (path.clone(), bytes.clone())),
                );
            }
        }
        self.install_metadata(&metadata).await
    }

    async fn build_plans(&self) -> Result<Vec<ClassPlan>, InstallError> {
        let manifest = &self.config.manifest;
        let mut classes = Vec::new();
        if let Some(dex) = &manifest.dex {
            classes.push(ClassPlan {
                class: "secondary_dex",
                prefix: "secondary-dex/",
                plan: dex_plan(dex)?,
                pushed: false,
            });
        }
        if let Some(native) = &manifest.native {
            let abis = self.device_abis().await?;
            debug!(serial = self.device.serial(), ?abis, "device ABI preference");
            classes.push(ClassPlan {
                class: "native_library",
                prefix: "native-libs/",
                plan: native_plan(native, &abis)?,
                pushed: false,
            });
        }
        if let Some(resources) = &manifest.resources {
            classes.push(ClassPlan {
                class: "resources",
                prefix: "resources/",
                plan: resources_plan(resources),
                pushed: false,
            });
        }
        Ok(classes)
    }

    /// Reads the device's ABI preference list.
    async fn device_abis(&self) -> Result<Vec<String>, InstallError> {
        let abilist = self.device.get_property("ro.product.cpu.abilist").await?;
        if !abilist.is_empty() {
            return Ok(abilist.split(',').map(str::to_string).collect());
        }
        let abi = self.device.get_property("ro.product.cpu.abi").await?;
        if abi.is_empty() {
            return Err(InstallError::Device(
                "device returned an empty ro.product.cpu.abi property".to_string(),
            ));
        }
        let mut abis = vec![abi];
        let abi2 = self.device.get_property("ro.product.cpu.abi2").await?;
        if !abi2.is_empty() {
            abis.push(abi2);
        }
        Ok(abis)
    }

    /// Pushes a batch of files, creating their parent directories first. The
    /// forward stays open for the whole batch and is released on every exit
    /// path.
    async fn install_files(&self, files: &BTreeMap<String, PathBuf>) -> Result<(), InstallError> {
        if files.is_empty() {
            return Ok(());
        }
        let forward = ForwardGuard::open(self.device.clone(), self.agent_port).await?;
        let result = self.push_files(files).await;
        forward.release().await;
        result
    }

    async fn push_files(&self, files: &BTreeMap<String, PathBuf>) -> Result<(), InstallError> {
        let dirs: BTreeSet<String> = files
            .keys()
            .map(|path| self.device_dir(parent_dir(path)))
            .collect();
        for dir in dirs {
            self.check_cancelled()?;
            self.device.mk_dir_p(&dir).await?;
        }
        for (path, source) in files {
            self.check_cancelled()?;
            let destination = format!("{}/{path}", self.data_root);
            timed(
                "install_file",
                self.device.install_file(self.agent_port, &destination, source),
            )
            .await?;
        }
        Ok(())
    }

    /// Deletes present files that are neither wanted nor the `lock`
    /// sentinel, grouped by parent directory. Returns what was deleted.
    async fn delete_unwanted_files(
        &self,
        present: &BTreeSet<String>,
        wanted: &BTreeSet<String>,
    ) -> Result<Vec<String>, InstallError> {
        let doomed: Vec<String> = present
            .iter()
            .filter(|path| file_name(path) != LOCK_FILE_NAME && !wanted.contains(*path))
            .cloned()
            .collect();

        let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in &doomed {
            by_dir
                .entry(parent_dir(path).to_string())
                .or_default()
                .push(file_name(path).to_string());
        }
        for (dir, files) in &by_dir {
            self.check_cancelled()?;
            self.device.rm_files(&self.device_dir(dir), files).await?;
        }
        Ok(doomed)
    }

    /// Stages metadata bytes in temporary host files and pushes them like
    /// data files.
    async fn install_metadata(
        &self,
        metadata: &BTreeMap<String, Vec<u8>>,
    ) -> Result<(), InstallError> {
        if metadata.is_empty() {
            return Ok(());
        }
        let mut temps = Vec::with_capacity(metadata.len());
        let mut files = BTreeMap::new();
        for (path, bytes) in metadata {
            let mut temp = NamedTempFile::new()?;
            temp.write_all(bytes)?;
            temp.flush()?;
            files.insert(path.clone(), temp.path().to_path_buf());
            temps.push(temp);
        }
        timed("multi_install_metadata", self.install_files(&files)).await
    }

    /// Decides whether the main APK must be (re)installed.
    async fn should_app_be_installed(&self) -> Result<bool, InstallError> {
        let package = &self.config.package_name;
        let info = timed("get_package_info", self.device.get_package_info(package)).await?;
        let Some(info) = info else {
            info!(package = %package, "app not installed; installing now");
            return Ok(true);
        };
        debug!(apk_path = %info.apk_path, "installed app path");

        let installed_signature = self.installed_app_signature(&info.apk_path).await?;
        let apk = self.config.apk.clone();
        let local_signature = tokio::task::spawn_blocking(move || local_apk_signature(&apk))
            .await
            .map_err(|e| InstallError::Device(format!("signature task failed: {e}")))??;
        debug!(
            local = %local_signature,
            installed = %installed_signature,
            "app signatures"
        );

        if installed_signature != local_signature {
            debug!("app signatures differ; reinstalling");
            return Ok(true);
        }
        debug!("app signatures match; skipping reinstall");
        Ok(false)
    }

    /// The agent must answer with a single-line signature; embedded line
    /// breaks mean the output was not a signature at all.
    async fn installed_app_signature(&self, package_path: &str) -> Result<String, InstallError> {
        let output = timed(
            "get_app_signature",
            self.device.get_signature(package_path),
        )
        .await?;
        let result = output.trim();
        if result.contains('\n') || result.contains('\r') {
            return Err(InstallError::SignatureFormat(output));
        }
        Ok(result.to_string())
    }

    fn device_dir(&self, relative_dir: &str) -> String {
        if relative_dir.is_empty() {
            self.data_root.clone()
        } else {
            format!("{}/{relative_dir}", self.data_root)
        }
    }

    fn check_cancelled(&self) -> Result<(), InstallError> {
        if self.cancel.is_cancelled() {
            Err(InstallError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Scoped port forward: released explicitly on the normal path, best-effort
/// from `Drop` so an unwind cannot leak the forward.
struct ForwardGuard {
    device: Arc<dyn ExoDevice>,
    port: u16,
    released: bool,
}

impl ForwardGuard {
    async fn open(device: Arc<dyn ExoDevice>, port: u16) -> Result<Self, InstallError> {
        device.create_forward(port).await?;
        Ok(Self {
            device,
            port,
            released: false,
        })
    }

    async fn release(mut self) {
        self.released = true;
        if let Err(error) = self.device.remove_forward(self.port).await {
            // A stale forward is recreated on the next install, so this is
            // not fatal.
            warn!(port = self.port, %error, "failed to remove port forward");
        }
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let device = self.device.clone();
        let port = self.port;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(error) = device.remove_forward(port).await {
                    warn!(port, %error, "failed to remove port forward");
                }
            });
        } else {
            warn!(port, "port forward left behind outside a runtime");
        }
    }
}

async fn timed<T>(
    name: &str,
    fut: impl Future<Output = Result<T, InstallError>>,
) -> Result<T, InstallError> {
    let started = Instant::now();
    let result = fut.await;
    debug!(
        scope = name,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "perf scope"
    );
    result
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}
