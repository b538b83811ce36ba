//! Installer facade: fans one install out over many devices.

use std::path::PathBuf;
use std::sync::atomic::AtomicU16;
use std::sync::{Arc, LazyLock};

use exodeploy_manifest::ExoManifest;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::AGENT_PORT_BASE;
use crate::device::ExoDevice;
use crate::error::InstallError;
use crate::events::InstallEvent;
use crate::sync::DeviceInstall;

/// Conventional reverse-DNS package names: dot-separated segments of
/// letters, digits and underscores, the first starting with a letter.
static PACKAGE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*(\.[a-zA-Z0-9_]+)*$").expect("static pattern")
});

/// Everything one install needs to know about the app being installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Label used in events, typically the build target.
    pub target: String,
    pub package_name: String,
    /// The locally built main APK.
    pub apk: PathBuf,
    #[serde(default)]
    pub manifest: ExoManifest,
}

/// Result of installing on one device.
#[derive(Debug, Clone)]
pub struct DeviceResult {
    pub serial: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Runs an exopackage install across a set of devices.
///
/// One instance serves one app build; concurrent calls to
/// [`install`](Self::install) on the same instance are serialized.
#[derive(Debug)]
pub struct ExoInstaller {
    config: Arc<InstallConfig>,
    events_tx: mpsc::Sender<InstallEvent>,
    events_rx: Option<mpsc::Receiver<InstallEvent>>,
    cancel: CancellationToken,
    next_agent_port: Arc<AtomicU16>,
    serialize: Mutex<()>,
}

impl ExoInstaller {
    /// Creates an installer for `config`.
    pub fn new(config: InstallConfig) -> Result<Self, InstallError> {
        if !PACKAGE_NAME_PATTERN.is_match(&config.package_name) {
            return Err(InstallError::InvalidPackageName(config.package_name));
        }
        let (events_tx, events_rx) = mpsc::channel(256);
        Ok(Self {
            config: Arc::new(config),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
            next_agent_port: Arc::new(AtomicU16::new(AGENT_PORT_BASE)),
            serialize: Mutex::new(()),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<InstallEvent>> {
        self.events_rx.take()
    }

    /// Returns a token that cancels in-flight installs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Installs on every device in parallel and reports per-device results
    /// in input order. The run as a whole succeeded only when every device
    /// did.
    pub async fn install(
        &self,
        devices: Vec<Arc<dyn ExoDevice>>,
        process_name: Option<String>,
    ) -> Vec<DeviceResult> {
        let _serialized = self.serialize.lock().await;

        let _ = self
            .events_tx
            .send(InstallEvent::Started {
                target: self.config.target.clone(),
            })
            .await;

        let mut handles = Vec::with_capacity(devices.len());
        for device in devices {
            let serial = device.serial().to_string();
            let config = self.config.clone();
            let ports = self.next_agent_port.clone();
            let cancel = self.cancel.clone();
            let process_name = process_name.clone();
            let events_tx = self.events_tx.clone();
            let task_serial = serial.clone();
            let handle = tokio::spawn(async move {
                let install = DeviceInstall::new(device, config, &ports, cancel);
                let result = match install.run(process_name.as_deref()).await {
                    Ok(()) => {
                        info!(serial = %task_serial, "device install finished");
                        DeviceResult {
                            serial: task_serial,
                            success: true,
                            error: None,
                        }
                    }
                    Err(e) => {
                        error!(serial = %task_serial, error = %e, "device install failed");
                        DeviceResult {
                            serial: task_serial,
                            success: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                let _ = events_tx
                    .send(InstallEvent::DeviceFinished {
                        serial: result.serial.clone(),
                        success: result.success,
                        error: result.error.clone(),
                    })
                    .await;
                result
            });
            handles.push((serial, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (serial, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => results.push(DeviceResult {
                    serial,
                    success: false,
                    error: Some(format!("install task failed: {e}")),
                }),
            }
        }

        let success = results.iter().all(|result| result.success);
        let _ = self
            .events_tx
            .send(InstallEvent::Finished {
                target: self.config.target.clone(),
                success,
                package_name: self.config.package_name.clone(),
            })
            .await;
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, fake_apk};
    use exodeploy_adb::PackageInfo;

    const DIGEST: &str = "ZmFjYWRlLWRpZ2VzdA==";

    fn ready_device(serial: &str) -> MockDevice {
        let mut device = MockDevice::new(serial);
        device.packages.insert(
            "com.example.app".to_string(),
            PackageInfo {
                apk_path: "/data/app/com.example.app-1/base.apk".to_string(),
                native_library_path: "/data/app-lib/com.example.app-1".to_string(),
                version_code: "42".to_string(),
            },
        );
        device.signatures.insert(
            "/data/app/com.example.app-1/base.apk".to_string(),
            DIGEST.to_string(),
        );
        device
    }

    fn config(dir: &std::path::Path) -> InstallConfig {
        InstallConfig {
            target: "//app:app".to_string(),
            package_name: "com.example.app".to_string(),
            apk: fake_apk(dir, DIGEST),
            manifest: ExoManifest::default(),
        }
    }

    #[test]
    fn package_names_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = config(dir.path());
        bad.package_name = "1com.example".to_string();
        assert!(matches!(
            ExoInstaller::new(bad).unwrap_err(),
            InstallError::InvalidPackageName(_)
        ));

        let mut with_dash = config(dir.path());
        with_dash.package_name = "com.exam-ple".to_string();
        assert!(ExoInstaller::new(with_dash).is_err());

        assert!(ExoInstaller::new(config(dir.path())).is_ok());
    }

    #[test]
    fn take_events_only_works_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = ExoInstaller::new(config(dir.path())).unwrap();
        assert!(installer.take_events().is_some());
        assert!(installer.take_events().is_none());
    }

    #[tokio::test]
    async fn empty_device_list_still_emits_events() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = ExoInstaller::new(config(dir.path())).unwrap();
        let mut events = installer.take_events().unwrap();

        let results = installer.install(vec![], None).await;
        assert!(results.is_empty());

        drop(installer);
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        assert!(matches!(seen[0], InstallEvent::Started { .. }));
        assert!(matches!(
            seen[1],
            InstallEvent::Finished { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn installs_run_on_every_device() {
        let dir = tempfile::tempdir().unwrap();
        let installer = ExoInstaller::new(config(dir.path())).unwrap();

        let one = Arc::new(ready_device("dev-1"));
        let two = Arc::new(ready_device("dev-2"));
        let results = installer
            .install(
                vec![one.clone() as Arc<dyn ExoDevice>, two.clone() as _],
                None,
            )
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].serial, "dev-1");
        assert_eq!(results[1].serial, "dev-2");
        assert!(results.iter().all(|result| result.success));
        assert!(one.log_entries().iter().any(|e| e == "force-stop com.example.app"));
        assert!(two.log_entries().iter().any(|e| e == "force-stop com.example.app"));
    }

    #[tokio::test]
    async fn one_failing_device_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = ExoInstaller::new(config(dir.path())).unwrap();
        let mut events = installer.take_events().unwrap();

        let good = Arc::new(ready_device("dev-good"));
        // No canned signature: the signature query fails on this device.
        let mut broken = ready_device("dev-broken");
        broken.signatures.clear();
        let broken = Arc::new(broken);

        let results = installer
            .install(vec![good as Arc<dyn ExoDevice>, broken as _], None)
            .await;
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[1].error.is_some());

        drop(installer);
        let mut finished_success = None;
        while let Some(event) = events.recv().await {
            if let InstallEvent::Finished { success, .. } = event {
                finished_success = Some(success);
            }
        }
        assert_eq!(finished_success, Some(false));
    }

    #[tokio::test]
    async fn each_device_draws_its_own_agent_port() {
        let dir = tempfile::tempdir().unwrap();

        // A dex block forces a push, which opens a forward.
        let dex_dir = dir.path().join("dex");
        std::fs::create_dir_all(&dex_dir).unwrap();
        std::fs::write(dex_dir.join("libs.dex.jar"), b"DEX").unwrap();
        let metadata = dir.path().join("metadata.txt");
        std::fs::write(&metadata, "libs.dex.jar h1\n").unwrap();

        let mut config = config(dir.path());
        config.manifest.dex = Some(exodeploy_manifest::DexBlock {
            metadata,
            dex_directory: dex_dir,
        });
        let installer = ExoInstaller::new(config).unwrap();

        let one = Arc::new(ready_device("dev-1"));
        let two = Arc::new(ready_device("dev-2"));
        let results = installer
            .install(
                vec![one.clone() as Arc<dyn ExoDevice>, two.clone() as _],
                None,
            )
            .await;
        assert!(results.iter().all(|result| result.success));

        let mut ports: Vec<String> = [one, two]
            .iter()
            .flat_map(|device| device.log_entries())
            .filter(|entry| entry.starts_with("forward "))
            .collect();
        ports.sort();
        ports.dedup();
        assert_eq!(ports, vec!["forward 2828", "forward 2829"]);
    }

    #[tokio::test]
    async fn device_finished_events_carry_the_serial() {
        let dir = tempfile::tempdir().unwrap();
        let mut installer = ExoInstaller::new(config(dir.path())).unwrap();
        let mut events = installer.take_events().unwrap();

        let device = Arc::new(ready_device("dev-events")) as Arc<dyn ExoDevice>;
        installer.install(vec![device], None).await;

        drop(installer);
        let mut device_finished = false;
        while let Some(event) = events.recv().await {
            if let InstallEvent::DeviceFinished { serial, success, .. } = event {
                assert_eq!(serial, "dev-events");
                assert!(success);
                device_finished = true;
            }
        }
        assert!(device_finished);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = InstallConfig {
            target: "//app:app".to_string(),
            package_name: "com.example.app".to_string(),
            apk: PathBuf::from("/build/app.apk"),
            manifest: ExoManifest::default(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("dex"));
        let parsed: InstallConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.package_name, config.package_name);
        assert_eq!(parsed.apk, config.apk);
    }
}
