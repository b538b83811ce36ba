//! In-memory device used by engine and facade tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use exodeploy_adb::PackageInfo;

use crate::device::{DeviceFuture, ExoDevice, KillOutcome};
use crate::error::InstallError;

/// Recording device: canned answers in, operation log out.
#[derive(Default)]
pub(crate) struct MockDevice {
    pub serial: String,
    /// Absolute device path → file bytes.
    pub files: Mutex<BTreeMap<String, Vec<u8>>>,
    /// Directories created through `mk_dir_p`.
    pub dirs: Mutex<BTreeSet<String>>,
    pub properties: HashMap<String, String>,
    pub packages: HashMap<String, PackageInfo>,
    /// Device path → canned `get-signature` output.
    pub signatures: HashMap<String, String>,
    /// Chronological record of device operations.
    pub log: Mutex<Vec<String>>,
    /// Canned kill result; `None` makes the kill command fail.
    pub kill_outcome: Option<KillOutcome>,
}

impl MockDevice {
    pub fn new(serial: &str) -> Self {
        Self {
            serial: serial.to_string(),
            kill_outcome: Some(KillOutcome::Killed),
            ..Default::default()
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn insert_file(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }

    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// All file paths under `root`, relative to it.
    pub fn file_set(&self, root: &str) -> BTreeSet<String> {
        let prefix = format!("{}/", root.trim_end_matches('/'));
        self.files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

impl ExoDevice for MockDevice {
    fn serial(&self) -> &str {
        &self.serial
    }

    fn list_dir_recursive<'a>(&'a self, root: &'a str) -> DeviceFuture<'a, BTreeSet<String>> {
        Box::pin(async move {
            self.record(format!("ls -R {root}"));
            Ok(self.file_set(root))
        })
    }

    fn get_property<'a>(&'a self, name: &'a str) -> DeviceFuture<'a, String> {
        Box::pin(async move {
            self.record(format!("getprop {name}"));
            Ok(self.properties.get(name).cloned().unwrap_or_default())
        })
    }

    fn get_package_info<'a>(
        &'a self,
        package: &'a str,
    ) -> DeviceFuture<'a, Option<PackageInfo>> {
        Box::pin(async move {
            self.record(format!("pm path {package}"));
            Ok(self.packages.get(package).cloned())
        })
    }

    fn get_signature<'a>(&'a self, device_path: &'a str) -> DeviceFuture<'a, String> {
        Box::pin(async move {
            self.record(format!("get-signature {device_path}"));
            self.signatures
                .get(device_path)
                .cloned()
                .ok_or_else(|| InstallError::Device(format!("no signature for {device_path}")))
        })
    }

    fn mk_dir_p<'a>(&'a self, path: &'a str) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("mkdir-p {path}"));
            self.dirs.lock().unwrap().insert(path.to_string());
            Ok(())
        })
    }

    fn rm_files<'a>(&'a self, dir_path: &'a str, files: &'a [String]) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("rm {dir_path} {}", files.join(" ")));
            let mut tree = self.files.lock().unwrap();
            for name in files {
                tree.remove(&format!("{dir_path}/{name}"));
            }
            Ok(())
        })
    }

    fn create_forward(&self, port: u16) -> DeviceFuture<'_, ()> {
        Box::pin(async move {
            self.record(format!("forward {port}"));
            Ok(())
        })
    }

    fn remove_forward(&self, port: u16) -> DeviceFuture<'_, ()> {
        Box::pin(async move {
            self.record(format!("remove-forward {port}"));
            Ok(())
        })
    }

    fn install_file<'a>(
        &'a self,
        _port: u16,
        device_path: &'a str,
        source: &'a Path,
    ) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("receive-file {device_path}"));
            let parent = device_path
                .rsplit_once('/')
                .map_or("", |(dir, _)| dir);
            if !self.dirs.lock().unwrap().contains(parent) {
                return Err(InstallError::Device(format!(
                    "push into missing directory {parent}"
                )));
            }
            let bytes = std::fs::read(source)?;
            self.files
                .lock()
                .unwrap()
                .insert(device_path.to_string(), bytes);
            Ok(())
        })
    }

    fn install_apk<'a>(&'a self, _apk: &'a Path) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.record("install-apk".to_string());
            Ok(())
        })
    }

    fn stop_package<'a>(&'a self, package: &'a str) -> DeviceFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("force-stop {package}"));
            Ok(())
        })
    }

    fn kill_process<'a>(&'a self, process: &'a str) -> DeviceFuture<'a, KillOutcome> {
        Box::pin(async move {
            self.record(format!("killall {process}"));
            match self.kill_outcome {
                Some(outcome) => Ok(outcome),
                None => Err(InstallError::Device("run-as failed".to_string())),
            }
        })
    }
}

/// Builds a minimal signed APK whose signature file carries `digest`.
pub(crate) fn fake_apk(dir: &Path, digest: &str) -> std::path::PathBuf {
    let path = dir.join("app.apk");
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("classes.dex", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"DEX").unwrap();
    writer
        .start_file("META-INF/CERT.SF", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(format!("Signature-Version: 1.0\nSHA1-Digest-Manifest: {digest}\n\n").as_bytes())
        .unwrap();
    writer.finish().unwrap();
    path
}
