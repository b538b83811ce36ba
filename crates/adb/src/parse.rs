//! Parsers for semi-structured device command output.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AdbError;

const LINKER_WARNING_PREFIX: &str = "WARNING: linker: ";
const PM_PATH_PREFIX: &str = "package:";

/// Install details for a package already on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub apk_path: String,
    pub native_library_path: String,
    pub version_code: String,
}

fn device_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().filter(|line| !line.is_empty())
}

/// Parses `ls -R <root> | cat` output into the set of regular-file paths
/// under `root`, expressed relative to it.
///
/// Lines ending in `:` open a directory section; following non-empty lines
/// are entries of that directory. Directories show up both as section
/// headers and as entries of their parent, so the header set is subtracted
/// from the entry set to keep files only. An entry before any header means
/// the output is not a recursive listing at all.
pub fn parse_ls_recursive(root: &str, output: &str) -> Result<BTreeSet<String>, AdbError> {
    let mut entries: HashSet<String> = HashSet::new();
    let mut dirs: HashSet<String> = HashSet::new();
    let mut current: Option<String> = None;
    for line in device_lines(output) {
        if let Some(dir) = line.strip_suffix(':') {
            let rel = relativize(root, dir);
            dirs.insert(rel.clone());
            current = Some(rel);
        } else {
            let Some(dir) = &current else {
                return Err(AdbError::MalformedOutput(format!(
                    "ls -R entry {line:?} appeared before any directory header"
                )));
            };
            entries.insert(join_relative(dir, line));
        }
    }
    Ok(entries.difference(&dirs).cloned().collect())
}

fn relativize(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    match path.strip_prefix(root) {
        Some(rest) => rest.trim_start_matches('/').to_string(),
        None => path.to_string(),
    }
}

fn join_relative(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Parses the concatenated output of `pm path <pkg>` and
/// `dumpsys package <pkg>`.
///
/// Returns `Ok(None)` when the package is not installed. `pm path` is
/// consulted first because the package dump stays valid for apps
/// uninstalled with their data kept. Missing keys or a code/resource path
/// mismatch in an otherwise-present dump are malformed output.
pub fn parse_path_and_package_info(
    package_name: &str,
    output: &str,
) -> Result<Option<PackageInfo>, AdbError> {
    // Emulators prepend linker warnings about non-PIC code; skip them.
    let pm_path = device_lines(output).find(|line| !line.starts_with(LINKER_WARNING_PREFIX));
    match pm_path {
        Some(line) if line.starts_with(PM_PATH_PREFIX) => {}
        _ => {
            warn!(package = package_name, "unable to locate package path");
            return Ok(None);
        }
    }

    let package_prefix = format!("  Package [{package_name}] (");
    const OTHER_PREFIX: &str = "  Package [";
    let mut saw_package_line = false;

    let mut code_path: Option<String> = None;
    let mut resource_path: Option<String> = None;
    let mut native_lib_path: Option<String> = None;
    let mut version_code: Option<String> = None;

    for line in device_lines(output) {
        if line.starts_with(&package_prefix) {
            saw_package_line = true;
            continue;
        }
        // A different package section ends the scan.
        if line.starts_with(OTHER_PREFIX) {
            break;
        }
        if !saw_package_line {
            continue;
        }
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key {
            "codePath" => code_path = Some(value.to_string()),
            "resourcePath" => resource_path = Some(value.to_string()),
            // Lollipop calls this legacyNativeLibraryDir.
            "nativeLibraryPath" | "legacyNativeLibraryDir" => {
                native_lib_path = Some(value.to_string());
            }
            "versionCode" => {
                // Drop the "targetSdk=..." tail sharing the line.
                version_code = Some(value.split_once(' ').map_or(value, |(code, _)| code).to_string());
            }
            _ => {}
        }
    }

    if !saw_package_line {
        return Ok(None);
    }

    let (Some(code_path), Some(resource_path), Some(native_library_path), Some(version_code)) =
        (code_path, resource_path, native_lib_path, version_code)
    else {
        return Err(AdbError::MalformedOutput(format!(
            "package dump for {package_name} is missing required keys"
        )));
    };
    if code_path != resource_path {
        return Err(AdbError::MalformedOutput(format!(
            "code path {code_path:?} and resource path {resource_path:?} do not match"
        )));
    }

    // Lollipop reports the install directory rather than the full APK path.
    let apk_path = if code_path.ends_with(".apk") {
        code_path
    } else {
        format!("{code_path}/base.apk")
    };

    Ok(Some(PackageInfo {
        apk_path,
        native_library_path,
        version_code,
    }))
}
