//! Install plan for native libraries.

use std::path::Path;

use crate::error::ManifestError;
use crate::metadata::parse_exopackage_metadata_file;
use crate::types::{ExoFilePlan, NativeBlock};
use crate::{METADATA_FILE, NATIVE_LIBS_DIR};

/// Builds the native-library plan for one device.
///
/// `device_abis` is the device's preference list; ABIs the app does not ship
/// are skipped and the selection keeps the device's order. Libraries land at
/// `native-libs/<abi>/<hash>.so` with a per-ABI metadata file of
/// `<soname> <hash>` lines; the top-level metadata file records the selected
/// ABIs, one per line.
pub fn native_plan(
    block: &NativeBlock,
    device_abis: &[String],
) -> Result<ExoFilePlan, ManifestError> {
    let mut plan = ExoFilePlan::default();
    let mut selected_abis: Vec<String> = Vec::new();

    for abi in device_abis {
        let Some(metadata_path) = block.abi_metadata.get(abi) else {
            continue;
        };
        selected_abis.push(abi.clone());

        let resolve_against = metadata_path.parent().unwrap_or_else(|| Path::new(""));
        let mut lines = Vec::new();
        for (hash, source) in parse_exopackage_metadata_file(metadata_path, resolve_against)? {
            let soname = source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            lines.push(format!("{soname} {hash}"));
            plan.files
                .insert(format!("{NATIVE_LIBS_DIR}/{abi}/{hash}.so"), source);
        }
        plan.metadata.insert(
            format!("{NATIVE_LIBS_DIR}/{abi}/{METADATA_FILE}"),
            lines.join("\n").into_bytes(),
        );
    }

    if selected_abis.is_empty() {
        return Err(ManifestError::NoCompatibleAbi {
            device_abis: device_abis.to_vec(),
        });
    }
    plan.metadata.insert(
        format!("{NATIVE_LIBS_DIR}/{METADATA_FILE}"),
        selected_abis.join("\n").into_bytes(),
    );
    Ok(plan)
}
