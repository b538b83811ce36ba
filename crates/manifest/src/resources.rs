//! Install plan for resource archives.

use crate::types::{ExoFilePlan, ResourcesBlock};
use crate::{METADATA_FILE, RESOURCES_DIR};

/// Builds the resources plan: each archive lands at `resources/<hash>.apk`,
/// and the top-level metadata file names the archives in manifest order.
pub fn resources_plan(block: &ResourcesBlock) -> ExoFilePlan {
    let mut plan = ExoFilePlan::default();
    let mut names = Vec::with_capacity(block.archives.len());
    for archive in &block.archives {
        names.push(format!("{}.apk", archive.hash));
        plan.files.insert(
            format!("{RESOURCES_DIR}/{}.apk", archive.hash),
            archive.source.clone(),
        );
    }
    plan.metadata.insert(
        format!("{RESOURCES_DIR}/{METADATA_FILE}"),
        names.join("\n").into_bytes(),
    );
    plan
}
