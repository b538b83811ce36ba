//! Install plan for secondary dex files.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ManifestError;
use crate::metadata::parse_exopackage_metadata;
use crate::types::{DexBlock, ExoFilePlan};
use crate::{METADATA_FILE, SECONDARY_DEX_DIR};

/// Matches `secondary-<N>.dex.jar <hash>` entries so they can be renamed to
/// their hash-addressed on-device form.
static SECONDARY_DEX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"secondary-(\d+)\.dex\.jar ([0-9a-fA-F]+) ").expect("static pattern")
});

/// Builds the dex install plan: one `secondary-dex/<hash>.dex.jar` per
/// listed file, plus the rewritten `secondary-dex/metadata.txt`.
pub fn dex_plan(block: &DexBlock) -> Result<ExoFilePlan, ManifestError> {
    let contents = std::fs::read_to_string(&block.metadata).map_err(|source| ManifestError::Io {
        path: block.metadata.clone(),
        source,
    })?;

    let mut plan = ExoFilePlan::default();
    for (hash, source) in parse_exopackage_metadata(&contents, &block.dex_directory)? {
        plan.files
            .insert(format!("{SECONDARY_DEX_DIR}/{hash}.dex.jar"), source);
    }
    plan.metadata.insert(
        format!("{SECONDARY_DEX_DIR}/{METADATA_FILE}"),
        rewrite_dex_metadata(&contents).into_bytes(),
    );
    Ok(plan)
}

/// The on-device dex loader looks files up by the name in the metadata's
/// first column, while the installer stores them under their content hash.
/// Entries following the `secondary-N.dex.jar` build convention are renamed
/// to the hash-addressed form; anything else passes through untouched.
fn rewrite_dex_metadata(contents: &str) -> String {
    SECONDARY_DEX_LINE
        .replace_all(contents, "secondary-$2.dex.jar $2 ")
        .into_owned()
}
