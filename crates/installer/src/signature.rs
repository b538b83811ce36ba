//! Local APK signature extraction.

use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::InstallError;

const DIGEST_HEADER: &str = "SHA1-Digest-Manifest: ";

/// Extracts the signature of a locally built APK: the manifest digest
/// recorded in the archive's `META-INF/<NAME>.SF` file. Returns an empty
/// string for unsigned archives, matching what the agent reports for them.
pub fn local_apk_signature(apk: &Path) -> Result<String, InstallError> {
    let file = std::fs::File::open(apk)?;
    let mut archive = zip::ZipArchive::new(file)?;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if !is_signature_file(entry.name()) {
            continue;
        }
        let reader = BufReader::new(entry);
        for line in reader.lines() {
            let line = line?;
            if let Some(digest) = line.strip_prefix(DIGEST_HEADER) {
                return Ok(digest.trim().to_string());
            }
            // The main header section ends at the first blank line.
            if line.trim().is_empty() {
                break;
            }
        }
    }
    Ok(String::new())
}

fn is_signature_file(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix("META-INF/")
        .and_then(|rest| rest.strip_suffix(".SF"))
    else {
        return false;
    };
    !stem.is_empty() && stem.chars().all(|c| c.is_ascii_uppercase())
}
