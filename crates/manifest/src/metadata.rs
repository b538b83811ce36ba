//! The two-column metadata file format.

use std::path::{Path, PathBuf};

use crate::error::ManifestError;

/// Parses metadata of the form `<name> <hash>[ <ignored>...]`, one entry per
/// line. Lines starting with `.` are skipped; a remaining line with fewer
/// than two space-separated tokens is malformed.
///
/// Returns `(hash, path)` pairs in file order with
/// `path = resolve_against/<name>`. The same hash may map to several paths.
pub fn parse_exopackage_metadata(
    contents: &str,
    resolve_against: &Path,
) -> Result<Vec<(String, PathBuf)>, ManifestError> {
    let mut entries = Vec::new();
    for line in contents.lines() {
        if line.starts_with('.') {
            continue;
        }
        let mut parts = line.split(' ');
        let (Some(name), Some(hash)) = (parts.next(), parts.next()) else {
            return Err(ManifestError::MalformedLine {
                line: line.to_string(),
            });
        };
        entries.push((hash.to_string(), resolve_against.join(name)));
    }
    Ok(entries)
}

/// Reads and parses a metadata file from disk.
pub fn parse_exopackage_metadata_file(
    path: &Path,
    resolve_against: &Path,
) -> Result<Vec<(String, PathBuf)>, ManifestError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_exopackage_metadata(&contents, resolve_against)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_resolve_against_the_base() {
        let entries =
            parse_exopackage_metadata("secondary-1.dex.jar abc123\n", Path::new("/build/dex"))
                .unwrap();
        assert_eq!(
            entries,
            vec![(
                "abc123".to_string(),
                PathBuf::from("/build/dex/secondary-1.dex.jar")
            )]
        );
    }

    #[test]
    fn trailing_columns_are_ignored() {
        let entries = parse_exopackage_metadata(
            "secondary-1.dex.jar abc123 com.example.Canary\n",
            Path::new("/b"),
        )
        .unwrap();
        assert_eq!(entries[0].0, "abc123");
    }

    #[test]
    fn dot_lines_are_skipped() {
        let entries = parse_exopackage_metadata(
            ".id com.example\n.root something\nlibx.so h2\n",
            Path::new("/libs"),
        )
        .unwrap();
        assert_eq!(entries, vec![("h2".to_string(), PathBuf::from("/libs/libx.so"))]);
    }

    #[test]
    fn one_hash_may_have_several_paths() {
        let entries =
            parse_exopackage_metadata("a.jar h1\nb.jar h1\n", Path::new("/b")).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "h1");
        assert_eq!(entries[1].0, "h1");
        assert_ne!(entries[0].1, entries[1].1);
    }

    #[test]
    fn a_single_token_line_is_malformed() {
        let err = parse_exopackage_metadata("just-a-name\n", Path::new("/b")).unwrap_err();
        assert!(matches!(err, ManifestError::MalformedLine { .. }));
    }

    #[test]
    fn an_empty_line_is_malformed() {
        let err = parse_exopackage_metadata("a.jar h1\n\nb.jar h2\n", Path::new("/b")).unwrap_err();
        assert!(matches!(err, ManifestError::MalformedLine { .. }));
    }

    #[test]
    fn serialized_entries_parse_back() {
        let entries = vec![
            ("h1".to_string(), PathBuf::from("/b/a.jar")),
            ("h2".to_string(), PathBuf::from("/b/c.jar")),
            ("h1".to_string(), PathBuf::from("/b/d.jar")),
        ];
        let contents: String = entries
            .iter()
            .map(|(hash, path)| {
                let name = path.file_name().unwrap().to_string_lossy();
                format!("{name} {hash}\n")
            })
            .collect();
        let parsed = parse_exopackage_metadata(&contents, Path::new("/b")).unwrap();
        assert_eq!(parsed, entries);
    }
}
