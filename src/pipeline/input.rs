//! Input discovery: list the prospectus files a run will process.
//!
//! The listing is sorted by file name so the results file comes out in the
//! same order on every platform and every rerun. Only regular, non-hidden
//! files are returned; whether a file really is a PDF is decided per file by
//! [`validate_pdf`], so a stray `.docx` is skipped rather than aborting the
//! run.

use crate::error::{ExtractionError, VcExtractError};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List regular, non-hidden files directly inside `dir`, sorted by name.
pub fn list_inputs(dir: &Path) -> Result<Vec<PathBuf>, VcExtractError> {
    if !dir.is_dir() {
        return Err(VcExtractError::InputDirNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| VcExtractError::InputDirUnreadable {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| VcExtractError::InputDirUnreadable {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() {
            debug!("Ignoring {}", path.display());
            continue;
        }
        files.push(path);
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Found {} input files in {}", files.len(), dir.display());
    Ok(files)
}

/// Check that `path` is readable and starts with the `%PDF` magic bytes.
pub fn validate_pdf(path: &Path) -> Result<(), ExtractionError> {
    let mut f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ExtractionError::NotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut magic = [0u8; 4];
    let read = f.read(&mut magic).unwrap_or(0);
    if read < 4 || &magic != b"%PDF" {
        return Err(ExtractionError::NotAPdf {
            path: path.to_path_buf(),
            magic: magic[..read].to_vec(),
        });
    }
    Ok(())
}

/// File name component of `path`, for logs and the prompt.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn missing_dir_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let err = list_inputs(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, VcExtractError::InputDirNotFound { .. }));
    }

    #[test]
    fn listing_is_sorted_and_skips_hidden_and_dirs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b_300750.pdf", b"%PDF-1.7");
        touch(tmp.path(), "a_000001.pdf", b"%PDF-1.4");
        touch(tmp.path(), ".DS_Store", b"junk");
        std::fs::create_dir(tmp.path().join("sub")).unwrap();

        let files = list_inputs(tmp.path()).unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a_000001.pdf", "b_300750.pdf"]);
    }

    #[test]
    fn empty_dir_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(list_inputs(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn magic_bytes_checked() {
        let tmp = TempDir::new().unwrap();
        let ok = touch(tmp.path(), "ok.pdf", b"%PDF-1.7\n...");
        let docx = touch(tmp.path(), "report.docx", b"PK\x03\x04rest");
        let tiny = touch(tmp.path(), "tiny.pdf", b"%P");

        assert!(validate_pdf(&ok).is_ok());
        match validate_pdf(&docx).unwrap_err() {
            ExtractionError::NotAPdf { magic, .. } => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            validate_pdf(&tiny).unwrap_err(),
            ExtractionError::NotAPdf { .. }
        ));
    }

    #[test]
    fn vanished_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = validate_pdf(&tmp.path().join("gone.pdf")).unwrap_err();
        assert!(matches!(err, ExtractionError::NotFound { .. }));
    }
}
