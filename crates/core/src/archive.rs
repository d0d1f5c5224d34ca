//! Unpacking of bulk-download archives

use std::fs::File;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Extract every entry of the zip file at `archive` below `dest`.
///
/// Existing files are overwritten. Returns the number of files written.
///
/// # Errors
/// Fails on unreadable archives, on I/O errors, and with
/// [`Error::UnsafeArchiveEntry`] for entries that would land outside `dest`.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    debug!(source = %archive.display(), dest = %dest.display(), "Unzipping file");

    let zip_err = |source| Error::Extraction {
        archive: archive.to_path_buf(),
        dest: dest.to_path_buf(),
        source,
    };
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| Error::ExtractionIo { path, source }
    };

    let file = File::open(archive).map_err(io_err(archive))?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| Error::UnsafeArchiveEntry {
                name: entry.name().to_string(),
            })?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            trace!(dir = %out_path.display(), "Creating directory");
            std::fs::create_dir_all(&out_path).map_err(io_err(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        trace!(source = entry.name(), dest = %out_path.display(), "Extracting file");
        let mut out = File::create(&out_path).map_err(io_err(&out_path))?;
        std::io::copy(&mut entry, &mut out).map_err(io_err(&out_path))?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn make_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_extract_nested_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        make_zip(
            &archive,
            &[
                ("toplevel.file", b"top"),
                ("Dir In Archive/Sub Dir.file", b"nested"),
            ],
        );

        let dest = dir.path().join("run");
        let written = extract(&archive, &dest).unwrap();

        assert_eq!(written, 2);
        assert_eq!(std::fs::read(dest.join("toplevel.file")).unwrap(), b"top");
        assert_eq!(
            std::fs::read(dest.join("Dir In Archive/Sub Dir.file")).unwrap(),
            b"nested"
        );
    }

    #[test]
    fn test_extract_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("bundle.zip");
        make_zip(&archive, &[("a.pdf", b"new")]);
        std::fs::write(dir.path().join("a.pdf"), b"old").unwrap();

        extract(&archive, dir.path()).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.pdf")).unwrap(), b"new");
    }

    #[test]
    fn test_extract_rejects_escaping_entry() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        make_zip(&archive, &[("../evil.txt", b"x")]);

        let dest = dir.path().join("run");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, Error::UnsafeArchiveEntry { .. }), "{err:?}");
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_extract_not_a_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let err = extract(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, Error::Extraction { .. }), "{err:?}");
    }
}
