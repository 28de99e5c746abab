//! Zip archive reading and writing for test packages.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{PackageError, PackageResult};
use crate::resources::MANIFEST_FILE_NAME;

/// Accumulates package entries in memory and commits them to disk once.
///
/// Nothing touches the filesystem until [`PackageWriter::save`].
#[derive(Debug, Default)]
pub struct PackageWriter {
    entries: Vec<(String, Vec<u8>)>,
    names: HashSet<String>,
}

impl PackageWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry with this name (ASCII case-insensitive) was already added.
    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(&file_name.to_ascii_lowercase())
    }

    /// Add an entry. A later entry with the same name replaces the earlier one.
    pub fn add(&mut self, file_name: impl Into<String>, bytes: Vec<u8>) {
        let file_name = file_name.into();
        let key = file_name.to_ascii_lowercase();
        if self.names.insert(key.clone()) {
            self.entries.push((file_name, bytes));
        } else if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&key))
        {
            *slot = (file_name, bytes);
        }
    }

    /// Add an entry unless one with the same name exists. Returns whether it was added.
    pub fn add_if_absent(&mut self, file_name: &str, bytes: &[u8]) -> bool {
        if self.contains(file_name) {
            return false;
        }
        self.add(file_name, bytes.to_vec());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the archive into memory.
    pub fn to_bytes(&self) -> PackageResult<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, bytes) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Write the archive to `path`.
    ///
    /// The archive goes to a temporary file next to `path` first and is then
    /// renamed over it, so `path` never holds a partial package.
    pub fn save(&self, path: &Path) -> PackageResult<()> {
        let bytes = self.to_bytes()?;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(&bytes)?;
        temp.flush()?;
        temp.persist(path).map_err(|e| PackageError::Io(e.error))?;

        debug!("Saved package {:?} ({} entries)", path, self.entries.len());
        Ok(())
    }
}

/// Read access to an existing package.
pub struct PackageReader {
    path: PathBuf,
    archive: ZipArchive<File>,
    files: Vec<String>,
}

impl PackageReader {
    /// Open a package from disk.
    pub fn open(path: &Path) -> PackageResult<Self> {
        if !path.is_file() {
            return Err(PackageError::SourcePackageNotFound(path.to_path_buf()));
        }

        let archive = ZipArchive::new(File::open(path)?)?;
        let files = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            files,
        })
    }

    /// File entries (directories excluded), in archive order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// The manifest text at the package root.
    pub fn manifest(&mut self) -> PackageResult<String> {
        let name = self
            .files
            .iter()
            .find(|f| f.eq_ignore_ascii_case(MANIFEST_FILE_NAME))
            .cloned()
            .ok_or_else(|| PackageError::ManifestMissing(self.path.clone()))?;

        let bytes = self.file_bytes(&name)?;
        String::from_utf8(bytes).map_err(|e| PackageError::InvalidManifest(e.to_string()))
    }

    /// Raw bytes of one entry.
    pub fn file_bytes(&mut self, file_name: &str) -> PackageResult<Vec<u8>> {
        let mut entry = match self.archive.by_name(file_name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(PackageError::EntryNotFound {
                    name: file_name.to_string(),
                    package: self.path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_names_are_case_insensitive() {
        let mut writer = PackageWriter::new();
        assert!(writer.add_if_absent("Tests.dll", b"one"));
        assert!(!writer.add_if_absent("tests.DLL", b"two"));
        assert!(writer.contains("TESTS.dll"));
        assert_eq!(writer.len(), 1);

        // Only ASCII letters fold, like runtime file matching.
        assert!(writer.add_if_absent("Ärger.dll", b"upper"));
        assert!(writer.add_if_absent("ärger.dll", b"lower"));
        assert!(writer.contains("ärger.DLL"));
        assert_eq!(writer.len(), 3);
    }

    #[test]
    fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.zip");

        let mut writer = PackageWriter::new();
        writer.add("AppManifest.xaml", b"<Deployment />".to_vec());
        writer.add("Tests.dll", vec![1, 2, 3]);
        writer.save(&path).unwrap();

        let mut reader = PackageReader::open(&path).unwrap();
        assert_eq!(reader.files(), ["AppManifest.xaml", "Tests.dll"]);
        assert_eq!(reader.manifest().unwrap(), "<Deployment />");
        assert_eq!(reader.file_bytes("Tests.dll").unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            reader.file_bytes("Missing.dll"),
            Err(PackageError::EntryNotFound { .. })
        ));

        // Only the committed archive remains in the directory.
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_reader_reports_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-manifest.zip");
        let mut writer = PackageWriter::new();
        writer.add("Tests.dll", vec![0]);
        writer.save(&path).unwrap();

        let mut reader = PackageReader::open(&path).unwrap();
        assert!(matches!(
            reader.manifest(),
            Err(PackageError::ManifestMissing(_))
        ));
    }

    #[test]
    fn test_reader_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, "not a zip").unwrap();

        assert!(matches!(
            PackageReader::open(&path),
            Err(PackageError::Zip(_))
        ));
        assert!(matches!(
            PackageReader::open(&dir.path().join("absent.zip")),
            Err(PackageError::SourcePackageNotFound(_))
        ));
    }
}
