//! Embedded resources: runtime support binaries and document templates.
//!
//! Every resource is addressed by its logical file name and resolved at
//! compile time with `include_bytes!`/`include_str!`.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{PackageError, PackageResult};

/// File name of the manifest at the package root.
pub const MANIFEST_FILE_NAME: &str = "AppManifest.xaml";

/// Placeholder token in the manifest template.
pub const ASSEMBLY_PARTS_PLACEHOLDER: &str = "{ADDITIONAL_ASSEMBLY_PARTS}";

/// Placeholder token in the host page template.
pub const PACKAGE_URL_PLACEHOLDER: &str = "{PACKAGE_URL}";

/// Manifest template shipped with the runner.
pub const MANIFEST_TEMPLATE: &str = include_str!("../resources/AppManifest.template.xaml");

/// Host page template shipped with the runner.
pub const HOST_PAGE_TEMPLATE: &str = include_str!("../resources/host_page.html");

/// Names of the runtime support files injected into every package.
pub struct RuntimeFiles;

impl RuntimeFiles {
    pub const HARNESS_DLL: &'static str = "Lantern.Harness.dll";
    pub const HARNESS_PDB: &'static str = "Lantern.Harness.pdb";
    pub const BRIDGE_DLL: &'static str = "Lantern.Bridge.dll";
    pub const BRIDGE_PDB: &'static str = "Lantern.Bridge.pdb";
    pub const TESTING_DLL: &'static str = "Lantern.Testing.dll";
    pub const TESTING_PDB: &'static str = "Lantern.Testing.pdb";

    /// All runtime support files, in injection order.
    pub const ALL: [&'static str; 6] = [
        Self::TESTING_DLL,
        Self::TESTING_PDB,
        Self::HARNESS_DLL,
        Self::HARNESS_PDB,
        Self::BRIDGE_DLL,
        Self::BRIDGE_PDB,
    ];
}

static EMBEDDED_RUNTIME: [(&str, &[u8]); 6] = [
    (
        RuntimeFiles::TESTING_DLL,
        include_bytes!("../resources/runtime/Lantern.Testing.dll"),
    ),
    (
        RuntimeFiles::TESTING_PDB,
        include_bytes!("../resources/runtime/Lantern.Testing.pdb"),
    ),
    (
        RuntimeFiles::HARNESS_DLL,
        include_bytes!("../resources/runtime/Lantern.Harness.dll"),
    ),
    (
        RuntimeFiles::HARNESS_PDB,
        include_bytes!("../resources/runtime/Lantern.Harness.pdb"),
    ),
    (
        RuntimeFiles::BRIDGE_DLL,
        include_bytes!("../resources/runtime/Lantern.Bridge.dll"),
    ),
    (
        RuntimeFiles::BRIDGE_PDB,
        include_bytes!("../resources/runtime/Lantern.Bridge.pdb"),
    ),
];

/// A single runtime support file.
#[derive(Debug, Clone)]
pub struct RuntimeFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// The set of runtime support files seeded into every package.
#[derive(Debug, Clone)]
pub struct RuntimeSupport {
    files: Vec<RuntimeFile>,
}

impl Default for RuntimeSupport {
    fn default() -> Self {
        Self::embedded()
    }
}

impl RuntimeSupport {
    /// The runtime support files compiled into this binary.
    pub fn embedded() -> Self {
        Self {
            files: EMBEDDED_RUNTIME
                .iter()
                .map(|(name, bytes)| RuntimeFile {
                    name: (*name).to_string(),
                    bytes: bytes.to_vec(),
                })
                .collect(),
        }
    }

    /// Load the runtime support files from a directory of harness build output.
    ///
    /// Every name in [`RuntimeFiles::ALL`] must exist in `dir`.
    pub fn from_dir(dir: &Path) -> PackageResult<Self> {
        let mut files = Vec::with_capacity(RuntimeFiles::ALL.len());
        for name in RuntimeFiles::ALL {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(PackageError::MissingResource(path.display().to_string()));
            }
            debug!("Loading runtime support file {:?}", path);
            files.push(RuntimeFile {
                name: name.to_string(),
                bytes: fs::read(&path)?,
            });
        }
        Ok(Self { files })
    }

    pub fn files(&self) -> &[RuntimeFile] {
        &self.files
    }

    /// Whether `file_name` is one of the runtime support files (ASCII case-insensitive).
    pub fn contains(&self, file_name: &str) -> bool {
        self.files
            .iter()
            .any(|f| f.name.eq_ignore_ascii_case(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_runtime_has_every_file() {
        let support = RuntimeSupport::embedded();
        assert_eq!(support.files().len(), RuntimeFiles::ALL.len());
        for name in RuntimeFiles::ALL {
            assert!(support.contains(name));
        }
        assert!(support.contains("lantern.harness.DLL"));
        assert!(!support.contains("Tests.dll"));
    }

    #[test]
    fn test_templates_carry_placeholders() {
        assert!(MANIFEST_TEMPLATE.contains(ASSEMBLY_PARTS_PLACEHOLDER));
        assert!(HOST_PAGE_TEMPLATE.contains(PACKAGE_URL_PLACEHOLDER));
    }

    #[test]
    fn test_from_dir_requires_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = RuntimeSupport::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, PackageError::MissingResource(_)));

        for name in RuntimeFiles::ALL {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        let support = RuntimeSupport::from_dir(dir.path()).unwrap();
        assert_eq!(support.files().len(), 6);
        assert_eq!(support.files()[0].bytes, RuntimeFiles::TESTING_DLL.as_bytes());
    }
}
