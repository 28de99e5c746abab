//! Test package assembly.
//!
//! Both build variants seed the runtime support files first, add the caller's
//! files, render the manifest last and commit the archive in a single save.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::archive::{PackageReader, PackageWriter};
use crate::error::{PackageError, PackageResult};
use crate::manifest::{analyze, ManifestAnalysis, ManifestGenerator, PartDescriptor};
use crate::resources::{RuntimeSupport, MANIFEST_FILE_NAME};

/// Outcome of a package build. Never mutated after it is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageBuildResult {
    pub success: bool,
    pub resulting_package_path: PathBuf,
    /// Package that was re-packaged, when building from an existing package
    pub source_package_path: Option<PathBuf>,
    pub errors: Vec<String>,
    /// Manifest of the source package, when building from an existing package
    pub source_manifest: Option<ManifestAnalysis>,
    /// File names the harness should treat as test assemblies
    pub test_assembly_file_names: Vec<String>,
}

impl PackageBuildResult {
    fn failed(output: &Path, source: Option<&Path>, err: PackageError) -> Self {
        error!("Package build failed: {}", err);
        Self {
            success: false,
            resulting_package_path: output.to_path_buf(),
            source_package_path: source.map(Path::to_path_buf),
            errors: vec![err.to_string()],
            ..Default::default()
        }
    }

    /// Name used to identify the package in reports.
    pub fn display_name(&self) -> String {
        self.source_package_path
            .as_deref()
            .unwrap_or(&self.resulting_package_path)
            .display()
            .to_string()
    }
}

/// Builds deployable test packages.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    runtime: RuntimeSupport,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            runtime: RuntimeSupport::embedded(),
        }
    }

    pub fn with_runtime_support(mut self, runtime: RuntimeSupport) -> Self {
        self.runtime = runtime;
        self
    }

    /// Build a package from loose test and reference files.
    pub fn build_from_assemblies(
        &self,
        test_files: &[PathBuf],
        reference_files: &[PathBuf],
        output: &Path,
    ) -> PackageBuildResult {
        info!(
            "Building test package {:?} from {} test and {} referenced files",
            output,
            test_files.len(),
            reference_files.len()
        );

        match self.try_build_from_assemblies(test_files, reference_files, output) {
            Ok(test_assembly_file_names) => PackageBuildResult {
                success: true,
                resulting_package_path: output.to_path_buf(),
                test_assembly_file_names,
                ..Default::default()
            },
            Err(e) => PackageBuildResult::failed(output, None, e),
        }
    }

    fn try_build_from_assemblies(
        &self,
        test_files: &[PathBuf],
        reference_files: &[PathBuf],
        output: &Path,
    ) -> PackageResult<Vec<String>> {
        if test_files.is_empty() {
            return Err(PackageError::NoTestAssemblies);
        }

        // Validate everything before anything is written.
        let mut inputs = Vec::with_capacity(test_files.len() + reference_files.len());
        for path in test_files.iter().chain(reference_files) {
            if !path.is_file() {
                return Err(PackageError::FileNotFound(path.clone()));
            }
            inputs.push((path, file_name_of(path)?));
        }

        let mut writer = self.seeded_writer();
        let mut generator = ManifestGenerator::default();
        let mut seen = HashSet::new();

        for (path, file_name) in &inputs {
            if !seen.insert(file_name.to_ascii_lowercase()) || writer.contains(file_name) {
                info!("Skipping {:?}, a file named {} is already packaged", path, file_name);
                continue;
            }

            debug!("Adding {:?} to package", path);
            writer.add(file_name.as_str(), fs::read(path)?);

            if is_assembly(file_name) {
                generator.add_part(PartDescriptor::new(file_stem(file_name), file_name.as_str()));
            }
        }

        writer.add(MANIFEST_FILE_NAME, generator.generate().into_bytes());
        writer.save(output)?;

        info!("Test package {:?} created with {} files", output, writer.len());

        Ok(test_files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect())
    }

    /// Re-package an existing package, injecting fresh runtime support files and
    /// carrying over every declared part.
    pub fn build_from_existing_package(&self, source: &Path, output: &Path) -> PackageBuildResult {
        info!("Building test package {:?} from existing package {:?}", output, source);

        match self.try_build_from_existing_package(source, output) {
            Ok(analysis) => PackageBuildResult {
                success: true,
                resulting_package_path: output.to_path_buf(),
                source_package_path: Some(source.to_path_buf()),
                test_assembly_file_names: analysis.entry_assembly_file_name.iter().cloned().collect(),
                source_manifest: Some(analysis),
                errors: Vec::new(),
            },
            Err(e) => PackageBuildResult::failed(output, Some(source), e),
        }
    }

    fn try_build_from_existing_package(
        &self,
        source: &Path,
        output: &Path,
    ) -> PackageResult<ManifestAnalysis> {
        let mut reader = PackageReader::open(source)?;
        let analysis = analyze(&reader.manifest()?)?;

        if analysis.entry_assembly_file_name.is_none() {
            warn!(
                "Manifest of {:?} declares no part for entry point {:?}",
                source, analysis.entry_assembly_name
            );
        }

        let mut writer = self.seeded_writer();
        let files = reader.files().to_vec();
        for name in &files {
            if name.eq_ignore_ascii_case(MANIFEST_FILE_NAME) || self.runtime.contains(name) {
                continue;
            }
            debug!("Copying {} from source package", name);
            writer.add(name.as_str(), reader.file_bytes(name)?);
        }

        let mut generator = ManifestGenerator::default();
        for part in &analysis.parts {
            if self.runtime.contains(&part.source_file_name) {
                continue;
            }
            generator.add_part(part.clone());
        }

        writer.add(MANIFEST_FILE_NAME, generator.generate().into_bytes());
        writer.save(output)?;

        info!(
            "Test package {:?} created from {:?} with {} files",
            output,
            source,
            writer.len()
        );

        Ok(analysis)
    }

    fn seeded_writer(&self) -> PackageWriter {
        let mut writer = PackageWriter::new();
        for file in self.runtime.files() {
            writer.add_if_absent(&file.name, &file.bytes);
        }
        writer
    }
}

fn file_name_of(path: &Path) -> PackageResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PackageError::InvalidPath(path.to_path_buf()))
}

fn is_assembly(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .map(|e| e.eq_ignore_ascii_case("dll"))
        .unwrap_or(false)
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}
