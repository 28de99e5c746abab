//! Error types for package assembly.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for package operations.
pub type PackageResult<T> = Result<T, PackageError>;

/// Errors that can occur while assembling or reading test packages.
#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Could not find referenced file {0}")]
    FileNotFound(PathBuf),

    #[error("Could not find directory {directory} for wildcarded file path {pattern}")]
    WildcardDirectoryNotFound { directory: PathBuf, pattern: String },

    #[error("Invalid wildcard pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Source package {0} does not exist")]
    SourcePackageNotFound(PathBuf),

    #[error("Source package {0} does not have an AppManifest.xaml")]
    ManifestMissing(PathBuf),

    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("File {name} does not exist in package {package}")]
    EntryNotFound { name: String, package: PathBuf },

    #[error("No test assemblies were supplied")]
    NoTestAssemblies,

    #[error("Runtime support file {0} is not available")]
    MissingResource(String),

    #[error("Invalid package path {0}")]
    InvalidPath(PathBuf),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
