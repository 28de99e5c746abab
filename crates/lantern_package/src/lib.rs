//! # lantern_package
//!
//! Test package assembly for lantern.
//!
//! A test package is a zip archive holding the test assemblies, their
//! references, the runtime support files that host the harness inside the
//! sandbox, and an `AppManifest.xaml` describing the entry point and parts.
//!
//! - Build from loose assemblies or re-package an existing package
//! - Analyze and generate manifests
//! - Write the host page that loads a package into the sandbox
//! - Expand wildcard file lists
//!
//! ## Example
//!
//! ```rust,no_run
//! use lantern_package::{resolve_paths, HostPageBuilder, PackageBuilder};
//! use std::path::Path;
//!
//! let tests = resolve_paths(&["bin/Debug/*.Tests.dll"]).unwrap();
//! let builder = PackageBuilder::new();
//! let result = builder.build_from_assemblies(&tests, &[], Path::new("out/package.zip"));
//!
//! if result.success {
//!     let page = HostPageBuilder::default()
//!         .build(&result.resulting_package_path, Path::new("out/lantern-host.html"))
//!         .unwrap();
//!     println!("Open {}", page);
//! }
//! ```

pub mod archive;
pub mod builder;
pub mod error;
pub mod host_page;
pub mod manifest;
pub mod paths;
pub mod resources;

pub use archive::{PackageReader, PackageWriter};
pub use builder::{PackageBuildResult, PackageBuilder};
pub use error::{PackageError, PackageResult};
pub use host_page::{file_url, HostPageBuilder, HOST_PAGE_FILE_NAME};
pub use manifest::{analyze, ManifestAnalysis, ManifestGenerator, PartDescriptor};
pub use paths::resolve_paths;
pub use resources::{RuntimeFile, RuntimeFiles, RuntimeSupport, MANIFEST_FILE_NAME};
