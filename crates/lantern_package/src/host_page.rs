//! Hosting document generation.

use std::fs;
use std::path::Path;

use quick_xml::escape::escape;
use tracing::debug;
use url::Url;

use crate::error::{PackageError, PackageResult};
use crate::resources::{HOST_PAGE_TEMPLATE, PACKAGE_URL_PLACEHOLDER};

/// File name of the generated host page inside a session directory.
pub const HOST_PAGE_FILE_NAME: &str = "lantern-host.html";

/// Writes the page that loads a package into the sandbox.
#[derive(Debug, Clone)]
pub struct HostPageBuilder {
    template: String,
}

impl Default for HostPageBuilder {
    fn default() -> Self {
        Self {
            template: HOST_PAGE_TEMPLATE.to_string(),
        }
    }
}

impl HostPageBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Render the page for `package_url`.
    pub fn render(&self, package_url: &Url) -> String {
        self.template
            .replace(PACKAGE_URL_PLACEHOLDER, &escape(package_url.as_str()))
    }

    /// Write a host page referencing `package_path` to `page_path` and return
    /// the page's `file://` URL.
    pub fn build(&self, package_path: &Path, page_path: &Path) -> PackageResult<Url> {
        let package_url = file_url(package_path)?;
        if let Some(parent) = page_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(page_path, self.render(&package_url))?;
        debug!("Wrote host page {:?} for {}", page_path, package_url);
        file_url(page_path)
    }
}

/// `file://` URL for a path, made absolute against the current directory.
pub fn file_url(path: &Path) -> PackageResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute).map_err(|_| PackageError::InvalidPath(absolute))
}
