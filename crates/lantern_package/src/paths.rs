//! Wildcard path expansion for caller-supplied file lists.

use std::path::{Path, PathBuf};

use glob::{glob_with, MatchOptions};
use tracing::debug;

use crate::error::{PackageError, PackageResult};

fn has_wildcards(path: &str) -> bool {
    path.contains('*') || path.contains('?')
}

/// Expand every wildcard path into the concrete files it matches.
///
/// Paths without wildcards are returned unchanged (existence is checked by the
/// package builder). A wildcard path whose directory does not exist is an
/// error naming that path; a wildcard matching nothing contributes nothing.
pub fn resolve_paths<S: AsRef<str>>(paths: &[S]) -> PackageResult<Vec<PathBuf>> {
    let mut resolved = Vec::new();

    for raw in paths {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            continue;
        }

        if !has_wildcards(raw) {
            resolved.push(PathBuf::from(raw));
            continue;
        }

        let pattern_path = Path::new(raw);
        let directory = match pattern_path.parent() {
            Some(p) if p.as_os_str().is_empty() => PathBuf::from("."),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        };

        if !directory.is_dir() {
            return Err(PackageError::WildcardDirectoryNotFound {
                directory,
                pattern: raw.to_string(),
            });
        }

        let options = MatchOptions {
            case_sensitive: cfg!(not(windows)),
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut matches: Vec<PathBuf> = glob_with(raw, options)
            .map_err(|e| PackageError::InvalidPattern {
                pattern: raw.to_string(),
                message: e.msg.to_string(),
            })?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();
        matches.sort();

        debug!("Wildcard {} matched {} files", raw, matches.len());
        resolved.extend(matches);
    }

    Ok(resolved)
}
