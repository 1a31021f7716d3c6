#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use crate::bundle::format::BUNDLE_EXT;

/// Where a build writes when the caller gave `output` (or nothing).
pub fn output_path(content: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(p) => ensure_bundle_ext(p),
        None => content.with_extension(BUNDLE_EXT),
    }
}

pub fn ensure_bundle_ext(p: &Path) -> PathBuf {
    if p.extension().and_then(|e| e.to_str()).unwrap_or("") == BUNDLE_EXT {
        return p.to_path_buf();
    }
    let mut s = p.as_os_str().to_os_string();
    if !s.to_string_lossy().ends_with('.') {
        s.push(".");
    }
    s.push(BUNDLE_EXT);
    PathBuf::from(s)
}
