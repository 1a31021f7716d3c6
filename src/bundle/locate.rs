#![forbid(unsafe_code)]

//! Startup-time resolution of where a payload's content lives.

use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};

use crate::bundle::format::{ENV_CONTENT_OFFSET, ENV_SOURCE_PATH};
use crate::bundle::read::detect_bundle;

/// Path of the running executable's on-disk image.
pub trait SelfExe {
    fn path(&self) -> io::Result<PathBuf>;
}

/// Linux `/proc/self/exe`, resolved to the file it links to so the path
/// stays valid in child processes. The link itself is returned when it
/// cannot be read (e.g. the image was deleted after exec).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcSelfExe;

const PROC_SELF_EXE: &str = "/proc/self/exe";

impl SelfExe for ProcSelfExe {
    fn path(&self) -> io::Result<PathBuf> {
        let link = PathBuf::from(PROC_SELF_EXE);
        std::fs::metadata(&link)?;
        match std::fs::read_link(&link) {
            Ok(target) if target.is_absolute() && target.exists() => Ok(target),
            _ => Ok(link),
        }
    }
}

/// Whatever the standard library reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentExe;

impl SelfExe for CurrentExe {
    fn path(&self) -> io::Result<PathBuf> {
        std::env::current_exe()
    }
}

/// A known path, for embedding hosts and tests.
#[derive(Debug, Clone)]
pub struct FixedExe(pub PathBuf);

impl SelfExe for FixedExe {
    fn path(&self) -> io::Result<PathBuf> {
        Ok(self.0.clone())
    }
}

#[cfg(target_os = "linux")]
pub fn platform_self_exe() -> Box<dyn SelfExe> {
    Box::new(ProcSelfExe)
}

#[cfg(not(target_os = "linux"))]
pub fn platform_self_exe() -> Box<dyn SelfExe> {
    Box::new(CurrentExe)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// `SOURCE_PATH` / `CONTENT_OFFSET` handed down by the extraction shim.
    Environment,
    /// Footer of the running executable.
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLocation {
    pub path: PathBuf,
    pub offset: u64,
    /// Unknown when an override points at a file without a matching footer.
    pub size: Option<u64>,
    pub source: ContentSource,
}

/// Raw values of the two override variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverride {
    pub source_path: Option<String>,
    pub content_offset: Option<String>,
}

impl EnvOverride {
    pub fn from_env() -> Self {
        Self {
            source_path: std::env::var(ENV_SOURCE_PATH).ok(),
            content_offset: std::env::var(ENV_CONTENT_OFFSET).ok(),
        }
    }

    /// Both variables set and the offset parses.
    fn resolve(&self) -> Option<(PathBuf, u64)> {
        let (path, raw) = match (&self.source_path, &self.content_offset) {
            (Some(p), Some(o)) if !p.is_empty() => (p, o),
            _ => return None,
        };
        match raw.trim().parse::<u64>() {
            Ok(offset) => Some((PathBuf::from(path), offset)),
            Err(_) => {
                warn!("ignoring {ENV_CONTENT_OFFSET}={raw:?}: not a byte offset");
                None
            }
        }
    }
}

/// Resolve content using the process environment and the platform's
/// own-executable path.
pub fn locate_content() -> Option<ContentLocation> {
    locate_content_with(&EnvOverride::from_env(), platform_self_exe().as_ref())
}

/// Environment override first, then the executable's own footer.
pub fn locate_content_with(env: &EnvOverride, exe: &dyn SelfExe) -> Option<ContentLocation> {
    if let Some((path, offset)) = env.resolve() {
        debug!("content via environment: {} @ {offset}", path.display());
        let size = footer_size_at(&path, offset);
        return Some(ContentLocation {
            path,
            offset,
            size,
            source: ContentSource::Environment,
        });
    }

    let path = match exe.path() {
        Ok(p) => p,
        Err(e) => {
            debug!("cannot resolve own executable: {e}");
            return None;
        }
    };
    let info = detect_bundle(&path)?;
    Some(ContentLocation {
        path,
        offset: info.content_offset,
        size: Some(info.content_size),
        source: ContentSource::Footer,
    })
}

fn footer_size_at(path: &Path, offset: u64) -> Option<u64> {
    detect_bundle(path)
        .filter(|info| info.content_offset == offset)
        .map(|info| info.content_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::format::Footer;

    fn bundle_like(dir: &Path) -> PathBuf {
        let p = dir.join("b");
        let mut bytes = vec![0u8; 32];
        bytes.extend_from_slice(b"content!");
        bytes.extend_from_slice(&Footer::new(32, 8).to_bytes());
        std::fs::write(&p, bytes).unwrap();
        p
    }

    fn env(path: &str, offset: &str) -> EnvOverride {
        EnvOverride {
            source_path: Some(path.into()),
            content_offset: Some(offset.into()),
        }
    }

    #[test]
    fn environment_wins_over_footer() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle_like(dir.path());
        let loc = locate_content_with(
            &env(b.to_str().unwrap(), "32"),
            &FixedExe(dir.path().join("nothing")),
        )
        .unwrap();
        assert_eq!(loc.source, ContentSource::Environment);
        assert_eq!(loc.offset, 32);
        assert_eq!(loc.size, Some(8));
    }

    #[test]
    fn environment_offset_without_matching_footer_has_no_size() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle_like(dir.path());
        let loc =
            locate_content_with(&env(b.to_str().unwrap(), "4"), &FixedExe(b.clone())).unwrap();
        assert_eq!(loc.source, ContentSource::Environment);
        assert_eq!(loc.size, None);
    }

    #[test]
    fn half_set_or_garbage_override_falls_back_to_footer() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle_like(dir.path());
        let exe = FixedExe(b.clone());

        let only_path = EnvOverride {
            source_path: Some("/elsewhere".into()),
            content_offset: None,
        };
        let loc = locate_content_with(&only_path, &exe).unwrap();
        assert_eq!(loc.source, ContentSource::Footer);
        assert_eq!(loc.path, b);

        let loc = locate_content_with(&env("/elsewhere", "12ab"), &exe).unwrap();
        assert_eq!(loc.source, ContentSource::Footer);
        assert_eq!((loc.offset, loc.size), (32, Some(8)));
    }

    #[test]
    fn plain_executable_has_no_content() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("plain");
        std::fs::write(&p, b"\x7fELF not really").unwrap();
        assert_eq!(
            locate_content_with(&EnvOverride::default(), &FixedExe(p)),
            None
        );
    }

    #[test]
    fn current_exe_resolves() {
        assert!(CurrentExe.path().is_ok());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn proc_self_exe_resolves() {
        let p = ProcSelfExe.path().unwrap();
        assert_ne!(p, PathBuf::from(PROC_SELF_EXE));
        assert!(p.is_absolute());
        assert_eq!(p, std::env::current_exe().unwrap());
    }

    #[test]
    fn test_binary_carries_no_content() {
        if std::env::var_os(ENV_SOURCE_PATH).is_none() {
            assert_eq!(locate_content(), None);
        }
    }
}
