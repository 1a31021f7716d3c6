#![forbid(unsafe_code)]

use log::debug;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::bundle::error::{BundleError, BundleResult};
use crate::bundle::format::{BundleInfo, Footer, HeaderRecord, FOOTER_LEN};
use crate::bundle::io::read_exact;
use crate::bundle::template::record_fields;

/// The header record always sits in the first page.
const HEADER_SCAN: u64 = 4096;

/// Read and check the trailing footer.
///
/// `Ok(None)` means "not a bundle": the file is too short, the magic does
/// not match, or the footer does not describe a file of this length.
pub(crate) fn read_footer(file: &mut File) -> BundleResult<Option<Footer>> {
    let size = file.metadata()?.len();
    if size < FOOTER_LEN {
        return Ok(None);
    }
    file.seek(SeekFrom::End(-(FOOTER_LEN as i64)))?;

    let buf = match read_exact::<{ FOOTER_LEN as usize }>(file) {
        Ok(b) => b,
        Err(BundleError::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };

    let footer = Footer::from_bytes(&buf);
    if !footer.has_magic() {
        return Ok(None);
    }
    if !footer.fits(size) {
        debug!(
            "footer magic present but {}+{}+{} != {size}",
            footer.content_offset, footer.content_size, FOOTER_LEN
        );
        return Ok(None);
    }
    Ok(Some(footer))
}

/// Look for a bundle footer at the end of `path`.
///
/// Any failure, including an unreadable file, is reported as `None`; callers
/// fall back to an explicit content path.
pub fn detect_bundle(path: &Path) -> Option<BundleInfo> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            debug!("self-detect: cannot open {}: {e}", path.display());
            return None;
        }
    };

    match read_footer(&mut file) {
        Ok(Some(f)) => {
            debug!(
                "self-detect: content at {} ({} bytes) in {}",
                f.content_offset,
                f.content_size,
                path.display()
            );
            Some(BundleInfo {
                content_offset: f.content_offset,
                content_size: f.content_size,
            })
        }
        Ok(None) => {
            debug!("self-detect: {} is not a bundle", path.display());
            None
        }
        Err(e) => {
            debug!("self-detect: reading {} failed: {e}", path.display());
            None
        }
    }
}

/// Parse the `rem polybundle ...` line out of the header.
pub fn read_header_record(path: &Path) -> BundleResult<HeaderRecord> {
    let file = File::open(path)?;
    let mut head = Vec::new();
    file.take(HEADER_SCAN).read_to_end(&mut head)?;
    let text = String::from_utf8_lossy(&head);

    let fields =
        record_fields(&text).ok_or_else(|| BundleError::Invalid("no header record".into()))?;
    let get = |key: &str| -> BundleResult<u64> {
        let raw = fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| BundleError::Invalid(format!("header record lacks {key}")))?;
        raw.parse::<u64>()
            .map_err(|_| BundleError::Invalid(format!("header record {key}={raw} is not a number")))
    };

    let version = get("format")?;
    Ok(HeaderRecord {
        version: u32::try_from(version)
            .map_err(|_| BundleError::Invalid(format!("format version {version} out of range")))?,
        payload_offset: get("payload_offset")?,
        payload_size: get("payload_size")?,
        content_offset: get("content_offset")?,
        page_boundary: get("page_boundary")?,
        content_boundary: get("content_boundary")?,
    })
}

/// Reader over exactly the content segment.
pub fn open_content(path: &Path, info: &BundleInfo) -> BundleResult<io::Take<File>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(info.content_offset))?;
    Ok(file.take(info.content_size))
}

/// Copy the embedded content of `bundle` to `dest`. Returns bytes written.
pub fn extract_content(bundle: &Path, dest: &Path) -> BundleResult<u64> {
    let info = detect_bundle(bundle)
        .ok_or_else(|| BundleError::Invalid(format!("{} is not a bundle", bundle.display())))?;
    let mut src = open_content(bundle, &info)?;
    let mut out = File::create(dest)?;
    let n = io::copy(&mut src, &mut out)?;
    if n != info.content_size {
        return Err(BundleError::Invalid(format!(
            "content truncated: expected {} bytes, got {n}",
            info.content_size
        )));
    }
    Ok(n)
}

/// Blake3 digest of the content segment.
pub fn content_digest(path: &Path, info: &BundleInfo) -> BundleResult<blake3::Hash> {
    let mut src = open_content(path, info)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut src, &mut hasher)?;
    Ok(hasher.finalize())
}
