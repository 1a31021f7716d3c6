#![forbid(unsafe_code)]

use log::{info, warn};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::Path;

use crate::bundle::error::{BundleError, BundleResult};
use crate::bundle::format::Footer;
use crate::bundle::io::write_padding;
use crate::bundle::layout::{resolve, BuildOptions, Layout, SegmentKind};
use crate::bundle::template::Template;

/// What a finished build produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub payload_offset: u64,
    pub payload_size: u64,
    pub content_offset: u64,
    pub content_size: u64,
    pub total_size: u64,
}

/// Bundle layout:
/// - polyglot header (sh + batch), padded with spaces to `page_boundary`
/// - payload executable, zero-padded to `content_boundary`
/// - content blob
/// - footer: [u64 content_offset][u64 content_size][u32 magic]
///
/// The file is streamed into a temporary sibling of `output` and renamed
/// into place only once everything has been written.
pub fn write_bundle(
    payload: &Path,
    content: &Path,
    output: &Path,
    opts: &BuildOptions,
) -> BundleResult<Summary> {
    let mut payload_in = open_input("payload", payload)?;
    let mut content_in = open_input("content", content)?;

    let payload_size = payload_in
        .metadata()
        .map_err(|source| input_err("payload", payload, source))?
        .len();

    let resolved = resolve(&Template::default(), payload_size, opts)?;
    let layout = resolved.layout;

    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".polybundle-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|source| output_err(output, source))?;

    let content_size = {
        let mut out = BufWriter::new(tmp.as_file());
        let n = write_segments(
            &mut out,
            &layout,
            &resolved.header,
            &mut payload_in,
            &mut content_in,
        )?;
        out.flush().map_err(|source| output_err(output, source))?;
        n
    };

    let end = tmp
        .as_file()
        .stream_position()
        .map_err(|source| output_err(output, source))?;
    if end != layout.total_len(content_size) {
        return Err(BundleError::Invalid(format!(
            "wrote {end} bytes, layout expects {}",
            layout.total_len(content_size)
        )));
    }

    tmp.as_file()
        .sync_all()
        .map_err(|source| output_err(output, source))?;
    tmp.persist(output)
        .map_err(|e| output_err(output, e.error))?;

    if let Err(e) = set_executable(output) {
        warn!("could not mark {} executable: {e}", output.display());
    }

    let summary = Summary {
        payload_offset: layout.payload_offset,
        payload_size,
        content_offset: layout.content_offset,
        content_size,
        total_size: end,
    };
    info!(
        "bundled {} + {} -> {} ({} bytes)",
        payload.display(),
        content.display(),
        output.display(),
        summary.total_size
    );
    Ok(summary)
}

/// Stream every segment in order. Returns the number of content bytes
/// actually copied.
fn write_segments(
    out: &mut dyn Write,
    layout: &Layout,
    header: &[u8],
    payload: &mut dyn Read,
    content: &mut dyn Read,
) -> BundleResult<u64> {
    let segs = layout.segments(0);

    out.write_all(header)?;
    write_padding(out, SegmentKind::HeaderPadding.pad_byte(), segs[1].len)?;

    // The shims slice exactly `payload_size` bytes, so a payload that
    // changed size since it was measured would produce a broken bundle.
    let copied = io::copy(&mut payload.take(layout.payload_size), out)?;
    if copied != layout.payload_size {
        return Err(BundleError::Invalid(format!(
            "payload shrank while bundling: expected {} bytes, read {copied}",
            layout.payload_size
        )));
    }
    write_padding(out, SegmentKind::PayloadPadding.pad_byte(), segs[3].len)?;

    let content_size = io::copy(content, out)?;

    let footer = Footer::new(layout.content_offset, content_size);
    out.write_all(&footer.to_bytes())?;
    Ok(content_size)
}

fn open_input(role: &'static str, path: &Path) -> BundleResult<File> {
    File::open(path).map_err(|source| input_err(role, path, source))
}

fn input_err(role: &'static str, path: &Path, source: io::Error) -> BundleError {
    BundleError::InputNotFound {
        role,
        path: path.to_path_buf(),
        source,
    }
}

fn output_err(path: &Path, source: io::Error) -> BundleError {
    BundleError::OutputUnwritable {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
