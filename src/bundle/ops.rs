#![forbid(unsafe_code)]

use std::fs::File;
use std::path::Path;

use crate::bundle::align::check_boundary;
use crate::bundle::build::{write_bundle, Summary};
use crate::bundle::error::{BundleError, BundleResult};
use crate::bundle::format::{BundleInfo, HeaderRecord, FOOTER_LEN, FORMAT_VERSION};
use crate::bundle::layout::BuildOptions;
use crate::bundle::path::output_path;
use crate::bundle::read::{content_digest, read_footer, read_header_record};

/// Everything `verify_bundle` established about a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub file_len: u64,
    pub content: BundleInfo,
    pub record: HeaderRecord,
}

pub fn build(
    payload: &Path,
    content: &Path,
    output: Option<&Path>,
    opts: &BuildOptions,
) -> BundleResult<Summary> {
    let output = output_path(content, output);
    let s = write_bundle(payload, content, &output, opts)?;

    println!("created {}", output.display());
    println!("  payload : offset={} size={}", s.payload_offset, s.payload_size);
    println!("  content : offset={} size={}", s.content_offset, s.content_size);
    println!("  total   : {} bytes", s.total_size);
    Ok(s)
}

/// Check every layout invariant of an existing bundle.
pub fn verify_bundle(bundle: &Path) -> BundleResult<Report> {
    let mut f = File::open(bundle)?;
    let file_len = f.metadata()?.len();
    let footer = read_footer(&mut f)?
        .ok_or_else(|| BundleError::Invalid(format!("{} is not a bundle", bundle.display())))?;
    let record = read_header_record(bundle)?;

    if record.version != FORMAT_VERSION {
        return Err(BundleError::Invalid(format!(
            "unsupported format version {}",
            record.version
        )));
    }
    check_boundary(record.page_boundary)?;
    check_boundary(record.content_boundary)?;

    if record.payload_offset % record.page_boundary != 0 {
        return Err(BundleError::Invalid(format!(
            "payload offset {} not aligned to {}",
            record.payload_offset, record.page_boundary
        )));
    }
    if footer.content_offset % record.content_boundary != 0 {
        return Err(BundleError::Invalid(format!(
            "content offset {} not aligned to {}",
            footer.content_offset, record.content_boundary
        )));
    }
    if record.content_offset != footer.content_offset {
        return Err(BundleError::Invalid(format!(
            "header says content at {}, footer says {}",
            record.content_offset, footer.content_offset
        )));
    }
    let payload_end = record
        .payload_offset
        .checked_add(record.payload_size)
        .ok_or_else(|| BundleError::Invalid("payload size overflows".into()))?;
    if payload_end > footer.content_offset {
        return Err(BundleError::Invalid(format!(
            "payload ends at {payload_end}, past content start {}",
            footer.content_offset
        )));
    }

    Ok(Report {
        file_len,
        content: BundleInfo {
            content_offset: footer.content_offset,
            content_size: footer.content_size,
        },
        record,
    })
}

pub fn inspect(bundle: &Path) -> BundleResult<Report> {
    let r = verify_bundle(bundle)?;
    let digest = content_digest(bundle, &r.content)?;

    println!("{}", bundle.display());
    println!("  format  : v{}", r.record.version);
    println!(
        "  payload : offset={} size={} (page boundary {})",
        r.record.payload_offset, r.record.payload_size, r.record.page_boundary
    );
    println!(
        "  content : offset={} size={} (boundary {})",
        r.content.content_offset, r.content.content_size, r.record.content_boundary
    );
    println!("  footer  : {} bytes at {}", FOOTER_LEN, r.file_len - FOOTER_LEN);
    println!("  blake3  : {}", digest.to_hex());
    println!("ok");
    Ok(r)
}
