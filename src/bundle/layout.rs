#![forbid(unsafe_code)]

use log::debug;

use crate::bundle::align::{align_up, check_boundary};
use crate::bundle::error::{BundleError, BundleResult};
use crate::bundle::format::{CONTENT_BOUNDARY, FOOTER_LEN, FORMAT_VERSION, PAGE_BOUNDARY};
use crate::bundle::template::{Bindings, Field, Template};

/// Upper bound on header re-measurement passes. Each pass can only grow the
/// digit count of an offset, so a handful is plenty.
const MAX_PASSES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    pub page_boundary: u64,
    pub content_boundary: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            page_boundary: PAGE_BOUNDARY,
            content_boundary: CONTENT_BOUNDARY,
        }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> BundleResult<()> {
        check_boundary(self.page_boundary)?;
        check_boundary(self.content_boundary)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Header,
    HeaderPadding,
    Payload,
    PayloadPadding,
    Content,
    Footer,
}

impl SegmentKind {
    /// Fill byte for padding segments.
    ///
    /// Header padding follows shell/batch text, so it must stay printable.
    /// Padding between binary segments is zeroed.
    pub fn pad_byte(self) -> u8 {
        match self {
            SegmentKind::HeaderPadding => b' ',
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub start: u64,
    pub len: u64,
}

impl Segment {
    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// Byte positions of one bundle. `content_size` is not part of it: the
/// header never mentions it, and the footer takes it from the write cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub header_len: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub content_offset: u64,
    pub page_boundary: u64,
    pub content_boundary: u64,
}

impl Layout {
    fn place(header_len: u64, payload_size: u64, opts: &BuildOptions) -> BundleResult<Self> {
        let payload_offset = align_up(header_len, opts.page_boundary)?;
        let payload_end = payload_offset
            .checked_add(payload_size)
            .ok_or_else(|| BundleError::Invalid("payload too large".into()))?;
        let content_offset = align_up(payload_end, opts.content_boundary)?;
        Ok(Self {
            header_len,
            payload_offset,
            payload_size,
            content_offset,
            page_boundary: opts.page_boundary,
            content_boundary: opts.content_boundary,
        })
    }

    fn same_placement(&self, other: &Layout) -> bool {
        self.payload_offset == other.payload_offset && self.content_offset == other.content_offset
    }

    pub fn bindings(&self) -> BundleResult<Bindings> {
        Bindings::new()
            .bind(Field::FormatVersion, FORMAT_VERSION as u64)?
            .bind(Field::PayloadOffset, self.payload_offset)?
            .bind(Field::PayloadSkip, self.payload_offset + 1)?
            .bind(Field::PayloadSize, self.payload_size)?
            .bind(Field::ContentOffset, self.content_offset)?
            .bind(Field::PageBoundary, self.page_boundary)?
            .bind(Field::ContentBoundary, self.content_boundary)
    }

    pub fn segments(&self, content_size: u64) -> [Segment; 6] {
        let payload_end = self.payload_offset + self.payload_size;
        let content_end = self.content_offset + content_size;
        [
            Segment {
                kind: SegmentKind::Header,
                start: 0,
                len: self.header_len,
            },
            Segment {
                kind: SegmentKind::HeaderPadding,
                start: self.header_len,
                len: self.payload_offset - self.header_len,
            },
            Segment {
                kind: SegmentKind::Payload,
                start: self.payload_offset,
                len: self.payload_size,
            },
            Segment {
                kind: SegmentKind::PayloadPadding,
                start: payload_end,
                len: self.content_offset - payload_end,
            },
            Segment {
                kind: SegmentKind::Content,
                start: self.content_offset,
                len: content_size,
            },
            Segment {
                kind: SegmentKind::Footer,
                start: content_end,
                len: FOOTER_LEN,
            },
        ]
    }

    pub fn total_len(&self, content_size: u64) -> u64 {
        self.content_offset + content_size + FOOTER_LEN
    }
}

/// A layout together with the header rendered for it.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub layout: Layout,
    pub header: Vec<u8>,
}

/// Find a layout whose rendered header produces that same layout.
///
/// Rendering writes decimal offsets into the header, which changes its
/// length, which can move the aligned offsets. Re-measure until the
/// offsets computed from the rendered length equal the ones substituted.
pub fn resolve(template: &Template, payload_size: u64, opts: &BuildOptions) -> BundleResult<Resolved> {
    opts.validate()?;

    let mut header_len = template.text().len() as u64;
    for pass in 1..=MAX_PASSES {
        let guess = Layout::place(header_len, payload_size, opts)?;
        let header = template.render(&guess.bindings()?)?;
        let measured = Layout::place(header.len() as u64, payload_size, opts)?;
        debug!(
            "layout pass {pass}: header {} -> {} bytes, payload@{}, content@{}",
            header_len,
            header.len(),
            measured.payload_offset,
            measured.content_offset
        );

        if measured.same_placement(&guess) {
            return Ok(Resolved {
                layout: measured,
                header,
            });
        }
        header_len = header.len() as u64;
    }

    Err(BundleError::LayoutDiverged {
        iterations: MAX_PASSES,
    })
}
