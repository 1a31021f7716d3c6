#![forbid(unsafe_code)]

/// Footer magic: ASCII "GGUF" read as a big-endian u32, stored little-endian.
pub const FOOTER_MAGIC: u32 = 0x4747_5546;

/// Footer size on disk: `[u64 content_offset][u64 content_size][u32 magic]`.
pub const FOOTER_LEN: u64 = 8 + 8 + 4;

/// Version recorded in the header record line.
pub const FORMAT_VERSION: u32 = 1;

/// Alignment of the payload segment.
pub const PAGE_BOUNDARY: u64 = 4096;

/// Alignment of the content segment. 64 KiB covers mmap granularity everywhere.
pub const CONTENT_BOUNDARY: u64 = 65536;

/// Extension given to produced bundles.
pub const BUNDLE_EXT: &str = "bundle";

/// Environment override: path of the file holding the content.
pub const ENV_SOURCE_PATH: &str = "SOURCE_PATH";

/// Environment override: decimal byte offset of the content.
pub const ENV_CONTENT_OFFSET: &str = "CONTENT_OFFSET";

/// Trailer written as the last [`FOOTER_LEN`] bytes of every bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub content_offset: u64,
    pub content_size: u64,
    pub magic: u32,
}

impl Footer {
    pub fn new(content_offset: u64, content_size: u64) -> Self {
        Self {
            content_offset,
            content_size,
            magic: FOOTER_MAGIC,
        }
    }

    pub fn to_bytes(&self) -> [u8; FOOTER_LEN as usize] {
        let mut out = [0u8; FOOTER_LEN as usize];
        out[0..8].copy_from_slice(&self.content_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.content_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.magic.to_le_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8; FOOTER_LEN as usize]) -> Self {
        let mut off = [0u8; 8];
        let mut size = [0u8; 8];
        let mut magic = [0u8; 4];
        off.copy_from_slice(&buf[0..8]);
        size.copy_from_slice(&buf[8..16]);
        magic.copy_from_slice(&buf[16..20]);
        Self {
            content_offset: u64::from_le_bytes(off),
            content_size: u64::from_le_bytes(size),
            magic: u32::from_le_bytes(magic),
        }
    }

    pub fn has_magic(&self) -> bool {
        self.magic == FOOTER_MAGIC
    }

    /// True when the footer describes a file of exactly `file_len` bytes.
    pub fn fits(&self, file_len: u64) -> bool {
        self.content_offset
            .checked_add(self.content_size)
            .and_then(|end| end.checked_add(FOOTER_LEN))
            == Some(file_len)
    }
}

/// Location of the content segment inside a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleInfo {
    pub content_offset: u64,
    pub content_size: u64,
}

/// Parsed header record line (`rem polybundle ...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub version: u32,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub content_offset: u64,
    pub page_boundary: u64,
    pub content_boundary: u64,
}
