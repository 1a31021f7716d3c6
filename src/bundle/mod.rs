#![forbid(unsafe_code)]

mod align;
mod build;
mod error;
mod format;
mod io;
mod layout;
mod locate;
mod ops;
mod path;
mod read;
mod template;

pub use align::align_up;
pub use build::{write_bundle, Summary};
pub use error::{BundleError, BundleResult};
pub use format::{
    BundleInfo, Footer, HeaderRecord, BUNDLE_EXT, CONTENT_BOUNDARY, ENV_CONTENT_OFFSET,
    ENV_SOURCE_PATH, FOOTER_LEN, FOOTER_MAGIC, FORMAT_VERSION, PAGE_BOUNDARY,
};
pub use layout::{resolve, BuildOptions, Layout, Resolved, Segment, SegmentKind};
pub use locate::{
    locate_content, locate_content_with, platform_self_exe, ContentLocation, ContentSource,
    CurrentExe, EnvOverride, FixedExe, ProcSelfExe, SelfExe,
};
pub use ops::{build, inspect, verify_bundle, Report};
pub use path::{ensure_bundle_ext, output_path};
pub use read::{content_digest, detect_bundle, extract_content, open_content, read_header_record};
pub use template::{Bindings, Field, Grammar, Region, Template, RECORD_PREFIX};
