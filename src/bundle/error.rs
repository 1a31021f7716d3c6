#![forbid(unsafe_code)]

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("cannot read {role} '{}': {source}", path.display())]
    InputNotFound {
        role: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write output '{}': {source}", path.display())]
    OutputUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("header template is missing token {0}")]
    TemplateTokenMissing(String),

    #[error("token {0} is bound to more than one field")]
    DuplicateToken(String),

    #[error("header template contains unbound token {0}")]
    UnknownToken(String),

    #[error("alignment boundary {0} is not a power of two")]
    InvalidBoundary(u64),

    #[error("header layout did not settle after {iterations} passes")]
    LayoutDiverged { iterations: usize },

    #[error("invalid bundle: {0}")]
    Invalid(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type BundleResult<T> = Result<T, BundleError>;
