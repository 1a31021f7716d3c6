#![forbid(unsafe_code)]

use crate::bundle::error::{BundleError, BundleResult};

pub fn check_boundary(boundary: u64) -> BundleResult<u64> {
    if boundary.is_power_of_two() {
        Ok(boundary)
    } else {
        Err(BundleError::InvalidBoundary(boundary))
    }
}

/// Smallest multiple of `boundary` that is `>= cursor`.
pub fn align_up(cursor: u64, boundary: u64) -> BundleResult<u64> {
    let mask = check_boundary(boundary)? - 1;
    cursor
        .checked_add(mask)
        .map(|v| v & !mask)
        .ok_or_else(|| BundleError::Invalid(format!("offset {cursor} overflows when aligned")))
}
