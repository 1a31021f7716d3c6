#![forbid(unsafe_code)]

use std::io::{Read, Write};

use crate::bundle::error::BundleResult;

const PAD_CHUNK: usize = 8192;

pub fn read_exact<const N: usize>(r: &mut dyn Read) -> BundleResult<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Write `len` copies of `byte`.
pub fn write_padding(w: &mut dyn Write, byte: u8, len: u64) -> BundleResult<()> {
    let chunk = [byte; PAD_CHUNK];
    let mut left = len;
    while left > 0 {
        let n = left.min(PAD_CHUNK as u64) as usize;
        w.write_all(&chunk[..n])?;
        left -= n as u64;
    }
    Ok(())
}
