//! Binary PGM (`P5`) output.

use std::fs;
use std::io;
use std::path::Path;

/// Encode a row-major 8-bit image.
pub fn encode(width: usize, height: usize, pixels: &[u8]) -> Vec<u8> {
    let mut out = format!("P5\n{width} {height}\n255\n").into_bytes();
    out.extend_from_slice(pixels);
    out
}

pub fn write(path: &Path, width: usize, height: usize, pixels: &[u8]) -> io::Result<()> {
    if pixels.len() != width * height {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} pixels for a {width}×{height} image", pixels.len()),
        ));
    }
    fs::write(path, encode(width, height, pixels))
}
