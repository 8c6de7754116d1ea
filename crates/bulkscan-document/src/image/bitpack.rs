// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bilevel bit packing — one byte per pixel in, one bit per pixel out.

use bulkscan_core::error::{BulkscanError, Result};

/// Samples at or above this value become a set (white) bit.
pub(crate) const WHITE_THRESHOLD: u8 = 128;

/// Number of bytes one packed row of `width` pixels occupies.
pub fn packed_row_len(width: u32) -> usize {
    (width as usize).div_ceil(8)
}

/// Pack a bilevel buffer holding one byte per pixel into 1 bit per pixel.
///
/// Rows are packed independently, most significant bit first; the trailing
/// byte of each row is zero-padded. White (>= 128) maps to 1 and black to 0,
/// which is the sample convention of both PDF `DeviceGray` at one bit per
/// component and 1-bit grayscale PNG.
pub fn pack_bilevel(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let width_px = width as usize;
    let expected = width_px * height as usize;
    if pixels.len() != expected {
        return Err(BulkscanError::InvalidImage(format!(
            "bilevel buffer holds {} bytes, expected {expected} for {width}x{height}",
            pixels.len()
        )));
    }

    let row_len = packed_row_len(width);
    let mut packed = vec![0u8; row_len * height as usize];
    if width_px == 0 {
        return Ok(packed);
    }

    for (row, out) in pixels
        .chunks_exact(width_px)
        .zip(packed.chunks_exact_mut(row_len))
    {
        for (x, &sample) in row.iter().enumerate() {
            if sample >= WHITE_THRESHOLD {
                out[x / 8] |= 0x80 >> (x % 8);
            }
        }
    }
    Ok(packed)
}
