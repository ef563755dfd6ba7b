// This file is part of Reliquary.
//
// Reliquary is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Reliquary is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Reliquary.  If not, see <http://www.gnu.org/licenses/>.

// Archival copy of the raw color plate: a big-endian decompressed-size
// prefix followed by a zlib stream at best compression. Regeneration
// rebuilds the exact source pixels from this blob alone.

use crate::{bytes_as_pixels, pixels_as_bytes, Pixel, PIXEL_SIZE};
use anyhow::{ensure, Result};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use std::io::{Read, Write};

pub fn compress_plate(pixels: &[Pixel]) -> Result<Vec<u8>> {
    let raw = pixels_as_bytes(pixels);
    let mut out = Vec::with_capacity(PIXEL_SIZE + raw.len() / 2);
    out.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    let mut encoder = ZlibEncoder::new(out, Compression::best());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

pub fn decompress_plate(data: &[u8]) -> Result<Vec<Pixel>> {
    ensure!(data.len() >= 4, "archival plate data lacks a size prefix");
    let expected = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    ensure!(
        expected % PIXEL_SIZE == 0,
        "archival plate size {} is not a whole number of pixels",
        expected
    );
    let mut raw = Vec::with_capacity(expected);
    ZlibDecoder::new(&data[4..]).read_to_end(&mut raw)?;
    ensure!(
        raw.len() == expected,
        "archival plate inflated to {} bytes; prefix promised {}",
        raw.len(),
        expected
    );
    bytes_as_pixels(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_exactly() -> Result<()> {
        let pixels: Vec<Pixel> = (0..64 * 64)
            .map(|i| Pixel::rgba((i % 251) as u8, (i % 13) as u8, (i % 7) as u8, 255))
            .collect();
        let packed = compress_plate(&pixels)?;
        assert_eq!(
            u32::from_be_bytes([packed[0], packed[1], packed[2], packed[3]]) as usize,
            pixels.len() * PIXEL_SIZE
        );
        assert_eq!(decompress_plate(&packed)?, pixels);
        Ok(())
    }

    #[test]
    fn bad_prefixes_are_rejected() -> Result<()> {
        let pixels = vec![Pixel::rgb(1, 2, 3); 16];
        let mut packed = compress_plate(&pixels)?;

        // Not a multiple of the pixel size.
        packed[3] = 0x02;
        assert!(decompress_plate(&packed).is_err());

        // Prefix disagrees with the stream.
        packed[3] = 0x3C;
        assert!(decompress_plate(&packed).is_err());

        assert!(decompress_plate(&[0, 1]).is_err());
        Ok(())
    }
}
