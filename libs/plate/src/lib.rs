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

// Source images as the pipeline sees them: a 32-bit BGRA pixel grid,
// loaded from whatever the artist saved, scanned into sequences and
// bitmaps, and archived losslessly into the tag for later regeneration.

mod archive;
mod loader;
mod scanner;

pub use crate::{
    archive::{compress_plate, decompress_plate},
    loader::{load_image, probe_source_image, SUPPORTED_EXTENSIONS},
    scanner::{
        scan_color_plate, BitmapType, BitmapUsage, ScanOptions, ScannedBitmap, ScannedPlate,
        ScannedSequence, Sprite,
    },
};

/// Canonical pixel: blue in the lowest byte, alpha in the highest.
/// Straight (non-premultiplied) alpha.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Pixel {
    pub b: u8,
    pub g: u8,
    pub r: u8,
    pub a: u8,
}

pub const PIXEL_SIZE: usize = 4;

impl Pixel {
    pub const TRANSPARENT: Pixel = Pixel {
        b: 0,
        g: 0,
        r: 0,
        a: 0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    pub fn is_gray(&self) -> bool {
        self.r == self.g && self.g == self.b
    }

    /// Rec. 601 luma, rounded.
    pub fn luma(&self) -> u8 {
        let y = 0.299 * self.r as f32 + 0.587 * self.g as f32 + 0.114 * self.b as f32;
        y.round().clamp(0., 255.) as u8
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Pixel>,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Pixel::TRANSPARENT; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Pixel {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x]
    }

    pub fn put(&mut self, x: usize, y: usize, p: Pixel) {
        debug_assert!(x < self.width && y < self.height);
        self.pixels[y * self.width + x] = p;
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len() * PIXEL_SIZE
    }
}

/// Flatten pixels to their on-disk byte order.
pub fn pixels_as_bytes(pixels: &[Pixel]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * PIXEL_SIZE);
    for p in pixels {
        out.extend_from_slice(&[p.b, p.g, p.r, p.a]);
    }
    out
}

pub fn bytes_as_pixels(bytes: &[u8]) -> anyhow::Result<Vec<Pixel>> {
    anyhow::ensure!(
        bytes.len() % PIXEL_SIZE == 0,
        "pixel stream of {} bytes is not a whole number of pixels",
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(PIXEL_SIZE)
        .map(|c| Pixel {
            b: c[0],
            g: c[1],
            r: c[2],
            a: c[3],
        })
        .collect())
}
