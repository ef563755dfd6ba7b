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

// Stage three: pick (or honor) a pixel format and serialize each bitmap's
// level chain into the processed pixel blob. Pixel words are engine
// native, little-endian; only the tag structures around them are
// big-endian.

use crate::{
    processor::{mip_dims, nearest_p8_entry},
    EncodeError, EncodingFormat,
};
use anyhow::{bail, Result};
use plate::{BitmapUsage, Pixel, ScannedBitmap};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PixelFormat {
    A8,
    Y8,
    Ay8,
    A8y8,
    R5g6b5,
    A1r5g5b5,
    A4r4g4b4,
    X8r8g8b8,
    A8r8g8b8,
    Dxt1,
    Dxt3,
    Dxt5,
    P8Bump,
}

impl PixelFormat {
    pub fn to_wire(self) -> u16 {
        match self {
            Self::A8 => 0,
            Self::Y8 => 1,
            Self::Ay8 => 2,
            Self::A8y8 => 3,
            Self::R5g6b5 => 6,
            Self::A1r5g5b5 => 8,
            Self::A4r4g4b4 => 9,
            Self::X8r8g8b8 => 10,
            Self::A8r8g8b8 => 11,
            Self::Dxt1 => 14,
            Self::Dxt3 => 15,
            Self::Dxt5 => 16,
            Self::P8Bump => 17,
        }
    }

    pub fn from_wire(v: u16) -> Result<Self> {
        Ok(match v {
            0 => Self::A8,
            1 => Self::Y8,
            2 => Self::Ay8,
            3 => Self::A8y8,
            6 => Self::R5g6b5,
            8 => Self::A1r5g5b5,
            9 => Self::A4r4g4b4,
            10 => Self::X8r8g8b8,
            11 => Self::A8r8g8b8,
            14 => Self::Dxt1,
            15 => Self::Dxt3,
            16 => Self::Dxt5,
            17 => Self::P8Bump,
            _ => bail!("unknown pixel format {}", v),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::A8 => "a8",
            Self::Y8 => "y8",
            Self::Ay8 => "ay8",
            Self::A8y8 => "a8y8",
            Self::R5g6b5 => "r5g6b5",
            Self::A1r5g5b5 => "a1r5g5b5",
            Self::A4r4g4b4 => "a4r4g4b4",
            Self::X8r8g8b8 => "x8r8g8b8",
            Self::A8r8g8b8 => "a8r8g8b8",
            Self::Dxt1 => "dxt1",
            Self::Dxt3 => "dxt3",
            Self::Dxt5 => "dxt5",
            Self::P8Bump => "p8-bump",
        }
    }

    pub fn is_block_compressed(self) -> bool {
        matches!(self, Self::Dxt1 | Self::Dxt3 | Self::Dxt5)
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::A8
                | Self::Ay8
                | Self::A8y8
                | Self::A1r5g5b5
                | Self::A4r4g4b4
                | Self::A8r8g8b8
                | Self::Dxt1
                | Self::Dxt3
                | Self::Dxt5
        )
    }

    /// Encoded byte size of one level.
    pub fn level_byte_size(self, w: usize, h: usize, d: usize, faces: usize) -> usize {
        let per_slice = match self {
            Self::A8 | Self::Y8 | Self::Ay8 | Self::P8Bump => w * h,
            Self::A8y8 | Self::R5g6b5 | Self::A1r5g5b5 | Self::A4r4g4b4 => w * h * 2,
            Self::X8r8g8b8 | Self::A8r8g8b8 => w * h * 4,
            Self::Dxt1 => ((w + 3) / 4) * ((h + 3) / 4) * 8,
            Self::Dxt3 | Self::Dxt5 => ((w + 3) / 4) * ((h + 3) / 4) * 16,
        };
        per_slice * d * faces
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Dither {
    pub alpha: bool,
    pub color: bool,
}

/// Dimensions of mip level `level` of a `w` x `h` x `d` bitmap.
pub fn level_dims(w: usize, h: usize, d: usize, level: usize) -> (usize, usize, usize) {
    ((w >> level).max(1), (h >> level).max(1), (d >> level).max(1))
}

fn pixel_run<'a>(bitmap: &'a ScannedBitmap, level: usize) -> &'a [Pixel] {
    if level == 0 {
        &bitmap.pixels
    } else {
        &bitmap.mipmaps[level - 1]
    }
}

struct Coverage {
    all_gray: bool,
    all_opaque: bool,
    binary_alpha: bool,
    alpha_is_luma: bool,
    all_white: bool,
}

fn survey(bitmap: &ScannedBitmap) -> Coverage {
    let mut coverage = Coverage {
        all_gray: true,
        all_opaque: true,
        binary_alpha: true,
        alpha_is_luma: true,
        all_white: true,
    };
    for level in 0..=bitmap.mipmaps.len() {
        for p in pixel_run(bitmap, level) {
            coverage.all_gray &= p.is_gray();
            coverage.all_opaque &= p.a == 255;
            coverage.binary_alpha &= p.a == 0 || p.a == 255;
            coverage.alpha_is_luma &= p.a == p.luma();
            coverage.all_white &= p.r == 255 && p.g == 255 && p.b == 255;
        }
    }
    coverage
}

/// The best lossless format for this bitmap: monochrome when gray, P8 for
/// palettized height maps, 32-bit when alpha blends, 16-bit otherwise.
/// Block compression is never chosen automatically.
pub fn choose_format(bitmap: &ScannedBitmap, usage: BitmapUsage, palettize: bool) -> PixelFormat {
    let coverage = survey(bitmap);
    if coverage.all_gray {
        return if coverage.all_opaque {
            PixelFormat::Y8
        } else if coverage.alpha_is_luma {
            PixelFormat::Ay8
        } else if coverage.all_white {
            PixelFormat::A8
        } else {
            PixelFormat::A8y8
        };
    }
    if usage == BitmapUsage::HeightMap && palettize {
        return PixelFormat::P8Bump;
    }
    if !coverage.binary_alpha {
        return PixelFormat::A8r8g8b8;
    }
    if coverage.all_opaque {
        PixelFormat::R5g6b5
    } else {
        PixelFormat::A1r5g5b5
    }
}

/// Map an explicit tag-level format request onto a concrete pixel format
/// for one bitmap.
pub fn resolve_format(
    request: EncodingFormat,
    bitmap: &ScannedBitmap,
    index: usize,
    usage: BitmapUsage,
    palettize: bool,
) -> Result<PixelFormat> {
    if usage == BitmapUsage::HeightMap && palettize {
        return Ok(PixelFormat::P8Bump);
    }
    let coverage = survey(bitmap);
    Ok(match request {
        EncodingFormat::ThirtyTwoBit => {
            if coverage.all_opaque {
                PixelFormat::X8r8g8b8
            } else {
                PixelFormat::A8r8g8b8
            }
        }
        EncodingFormat::SixteenBit => {
            if coverage.all_opaque {
                PixelFormat::R5g6b5
            } else if coverage.binary_alpha {
                PixelFormat::A1r5g5b5
            } else {
                PixelFormat::A4r4g4b4
            }
        }
        EncodingFormat::Monochrome => {
            if coverage.all_opaque {
                PixelFormat::Y8
            } else if coverage.alpha_is_luma {
                PixelFormat::Ay8
            } else if coverage.all_white {
                PixelFormat::A8
            } else {
                PixelFormat::A8y8
            }
        }
        EncodingFormat::Dxt1 | EncodingFormat::Dxt3 | EncodingFormat::Dxt5 => {
            if bitmap.width < 4 || bitmap.height < 4 {
                return Err(EncodeError::TooSmallForBlockCompression {
                    index,
                    width: bitmap.width,
                    height: bitmap.height,
                    format: match request {
                        EncodingFormat::Dxt1 => "dxt1",
                        EncodingFormat::Dxt3 => "dxt3",
                        _ => "dxt5",
                    },
                }
                .into());
            }
            match request {
                EncodingFormat::Dxt1 => PixelFormat::Dxt1,
                EncodingFormat::Dxt3 => PixelFormat::Dxt3,
                _ => PixelFormat::Dxt5,
            }
        }
    })
}

/// Serialize every level of a bitmap, largest first, into one run.
pub fn encode_bitmap(bitmap: &ScannedBitmap, format: PixelFormat, dither: Dither) -> Vec<u8> {
    let mut out = Vec::new();
    for level in 0..=bitmap.mipmaps.len() {
        let (w, h, d) = mip_dims(bitmap, level);
        let pixels = pixel_run(bitmap, level);
        for slice in 0..d * bitmap.faces {
            let slice_pixels = &pixels[slice * w * h..(slice + 1) * w * h];
            encode_slice(&mut out, slice_pixels, w, h, format, dither);
        }
    }
    out
}

fn encode_slice(
    out: &mut Vec<u8>,
    pixels: &[Pixel],
    w: usize,
    h: usize,
    format: PixelFormat,
    dither: Dither,
) {
    match format {
        PixelFormat::A8 => out.extend(pixels.iter().map(|p| p.a)),
        PixelFormat::Y8 => out.extend(pixels.iter().map(|p| p.luma())),
        PixelFormat::Ay8 => out.extend(pixels.iter().map(|p| p.luma())),
        PixelFormat::A8y8 => {
            for p in pixels {
                out.push(p.luma());
                out.push(p.a);
            }
        }
        PixelFormat::R5g6b5 => encode_16bit(out, pixels, w, h, [0, 5, 6, 5], dither),
        PixelFormat::A1r5g5b5 => encode_16bit(out, pixels, w, h, [1, 5, 5, 5], dither),
        PixelFormat::A4r4g4b4 => encode_16bit(out, pixels, w, h, [4, 4, 4, 4], dither),
        PixelFormat::X8r8g8b8 => {
            for p in pixels {
                out.extend_from_slice(&[p.b, p.g, p.r, 0xFF]);
            }
        }
        PixelFormat::A8r8g8b8 => {
            for p in pixels {
                out.extend_from_slice(&[p.b, p.g, p.r, p.a]);
            }
        }
        PixelFormat::P8Bump => out.extend(pixels.iter().map(|&p| nearest_p8_entry(p))),
        PixelFormat::Dxt1 => encode_dxt(out, pixels, w, h, DxtVariant::Dxt1),
        PixelFormat::Dxt3 => encode_dxt(out, pixels, w, h, DxtVariant::Dxt3),
        PixelFormat::Dxt5 => encode_dxt(out, pixels, w, h, DxtVariant::Dxt5),
    }
}

fn quantize(v: u8, bits: u32) -> (u8, i16) {
    if bits >= 8 {
        return (v, 0);
    }
    let levels = (1u16 << bits) - 1;
    let q = ((v as u16 * levels + 127) / 255) as u8;
    let back = (q as u16 * 255 / levels) as u8;
    (q, v as i16 - back as i16)
}

/// Pack to a 16-bit word, alpha in the top bits, little-endian on disk.
/// Floyd-Steinberg error diffusion runs per enabled channel.
fn encode_16bit(
    out: &mut Vec<u8>,
    pixels: &[Pixel],
    w: usize,
    h: usize,
    bits: [u32; 4],
    dither: Dither,
) {
    let [ab, rb, gb, bb] = bits;
    // Per-channel running error, a row and a pixel of lookahead.
    let mut errors = vec![[0f32; 4]; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let p = pixels[i];
            let carried = errors[i];
            let channel = |v: u8, dithered: bool, lane: usize| -> u8 {
                if dithered {
                    (v as f32 + carried[lane]).round().clamp(0., 255.) as u8
                } else {
                    v
                }
            };
            let a_in = channel(p.a, dither.alpha && ab > 0, 0);
            let r_in = channel(p.r, dither.color, 1);
            let g_in = channel(p.g, dither.color, 2);
            let b_in = channel(p.b, dither.color, 3);

            let (a, ae) = if ab == 0 {
                (0, 0)
            } else {
                quantize(a_in, ab)
            };
            let (r, re) = quantize(r_in, rb);
            let (g, ge) = quantize(g_in, gb);
            let (b, be) = quantize(b_in, bb);

            if dither.alpha || dither.color {
                let spill = [
                    (ae, dither.alpha && ab > 0),
                    (re, dither.color),
                    (ge, dither.color),
                    (be, dither.color),
                ];
                for (lane, &(e, enabled)) in spill.iter().enumerate() {
                    if !enabled || e == 0 {
                        continue;
                    }
                    let e = e as f32;
                    if x + 1 < w {
                        errors[i + 1][lane] += e * 7. / 16.;
                    }
                    if y + 1 < h {
                        if x > 0 {
                            errors[i + w - 1][lane] += e * 3. / 16.;
                        }
                        errors[i + w][lane] += e * 5. / 16.;
                        if x + 1 < w {
                            errors[i + w + 1][lane] += e * 1. / 16.;
                        }
                    }
                }
            }

            let word = ((a as u16) << (rb + gb + bb))
                | ((r as u16) << (gb + bb))
                | ((g as u16) << bb)
                | b as u16;
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum DxtVariant {
    Dxt1,
    Dxt3,
    Dxt5,
}

fn to_565(p: Pixel) -> u16 {
    (((p.r as u16 * 31 + 127) / 255) << 11)
        | (((p.g as u16 * 63 + 127) / 255) << 5)
        | ((p.b as u16 * 31 + 127) / 255)
}

fn from_565(v: u16) -> [i32; 3] {
    [
        (((v >> 11) & 31) as i32 * 255 + 15) / 31,
        (((v >> 5) & 63) as i32 * 255 + 31) / 63,
        ((v & 31) as i32 * 255 + 15) / 31,
    ]
}

/// Block compression with bounding-box endpoints: enough for the legacy
/// engine, stable across hosts, no external texture toolchain.
fn encode_dxt(out: &mut Vec<u8>, pixels: &[Pixel], w: usize, h: usize, variant: DxtVariant) {
    for by in (0..h).step_by(4) {
        for bx in (0..w).step_by(4) {
            // Gather the block, replicating edge texels on short tails.
            let mut block = [Pixel::TRANSPARENT; 16];
            for (i, slot) in block.iter_mut().enumerate() {
                let x = (bx + i % 4).min(w - 1);
                let y = (by + i / 4).min(h - 1);
                *slot = pixels[y * w + x];
            }

            match variant {
                DxtVariant::Dxt1 => {}
                DxtVariant::Dxt3 => {
                    for chunk in block.chunks(4) {
                        let mut word = 0u16;
                        for (i, p) in chunk.iter().enumerate() {
                            word |= ((p.a >> 4) as u16) << (4 * i);
                        }
                        out.extend_from_slice(&word.to_le_bytes());
                    }
                }
                DxtVariant::Dxt5 => encode_dxt5_alpha(out, &block),
            }
            encode_color_block(out, &block, variant);
        }
    }
}

fn encode_dxt5_alpha(out: &mut Vec<u8>, block: &[Pixel; 16]) {
    let a0 = block.iter().map(|p| p.a).max().unwrap_or(255);
    let a1 = block.iter().map(|p| p.a).min().unwrap_or(0);
    out.push(a0);
    out.push(a1);
    let mut palette = [0u8; 8];
    palette[0] = a0;
    palette[1] = a1;
    if a0 > a1 {
        for i in 0..6 {
            palette[2 + i] = (((6 - i) as u16 * a0 as u16 + (1 + i) as u16 * a1 as u16) / 7) as u8;
        }
    } else {
        for i in 0..4 {
            palette[2 + i] = (((4 - i) as u16 * a0 as u16 + (1 + i) as u16 * a1 as u16) / 5) as u8;
        }
        palette[6] = 0;
        palette[7] = 255;
    }
    let mut bits = 0u64;
    for (i, p) in block.iter().enumerate() {
        let mut best = 0u64;
        let mut best_distance = i32::MAX;
        for (j, &candidate) in palette.iter().enumerate() {
            let distance = (candidate as i32 - p.a as i32).abs();
            if distance < best_distance {
                best_distance = distance;
                best = j as u64;
            }
        }
        bits |= best << (3 * i);
    }
    out.extend_from_slice(&bits.to_le_bytes()[..6]);
}

fn encode_color_block(out: &mut Vec<u8>, block: &[Pixel; 16], variant: DxtVariant) {
    let has_transparency =
        variant == DxtVariant::Dxt1 && block.iter().any(|p| p.a < 128);

    // Bounding-box endpoints in color space.
    let mut low = [255i32; 3];
    let mut high = [0i32; 3];
    for p in block {
        if variant == DxtVariant::Dxt1 && p.a < 128 {
            continue;
        }
        for (lane, v) in [p.r, p.g, p.b].into_iter().enumerate() {
            low[lane] = low[lane].min(v as i32);
            high[lane] = high[lane].max(v as i32);
        }
    }
    let mut c0 = to_565(Pixel::rgb(high[0] as u8, high[1] as u8, high[2] as u8));
    let mut c1 = to_565(Pixel::rgb(low[0].min(255) as u8, low[1].min(255) as u8, low[2].min(255) as u8));

    // c0 > c1 selects 4-color mode; equal-or-less selects 3-color plus
    // transparent, which DXT1 punch-through needs.
    if has_transparency {
        if c0 > c1 {
            std::mem::swap(&mut c0, &mut c1);
        }
    } else if c0 <= c1 {
        if c0 < c1 {
            std::mem::swap(&mut c0, &mut c1);
        } else if c0 == 0 {
            c0 = 1;
        } else {
            c1 = c0 - 1;
        }
    }

    let e0 = from_565(c0);
    let e1 = from_565(c1);
    let mut palette = [[0i32; 3]; 4];
    palette[0] = e0;
    palette[1] = e1;
    if has_transparency {
        // 3-color mode: index 2 is the midpoint, 3 is transparent.
        for lane in 0..3 {
            palette[2][lane] = (e0[lane] + e1[lane]) / 2;
        }
        palette[3] = [0; 3];
    } else {
        for lane in 0..3 {
            palette[2][lane] = (2 * e0[lane] + e1[lane]) / 3;
            palette[3][lane] = (e0[lane] + 2 * e1[lane]) / 3;
        }
    }

    out.extend_from_slice(&c0.to_le_bytes());
    out.extend_from_slice(&c1.to_le_bytes());
    let mut bits = 0u32;
    for (i, p) in block.iter().enumerate() {
        let index = if has_transparency && p.a < 128 {
            3
        } else {
            let mut best = 0u32;
            let mut best_distance = i32::MAX;
            let candidates = if has_transparency { 3 } else { 4 };
            for (j, candidate) in palette.iter().take(candidates).enumerate() {
                let dr = candidate[0] - p.r as i32;
                let dg = candidate[1] - p.g as i32;
                let db = candidate[2] - p.b as i32;
                let distance = dr * dr + dg * dg + db * db;
                if distance < best_distance {
                    best_distance = distance;
                    best = j as u32;
                }
            }
            best
        };
        bits |= index << (2 * i);
    }
    out.extend_from_slice(&bits.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_of(width: usize, height: usize, pixels: Vec<Pixel>) -> ScannedBitmap {
        ScannedBitmap {
            width,
            height,
            depth: 1,
            faces: 1,
            pixels,
            registration_point: [0., 0.],
            mipmaps: Vec::new(),
        }
    }

    #[test]
    fn auto_format_follows_the_rules() {
        // Opaque color picks 565; never an alpha-bearing format.
        let b = bitmap_of(2, 2, vec![Pixel::rgb(10, 200, 30); 4]);
        let f = choose_format(&b, BitmapUsage::Default, false);
        assert_eq!(f, PixelFormat::R5g6b5);
        assert!(!f.has_alpha());

        // Binary alpha picks 1555, never 4444.
        let b = bitmap_of(
            2,
            1,
            vec![Pixel::rgba(10, 200, 30, 0), Pixel::rgb(10, 200, 30)],
        );
        assert_eq!(
            choose_format(&b, BitmapUsage::Default, false),
            PixelFormat::A1r5g5b5
        );

        // Blending alpha forces 32-bit.
        let b = bitmap_of(1, 1, vec![Pixel::rgba(10, 200, 30, 100)]);
        assert_eq!(
            choose_format(&b, BitmapUsage::Default, false),
            PixelFormat::A8r8g8b8
        );

        // Gray and opaque collapses to Y8.
        let b = bitmap_of(2, 1, vec![Pixel::rgb(77, 77, 77); 2]);
        assert_eq!(
            choose_format(&b, BitmapUsage::Default, false),
            PixelFormat::Y8
        );

        // White with independent alpha is pure A8.
        let b = bitmap_of(
            2,
            1,
            vec![Pixel::rgba(255, 255, 255, 9), Pixel::rgba(255, 255, 255, 200)],
        );
        assert_eq!(
            choose_format(&b, BitmapUsage::Default, false),
            PixelFormat::A8
        );
    }

    #[test]
    fn explicit_sixteen_bit_keeps_the_binary_alpha_guarantee() -> Result<()> {
        let binary = bitmap_of(
            2,
            1,
            vec![Pixel::rgba(1, 2, 3, 0), Pixel::rgb(1, 2, 3)],
        );
        assert_eq!(
            resolve_format(EncodingFormat::SixteenBit, &binary, 0, BitmapUsage::Default, false)?,
            PixelFormat::A1r5g5b5
        );
        let blended = bitmap_of(1, 1, vec![Pixel::rgba(1, 2, 3, 77)]);
        assert_eq!(
            resolve_format(EncodingFormat::SixteenBit, &blended, 0, BitmapUsage::Default, false)?,
            PixelFormat::A4r4g4b4
        );
        Ok(())
    }

    #[test]
    fn thirty_two_bit_round_trips_exactly() {
        let pixels = vec![
            Pixel::rgba(1, 2, 3, 4),
            Pixel::rgba(250, 128, 0, 255),
            Pixel::rgba(9, 9, 9, 0),
            Pixel::rgba(200, 100, 50, 25),
        ];
        let b = bitmap_of(2, 2, pixels.clone());
        let bytes = encode_bitmap(&b, PixelFormat::A8r8g8b8, Dither::default());
        assert_eq!(bytes.len(), 16);
        for (i, p) in pixels.iter().enumerate() {
            assert_eq!(&bytes[i * 4..i * 4 + 4], &[p.b, p.g, p.r, p.a]);
        }
    }

    #[test]
    fn five_six_five_packs_little_endian() {
        let b = bitmap_of(1, 1, vec![Pixel::rgb(255, 0, 0)]);
        let bytes = encode_bitmap(&b, PixelFormat::R5g6b5, Dither::default());
        assert_eq!(bytes, vec![0x00, 0xF8]);
    }

    #[test]
    fn mip_levels_are_contiguous_and_sized() {
        let mut b = bitmap_of(4, 4, vec![Pixel::rgb(8, 8, 8); 16]);
        b.mipmaps = vec![vec![Pixel::rgb(8, 8, 8); 4], vec![Pixel::rgb(8, 8, 8); 1]];
        let bytes = encode_bitmap(&b, PixelFormat::A8r8g8b8, Dither::default());
        assert_eq!(bytes.len(), (16 + 4 + 1) * 4);
        assert_eq!(
            PixelFormat::A8r8g8b8.level_byte_size(4, 4, 1, 1)
                + PixelFormat::A8r8g8b8.level_byte_size(2, 2, 1, 1)
                + PixelFormat::A8r8g8b8.level_byte_size(1, 1, 1, 1),
            bytes.len()
        );
    }

    #[test]
    fn dxt1_solid_blocks_decode_to_the_color() {
        let b = bitmap_of(4, 4, vec![Pixel::rgb(255, 0, 0); 16]);
        let bytes = encode_bitmap(&b, PixelFormat::Dxt1, Dither::default());
        assert_eq!(bytes.len(), 8);
        let c0 = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(c0 >> 11, 31);
        assert_eq!((c0 >> 5) & 63, 0);
    }

    #[test]
    fn dxt_block_sizes_cover_short_tails() {
        assert_eq!(PixelFormat::Dxt1.level_byte_size(4, 4, 1, 1), 8);
        assert_eq!(PixelFormat::Dxt1.level_byte_size(2, 2, 1, 1), 8);
        assert_eq!(PixelFormat::Dxt5.level_byte_size(8, 4, 1, 1), 32);
        let b = bitmap_of(2, 2, vec![Pixel::rgb(0, 255, 0); 4]);
        let bytes = encode_bitmap(&b, PixelFormat::Dxt1, Dither::default());
        assert_eq!(bytes.len(), 8);
    }

    #[test]
    fn dxt1_punch_through_alpha_survives() {
        let mut pixels = vec![Pixel::rgb(0, 0, 255); 16];
        pixels[5] = Pixel::TRANSPARENT;
        let b = bitmap_of(4, 4, pixels);
        let bytes = encode_bitmap(&b, PixelFormat::Dxt1, Dither::default());
        let c0 = u16::from_le_bytes([bytes[0], bytes[1]]);
        let c1 = u16::from_le_bytes([bytes[2], bytes[3]]);
        // Three-color mode with index 3 on the hole.
        assert!(c0 <= c1);
        let bits = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!((bits >> (2 * 5)) & 3, 3);
    }

    #[test]
    fn dithering_preserves_average_brightness() {
        // A mid gray that 565 cannot hit exactly.
        let b = bitmap_of(16, 16, vec![Pixel::rgb(130, 130, 130); 256]);
        let dithered = encode_bitmap(
            &b,
            PixelFormat::R5g6b5,
            Dither {
                alpha: false,
                color: true,
            },
        );
        let flat = encode_bitmap(&b, PixelFormat::R5g6b5, Dither::default());
        // Without dithering every word is identical; with it they vary.
        let first = &flat[..2];
        assert!(flat.chunks(2).all(|c| c == first));
        assert!(dithered.chunks(2).any(|c| c != first));
    }

    #[test]
    fn too_small_for_dxt_is_a_typed_error() {
        let b = bitmap_of(2, 2, vec![Pixel::rgb(0, 0, 0); 4]);
        let err =
            resolve_format(EncodingFormat::Dxt5, &b, 3, BitmapUsage::Default, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EncodeError>(),
            Some(EncodeError::TooSmallForBlockCompression { index: 3, .. })
        ));
    }
}
