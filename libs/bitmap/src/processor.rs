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

// Stage two of a bitmap build: filters on the base level, height-to-normal
// conversion, sprite sheet packing, then the mip chain. Everything here
// rewrites the scanned plate in place; the encoder only reads it.

use crate::EncodeError;
use anyhow::{bail, ensure, Result};
use log::trace;
use once_cell::sync::Lazy;
use plate::{BitmapType, BitmapUsage, Pixel, ScannedBitmap, ScannedPlate, Sprite};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MipmapScaleType {
    Linear,
    NearestAlpha,
    Nearest,
}

impl FromStr for MipmapScaleType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "linear" => Self::Linear,
            "nearest_alpha" => Self::NearestAlpha,
            "nearest" => Self::Nearest,
            _ => bail!("unknown mipmap scale type '{}'", s),
        })
    }
}

#[derive(Clone, Debug)]
pub struct SpriteParameters {
    /// Sheet edge length; sheets are `budget` x `budget`.
    pub budget: usize,
    /// Sheet count cap; 0 disables budgeting.
    pub budget_count: usize,
    /// Empty pixels between placements and sheet edges.
    pub spacing: usize,
    pub force_square_sheets: bool,
}

#[derive(Clone, Debug)]
pub struct ProcessorOptions {
    pub bitmap_type: BitmapType,
    pub usage: BitmapUsage,
    pub bump_height: f32,
    pub palettize: bool,
    pub sprite_parameters: Option<SpriteParameters>,
    pub max_mipmap_count: usize,
    pub scale_type: MipmapScaleType,
    /// Detail-map fade toward gray; None outside detail usage.
    pub mipmap_fade: Option<f32>,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub alpha_bias: Option<f32>,
}

pub fn process_plate(plate: &mut ScannedPlate, options: &ProcessorOptions) -> Result<()> {
    if options.bitmap_type == BitmapType::Sprites {
        let parameters = options
            .sprite_parameters
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("sprite builds need sprite parameters"))?;
        pack_sprites(plate, parameters)?;
    }

    for bitmap in &mut plate.bitmaps {
        if let Some(blur) = options.blur {
            if blur > 0. {
                apply_blur(bitmap, blur);
            }
        }
        if let Some(sharpen) = options.sharpen {
            ensure!(
                (0.0..=1.0).contains(&sharpen),
                "sharpen amount {} is outside 0..1",
                sharpen
            );
            apply_sharpen(bitmap, sharpen);
        }
        if let Some(bias) = options.alpha_bias {
            ensure!(
                (-1.0..=1.0).contains(&bias),
                "alpha bias {} is outside -1..1",
                bias
            );
            apply_alpha_bias(bitmap, bias);
        }
        if options.usage == BitmapUsage::HeightMap {
            bump_to_normals(bitmap, options.bump_height);
        }

        generate_mipmaps(bitmap, options.max_mipmap_count, options.scale_type);

        if let Some(fade) = options.mipmap_fade {
            apply_detail_fade(bitmap, fade);
        }
    }
    Ok(())
}

/// Dimensions of mip level `level` (0 = base). Depth halves with the
/// levels; faces never do.
pub fn mip_dims(bitmap: &ScannedBitmap, level: usize) -> (usize, usize, usize) {
    (
        (bitmap.width >> level).max(1),
        (bitmap.height >> level).max(1),
        (bitmap.depth >> level).max(1),
    )
}

fn generate_mipmaps(bitmap: &mut ScannedBitmap, max_count: usize, scale: MipmapScaleType) {
    bitmap.mipmaps.clear();
    let mut level = 0;
    while level < max_count {
        let (w, h, d) = mip_dims(bitmap, level);
        if w == 1 && h == 1 && d == 1 {
            break;
        }
        let source = if level == 0 {
            &bitmap.pixels
        } else {
            &bitmap.mipmaps[level - 1]
        };
        let next = scale_down(source, w, h, d, bitmap.faces, scale);
        bitmap.mipmaps.push(next);
        level += 1;
    }
    trace!(
        "{}x{}: {} mip levels",
        bitmap.width,
        bitmap.height,
        bitmap.mipmaps.len()
    );
}

/// Halve a level. Linear averages the 2x2 (2x2x2 for volumes) footprint,
/// nearest takes the first sample, nearest-alpha mixes the two so hard
/// alpha edges survive while color still filters.
fn scale_down(
    pixels: &[Pixel],
    w: usize,
    h: usize,
    d: usize,
    faces: usize,
    scale: MipmapScaleType,
) -> Vec<Pixel> {
    let nw = (w / 2).max(1);
    let nh = (h / 2).max(1);
    let nd = (d / 2).max(1);
    let mut out = Vec::with_capacity(nw * nh * nd * faces);
    for face in 0..faces {
        for z in 0..nd {
            for y in 0..nh {
                for x in 0..nw {
                    let mut sums = [0u32; 4];
                    let mut count = 0u32;
                    for dz in 0..2usize.min(d) {
                        for dy in 0..2usize.min(h) {
                            for dx in 0..2usize.min(w) {
                                let sx = (x * 2 + dx).min(w - 1);
                                let sy = (y * 2 + dy).min(h - 1);
                                let sz = (z * 2 + dz).min(d - 1);
                                let p = pixels[((face * d + sz) * h + sy) * w + sx];
                                sums[0] += p.b as u32;
                                sums[1] += p.g as u32;
                                sums[2] += p.r as u32;
                                sums[3] += p.a as u32;
                                count += 1;
                            }
                        }
                    }
                    let nearest = pixels[((face * d + (z * 2).min(d - 1)) * h
                        + (y * 2).min(h - 1))
                        * w
                        + (x * 2).min(w - 1)];
                    let averaged = Pixel {
                        b: ((sums[0] + count / 2) / count) as u8,
                        g: ((sums[1] + count / 2) / count) as u8,
                        r: ((sums[2] + count / 2) / count) as u8,
                        a: ((sums[3] + count / 2) / count) as u8,
                    };
                    out.push(match scale {
                        MipmapScaleType::Linear => averaged,
                        MipmapScaleType::Nearest => nearest,
                        MipmapScaleType::NearestAlpha => Pixel {
                            a: nearest.a,
                            ..averaged
                        },
                    });
                }
            }
        }
    }
    out
}

fn apply_detail_fade(bitmap: &mut ScannedBitmap, fade: f32) {
    let last = bitmap.mipmaps.len();
    if last == 0 {
        return;
    }
    for (level, pixels) in bitmap.mipmaps.iter_mut().enumerate() {
        let t = (fade * (level + 1) as f32 / last as f32).clamp(0., 1.);
        for p in pixels.iter_mut() {
            p.r = lerp_u8(p.r, 127, t);
            p.g = lerp_u8(p.g, 127, t);
            p.b = lerp_u8(p.b, 127, t);
            p.a = lerp_u8(p.a, 127, t);
        }
    }
}

fn lerp_u8(from: u8, to: u8, t: f32) -> u8 {
    (from as f32 + (to as f32 - from as f32) * t)
        .round()
        .clamp(0., 255.) as u8
}

fn apply_alpha_bias(bitmap: &mut ScannedBitmap, bias: f32) {
    let shift = (bias * 255.) as i32;
    for p in bitmap.pixels.iter_mut() {
        p.a = (p.a as i32 + shift).clamp(0, 255) as u8;
    }
}

/// 5-point sharpen on the base level; edges clamp. Alpha is untouched.
fn apply_sharpen(bitmap: &mut ScannedBitmap, amount: f32) {
    convolve_faces(bitmap, |get, x, y| {
        let center = get(x, y);
        let neighbors = [
            get(x, y.saturating_sub(1)),
            get(x, y + 1),
            get(x.saturating_sub(1), y),
            get(x + 1, y),
        ];
        let sharpen_channel = |c: fn(Pixel) -> u8| -> u8 {
            let sum: f32 = neighbors.iter().map(|&p| c(p) as f32).sum();
            let v = c(center) as f32 * (1. + 4. * amount) - sum * amount;
            v.round().clamp(0., 255.) as u8
        };
        Pixel {
            b: sharpen_channel(|p| p.b),
            g: sharpen_channel(|p| p.g),
            r: sharpen_channel(|p| p.r),
            a: center.a,
        }
    });
}

/// 3x3 Gaussian, applied once per whole step of the filter size.
fn apply_blur(bitmap: &mut ScannedBitmap, size: f32) {
    let passes = (size.ceil() as usize).max(1);
    for _ in 0..passes {
        convolve_faces(bitmap, |get, x, y| {
            let mut sums = [0f32; 4];
            for (dy, row_weight) in [(-1i32, 1f32), (0, 2.), (1, 1.)] {
                for (dx, col_weight) in [(-1i32, 1f32), (0, 2.), (1, 1.)] {
                    let p = get(
                        (x as i32 + dx).max(0) as usize,
                        (y as i32 + dy).max(0) as usize,
                    );
                    let w = row_weight * col_weight;
                    sums[0] += p.b as f32 * w;
                    sums[1] += p.g as f32 * w;
                    sums[2] += p.r as f32 * w;
                    sums[3] += p.a as f32 * w;
                }
            }
            Pixel {
                b: (sums[0] / 16.).round() as u8,
                g: (sums[1] / 16.).round() as u8,
                r: (sums[2] / 16.).round() as u8,
                a: (sums[3] / 16.).round() as u8,
            }
        });
    }
}

/// Run a kernel over every face and depth slice of the base level. The
/// sampler the kernel receives clamps out-of-range coordinates.
fn convolve_faces<F>(bitmap: &mut ScannedBitmap, kernel: F)
where
    F: Fn(&dyn Fn(usize, usize) -> Pixel, usize, usize) -> Pixel,
{
    let (w, h) = (bitmap.width, bitmap.height);
    let slices = bitmap.depth * bitmap.faces;
    let mut out = Vec::with_capacity(bitmap.pixels.len());
    for slice in 0..slices {
        let base = slice * w * h;
        let source = &bitmap.pixels[base..base + w * h];
        let get = |x: usize, y: usize| -> Pixel {
            source[y.min(h - 1) * w + x.min(w - 1)]
        };
        for y in 0..h {
            for x in 0..w {
                out.push(kernel(&get, x, y));
            }
        }
    }
    bitmap.pixels = out;
}

/// Interpret grayscale as a height field and derive a normal map from
/// central differences; sampling wraps, since these textures tile.
fn bump_to_normals(bitmap: &mut ScannedBitmap, bump_height: f32) {
    let (w, h) = (bitmap.width, bitmap.height);
    let slices = bitmap.depth * bitmap.faces;
    let scale = bump_height.max(1e-6) * 255.;
    let mut out = Vec::with_capacity(bitmap.pixels.len());
    for slice in 0..slices {
        let base = slice * w * h;
        let source = &bitmap.pixels[base..base + w * h];
        let height_at =
            |x: usize, y: usize| -> f32 { source[(y % h) * w + (x % w)].luma() as f32 / 255. };
        for y in 0..h {
            for x in 0..w {
                let dx = (height_at(x + 1, y) - height_at(x + w - 1, y)) * scale / 2.;
                let dy = (height_at(x, y + 1) - height_at(x, y + h - 1)) * scale / 2.;
                let len = (dx * dx + dy * dy + 1.).sqrt();
                let n = [-dx / len, -dy / len, 1. / len];
                out.push(Pixel {
                    r: ((n[0] * 0.5 + 0.5) * 255.).round() as u8,
                    g: ((n[1] * 0.5 + 0.5) * 255.).round() as u8,
                    b: ((n[2] * 0.5 + 0.5) * 255.).round() as u8,
                    a: source[y * w + x].a,
                });
            }
        }
    }
    bitmap.pixels = out;
}

/// The engine's bump palette: 16 azimuth steps by 16 elevation rings,
/// normals pointing out of the surface.
pub static P8_BUMP_PALETTE: Lazy<[[u8; 3]; 256]> = Lazy::new(|| {
    let mut palette = [[0u8; 3]; 256];
    for (i, entry) in palette.iter_mut().enumerate() {
        let azimuth = (i % 16) as f32 / 16. * std::f32::consts::TAU;
        let elevation = (i / 16) as f32 / 15. * std::f32::consts::FRAC_PI_2;
        let n = [
            elevation.cos() * azimuth.cos(),
            elevation.cos() * azimuth.sin(),
            elevation.sin(),
        ];
        *entry = [
            ((n[0] * 0.5 + 0.5) * 255.).round() as u8,
            ((n[1] * 0.5 + 0.5) * 255.).round() as u8,
            ((n[2] * 0.5 + 0.5) * 255.).round() as u8,
        ];
    }
    palette
});

pub fn nearest_p8_entry(p: Pixel) -> u8 {
    let mut best = 0usize;
    let mut best_distance = i32::MAX;
    for (i, entry) in P8_BUMP_PALETTE.iter().enumerate() {
        let dr = entry[0] as i32 - p.r as i32;
        let dg = entry[1] as i32 - p.g as i32;
        let db = entry[2] as i32 - p.b as i32;
        let distance = dr * dr + dg * dg + db * db;
        if distance < best_distance {
            best_distance = distance;
            best = i;
        }
    }
    best as u8
}

struct Shelf {
    x: usize,
    y: usize,
    height: usize,
}

struct SheetBuilder {
    width: usize,
    height: usize,
    shelf: Shelf,
    used_height: usize,
    placements: Vec<(usize, usize, usize, usize, usize)>, // sprite, x, y, w, h
}

impl SheetBuilder {
    fn new(edge: usize, spacing: usize) -> Self {
        Self {
            width: edge,
            height: edge,
            shelf: Shelf {
                x: spacing,
                y: spacing,
                height: 0,
            },
            used_height: 0,
            placements: Vec::new(),
        }
    }

    fn try_place(&mut self, sprite: usize, w: usize, h: usize, spacing: usize) -> bool {
        if self.shelf.x + w + spacing > self.width {
            self.shelf.y += self.shelf.height + spacing;
            self.shelf.x = spacing;
            self.shelf.height = 0;
        }
        if self.shelf.x + w + spacing > self.width || self.shelf.y + h + spacing > self.height {
            return false;
        }
        self.placements.push((sprite, self.shelf.x, self.shelf.y, w, h));
        self.used_height = self.used_height.max(self.shelf.y + h + spacing);
        self.shelf.x += w + spacing;
        self.shelf.height = self.shelf.height.max(h);
        true
    }
}

/// First-fit-decreasing shelf packer. Replaces the plate's bitmaps with
/// the packed sheets and rewrites every sprite into sheet coordinates.
fn pack_sprites(plate: &mut ScannedPlate, parameters: &SpriteParameters) -> Result<()> {
    let spacing = parameters.spacing;
    let edge = parameters.budget;

    // (sequence, sprite slot, source rect) sorted decreasing by area.
    let mut jobs = Vec::new();
    for (sequence_index, sequence) in plate.sequences.iter().enumerate() {
        for (slot, sprite) in sequence.sprites.iter().enumerate() {
            let w = sprite.right - sprite.left;
            let h = sprite.bottom - sprite.top;
            if w + 2 * spacing > edge || h + 2 * spacing > edge {
                return Err(EncodeError::SpriteTooLarge {
                    index: sprite.bitmap_index,
                    width: w,
                    height: h,
                    budget: edge,
                }
                .into());
            }
            jobs.push((sequence_index, slot, w, h));
        }
    }
    jobs.sort_by(|a, b| (b.2 * b.3).cmp(&(a.2 * a.3)));

    let mut sheets: Vec<SheetBuilder> = Vec::new();
    let mut homes = vec![(0usize, 0usize, 0usize); jobs.len()];
    for (job, &(_, _, w, h)) in jobs.iter().enumerate() {
        let mut placed = None;
        for (sheet_index, sheet) in sheets.iter_mut().enumerate() {
            if sheet.try_place(job, w, h, spacing) {
                placed = Some(sheet_index);
                break;
            }
        }
        if placed.is_none() {
            let mut sheet = SheetBuilder::new(edge, spacing);
            ensure!(
                sheet.try_place(job, w, h, spacing),
                "sprite of {}x{} cannot enter an empty {}x{} sheet",
                w,
                h,
                edge,
                edge
            );
            sheets.push(sheet);
            placed = Some(sheets.len() - 1);
        }
        let sheet_index = placed.expect("placement succeeded");
        let placement = *sheets[sheet_index].placements.last().expect("just placed");
        homes[job] = (sheet_index, placement.1, placement.2);
    }

    if parameters.budget_count > 0 && sheets.len() > parameters.budget_count {
        return Err(EncodeError::SpriteBudgetExhausted {
            needed: sheets.len(),
            allowed: parameters.budget_count,
        }
        .into());
    }

    // The last sheet may shed unused height unless square sheets are
    // forced; keep the height a power of two for the encoder's sake.
    let mut sheet_heights: Vec<usize> = sheets.iter().map(|s| s.height).collect();
    if !parameters.force_square_sheets {
        if let (Some(last), Some(height)) = (sheets.last(), sheet_heights.last_mut()) {
            let mut trimmed = edge;
            while trimmed / 2 >= last.used_height && trimmed > 1 {
                trimmed /= 2;
            }
            *height = trimmed;
        }
    }

    // Blit sprite pixels into their sheets.
    let mut sheet_bitmaps: Vec<ScannedBitmap> = sheet_heights
        .iter()
        .map(|&h| ScannedBitmap {
            width: edge,
            height: h,
            depth: 1,
            faces: 1,
            pixels: vec![Pixel::TRANSPARENT; edge * h],
            registration_point: [edge as f32 / 2., h as f32 / 2.],
            mipmaps: Vec::new(),
        })
        .collect();

    let mut new_sprites: Vec<Vec<Sprite>> = vec![Vec::new(); plate.sequences.len()];
    for (job, &(sequence_index, slot, w, h)) in jobs.iter().enumerate() {
        let sprite = &plate.sequences[sequence_index].sprites[slot];
        let source = &plate.bitmaps[sprite.bitmap_index];
        let (sheet_index, x0, y0) = homes[job];
        let sheet = &mut sheet_bitmaps[sheet_index];
        for y in 0..h {
            for x in 0..w {
                let p = source.pixels[(sprite.top + y) * source.width + (sprite.left + x)];
                sheet.pixels[(y0 + y) * sheet.width + (x0 + x)] = p;
            }
        }
        new_sprites[sequence_index].push(Sprite {
            bitmap_index: sheet_index,
            left: x0,
            top: y0,
            right: x0 + w,
            bottom: y0 + h,
            registration_x: sprite.registration_x - sprite.left as f32 + x0 as f32,
            registration_y: sprite.registration_y - sprite.top as f32 + y0 as f32,
        });
    }

    trace!(
        "packed {} sprites into {} sheet(s) of {}x{}",
        jobs.len(),
        sheet_bitmaps.len(),
        edge,
        sheet_heights.last().copied().unwrap_or(edge)
    );

    plate.bitmaps = sheet_bitmaps;
    for (sequence, sprites) in plate.sequences.iter_mut().zip(new_sprites) {
        let mut indices: Vec<usize> = sprites.iter().map(|s| s.bitmap_index).collect();
        indices.sort_unstable();
        indices.dedup();
        sequence.bitmap_indices = indices;
        sequence.sprites = sprites;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plate::{scan_color_plate, PixelBuffer, ScanOptions};

    fn flat_bitmap(width: usize, height: usize, pixels: Vec<Pixel>) -> ScannedBitmap {
        ScannedBitmap {
            width,
            height,
            depth: 1,
            faces: 1,
            pixels,
            registration_point: [width as f32 / 2., height as f32 / 2.],
            mipmaps: Vec::new(),
        }
    }

    fn options_2d() -> ProcessorOptions {
        ProcessorOptions {
            bitmap_type: BitmapType::TwoDTextures,
            usage: BitmapUsage::Default,
            bump_height: 0.026,
            palettize: false,
            sprite_parameters: None,
            max_mipmap_count: usize::MAX,
            scale_type: MipmapScaleType::Linear,
            mipmap_fade: None,
            sharpen: None,
            blur: None,
            alpha_bias: None,
        }
    }

    #[test]
    fn full_chain_runs_to_one_pixel() -> Result<()> {
        let mut plate = ScannedPlate {
            width: 64,
            height: 64,
            bitmaps: vec![flat_bitmap(64, 64, vec![Pixel::rgb(10, 20, 30); 64 * 64])],
            sequences: Vec::new(),
        };
        process_plate(&mut plate, &options_2d())?;
        // 32, 16, 8, 4, 2, 1.
        assert_eq!(plate.bitmaps[0].mipmaps.len(), 6);
        assert_eq!(plate.bitmaps[0].mipmaps[5].len(), 1);
        Ok(())
    }

    #[test]
    fn mip_cap_limits_the_chain() -> Result<()> {
        let mut plate = ScannedPlate {
            width: 64,
            height: 64,
            bitmaps: vec![flat_bitmap(64, 64, vec![Pixel::rgb(0, 0, 0); 64 * 64])],
            sequences: Vec::new(),
        };
        let mut options = options_2d();
        options.max_mipmap_count = 2;
        process_plate(&mut plate, &options)?;
        assert_eq!(plate.bitmaps[0].mipmaps.len(), 2);
        Ok(())
    }

    #[test]
    fn linear_averages_but_nearest_alpha_keeps_edges() -> Result<()> {
        // 2x2 checker of opaque white and transparent black.
        let pixels = vec![
            Pixel::rgba(255, 255, 255, 255),
            Pixel::rgba(0, 0, 0, 0),
            Pixel::rgba(0, 0, 0, 0),
            Pixel::rgba(255, 255, 255, 255),
        ];
        let mut plate = ScannedPlate {
            width: 2,
            height: 2,
            bitmaps: vec![flat_bitmap(2, 2, pixels.clone())],
            sequences: Vec::new(),
        };
        process_plate(&mut plate, &options_2d())?;
        assert_eq!(plate.bitmaps[0].mipmaps[0][0].a, 128);

        let mut plate = ScannedPlate {
            width: 2,
            height: 2,
            bitmaps: vec![flat_bitmap(2, 2, pixels)],
            sequences: Vec::new(),
        };
        let mut options = options_2d();
        options.scale_type = MipmapScaleType::NearestAlpha;
        process_plate(&mut plate, &options)?;
        let p = plate.bitmaps[0].mipmaps[0][0];
        assert_eq!(p.a, 255);
        assert_eq!(p.r, 128);
        Ok(())
    }

    #[test]
    fn detail_fade_grays_the_last_level() -> Result<()> {
        let mut plate = ScannedPlate {
            width: 8,
            height: 8,
            bitmaps: vec![flat_bitmap(8, 8, vec![Pixel::rgb(255, 0, 0); 64])],
            sequences: Vec::new(),
        };
        let mut options = options_2d();
        options.usage = BitmapUsage::DetailMap;
        options.mipmap_fade = Some(1.0);
        process_plate(&mut plate, &options)?;
        let last = plate.bitmaps[0].mipmaps.last().unwrap();
        assert_eq!(last[0].r, 127);
        assert_eq!(last[0].g, 127);
        Ok(())
    }

    #[test]
    fn alpha_bias_shifts_and_clamps() -> Result<()> {
        let mut plate = ScannedPlate {
            width: 1,
            height: 1,
            bitmaps: vec![flat_bitmap(1, 1, vec![Pixel::rgba(0, 0, 0, 200)])],
            sequences: Vec::new(),
        };
        let mut options = options_2d();
        options.alpha_bias = Some(0.5);
        process_plate(&mut plate, &options)?;
        assert_eq!(plate.bitmaps[0].pixels[0].a, 255);
        Ok(())
    }

    #[test]
    fn height_maps_become_normal_maps() -> Result<()> {
        // A horizontal ramp; normals should lean -x and stay unit length.
        let mut pixels = Vec::new();
        for y in 0..4 {
            let _ = y;
            for x in 0..4 {
                let v = (x * 60) as u8;
                pixels.push(Pixel::rgb(v, v, v));
            }
        }
        let mut plate = ScannedPlate {
            width: 4,
            height: 4,
            bitmaps: vec![flat_bitmap(4, 4, pixels)],
            sequences: Vec::new(),
        };
        let mut options = options_2d();
        options.usage = BitmapUsage::HeightMap;
        options.bump_height = 0.5;
        process_plate(&mut plate, &options)?;
        let p = plate.bitmaps[0].pixels[5];
        // Up-axis stays dominant; x tilts below the midpoint.
        assert!(p.b > 200);
        assert!(p.r < 128);
        Ok(())
    }

    #[test]
    fn sprite_packing_respects_budget_and_gutters() -> Result<()> {
        use plate::ScannedSequence;

        let mut plate = ScannedPlate {
            width: 64,
            height: 16,
            bitmaps: vec![
                flat_bitmap(8, 8, vec![Pixel::rgb(255, 0, 0); 64]),
                flat_bitmap(4, 4, vec![Pixel::rgb(0, 255, 0); 16]),
                flat_bitmap(6, 2, vec![Pixel::rgb(0, 0, 255); 12]),
            ],
            sequences: vec![ScannedSequence {
                bitmap_indices: vec![0, 1, 2],
                sprites: vec![
                    Sprite {
                        bitmap_index: 0,
                        left: 0,
                        top: 0,
                        right: 8,
                        bottom: 8,
                        registration_x: 4.,
                        registration_y: 4.,
                    },
                    Sprite {
                        bitmap_index: 1,
                        left: 0,
                        top: 0,
                        right: 4,
                        bottom: 4,
                        registration_x: 2.,
                        registration_y: 2.,
                    },
                    Sprite {
                        bitmap_index: 2,
                        left: 0,
                        top: 0,
                        right: 6,
                        bottom: 2,
                        registration_x: 3.,
                        registration_y: 1.,
                    },
                ],
            }],
        };
        let mut options = options_2d();
        options.bitmap_type = BitmapType::Sprites;
        options.sprite_parameters = Some(SpriteParameters {
            budget: 32,
            budget_count: 0,
            spacing: 1,
            force_square_sheets: false,
        });
        process_plate(&mut plate, &options)?;

        assert_eq!(plate.sequences[0].sprites.len(), 3);
        assert_eq!(plate.sequences[0].bitmap_indices, vec![0]);
        let sheet = &plate.bitmaps[0];
        assert!(sheet.width <= 32 && sheet.height <= 32);
        for sprite in &plate.sequences[0].sprites {
            assert_eq!(sprite.bitmap_index, 0);
            assert!(sprite.left >= 1 && sprite.top >= 1);
            assert!(sprite.right + 1 <= sheet.width);
            assert!(sprite.bottom + 1 <= sheet.height);
            // Pixels inside the placement are the sprite's own.
            let p = sheet.pixels[sprite.top * sheet.width + sprite.left];
            assert_ne!(p, Pixel::TRANSPARENT);
        }
        Ok(())
    }

    #[test]
    fn oversized_sprites_fail_with_the_budget_named() {
        use plate::ScannedSequence;

        let mut plate = ScannedPlate {
            width: 64,
            height: 64,
            bitmaps: vec![flat_bitmap(48, 48, vec![Pixel::rgb(1, 2, 3); 48 * 48])],
            sequences: vec![ScannedSequence {
                bitmap_indices: vec![0],
                sprites: vec![Sprite {
                    bitmap_index: 0,
                    left: 0,
                    top: 0,
                    right: 48,
                    bottom: 48,
                    registration_x: 24.,
                    registration_y: 24.,
                }],
            }],
        };
        let mut options = options_2d();
        options.bitmap_type = BitmapType::Sprites;
        options.sprite_parameters = Some(SpriteParameters {
            budget: 32,
            budget_count: 0,
            spacing: 0,
            force_square_sheets: false,
        });
        let err = process_plate(&mut plate, &options).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EncodeError>(),
            Some(EncodeError::SpriteTooLarge { .. })
        ));
    }

    #[test]
    fn scanned_sprites_flow_through_packing() -> Result<()> {
        // End to end: a sprite plate through scan then process.
        let d = Pixel::rgb(0, 255, 255);
        let b = Pixel::rgb(255, 0, 255);
        let w = Pixel::rgb(255, 255, 255);
        let mut buffer = PixelBuffer::new(8, 4);
        for x in 0..8 {
            buffer.put(x, 0, b);
        }
        buffer.put(0, 0, d);
        for y in 1..4 {
            for x in 0..8 {
                buffer.put(x, y, if x < 3 { w } else { b });
            }
        }
        let mut plate = scan_color_plate(&buffer, BitmapType::Sprites, &ScanOptions::default())?;
        let mut options = options_2d();
        options.bitmap_type = BitmapType::Sprites;
        options.sprite_parameters = Some(SpriteParameters {
            budget: 32,
            budget_count: 1,
            spacing: 0,
            force_square_sheets: false,
        });
        process_plate(&mut plate, &options)?;
        assert_eq!(plate.bitmaps.len(), 1);
        assert_eq!(plate.sequences[0].sprites.len(), 1);
        let s = &plate.sequences[0].sprites[0];
        assert_eq!((s.right - s.left, s.bottom - s.top), (3, 3));
        Ok(())
    }
}
