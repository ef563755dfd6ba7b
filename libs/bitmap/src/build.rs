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

// The whole build: resolve options (command line over existing tag over
// defaults), obtain pixels (source image or the tag's archival plate),
// scan, process, encode, assemble, and write the tag in one atomic step.

use crate::{
    encoder::{choose_format, encode_bitmap, resolve_format, Dither, PixelFormat},
    processor::{process_plate, MipmapScaleType, ProcessorOptions, SpriteParameters},
    schema, EncodingFormat, BITMAP_CLASS,
};
use anyhow::{anyhow, bail, ensure, Result};
use log::{info, trace};
use plate::{
    compress_plate, decompress_plate, load_image, probe_source_image, scan_color_plate,
    BitmapType, BitmapUsage, Pixel, PixelBuffer, ScanOptions, ScannedPlate,
    SUPPORTED_EXTENSIONS,
};
use std::path::PathBuf;
use tag::{parse_tag_file, write_tag_file, TagFile, TagStruct, TagValue, NULL_TAG_ID};
use vault::BuildContext;

/// The tag file engine-version word this toolchain emits.
const TAG_ENGINE_VERSION: u32 = 1;

/// Stored mipmap counts at or above this mean "unlimited".
const UNLIMITED_MIPMAPS: u16 = i16::MAX as u16;

/// Everything the command line may or may not say. Unset values fall
/// back to the existing tag, then to the standard defaults.
#[derive(Clone, Debug, Default)]
pub struct BuildOptions {
    pub format: Option<EncodingFormat>,
    pub auto_format: Option<bool>,
    pub bitmap_type: Option<BitmapType>,
    pub usage: Option<BitmapUsage>,
    pub max_mipmap_count: Option<u16>,
    pub scale_type: Option<MipmapScaleType>,
    pub mipmap_fade: Option<f32>,
    pub sprite_budget: Option<u32>,
    pub sprite_budget_count: Option<u32>,
    pub sprite_spacing: Option<u16>,
    pub force_square_sprite_sheets: bool,
    pub palettize: Option<bool>,
    pub bump_height: Option<f32>,
    pub alpha_bias: Option<f32>,
    pub dither_alpha: bool,
    pub dither_color: bool,
    pub filthy_sprite_bug_fix: Option<bool>,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub ignore_tag_data: bool,
    pub regenerate: bool,
}

#[derive(Clone, Debug)]
pub struct ResolvedOptions {
    pub auto_format: bool,
    pub format: EncodingFormat,
    pub bitmap_type: BitmapType,
    pub usage: BitmapUsage,
    pub max_mipmap_count: u16,
    pub scale_type: MipmapScaleType,
    pub mipmap_fade: f32,
    pub sprite_budget: u32,
    pub sprite_budget_count: u32,
    pub sprite_spacing: u16,
    pub force_square_sprite_sheets: bool,
    pub palettize: bool,
    pub bump_height: f32,
    pub alpha_bias: f32,
    pub dither: Dither,
    pub filthy_sprite_bug_fix: bool,
    pub sharpen: Option<f32>,
    pub blur: Option<f32>,
    pub sprite_usage: u16,
}

/// Merge command-line options with the values stored in an existing tag.
pub fn resolve_options(options: &BuildOptions, old: Option<&TagStruct>) -> Result<ResolvedOptions> {
    let mut merged = options.clone();
    let mut sprite_usage = 0u16;
    if let Some(old) = old {
        let flags = old.u16("flags")? as u32;
        if merged.format.is_none() && !merged.auto_format.unwrap_or(false) {
            merged.format = Some(EncodingFormat::from_wire(old.u16("encoding format")?)?);
            merged.auto_format = Some(false);
        }
        if merged.mipmap_fade.is_none() {
            merged.mipmap_fade = Some(old.f32("detail fade factor")?);
        }
        if merged.bitmap_type.is_none() {
            merged.bitmap_type = Some(BitmapType::from_wire(old.u16("type")?)?);
        }
        if merged.max_mipmap_count.is_none() {
            let stored = old.u16("mipmap count")?;
            merged.max_mipmap_count = Some(if stored == 0 {
                UNLIMITED_MIPMAPS
            } else {
                stored - 1
            });
        }
        if merged.sprite_budget.is_none() {
            merged.sprite_budget = Some(32u32 << old.u16("sprite budget size")?);
        }
        if merged.sprite_budget_count.is_none() {
            merged.sprite_budget_count = Some(old.u16("sprite budget count")? as u32);
        }
        if merged.usage.is_none() {
            merged.usage = Some(BitmapUsage::from_wire(old.u16("usage")?)?);
        }
        if merged.palettize.is_none() {
            merged.palettize = Some(!endian::flag(
                flags,
                schema::FLAG_DISABLE_HEIGHT_MAP_COMPRESSION,
            ));
        }
        if merged.bump_height.is_none() {
            merged.bump_height = Some(old.f32("bump height")?);
        }
        if merged.sharpen.is_none() {
            let stored = old.f32("sharpen amount")?;
            if stored > 0.0 && stored <= 1.0 {
                merged.sharpen = Some(stored);
            }
        }
        if merged.blur.is_none() {
            let stored = old.f32("blur filter size")?;
            if stored > 0.0 {
                merged.blur = Some(stored);
            }
        }
        if merged.sprite_spacing.is_none() {
            merged.sprite_spacing = Some(old.u16("sprite spacing")?);
        }
        if merged.filthy_sprite_bug_fix.is_none() {
            merged.filthy_sprite_bug_fix =
                Some(endian::flag(flags, schema::FLAG_FILTHY_SPRITE_BUG_FIX));
        }
        if merged.alpha_bias.is_none() {
            merged.alpha_bias = Some(old.f32("alpha bias")?);
        }
        sprite_usage = old.u16("sprite usage")?;
    }

    let auto_format = merged.auto_format.unwrap_or(merged.format.is_none());
    let sprite_budget = merged.sprite_budget.unwrap_or(32);
    ensure!(
        matches!(sprite_budget, 32 | 64 | 128 | 256 | 512 | 1024),
        "invalid sprite budget {}",
        sprite_budget
    );
    Ok(ResolvedOptions {
        auto_format,
        format: merged.format.unwrap_or(EncodingFormat::ThirtyTwoBit),
        bitmap_type: merged.bitmap_type.unwrap_or(BitmapType::TwoDTextures),
        usage: merged.usage.unwrap_or(BitmapUsage::Default),
        max_mipmap_count: merged.max_mipmap_count.unwrap_or(UNLIMITED_MIPMAPS),
        scale_type: merged.scale_type.unwrap_or(MipmapScaleType::Linear),
        mipmap_fade: merged.mipmap_fade.unwrap_or(0.0),
        sprite_budget,
        sprite_budget_count: merged.sprite_budget_count.unwrap_or(0),
        sprite_spacing: merged.sprite_spacing.unwrap_or(0),
        force_square_sprite_sheets: merged.force_square_sprite_sheets,
        palettize: merged.palettize.unwrap_or(false),
        bump_height: merged.bump_height.unwrap_or(0.026),
        alpha_bias: merged.alpha_bias.unwrap_or(0.0),
        dither: Dither {
            alpha: merged.dither_alpha,
            color: merged.dither_color,
        },
        filthy_sprite_bug_fix: merged.filthy_sprite_bug_fix.unwrap_or(false),
        sharpen: merged.sharpen,
        blur: merged.blur,
        sprite_usage,
    })
}

/// Build or rebuild the bitmap tag at `tag_path`. Returns the host path
/// written.
pub fn build_bitmap_tag(
    ctx: &BuildContext,
    tag_path: &str,
    options: &BuildOptions,
) -> Result<PathBuf> {
    let final_path = ctx.tag_host_path(tag_path, BITMAP_CLASS);

    let existing = if !options.ignore_tag_data && final_path.is_file() {
        let bytes = vault::read_file(&final_path)?;
        Some(parse_tag_file(&bytes, &schema::BITMAP_SCHEMA, Some(BITMAP_CLASS))?)
    } else {
        None
    };
    if options.regenerate && existing.is_none() {
        bail!(
            "cannot regenerate: no bitmap tag exists at {}",
            final_path.display()
        );
    }

    let resolved = resolve_options(options, existing.as_ref().map(|t| &t.root))?;

    let (pixels, width, height, archival) = if options.regenerate {
        let root = &existing.as_ref().expect("checked above").root;
        let data = root.data("compressed color plate data")?;
        let width = root.i16("color plate width")? as usize;
        let height = root.i16("color plate height")? as usize;
        ensure!(
            data.len() >= 4 && width > 0 && height > 0,
            "cannot regenerate a bitmap that has no archival color plate data"
        );
        let pixels = decompress_plate(data)?;
        ensure!(
            pixels.len() == width * height,
            "archival plate holds {} pixels; the tag says {}x{}",
            pixels.len(),
            width,
            height
        );
        (pixels, width, height, Some(data.to_vec()))
    } else {
        let base = ctx.data_host_path(tag_path);
        let source = probe_source_image(&base).ok_or_else(|| {
            anyhow!(
                "failed to find {} under {} (extensions tried: {})",
                tag_path,
                ctx.data.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )
        })?;
        let buffer = load_image(&source)?;
        (buffer.pixels, buffer.width, buffer.height, None)
    };

    let old_flags = match &existing {
        Some(t) => t.root.u16("flags")?,
        None => 0,
    };
    let tag = build_tag_from_pixels(&resolved, &pixels, width, height, archival, old_flags)?;
    let bytes = write_tag_file(&tag)?;
    vault::write_file_atomic(&final_path, &bytes)?;
    info!(
        "wrote {} ({:.3} MiB of pixel data)",
        final_path.display(),
        tag.root.data("processed pixel data")?.len() as f64 / 1024. / 1024.
    );
    Ok(final_path)
}

/// The in-memory half of the build: everything between decoded pixels
/// and a finished tag file.
pub fn build_tag_from_pixels(
    resolved: &ResolvedOptions,
    pixels: &[Pixel],
    width: usize,
    height: usize,
    archival: Option<Vec<u8>>,
    old_flags: u16,
) -> Result<TagFile> {
    ensure!(
        pixels.len() == width * height,
        "{} pixels for a {}x{} plate",
        pixels.len(),
        width,
        height
    );
    let buffer = PixelBuffer {
        width,
        height,
        pixels: pixels.to_vec(),
    };
    let scan_options = ScanOptions {
        usage: resolved.usage,
        filthy_sprite_bug_fix: resolved.filthy_sprite_bug_fix,
    };
    let mut plate = scan_color_plate(&buffer, resolved.bitmap_type, &scan_options)?;

    let sprite_parameters = if resolved.bitmap_type == BitmapType::Sprites {
        Some(SpriteParameters {
            budget: resolved.sprite_budget as usize,
            budget_count: resolved.sprite_budget_count as usize,
            spacing: resolved.sprite_spacing as usize,
            force_square_sheets: resolved.force_square_sprite_sheets,
        })
    } else {
        None
    };
    process_plate(
        &mut plate,
        &ProcessorOptions {
            bitmap_type: resolved.bitmap_type,
            usage: resolved.usage,
            bump_height: resolved.bump_height,
            palettize: resolved.palettize,
            sprite_parameters,
            max_mipmap_count: resolved.max_mipmap_count as usize,
            scale_type: resolved.scale_type,
            mipmap_fade: if resolved.usage == BitmapUsage::DetailMap {
                Some(resolved.mipmap_fade)
            } else {
                None
            },
            sharpen: resolved.sharpen,
            blur: resolved.blur,
            alpha_bias: Some(resolved.alpha_bias),
        },
    )?;

    // Encode every bitmap into one contiguous blob.
    let mut blob = Vec::new();
    let mut entries = Vec::new();
    let mut stored_format = None;
    for (index, bitmap) in plate.bitmaps.iter().enumerate() {
        let format = if resolved.auto_format {
            choose_format(bitmap, resolved.usage, resolved.palettize)
        } else {
            resolve_format(
                resolved.format,
                bitmap,
                index,
                resolved.usage,
                resolved.palettize,
            )?
        };
        stored_format.get_or_insert(encoding_family(format));
        let offset = blob.len();
        let encoded = encode_bitmap(bitmap, format, resolved.dither);
        trace!(
            "bitmap {}: {}x{}x{} {} ({} bytes, {} mipmaps)",
            index,
            bitmap.width,
            bitmap.height,
            bitmap.depth * bitmap.faces,
            format.name(),
            encoded.len(),
            bitmap.mipmaps.len()
        );
        blob.extend_from_slice(&encoded);
        entries.push(bitmap_data_entry(bitmap, format, offset, blob.len() - offset)?);
    }

    let mut root = TagStruct::new(&schema::BITMAP_SCHEMA);
    root.set("type", TagValue::Enum(resolved.bitmap_type.to_wire()))?;
    root.set(
        "encoding format",
        TagValue::Enum(
            stored_format
                .unwrap_or(if resolved.auto_format {
                    EncodingFormat::ThirtyTwoBit
                } else {
                    resolved.format
                })
                .to_wire(),
        ),
    )?;
    root.set("usage", TagValue::Enum(resolved.usage.to_wire()))?;
    let mut flags = old_flags as u32;
    flags = endian::with_flag(
        flags,
        schema::FLAG_DISABLE_HEIGHT_MAP_COMPRESSION,
        !resolved.palettize,
    );
    flags = endian::with_flag(
        flags,
        schema::FLAG_FILTHY_SPRITE_BUG_FIX,
        resolved.filthy_sprite_bug_fix,
    );
    root.set("flags", TagValue::Bitmask16(flags as u16))?;
    root.set("detail fade factor", TagValue::Fraction(resolved.mipmap_fade))?;
    root.set(
        "sharpen amount",
        TagValue::Fraction(resolved.sharpen.unwrap_or(0.0)),
    )?;
    root.set("bump height", TagValue::Fraction(resolved.bump_height))?;
    root.set(
        "sprite budget size",
        TagValue::Enum(budget_size_index(resolved.sprite_budget)),
    )?;
    root.set(
        "sprite budget count",
        TagValue::U16(resolved.sprite_budget_count as u16),
    )?;
    root.set("color plate width", TagValue::I16(width as i16))?;
    root.set("color plate height", TagValue::I16(height as i16))?;
    root.set(
        "compressed color plate data",
        TagValue::Data(match archival {
            Some(bytes) => bytes,
            None => compress_plate(pixels)?,
        }),
    )?;
    root.set("processed pixel data", TagValue::Data(blob))?;
    root.set(
        "blur filter size",
        TagValue::F32(resolved.blur.unwrap_or(0.0)),
    )?;
    root.set("alpha bias", TagValue::F32(resolved.alpha_bias))?;
    root.set(
        "mipmap count",
        TagValue::U16(if resolved.max_mipmap_count >= UNLIMITED_MIPMAPS {
            0
        } else {
            resolved.max_mipmap_count + 1
        }),
    )?;
    root.set("sprite usage", TagValue::Enum(resolved.sprite_usage))?;
    root.set("sprite spacing", TagValue::U16(resolved.sprite_spacing))?;
    root.set(
        "sequences",
        TagValue::Reflexive(assemble_sequences(&plate, resolved.bitmap_type)?),
    )?;
    root.set("bitmap data", TagValue::Reflexive(entries))?;

    Ok(TagFile::new(BITMAP_CLASS, TAG_ENGINE_VERSION, root))
}

fn encoding_family(format: PixelFormat) -> EncodingFormat {
    match format {
        PixelFormat::A8 | PixelFormat::Y8 | PixelFormat::Ay8 | PixelFormat::A8y8 => {
            EncodingFormat::Monochrome
        }
        PixelFormat::R5g6b5 | PixelFormat::A1r5g5b5 | PixelFormat::A4r4g4b4 => {
            EncodingFormat::SixteenBit
        }
        PixelFormat::X8r8g8b8 | PixelFormat::A8r8g8b8 | PixelFormat::P8Bump => {
            EncodingFormat::ThirtyTwoBit
        }
        PixelFormat::Dxt1 => EncodingFormat::Dxt1,
        PixelFormat::Dxt3 => EncodingFormat::Dxt3,
        PixelFormat::Dxt5 => EncodingFormat::Dxt5,
    }
}

fn budget_size_index(budget: u32) -> u16 {
    match budget {
        64 => 1,
        128 => 2,
        256 => 3,
        512 => 4,
        1024 => 5,
        _ => 0,
    }
}

fn bitmap_data_entry(
    bitmap: &plate::ScannedBitmap,
    format: PixelFormat,
    offset: usize,
    size: usize,
) -> Result<TagStruct> {
    let mut entry = TagStruct::new(&schema::BITMAP_DATA_SCHEMA);
    entry.set(
        "bitmap class",
        TagValue::U32(u32::from_be_bytes(BITMAP_CLASS.0)),
    )?;
    entry.set("width", TagValue::U16(bitmap.width as u16))?;
    entry.set("height", TagValue::U16(bitmap.height as u16))?;
    // Cube maps carry their face count in the depth slot.
    let depth = if bitmap.faces == 6 { 6 } else { bitmap.depth };
    entry.set("depth", TagValue::U16(depth as u16))?;
    entry.set(
        "type",
        TagValue::Enum(if bitmap.faces == 6 {
            2
        } else if bitmap.depth > 1 {
            1
        } else {
            0
        }),
    )?;
    entry.set("format", TagValue::Enum(format.to_wire()))?;
    let mut flags = 0u32;
    if bitmap.width.is_power_of_two()
        && bitmap.height.is_power_of_two()
        && bitmap.depth.is_power_of_two()
    {
        flags = endian::with_flag(flags, schema::DATA_FLAG_POWER_OF_TWO, true);
    }
    if format.is_block_compressed() {
        flags = endian::with_flag(flags, schema::DATA_FLAG_COMPRESSED, true);
    }
    if format == PixelFormat::P8Bump {
        flags = endian::with_flag(flags, schema::DATA_FLAG_PALETTIZED, true);
    }
    entry.set("flags", TagValue::Bitmask16(flags as u16))?;
    entry.set(
        "registration point",
        TagValue::Point2Int([
            bitmap.registration_point[0].round() as i16,
            bitmap.registration_point[1].round() as i16,
        ]),
    )?;
    entry.set("mipmap count", TagValue::U16(bitmap.mipmaps.len() as u16))?;
    entry.set("pixel data offset", TagValue::U32(offset as u32))?;
    entry.set("pixel data size", TagValue::U32(size as u32))?;
    entry.set("bitmap tag id", TagValue::U32(NULL_TAG_ID))?;
    Ok(entry)
}

fn assemble_sequences(plate: &ScannedPlate, bitmap_type: BitmapType) -> Result<Vec<TagStruct>> {
    let mut out = Vec::with_capacity(plate.sequences.len());
    for sequence in &plate.sequences {
        let mut s = TagStruct::new(&schema::SEQUENCE_SCHEMA);
        if bitmap_type == BitmapType::Sprites {
            s.set(
                "bitmap count",
                TagValue::I16(if sequence.sprites.len() == 1 { 1 } else { 0 }),
            )?;
            let first = sequence
                .sprites
                .iter()
                .map(|sp| sp.bitmap_index)
                .min()
                .unwrap_or(0);
            s.set("first bitmap index", TagValue::Index(first as u16))?;
        } else {
            s.set(
                "bitmap count",
                TagValue::I16(sequence.bitmap_indices.len() as i16),
            )?;
            s.set(
                "first bitmap index",
                TagValue::Index(sequence.bitmap_indices.first().copied().unwrap_or(0) as u16),
            )?;
        }
        let mut sprites = Vec::with_capacity(sequence.sprites.len());
        for sprite in &sequence.sprites {
            let sheet = &plate.bitmaps[sprite.bitmap_index];
            let (w, h) = (sheet.width as f32, sheet.height as f32);
            let mut entry = TagStruct::new(&schema::SPRITE_SCHEMA);
            entry.set("bitmap index", TagValue::Index(sprite.bitmap_index as u16))?;
            entry.set("left", TagValue::F32(sprite.left as f32 / w))?;
            entry.set("right", TagValue::F32(sprite.right as f32 / w))?;
            entry.set("top", TagValue::F32(sprite.top as f32 / h))?;
            entry.set("bottom", TagValue::F32(sprite.bottom as f32 / h))?;
            entry.set(
                "registration point",
                TagValue::Point2([sprite.registration_x / w, sprite.registration_y / h]),
            )?;
            sprites.push(entry);
        }
        s.set("sprites", TagValue::Reflexive(sprites))?;
        out.push(s);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BITMAP_SCHEMA;

    fn resolved_defaults() -> ResolvedOptions {
        resolve_options(&BuildOptions::default(), None).unwrap()
    }

    #[test]
    fn single_opaque_bitmap_builds_sixteen_bit() -> Result<()> {
        // A 64x64 opaque image with no plate markers.
        let pixels: Vec<Pixel> = (0..64 * 64)
            .map(|i| Pixel::rgb((i % 200) as u8, (i / 64) as u8, 77))
            .collect();
        let tag = build_tag_from_pixels(&resolved_defaults(), &pixels, 64, 64, None, 0)?;
        let root = &tag.root;

        let entries = root.reflexive("bitmap data")?;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.u16("format")?, PixelFormat::R5g6b5.to_wire());
        assert_eq!(entry.u16("mipmap count")?, 6);
        assert_eq!(entry.u16("width")?, 64);
        assert_eq!(
            root.u16("encoding format")?,
            EncodingFormat::SixteenBit.to_wire()
        );

        // The archival plate inflates to the exact input.
        let archived = decompress_plate(root.data("compressed color plate data")?)?;
        assert_eq!(archived, pixels);

        // Pixel ranges stay inside the blob; the mip chain is contiguous.
        let blob = root.data("processed pixel data")?;
        let offset = entry.u32("pixel data offset")? as usize;
        let size = entry.u32("pixel data size")? as usize;
        assert!(offset + size <= blob.len());
        let mut expected = 0usize;
        for level in 0..=6usize {
            let w = (64usize >> level).max(1);
            expected += PixelFormat::R5g6b5.level_byte_size(w, w, 1, 1);
        }
        assert_eq!(size, expected);

        // Round trip through the file layer.
        let bytes = write_tag_file(&tag)?;
        let reparsed = parse_tag_file(&bytes, &BITMAP_SCHEMA, Some(BITMAP_CLASS))?;
        assert_eq!(reparsed.root, tag.root);
        Ok(())
    }

    #[test]
    fn cube_plate_builds_one_entry_with_six_faces() -> Result<()> {
        let divider = Pixel::rgb(0, 255, 255);
        let background = Pixel::rgb(255, 0, 255);
        let edge = 32usize;
        let width = 6 * edge + 7;
        let height = 1 + edge;
        let mut buffer = PixelBuffer::new(width, height);
        for x in 0..width {
            buffer.put(x, 0, background);
        }
        buffer.put(0, 0, divider);
        for y in 1..height {
            for x in 0..width {
                buffer.put(x, y, background);
            }
        }
        for face in 0..6 {
            let x0 = 1 + face * (edge + 1);
            for y in 0..edge {
                for x in 0..edge {
                    buffer.put(x0 + x, 1 + y, Pixel::rgb(40 * face as u8, 10, 200));
                }
            }
        }

        let mut options = BuildOptions::default();
        options.bitmap_type = Some(BitmapType::CubeMaps);
        let resolved = resolve_options(&options, None)?;
        let tag =
            build_tag_from_pixels(&resolved, &buffer.pixels, width, height, None, 0)?;
        let entries = tag.root.reflexive("bitmap data")?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].u16("depth")?, 6);
        assert_eq!(entries[0].u16("type")?, 2);
        assert_eq!(entries[0].u16("width")?, edge as u16);

        let sequences = tag.root.reflexive("sequences")?;
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].i16("bitmap count")?, 1);
        Ok(())
    }

    #[test]
    fn sprite_plate_builds_one_sheet_with_normalized_entries() -> Result<()> {
        let divider = Pixel::rgb(0, 255, 255);
        let background = Pixel::rgb(255, 0, 255);
        // Three cells of known sizes on one strip.
        let sizes = [(24usize, 24usize), (16, 16), (8, 8)];
        let width = 1 + sizes.iter().map(|s| s.0 + 1).sum::<usize>();
        let height = 1 + 24;
        let mut buffer = PixelBuffer::new(width, height);
        for x in 0..width {
            buffer.put(x, 0, background);
        }
        buffer.put(0, 0, divider);
        for y in 1..height {
            for x in 0..width {
                buffer.put(x, y, background);
            }
        }
        let mut x0 = 1;
        for &(w, h) in &sizes {
            for y in 0..h {
                for x in 0..w {
                    buffer.put(x0 + x, 1 + y, Pixel::rgb(250, 250, 0));
                }
            }
            x0 += w + 1;
        }

        let mut options = BuildOptions::default();
        options.bitmap_type = Some(BitmapType::Sprites);
        options.sprite_budget = Some(128);
        let resolved = resolve_options(&options, None)?;
        let tag =
            build_tag_from_pixels(&resolved, &buffer.pixels, width, height, None, 0)?;

        let entries = tag.root.reflexive("bitmap data")?;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].u16("width")? <= 128);
        assert!(entries[0].u16("height")? <= 128);

        let sequences = tag.root.reflexive("sequences")?;
        assert_eq!(sequences.len(), 1);
        let sprites = sequences[0].reflexive("sprites")?;
        assert_eq!(sprites.len(), 3);
        assert_eq!(sequences[0].u16("first bitmap index")?, 0);
        for sprite in sprites {
            let left = sprite.f32("left")?;
            let right = sprite.f32("right")?;
            let top = sprite.f32("top")?;
            let bottom = sprite.f32("bottom")?;
            assert!(0.0 <= left && left < right && right <= 1.0);
            assert!(0.0 <= top && top < bottom && bottom <= 1.0);
        }
        // The three placement sizes survive normalization.
        let sheet_w = entries[0].u16("width")? as f32;
        let mut widths: Vec<i32> = sprites
            .iter()
            .map(|s| {
                ((s.f32("right").unwrap() - s.f32("left").unwrap()) * sheet_w).round() as i32
            })
            .collect();
        widths.sort_unstable();
        assert_eq!(widths, vec![8, 16, 24]);
        Ok(())
    }

    #[test]
    fn regenerate_reencodes_but_keeps_the_archive() -> Result<()> {
        let pixels: Vec<Pixel> = (0..64 * 64)
            .map(|i| Pixel::rgb((i % 199) as u8, (i % 31) as u8, 9))
            .collect();
        let first = build_tag_from_pixels(&resolved_defaults(), &pixels, 64, 64, None, 0)?;
        let archive = first.root.data("compressed color plate data")?.to_vec();

        // Rebuild from the archive with an explicit 32-bit request, the
        // way --regenerate does.
        let mut options = BuildOptions::default();
        options.format = Some(EncodingFormat::ThirtyTwoBit);
        options.auto_format = Some(false);
        options.regenerate = true;
        let resolved = resolve_options(&options, Some(&first.root))?;
        let restored = decompress_plate(&archive)?;
        let second = build_tag_from_pixels(
            &resolved,
            &restored,
            64,
            64,
            Some(archive.clone()),
            first.root.u16("flags")?,
        )?;

        assert_eq!(
            second.root.data("compressed color plate data")?,
            archive.as_slice()
        );
        let entry = &second.root.reflexive("bitmap data")?[0];
        assert_eq!(entry.u16("format")?, PixelFormat::X8r8g8b8.to_wire());
        let first_size = first.root.reflexive("bitmap data")?[0].u32("pixel data size")?;
        assert_eq!(entry.u32("pixel data size")?, first_size * 2);
        Ok(())
    }

    #[test]
    fn tag_backed_defaults_fill_unset_options() -> Result<()> {
        let pixels = vec![Pixel::rgb(9, 9, 9); 16];
        let mut options = BuildOptions::default();
        options.mipmap_fade = Some(0.5);
        options.usage = Some(BitmapUsage::DetailMap);
        options.format = Some(EncodingFormat::ThirtyTwoBit);
        options.auto_format = Some(false);
        let resolved = resolve_options(&options, None)?;
        let tag = build_tag_from_pixels(&resolved, &pixels, 4, 4, None, 0)?;

        let merged = resolve_options(&BuildOptions::default(), Some(&tag.root))?;
        assert_eq!(merged.mipmap_fade, 0.5);
        assert_eq!(merged.usage, BitmapUsage::DetailMap);
        assert!(!merged.auto_format);
        assert_eq!(merged.format, EncodingFormat::ThirtyTwoBit);
        Ok(())
    }
}
