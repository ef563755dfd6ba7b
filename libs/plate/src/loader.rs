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
use crate::{Pixel, PixelBuffer};
use anyhow::{anyhow, bail, Context, Result};
use log::trace;
use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

/// Probe order when resolving a source image by logical path.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "tga", "bmp"];

/// Find the source image for a base path with no extension, trying each
/// supported extension in order.
pub fn probe_source_image(base: &Path) -> Option<PathBuf> {
    for extension in SUPPORTED_EXTENSIONS {
        let candidate = base.with_extension(extension);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Decode any supported image into the canonical BGRA buffer.
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| anyhow!("{} has no usable extension", path.display()))?;
    let buffer = match extension.as_str() {
        "tif" | "tiff" => load_tiff(path),
        "png" | "tga" | "bmp" => load_standard(path),
        _ => bail!("unsupported image format '.{}'", extension),
    }
    .with_context(|| format!("failed to decode {}", path.display()))?;
    trace!(
        "loaded {} ({}x{}, {} bytes)",
        path.display(),
        buffer.width,
        buffer.height,
        buffer.byte_len()
    );
    Ok(buffer)
}

fn load_standard(path: &Path) -> Result<PixelBuffer> {
    let decoded = image::open(path)?.into_rgba8();
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let mut out = PixelBuffer::new(width, height);
    for (i, rgba) in decoded.pixels().enumerate() {
        out.pixels[i] = Pixel::rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
    }
    Ok(out)
}

fn load_tiff(path: &Path) -> Result<PixelBuffer> {
    use tiff::{decoder::DecodingResult, ColorType};

    let mut decoder = tiff::decoder::Decoder::new(BufReader::new(File::open(path)?))?;
    let (width, height) = decoder.dimensions()?;
    let color_type = decoder.colortype()?;
    let samples = match decoder.read_image()? {
        DecodingResult::U8(samples) => samples,
        _ => bail!("only 8-bit TIFF sample depth is supported"),
    };

    let (width, height) = (width as usize, height as usize);
    let mut out = PixelBuffer::new(width, height);
    match color_type {
        ColorType::RGB(8) => {
            for (i, rgb) in samples.chunks_exact(3).enumerate() {
                out.pixels[i] = Pixel::rgb(rgb[0], rgb[1], rgb[2]);
            }
        }
        ColorType::RGBA(8) => {
            for (i, rgba) in samples.chunks_exact(4).enumerate() {
                out.pixels[i] = Pixel::rgba(rgba[0], rgba[1], rgba[2], rgba[3]);
            }
        }
        ColorType::Gray(8) => {
            for (i, &y) in samples.iter().enumerate() {
                out.pixels[i] = Pixel::rgb(y, y, y);
            }
        }
        other => bail!("unsupported TIFF color type {:?}", other),
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn png_decodes_to_bgra() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("plate-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("swatch.png");

        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 128]));
        img.save(&path)?;

        let buffer = load_image(&path)?;
        assert_eq!((buffer.width, buffer.height), (2, 1));
        assert_eq!(buffer.get(0, 0), Pixel::rgb(255, 0, 0));
        assert_eq!(buffer.get(1, 0), Pixel::rgba(0, 0, 255, 128));

        assert_eq!(probe_source_image(&dir.join("swatch")), Some(path));
        assert_eq!(probe_source_image(&dir.join("missing")), None);

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(load_image(Path::new("swatch.gif")).is_err());
        assert!(load_image(Path::new("swatch")).is_err());
    }
}
