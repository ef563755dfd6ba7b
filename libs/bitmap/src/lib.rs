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

// The bitmap pipeline: process a scanned color plate (mipmaps, filters,
// bump conversion, sprite sheets), encode pixels into an engine format,
// and assemble the result into a bitmap tag.

mod build;
mod encoder;
mod processor;
pub mod schema;

pub use crate::{
    build::{build_bitmap_tag, build_tag_from_pixels, BuildOptions, ResolvedOptions},
    encoder::{choose_format, encode_bitmap, level_dims, Dither, PixelFormat},
    processor::{process_plate, MipmapScaleType, ProcessorOptions, SpriteParameters},
};

use anyhow::{bail, Result};
use std::{fmt, str::FromStr};
use tag::TagClass;
use thiserror::Error;

pub const BITMAP_CLASS: TagClass = TagClass::new(b"bitm");

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("bitmap {index} is {width}x{height}; the sprite budget is {budget}x{budget}")]
    SpriteTooLarge {
        index: usize,
        width: usize,
        height: usize,
        budget: usize,
    },
    #[error("sprites need {needed} sheets; the budget allows {allowed}")]
    SpriteBudgetExhausted { needed: usize, allowed: usize },
    #[error("bitmap {index} is {width}x{height}; {format} needs at least 4x4")]
    TooSmallForBlockCompression {
        index: usize,
        width: usize,
        height: usize,
        format: &'static str,
    },
}

/// The tag-level encoding request; `auto` is represented by `None` at the
/// option layer and resolves per bitmap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EncodingFormat {
    Dxt1,
    Dxt3,
    Dxt5,
    SixteenBit,
    ThirtyTwoBit,
    Monochrome,
}

impl EncodingFormat {
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    pub fn from_wire(v: u16) -> Result<Self> {
        Ok(match v {
            0 => Self::Dxt1,
            1 => Self::Dxt3,
            2 => Self::Dxt5,
            3 => Self::SixteenBit,
            4 => Self::ThirtyTwoBit,
            5 => Self::Monochrome,
            _ => bail!("unknown encoding format {}", v),
        })
    }
}

impl FromStr for EncodingFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "dxt1" => Self::Dxt1,
            "dxt3" => Self::Dxt3,
            "dxt5" => Self::Dxt5,
            "16-bit" => Self::SixteenBit,
            "32-bit" => Self::ThirtyTwoBit,
            "monochrome" => Self::Monochrome,
            _ => bail!("unknown encoding format '{}'", s),
        })
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Dxt1 => "dxt1",
            Self::Dxt3 => "dxt3",
            Self::Dxt5 => "dxt5",
            Self::SixteenBit => "16-bit",
            Self::ThirtyTwoBit => "32-bit",
            Self::Monochrome => "monochrome",
        })
    }
}
