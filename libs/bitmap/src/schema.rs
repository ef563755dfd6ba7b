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

//! On-disk description of the bitmap tag class.

use tag::{BitmaskDomain, EnumDomain, Field, FieldKind, StructSchema};

pub static TYPE_DOMAIN: EnumDomain = EnumDomain {
    name: "bitmap type",
    values: &[
        "2d textures",
        "3d textures",
        "cube maps",
        "interface bitmaps",
        "sprites",
    ],
};

pub static FORMAT_DOMAIN: EnumDomain = EnumDomain {
    name: "encoding format",
    values: &["dxt1", "dxt3", "dxt5", "16-bit", "32-bit", "monochrome"],
};

pub static USAGE_DOMAIN: EnumDomain = EnumDomain {
    name: "bitmap usage",
    values: &[
        "alpha blend",
        "default",
        "height map",
        "detail map",
        "light map",
        "vector map",
    ],
};

pub static FLAGS_DOMAIN: BitmaskDomain = BitmaskDomain {
    name: "bitmap flags",
    flags: &[
        "enable diffusion dithering",
        "disable height map compression",
        "uniform sprite sequences",
        "filthy sprite bug fix",
    ],
};

pub const FLAG_DISABLE_HEIGHT_MAP_COMPRESSION: u32 = 1;
pub const FLAG_FILTHY_SPRITE_BUG_FIX: u32 = 3;

pub static SPRITE_BUDGET_DOMAIN: EnumDomain = EnumDomain {
    name: "sprite budget size",
    values: &["32x32", "64x64", "128x128", "256x256", "512x512", "1024x1024"],
};

pub static SPRITE_USAGE_DOMAIN: EnumDomain = EnumDomain {
    name: "sprite usage",
    values: &[
        "blend add subtract max",
        "multiply min",
        "double multiply",
    ],
};

pub static DATA_TYPE_DOMAIN: EnumDomain = EnumDomain {
    name: "bitmap data type",
    values: &["2d texture", "3d texture", "cube map", "white"],
};

pub static DATA_FORMAT_DOMAIN: EnumDomain = EnumDomain {
    name: "bitmap data format",
    values: &[
        "a8",
        "y8",
        "ay8",
        "a8y8",
        "unused1",
        "unused2",
        "r5g6b5",
        "unused3",
        "a1r5g5b5",
        "a4r4g4b4",
        "x8r8g8b8",
        "a8r8g8b8",
        "unused4",
        "unused5",
        "dxt1",
        "dxt3",
        "dxt5",
        "p8 bump",
    ],
};

pub static DATA_FLAGS_DOMAIN: BitmaskDomain = BitmaskDomain {
    name: "bitmap data flags",
    flags: &[
        "power of two dimensions",
        "compressed",
        "palettized",
        "swizzled",
        "linear",
    ],
};

pub const DATA_FLAG_POWER_OF_TWO: u32 = 0;
pub const DATA_FLAG_COMPRESSED: u32 = 1;
pub const DATA_FLAG_PALETTIZED: u32 = 2;

pub static SPRITE_SCHEMA: StructSchema = StructSchema {
    name: "bitmap group sprite",
    fields: &[
        Field {
            name: "bitmap index",
            kind: FieldKind::Index,
        },
        Field {
            name: "",
            kind: FieldKind::Pad(6),
        },
        Field {
            name: "left",
            kind: FieldKind::F32,
        },
        Field {
            name: "right",
            kind: FieldKind::F32,
        },
        Field {
            name: "top",
            kind: FieldKind::F32,
        },
        Field {
            name: "bottom",
            kind: FieldKind::F32,
        },
        Field {
            name: "registration point",
            kind: FieldKind::Point2,
        },
    ],
};

pub static SEQUENCE_SCHEMA: StructSchema = StructSchema {
    name: "bitmap group sequence",
    fields: &[
        Field {
            name: "name",
            kind: FieldKind::String32,
        },
        Field {
            name: "first bitmap index",
            kind: FieldKind::Index,
        },
        Field {
            name: "bitmap count",
            kind: FieldKind::I16,
        },
        Field {
            name: "",
            kind: FieldKind::Pad(16),
        },
        Field {
            name: "sprites",
            kind: FieldKind::Reflexive(&SPRITE_SCHEMA),
        },
    ],
};

pub static BITMAP_DATA_SCHEMA: StructSchema = StructSchema {
    name: "bitmap data",
    fields: &[
        Field {
            name: "bitmap class",
            kind: FieldKind::U32,
        },
        Field {
            name: "width",
            kind: FieldKind::U16,
        },
        Field {
            name: "height",
            kind: FieldKind::U16,
        },
        Field {
            name: "depth",
            kind: FieldKind::U16,
        },
        Field {
            name: "type",
            kind: FieldKind::Enum(&DATA_TYPE_DOMAIN),
        },
        Field {
            name: "format",
            kind: FieldKind::Enum(&DATA_FORMAT_DOMAIN),
        },
        Field {
            name: "flags",
            kind: FieldKind::Bitmask16(&DATA_FLAGS_DOMAIN),
        },
        Field {
            name: "registration point",
            kind: FieldKind::Point2Int,
        },
        Field {
            name: "mipmap count",
            kind: FieldKind::U16,
        },
        Field {
            name: "",
            kind: FieldKind::Pad(2),
        },
        Field {
            name: "pixel data offset",
            kind: FieldKind::U32,
        },
        Field {
            name: "pixel data size",
            kind: FieldKind::U32,
        },
        Field {
            name: "bitmap tag id",
            kind: FieldKind::U32,
        },
        Field {
            name: "pointer",
            kind: FieldKind::U32,
        },
        Field {
            name: "hardware format",
            kind: FieldKind::U32,
        },
        Field {
            name: "base address",
            kind: FieldKind::U32,
        },
    ],
};

pub static BITMAP_SCHEMA: StructSchema = StructSchema {
    name: "bitmap",
    fields: &[
        Field {
            name: "type",
            kind: FieldKind::Enum(&TYPE_DOMAIN),
        },
        Field {
            name: "encoding format",
            kind: FieldKind::Enum(&FORMAT_DOMAIN),
        },
        Field {
            name: "usage",
            kind: FieldKind::Enum(&USAGE_DOMAIN),
        },
        Field {
            name: "flags",
            kind: FieldKind::Bitmask16(&FLAGS_DOMAIN),
        },
        Field {
            name: "detail fade factor",
            kind: FieldKind::Fraction,
        },
        Field {
            name: "sharpen amount",
            kind: FieldKind::Fraction,
        },
        Field {
            name: "bump height",
            kind: FieldKind::Fraction,
        },
        Field {
            name: "sprite budget size",
            kind: FieldKind::Enum(&SPRITE_BUDGET_DOMAIN),
        },
        Field {
            name: "sprite budget count",
            kind: FieldKind::U16,
        },
        Field {
            name: "color plate width",
            kind: FieldKind::I16,
        },
        Field {
            name: "color plate height",
            kind: FieldKind::I16,
        },
        Field {
            name: "compressed color plate data",
            kind: FieldKind::Data,
        },
        Field {
            name: "processed pixel data",
            kind: FieldKind::Data,
        },
        Field {
            name: "blur filter size",
            kind: FieldKind::F32,
        },
        Field {
            name: "alpha bias",
            kind: FieldKind::F32,
        },
        Field {
            name: "mipmap count",
            kind: FieldKind::U16,
        },
        Field {
            name: "sprite usage",
            kind: FieldKind::Enum(&SPRITE_USAGE_DOMAIN),
        },
        Field {
            name: "sprite spacing",
            kind: FieldKind::U16,
        },
        Field {
            name: "",
            kind: FieldKind::Pad(2),
        },
        Field {
            name: "sequences",
            kind: FieldKind::Reflexive(&SEQUENCE_SCHEMA),
        },
        Field {
            name: "bitmap data",
            kind: FieldKind::Reflexive(&BITMAP_DATA_SCHEMA),
        },
    ],
};
