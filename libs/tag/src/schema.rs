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
use crate::TagClass;

/// Named values of an enum field, in wire order.
pub struct EnumDomain {
    pub name: &'static str,
    pub values: &'static [&'static str],
}

/// Named bits of a bitmask field; index is the bit number.
pub struct BitmaskDomain {
    pub name: &'static str,
    pub flags: &'static [&'static str],
}

pub enum FieldKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    /// Stored in radians; displayed in degrees.
    Angle,
    /// A float conventionally in 0..1.
    Fraction,
    /// Nullable 16-bit index; null is 0xFFFF.
    Index,
    Enum(&'static EnumDomain),
    Bitmask16(&'static BitmaskDomain),
    Bitmask32(&'static BitmaskDomain),
    String32,
    ColorArgbF,
    ColorRgbF,
    ColorArgbInt,
    Point2,
    Point2Int,
    Point3,
    Vector2,
    Vector3,
    Euler2,
    Euler3,
    Plane2,
    Plane3,
    Quaternion,
    Matrix3,
    /// top, left, bottom, right as i16.
    Rect,
    BoundsF32,
    /// Reserved bytes, preserved verbatim across round trips.
    Pad(usize),
    /// Cross-tag reference; the slice limits the target classes (empty
    /// means unrestricted).
    Dependency(&'static [TagClass]),
    Reflexive(&'static StructSchema),
    Data,
}

impl FieldKind {
    /// Size of the fixed (in-struct) image of this field.
    pub fn disk_size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::Index | Self::Enum(_) | Self::Bitmask16(_) => 2,
            Self::I32 | Self::U32 | Self::Bitmask32(_) => 4,
            Self::F32 | Self::Angle | Self::Fraction => 4,
            Self::String32 => 32,
            Self::ColorArgbF => 16,
            Self::ColorRgbF => 12,
            Self::ColorArgbInt => 4,
            Self::Point2 | Self::Vector2 | Self::Euler2 => 8,
            Self::Point2Int => 4,
            Self::Point3 | Self::Vector3 | Self::Euler3 => 12,
            Self::Plane2 => 12,
            Self::Plane3 | Self::Quaternion => 16,
            Self::Matrix3 => 36,
            Self::Rect => 8,
            Self::BoundsF32 => 8,
            Self::Pad(n) => *n,
            // class + path pointer + path size + tag id
            Self::Dependency(_) => 16,
            // count + pointer + reserved
            Self::Reflexive(_) => 12,
            // size + external + file offset + pointer + reserved
            Self::Data => 20,
        }
    }
}

pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

pub struct StructSchema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl StructSchema {
    /// Size of the fixed struct image on disk, excluding all payload.
    pub fn disk_size(&self) -> usize {
        self.fields.iter().map(|f| f.kind.disk_size()).sum()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
