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
use crate::{
    schema::{FieldKind, StructSchema},
    TagClass, NULL_INDEX, NULL_TAG_ID,
};
use anyhow::{anyhow, bail, ensure, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub class: TagClass,
    pub path: String,
    /// Resolved only inside compiled caches; NULL_TAG_ID in tag files.
    pub id: u32,
}

impl Dependency {
    pub fn null(class: TagClass) -> Self {
        Self {
            class,
            path: String::new(),
            id: NULL_TAG_ID,
        }
    }

    pub fn is_null(&self) -> bool {
        self.path.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    Angle(f32),
    Fraction(f32),
    Index(u16),
    Enum(u16),
    Bitmask16(u16),
    Bitmask32(u32),
    String32(String),
    ColorArgbF([f32; 4]),
    ColorRgbF([f32; 3]),
    ColorArgbInt(u32),
    Point2([f32; 2]),
    Point2Int([i16; 2]),
    Point3([f32; 3]),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Euler2([f32; 2]),
    Euler3([f32; 3]),
    Plane2([f32; 3]),
    Plane3([f32; 4]),
    Quaternion([f32; 4]),
    Matrix3([f32; 9]),
    Rect([i16; 4]),
    BoundsF32([f32; 2]),
    Pad(Vec<u8>),
    Dependency(Dependency),
    Reflexive(Vec<TagStruct>),
    Data(Vec<u8>),
}

impl TagValue {
    pub fn default_for(kind: &FieldKind) -> Self {
        match kind {
            FieldKind::I8 => Self::I8(0),
            FieldKind::U8 => Self::U8(0),
            FieldKind::I16 => Self::I16(0),
            FieldKind::U16 => Self::U16(0),
            FieldKind::I32 => Self::I32(0),
            FieldKind::U32 => Self::U32(0),
            FieldKind::F32 => Self::F32(0.),
            FieldKind::Angle => Self::Angle(0.),
            FieldKind::Fraction => Self::Fraction(0.),
            FieldKind::Index => Self::Index(NULL_INDEX),
            FieldKind::Enum(_) => Self::Enum(0),
            FieldKind::Bitmask16(_) => Self::Bitmask16(0),
            FieldKind::Bitmask32(_) => Self::Bitmask32(0),
            FieldKind::String32 => Self::String32(String::new()),
            FieldKind::ColorArgbF => Self::ColorArgbF([0.; 4]),
            FieldKind::ColorRgbF => Self::ColorRgbF([0.; 3]),
            FieldKind::ColorArgbInt => Self::ColorArgbInt(0),
            FieldKind::Point2 => Self::Point2([0.; 2]),
            FieldKind::Point2Int => Self::Point2Int([0; 2]),
            FieldKind::Point3 => Self::Point3([0.; 3]),
            FieldKind::Vector2 => Self::Vector2([0.; 2]),
            FieldKind::Vector3 => Self::Vector3([0.; 3]),
            FieldKind::Euler2 => Self::Euler2([0.; 2]),
            FieldKind::Euler3 => Self::Euler3([0.; 3]),
            FieldKind::Plane2 => Self::Plane2([0.; 3]),
            FieldKind::Plane3 => Self::Plane3([0.; 4]),
            FieldKind::Quaternion => Self::Quaternion([0.; 4]),
            FieldKind::Matrix3 => Self::Matrix3([0.; 9]),
            FieldKind::Rect => Self::Rect([0; 4]),
            FieldKind::BoundsF32 => Self::BoundsF32([0.; 2]),
            FieldKind::Pad(n) => Self::Pad(vec![0; *n]),
            FieldKind::Dependency(allowed) => Self::Dependency(Dependency::null(
                allowed.first().copied().unwrap_or(TagClass::new(b"none")),
            )),
            FieldKind::Reflexive(_) => Self::Reflexive(Vec::new()),
            FieldKind::Data => Self::Data(Vec::new()),
        }
    }

    pub fn matches_kind(&self, kind: &FieldKind) -> bool {
        matches!(
            (self, kind),
            (Self::I8(_), FieldKind::I8)
                | (Self::U8(_), FieldKind::U8)
                | (Self::I16(_), FieldKind::I16)
                | (Self::U16(_), FieldKind::U16)
                | (Self::I32(_), FieldKind::I32)
                | (Self::U32(_), FieldKind::U32)
                | (Self::F32(_), FieldKind::F32)
                | (Self::Angle(_), FieldKind::Angle)
                | (Self::Fraction(_), FieldKind::Fraction)
                | (Self::Index(_), FieldKind::Index)
                | (Self::Enum(_), FieldKind::Enum(_))
                | (Self::Bitmask16(_), FieldKind::Bitmask16(_))
                | (Self::Bitmask32(_), FieldKind::Bitmask32(_))
                | (Self::String32(_), FieldKind::String32)
                | (Self::ColorArgbF(_), FieldKind::ColorArgbF)
                | (Self::ColorRgbF(_), FieldKind::ColorRgbF)
                | (Self::ColorArgbInt(_), FieldKind::ColorArgbInt)
                | (Self::Point2(_), FieldKind::Point2)
                | (Self::Point2Int(_), FieldKind::Point2Int)
                | (Self::Point3(_), FieldKind::Point3)
                | (Self::Vector2(_), FieldKind::Vector2)
                | (Self::Vector3(_), FieldKind::Vector3)
                | (Self::Euler2(_), FieldKind::Euler2)
                | (Self::Euler3(_), FieldKind::Euler3)
                | (Self::Plane2(_), FieldKind::Plane2)
                | (Self::Plane3(_), FieldKind::Plane3)
                | (Self::Quaternion(_), FieldKind::Quaternion)
                | (Self::Matrix3(_), FieldKind::Matrix3)
                | (Self::Rect(_), FieldKind::Rect)
                | (Self::BoundsF32(_), FieldKind::BoundsF32)
                | (Self::Pad(_), FieldKind::Pad(_))
                | (Self::Dependency(_), FieldKind::Dependency(_))
                | (Self::Reflexive(_), FieldKind::Reflexive(_))
                | (Self::Data(_), FieldKind::Data)
        )
    }
}

/// One parsed structure: a value per schema field, in schema order.
#[derive(Clone)]
pub struct TagStruct {
    pub schema: &'static StructSchema,
    pub values: Vec<TagValue>,
}

impl PartialEq for TagStruct {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema) && self.values == other.values
    }
}

impl std::fmt::Debug for TagStruct {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct(self.schema.name)
            .field("values", &self.values)
            .finish()
    }
}

impl TagStruct {
    pub fn new(schema: &'static StructSchema) -> Self {
        let values = schema
            .fields
            .iter()
            .map(|f| TagValue::default_for(&f.kind))
            .collect();
        Self { schema, values }
    }

    pub fn value(&self, name: &str) -> Result<&TagValue> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| anyhow!("no field '{}' in {}", name, self.schema.name))?;
        Ok(&self.values[index])
    }

    pub fn value_mut(&mut self, name: &str) -> Result<&mut TagValue> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| anyhow!("no field '{}' in {}", name, self.schema.name))?;
        Ok(&mut self.values[index])
    }

    pub fn set(&mut self, name: &str, value: TagValue) -> Result<()> {
        let index = self
            .schema
            .field_index(name)
            .ok_or_else(|| anyhow!("no field '{}' in {}", name, self.schema.name))?;
        ensure!(
            value.matches_kind(&self.schema.fields[index].kind),
            "value kind mismatch for field '{}' in {}",
            name,
            self.schema.name
        );
        self.values[index] = value;
        Ok(())
    }

    pub fn u16(&self, name: &str) -> Result<u16> {
        match self.value(name)? {
            TagValue::U16(v) | TagValue::Enum(v) | TagValue::Bitmask16(v) | TagValue::Index(v) => {
                Ok(*v)
            }
            v => bail!("field '{}' is not u16-like: {:?}", name, v),
        }
    }

    pub fn i16(&self, name: &str) -> Result<i16> {
        match self.value(name)? {
            TagValue::I16(v) => Ok(*v),
            v => bail!("field '{}' is not i16: {:?}", name, v),
        }
    }

    pub fn u32(&self, name: &str) -> Result<u32> {
        match self.value(name)? {
            TagValue::U32(v) | TagValue::ColorArgbInt(v) | TagValue::Bitmask32(v) => Ok(*v),
            v => bail!("field '{}' is not u32-like: {:?}", name, v),
        }
    }

    pub fn f32(&self, name: &str) -> Result<f32> {
        match self.value(name)? {
            TagValue::F32(v) | TagValue::Angle(v) | TagValue::Fraction(v) => Ok(*v),
            v => bail!("field '{}' is not float-like: {:?}", name, v),
        }
    }

    pub fn data(&self, name: &str) -> Result<&[u8]> {
        match self.value(name)? {
            TagValue::Data(v) => Ok(v),
            v => bail!("field '{}' is not data: {:?}", name, v),
        }
    }

    pub fn reflexive(&self, name: &str) -> Result<&[TagStruct]> {
        match self.value(name)? {
            TagValue::Reflexive(v) => Ok(v),
            v => bail!("field '{}' is not a reflexive: {:?}", name, v),
        }
    }

    pub fn reflexive_mut(&mut self, name: &str) -> Result<&mut Vec<TagStruct>> {
        match self.value_mut(name)? {
            TagValue::Reflexive(v) => Ok(v),
            v => bail!("field '{}' is not a reflexive: {:?}", name, v),
        }
    }
}
