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

// Value handles are the sole access path editors, dumpers and comparators
// use to walk tag contents: a flat list of (name, kind, lanes) views over
// one structure, with numeric get/set per lane.

use crate::{
    schema::{Field, FieldKind, StructSchema},
    value::{TagStruct, TagValue},
};
use anyhow::{bail, ensure, Result};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Int(v) => *v,
            Self::Float(v) => *v as i64,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NumberFormat {
    Int,
    Float,
    /// Not a numeric value (strings, containers, padding).
    None,
}

pub struct ValueHandle<'a> {
    field: &'static Field,
    value: &'a TagValue,
}

impl<'a> ValueHandle<'a> {
    pub fn name(&self) -> &'static str {
        self.field.name
    }

    pub fn kind(&self) -> &'static FieldKind {
        &self.field.kind
    }

    /// Number of numeric lanes addressable through get/set.
    pub fn count(&self) -> usize {
        lane_count(self.value)
    }

    pub fn number_format(&self) -> NumberFormat {
        number_format(self.value)
    }

    /// Multiplier applied for display; radians-stored angles show degrees.
    pub fn display_multiplier(&self) -> f64 {
        match self.value {
            TagValue::Angle(_) => 180.0 / std::f64::consts::PI,
            _ => 1.0,
        }
    }

    pub fn get(&self, lane: usize) -> Result<Scalar> {
        get_lane(self.value, lane)
    }

    pub fn child_schema(&self) -> Option<&'static StructSchema> {
        match self.field.kind {
            FieldKind::Reflexive(schema) => Some(schema),
            _ => None,
        }
    }

    /// Element count for reflexives; 0 for everything else.
    pub fn element_count(&self) -> usize {
        match self.value {
            TagValue::Reflexive(elems) => elems.len(),
            _ => 0,
        }
    }

    /// Reflexive elements, for walking into sub-structures.
    pub fn elements(&self) -> &'a [TagStruct] {
        match self.value {
            TagValue::Reflexive(elems) => elems,
            _ => &[],
        }
    }
}

pub struct ValueHandleMut<'a> {
    field: &'static Field,
    value: &'a mut TagValue,
}

impl<'a> ValueHandleMut<'a> {
    pub fn name(&self) -> &'static str {
        self.field.name
    }

    pub fn get(&self, lane: usize) -> Result<Scalar> {
        get_lane(self.value, lane)
    }

    pub fn set(&mut self, lane: usize, v: Scalar) -> Result<()> {
        set_lane(self.value, lane, v)
    }
}

impl TagStruct {
    /// Flattened handles over this structure's fields, in schema order.
    pub fn handles(&self) -> Vec<ValueHandle> {
        self.schema
            .fields
            .iter()
            .zip(&self.values)
            .map(|(field, value)| ValueHandle { field, value })
            .collect()
    }

    pub fn handles_mut(&mut self) -> Vec<ValueHandleMut> {
        self.schema
            .fields
            .iter()
            .zip(self.values.iter_mut())
            .map(|(field, value)| ValueHandleMut { field, value })
            .collect()
    }
}

fn lane_count(value: &TagValue) -> usize {
    match value {
        TagValue::I8(_)
        | TagValue::U8(_)
        | TagValue::I16(_)
        | TagValue::U16(_)
        | TagValue::I32(_)
        | TagValue::U32(_)
        | TagValue::F32(_)
        | TagValue::Angle(_)
        | TagValue::Fraction(_)
        | TagValue::Index(_)
        | TagValue::Enum(_)
        | TagValue::Bitmask16(_)
        | TagValue::Bitmask32(_) => 1,
        TagValue::ColorArgbInt(_) => 4,
        TagValue::ColorArgbF(_) | TagValue::Plane3(_) | TagValue::Quaternion(_) => 4,
        TagValue::ColorRgbF(_)
        | TagValue::Point3(_)
        | TagValue::Vector3(_)
        | TagValue::Euler3(_)
        | TagValue::Plane2(_) => 3,
        TagValue::Point2(_)
        | TagValue::Vector2(_)
        | TagValue::Euler2(_)
        | TagValue::BoundsF32(_) => 2,
        TagValue::Point2Int(_) => 2,
        TagValue::Matrix3(_) => 9,
        TagValue::Rect(_) => 4,
        TagValue::String32(_)
        | TagValue::Pad(_)
        | TagValue::Dependency(_)
        | TagValue::Reflexive(_)
        | TagValue::Data(_) => 0,
    }
}

fn number_format(value: &TagValue) -> NumberFormat {
    match value {
        TagValue::F32(_)
        | TagValue::Angle(_)
        | TagValue::Fraction(_)
        | TagValue::ColorArgbF(_)
        | TagValue::ColorRgbF(_)
        | TagValue::Point2(_)
        | TagValue::Point3(_)
        | TagValue::Vector2(_)
        | TagValue::Vector3(_)
        | TagValue::Euler2(_)
        | TagValue::Euler3(_)
        | TagValue::Plane2(_)
        | TagValue::Plane3(_)
        | TagValue::Quaternion(_)
        | TagValue::Matrix3(_)
        | TagValue::BoundsF32(_) => NumberFormat::Float,
        TagValue::String32(_)
        | TagValue::Pad(_)
        | TagValue::Dependency(_)
        | TagValue::Reflexive(_)
        | TagValue::Data(_) => NumberFormat::None,
        _ => NumberFormat::Int,
    }
}

fn get_lane(value: &TagValue, lane: usize) -> Result<Scalar> {
    ensure!(
        lane < lane_count(value),
        "lane {} out of range for {:?}",
        lane,
        value
    );
    Ok(match value {
        TagValue::I8(v) => Scalar::Int(*v as i64),
        TagValue::U8(v) => Scalar::Int(*v as i64),
        TagValue::I16(v) => Scalar::Int(*v as i64),
        TagValue::U16(v) | TagValue::Enum(v) | TagValue::Bitmask16(v) | TagValue::Index(v) => {
            Scalar::Int(*v as i64)
        }
        TagValue::I32(v) => Scalar::Int(*v as i64),
        TagValue::U32(v) | TagValue::Bitmask32(v) => Scalar::Int(*v as i64),
        TagValue::F32(v) | TagValue::Angle(v) | TagValue::Fraction(v) => Scalar::Float(*v as f64),
        // a, r, g, b from the high byte down
        TagValue::ColorArgbInt(v) => Scalar::Int(((*v >> (8 * (3 - lane))) & 0xFF) as i64),
        TagValue::ColorArgbF(v) | TagValue::Plane3(v) | TagValue::Quaternion(v) => {
            Scalar::Float(v[lane] as f64)
        }
        TagValue::ColorRgbF(v)
        | TagValue::Point3(v)
        | TagValue::Vector3(v)
        | TagValue::Euler3(v)
        | TagValue::Plane2(v) => Scalar::Float(v[lane] as f64),
        TagValue::Point2(v)
        | TagValue::Vector2(v)
        | TagValue::Euler2(v)
        | TagValue::BoundsF32(v) => Scalar::Float(v[lane] as f64),
        TagValue::Point2Int(v) => Scalar::Int(v[lane] as i64),
        TagValue::Matrix3(v) => Scalar::Float(v[lane] as f64),
        TagValue::Rect(v) => Scalar::Int(v[lane] as i64),
        _ => bail!("value {:?} has no numeric lanes", value),
    })
}

fn set_lane(value: &mut TagValue, lane: usize, v: Scalar) -> Result<()> {
    ensure!(
        lane < lane_count(value),
        "lane {} out of range for {:?}",
        lane,
        value
    );
    match value {
        TagValue::I8(slot) => *slot = v.as_i64() as i8,
        TagValue::U8(slot) => *slot = v.as_i64() as u8,
        TagValue::I16(slot) => *slot = v.as_i64() as i16,
        TagValue::U16(slot)
        | TagValue::Enum(slot)
        | TagValue::Bitmask16(slot)
        | TagValue::Index(slot) => *slot = v.as_i64() as u16,
        TagValue::I32(slot) => *slot = v.as_i64() as i32,
        TagValue::U32(slot) | TagValue::Bitmask32(slot) => *slot = v.as_i64() as u32,
        TagValue::F32(slot) | TagValue::Angle(slot) | TagValue::Fraction(slot) => {
            *slot = v.as_f64() as f32
        }
        TagValue::ColorArgbInt(slot) => {
            let shift = 8 * (3 - lane as u32);
            *slot = (*slot & !(0xFF << shift)) | (((v.as_i64() as u32) & 0xFF) << shift);
        }
        TagValue::ColorArgbF(arr) | TagValue::Plane3(arr) | TagValue::Quaternion(arr) => {
            arr[lane] = v.as_f64() as f32
        }
        TagValue::ColorRgbF(arr)
        | TagValue::Point3(arr)
        | TagValue::Vector3(arr)
        | TagValue::Euler3(arr)
        | TagValue::Plane2(arr) => arr[lane] = v.as_f64() as f32,
        TagValue::Point2(arr)
        | TagValue::Vector2(arr)
        | TagValue::Euler2(arr)
        | TagValue::BoundsF32(arr) => arr[lane] = v.as_f64() as f32,
        TagValue::Point2Int(arr) => arr[lane] = v.as_i64() as i16,
        TagValue::Matrix3(arr) => arr[lane] = v.as_f64() as f32,
        TagValue::Rect(arr) => arr[lane] = v.as_i64() as i16,
        _ => bail!("value {:?} has no numeric lanes", value),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, StructSchema};

    static HANDLE_SCHEMA: StructSchema = StructSchema {
        name: "handle test",
        fields: &[
            Field {
                name: "pitch",
                kind: FieldKind::Angle,
            },
            Field {
                name: "tint",
                kind: FieldKind::ColorArgbInt,
            },
            Field {
                name: "bounds",
                kind: FieldKind::Rect,
            },
        ],
    };

    #[test]
    fn angles_carry_a_degree_multiplier() -> Result<()> {
        let mut s = TagStruct::new(&HANDLE_SCHEMA);
        s.set("pitch", TagValue::Angle(std::f32::consts::PI))?;
        let handles = s.handles();
        let pitch = &handles[0];
        assert_eq!(pitch.number_format(), NumberFormat::Float);
        assert_eq!(pitch.count(), 1);
        let shown = pitch.get(0)?.as_f64() * pitch.display_multiplier();
        assert!((shown - 180.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn int_color_lanes_address_bytes() -> Result<()> {
        let mut s = TagStruct::new(&HANDLE_SCHEMA);
        s.set("tint", TagValue::ColorArgbInt(0x80FF_4020))?;
        {
            let handles = s.handles();
            let tint = &handles[1];
            assert_eq!(tint.count(), 4);
            assert_eq!(tint.get(0)?, Scalar::Int(0x80));
            assert_eq!(tint.get(1)?, Scalar::Int(0xFF));
            assert_eq!(tint.get(3)?, Scalar::Int(0x20));
        }
        let mut handles = s.handles_mut();
        handles[1].set(2, Scalar::Int(0x11))?;
        drop(handles);
        assert_eq!(s.u32("tint")?, 0x80FF_1120);
        Ok(())
    }

    #[test]
    fn lane_bounds_are_enforced() -> Result<()> {
        let s = TagStruct::new(&HANDLE_SCHEMA);
        let handles = s.handles();
        assert!(handles[2].get(4).is_err());
        assert!(handles[0].get(1).is_err());
        Ok(())
    }
}
