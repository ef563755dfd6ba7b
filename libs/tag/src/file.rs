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

// Standalone tag files: 64 byte big-endian header, fixed root structure,
// then the payload region. Payload order is field order, depth first: a
// dependency's path bytes, a reflexive's element array followed by each
// element's own payload, a data field's raw bytes. Standalone files carry
// no live pointers; every pointer slot is written as zero.

use crate::{
    schema::{FieldKind, StructSchema},
    value::{Dependency, TagStruct, TagValue},
    TagClass, TagError,
};
use anyhow::{ensure, Result};
use std::str;

pub const HEADER_LEN: usize = 64;
const HEADER_VERSION: u16 = 1;
const SENTINEL: &[u8; 4] = b"blam";

#[derive(Debug)]
pub struct TagFile {
    pub class: TagClass,
    pub engine: u32,
    pub flags: u16,
    pub root: TagStruct,
    // Reserved header runs, preserved bit for bit on round trips.
    reserved0: [u8; 36],
    reserved1: [u8; 8],
    sentinel_prefix: [u8; 4],
}

impl TagFile {
    pub fn new(class: TagClass, engine: u32, root: TagStruct) -> Self {
        Self {
            class,
            engine,
            flags: 0,
            root,
            reserved0: [0; 36],
            reserved1: [0; 8],
            sentinel_prefix: [0; 4],
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, length: usize, container: &'static str) -> Result<&'a [u8]> {
        if self.pos.checked_add(length).map_or(true, |end| end > self.data.len()) {
            return Err(TagError::OutOfBounds {
                container,
                offset: self.pos,
                length,
                size: self.data.len(),
            }
            .into());
        }
        let out = &self.data[self.pos..self.pos + length];
        self.pos += length;
        Ok(out)
    }
}

fn get_f32_lanes<const N: usize>(image: &[u8]) -> Result<[f32; N]> {
    let mut out = [0f32; N];
    for (i, lane) in out.iter_mut().enumerate() {
        *lane = endian::get_f32(image, i * 4)?;
    }
    Ok(out)
}

fn put_f32_lanes(image: &mut [u8], lanes: &[f32]) -> Result<()> {
    for (i, lane) in lanes.iter().enumerate() {
        endian::put_f32(image, i * 4, *lane)?;
    }
    Ok(())
}

fn get_i16_lanes<const N: usize>(image: &[u8]) -> Result<[i16; N]> {
    let mut out = [0i16; N];
    for (i, lane) in out.iter_mut().enumerate() {
        *lane = endian::get_i16(image, i * 2)?;
    }
    Ok(out)
}

fn put_i16_lanes(image: &mut [u8], lanes: &[i16]) -> Result<()> {
    for (i, lane) in lanes.iter().enumerate() {
        endian::put_i16(image, i * 2, *lane)?;
    }
    Ok(())
}

fn read_array(
    r: &mut Reader,
    schema: &'static StructSchema,
    count: usize,
) -> Result<Vec<TagStruct>> {
    let size = schema.disk_size();
    let total = size
        .checked_mul(count)
        .ok_or(TagError::OutOfBounds {
            container: schema.name,
            offset: 0,
            length: usize::MAX,
            size: 0,
        })?;
    let fixed = r.take(total, schema.name)?;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(read_struct(r, schema, &fixed[i * size..(i + 1) * size])?);
    }
    Ok(out)
}

fn read_struct(
    r: &mut Reader,
    schema: &'static StructSchema,
    image: &[u8],
) -> Result<TagStruct> {
    let mut values = Vec::with_capacity(schema.fields.len());
    let mut offset = 0;
    for field in schema.fields {
        let width = field.kind.disk_size();
        let fixed = &image[offset..offset + width];
        offset += width;
        values.push(read_value(r, field.name, &field.kind, fixed)?);
    }
    Ok(TagStruct { schema, values })
}

fn read_value(
    r: &mut Reader,
    name: &'static str,
    kind: &FieldKind,
    fixed: &[u8],
) -> Result<TagValue> {
    Ok(match kind {
        FieldKind::I8 => TagValue::I8(fixed[0] as i8),
        FieldKind::U8 => TagValue::U8(fixed[0]),
        FieldKind::I16 => TagValue::I16(endian::get_i16(fixed, 0)?),
        FieldKind::U16 => TagValue::U16(endian::get_u16(fixed, 0)?),
        FieldKind::I32 => TagValue::I32(endian::get_i32(fixed, 0)?),
        FieldKind::U32 => TagValue::U32(endian::get_u32(fixed, 0)?),
        FieldKind::F32 => TagValue::F32(endian::get_f32(fixed, 0)?),
        FieldKind::Angle => TagValue::Angle(endian::get_f32(fixed, 0)?),
        FieldKind::Fraction => TagValue::Fraction(endian::get_f32(fixed, 0)?),
        FieldKind::Index => TagValue::Index(endian::get_u16(fixed, 0)?),
        FieldKind::Enum(domain) => {
            let raw = endian::get_u16(fixed, 0)?;
            ensure!(
                (raw as usize) < domain.values.len(),
                "enum value {} out of domain '{}' in field '{}'",
                raw,
                domain.name,
                name
            );
            TagValue::Enum(raw)
        }
        FieldKind::Bitmask16(_) => TagValue::Bitmask16(endian::get_u16(fixed, 0)?),
        FieldKind::Bitmask32(_) => TagValue::Bitmask32(endian::get_u32(fixed, 0)?),
        FieldKind::String32 => TagValue::String32(endian::read_string32(fixed)?),
        FieldKind::ColorArgbF => TagValue::ColorArgbF(get_f32_lanes(fixed)?),
        FieldKind::ColorRgbF => TagValue::ColorRgbF(get_f32_lanes(fixed)?),
        FieldKind::ColorArgbInt => TagValue::ColorArgbInt(endian::get_u32(fixed, 0)?),
        FieldKind::Point2 => TagValue::Point2(get_f32_lanes(fixed)?),
        FieldKind::Point2Int => TagValue::Point2Int(get_i16_lanes(fixed)?),
        FieldKind::Point3 => TagValue::Point3(get_f32_lanes(fixed)?),
        FieldKind::Vector2 => TagValue::Vector2(get_f32_lanes(fixed)?),
        FieldKind::Vector3 => TagValue::Vector3(get_f32_lanes(fixed)?),
        FieldKind::Euler2 => TagValue::Euler2(get_f32_lanes(fixed)?),
        FieldKind::Euler3 => TagValue::Euler3(get_f32_lanes(fixed)?),
        FieldKind::Plane2 => TagValue::Plane2(get_f32_lanes(fixed)?),
        FieldKind::Plane3 => TagValue::Plane3(get_f32_lanes(fixed)?),
        FieldKind::Quaternion => TagValue::Quaternion(get_f32_lanes(fixed)?),
        FieldKind::Matrix3 => TagValue::Matrix3(get_f32_lanes(fixed)?),
        FieldKind::Rect => TagValue::Rect(get_i16_lanes(fixed)?),
        FieldKind::BoundsF32 => TagValue::BoundsF32(get_f32_lanes(fixed)?),
        FieldKind::Pad(_) => TagValue::Pad(fixed.to_vec()),
        FieldKind::Dependency(allowed) => {
            let class = TagClass([fixed[0], fixed[1], fixed[2], fixed[3]]);
            let path_size = endian::get_u32(fixed, 8)? as usize;
            let id = endian::get_u32(fixed, 12)?;
            let path = if path_size > 0 {
                let raw = r.take(path_size + 1, "dependency path")?;
                ensure!(
                    raw[path_size] == 0,
                    "dependency path in field '{}' is not terminated",
                    name
                );
                str::from_utf8(&raw[..path_size])?.to_owned()
            } else {
                String::new()
            };
            if !path.is_empty() && !allowed.is_empty() {
                ensure!(
                    allowed.contains(&class),
                    "dependency field '{}' does not allow class '{}'",
                    name,
                    class
                );
            }
            TagValue::Dependency(Dependency { class, path, id })
        }
        FieldKind::Reflexive(element) => {
            let count = endian::get_u32(fixed, 0)? as usize;
            TagValue::Reflexive(read_array(r, element, count)?)
        }
        FieldKind::Data => {
            let size = endian::get_u32(fixed, 0)? as usize;
            TagValue::Data(r.take(size, "data block")?.to_vec())
        }
    })
}

fn encode_fixed(image: &mut [u8], s: &TagStruct) -> Result<()> {
    ensure!(
        s.values.len() == s.schema.fields.len(),
        "{}: value count does not match schema",
        s.schema.name
    );
    let mut offset = 0;
    for (field, value) in s.schema.fields.iter().zip(&s.values) {
        ensure!(
            value.matches_kind(&field.kind),
            "{}: field '{}' holds the wrong value kind",
            s.schema.name,
            field.name
        );
        let width = field.kind.disk_size();
        let fixed = &mut image[offset..offset + width];
        offset += width;
        match value {
            TagValue::I8(v) => fixed[0] = *v as u8,
            TagValue::U8(v) => fixed[0] = *v,
            TagValue::I16(v) => endian::put_i16(fixed, 0, *v)?,
            TagValue::U16(v) | TagValue::Enum(v) | TagValue::Bitmask16(v) | TagValue::Index(v) => {
                endian::put_u16(fixed, 0, *v)?
            }
            TagValue::I32(v) => endian::put_i32(fixed, 0, *v)?,
            TagValue::U32(v) | TagValue::Bitmask32(v) | TagValue::ColorArgbInt(v) => {
                endian::put_u32(fixed, 0, *v)?
            }
            TagValue::F32(v) | TagValue::Angle(v) | TagValue::Fraction(v) => {
                endian::put_f32(fixed, 0, *v)?
            }
            TagValue::String32(v) => fixed.copy_from_slice(&endian::write_string32(v)?),
            TagValue::ColorArgbF(v) | TagValue::Plane3(v) | TagValue::Quaternion(v) => {
                put_f32_lanes(fixed, v)?
            }
            TagValue::ColorRgbF(v)
            | TagValue::Point3(v)
            | TagValue::Vector3(v)
            | TagValue::Euler3(v)
            | TagValue::Plane2(v) => put_f32_lanes(fixed, v)?,
            TagValue::Point2(v)
            | TagValue::Vector2(v)
            | TagValue::Euler2(v)
            | TagValue::BoundsF32(v) => put_f32_lanes(fixed, v)?,
            TagValue::Matrix3(v) => put_f32_lanes(fixed, v)?,
            TagValue::Point2Int(v) => put_i16_lanes(fixed, v)?,
            TagValue::Rect(v) => put_i16_lanes(fixed, v)?,
            TagValue::Pad(v) => {
                ensure!(
                    v.len() == width,
                    "{}: padding field '{}' holds {} bytes; expected {}",
                    s.schema.name,
                    field.name,
                    v.len(),
                    width
                );
                fixed.copy_from_slice(v);
            }
            TagValue::Dependency(dep) => {
                fixed[0..4].copy_from_slice(&dep.class.0);
                endian::put_u32(fixed, 4, 0)?;
                endian::put_u32(fixed, 8, dep.path.len() as u32)?;
                endian::put_u32(fixed, 12, dep.id)?;
            }
            TagValue::Reflexive(elems) => {
                endian::put_u32(fixed, 0, elems.len() as u32)?;
                // pointer and reserved word stay zero
            }
            TagValue::Data(bytes) => {
                endian::put_u32(fixed, 0, bytes.len() as u32)?;
                // external, file offset, pointer, reserved stay zero
            }
        }
    }
    Ok(())
}

fn write_payload(out: &mut Vec<u8>, s: &TagStruct) -> Result<()> {
    for (field, value) in s.schema.fields.iter().zip(&s.values) {
        match (value, &field.kind) {
            (TagValue::Dependency(dep), _) => {
                if !dep.path.is_empty() {
                    out.extend_from_slice(dep.path.as_bytes());
                    out.push(0);
                }
            }
            (TagValue::Reflexive(elems), FieldKind::Reflexive(element)) => {
                for e in elems {
                    ensure!(
                        std::ptr::eq(e.schema, *element),
                        "reflexive '{}' holds a {} element; expected {}",
                        field.name,
                        e.schema.name,
                        element.name
                    );
                }
                write_array(out, element, elems)?;
            }
            (TagValue::Data(bytes), _) => out.extend_from_slice(bytes),
            _ => {}
        }
    }
    Ok(())
}

fn write_array(
    out: &mut Vec<u8>,
    schema: &'static StructSchema,
    elems: &[TagStruct],
) -> Result<()> {
    let size = schema.disk_size();
    let base = out.len();
    out.resize(base + size * elems.len(), 0);
    for (i, e) in elems.iter().enumerate() {
        let mut image = vec![0u8; size];
        encode_fixed(&mut image, e)?;
        out[base + i * size..base + (i + 1) * size].copy_from_slice(&image);
    }
    for e in elems {
        write_payload(out, e)?;
    }
    Ok(())
}

/// Parse a standalone tag file against `schema`, validating the header.
/// Pass `expect_class` to reject tags of another class.
pub fn parse_tag_file(
    data: &[u8],
    schema: &'static StructSchema,
    expect_class: Option<TagClass>,
) -> Result<TagFile> {
    if data.len() < HEADER_LEN {
        return Err(TagError::BadHeader("file shorter than the tag header").into());
    }
    if &data[60..64] != SENTINEL {
        return Err(TagError::BadHeader("footer sentinel missing").into());
    }
    if endian::get_u16(data, 44)? != HEADER_VERSION {
        return Err(TagError::BadHeader("unsupported header version").into());
    }
    let class = TagClass([data[36], data[37], data[38], data[39]]);
    if let Some(expected) = expect_class {
        if class != expected {
            return Err(TagError::WrongClass {
                expected,
                found: class,
            }
            .into());
        }
    }

    let mut r = Reader {
        data,
        pos: HEADER_LEN,
    };
    let root = read_array(&mut r, schema, 1)?
        .pop()
        .expect("read_array returned one element");
    ensure!(
        r.pos == data.len(),
        "{} trailing bytes after tag payload",
        data.len() - r.pos
    );

    let mut reserved0 = [0u8; 36];
    reserved0.copy_from_slice(&data[0..36]);
    let mut reserved1 = [0u8; 8];
    reserved1.copy_from_slice(&data[48..56]);
    let mut sentinel_prefix = [0u8; 4];
    sentinel_prefix.copy_from_slice(&data[56..60]);

    Ok(TagFile {
        class,
        engine: endian::get_u32(data, 40)?,
        flags: endian::get_u16(data, 46)?,
        root,
        reserved0,
        reserved1,
        sentinel_prefix,
    })
}

/// Emit a standalone tag file. `parse_tag_file(write_tag_file(t))` yields
/// `t` again, byte for byte.
pub fn write_tag_file(tag: &TagFile) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + tag.root.schema.disk_size());
    out.extend_from_slice(&tag.reserved0);
    out.extend_from_slice(&tag.class.0);
    out.resize(HEADER_LEN, 0);
    endian::put_u32(&mut out, 40, tag.engine)?;
    endian::put_u16(&mut out, 44, HEADER_VERSION)?;
    endian::put_u16(&mut out, 46, tag.flags)?;
    out[48..56].copy_from_slice(&tag.reserved1);
    out[56..60].copy_from_slice(&tag.sentinel_prefix);
    out[60..64].copy_from_slice(SENTINEL);
    write_array(&mut out, tag.root.schema, std::slice::from_ref(&tag.root))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::{EnumDomain, Field},
        NULL_TAG_ID,
    };

    static TEST_ENUM: EnumDomain = EnumDomain {
        name: "widget kind",
        values: &["container", "button", "spinner"],
    };

    static CHILD_SCHEMA: StructSchema = StructSchema {
        name: "child widget",
        fields: &[
            Field {
                name: "label",
                kind: FieldKind::String32,
            },
            Field {
                name: "weight",
                kind: FieldKind::F32,
            },
            Field {
                name: "grandchildren",
                kind: FieldKind::Reflexive(&LEAF_SCHEMA),
            },
        ],
    };

    static LEAF_SCHEMA: StructSchema = StructSchema {
        name: "leaf",
        fields: &[
            Field {
                name: "value",
                kind: FieldKind::I16,
            },
            Field {
                name: "",
                kind: FieldKind::Pad(2),
            },
        ],
    };

    static ROOT_SCHEMA: StructSchema = StructSchema {
        name: "widget",
        fields: &[
            Field {
                name: "kind",
                kind: FieldKind::Enum(&TEST_ENUM),
            },
            Field {
                name: "flags",
                kind: FieldKind::Bitmask16(&crate::schema::BitmaskDomain {
                    name: "widget flags",
                    flags: &["visible", "focusable"],
                }),
            },
            Field {
                name: "origin",
                kind: FieldKind::Point2,
            },
            Field {
                name: "turn",
                kind: FieldKind::Angle,
            },
            Field {
                name: "",
                kind: FieldKind::Pad(4),
            },
            Field {
                name: "art",
                kind: FieldKind::Dependency(&[TagClass::new(b"bitm")]),
            },
            Field {
                name: "children",
                kind: FieldKind::Reflexive(&CHILD_SCHEMA),
            },
            Field {
                name: "raw",
                kind: FieldKind::Data,
            },
        ],
    };

    fn sample_tag() -> Result<TagFile> {
        let mut leaf = TagStruct::new(&LEAF_SCHEMA);
        leaf.set("value", TagValue::I16(-7))?;

        let mut child = TagStruct::new(&CHILD_SCHEMA);
        child.set("label", TagValue::String32("inner".to_owned()))?;
        child.set("weight", TagValue::F32(0.25))?;
        child.set("grandchildren", TagValue::Reflexive(vec![leaf.clone(), leaf]))?;

        let mut root = TagStruct::new(&ROOT_SCHEMA);
        root.set("kind", TagValue::Enum(1))?;
        root.set("flags", TagValue::Bitmask16(0b01))?;
        root.set("origin", TagValue::Point2([4., 8.]))?;
        root.set("turn", TagValue::Angle(std::f32::consts::FRAC_PI_2))?;
        root.set(
            "art",
            TagValue::Dependency(Dependency {
                class: TagClass::new(b"bitm"),
                path: "ui\\shell\\cursor".to_owned(),
                id: NULL_TAG_ID,
            }),
        )?;
        root.set(
            "children",
            TagValue::Reflexive(vec![TagStruct::new(&CHILD_SCHEMA), {
                let mut c = TagStruct::new(&CHILD_SCHEMA);
                c.set("label", TagValue::String32("second".to_owned()))?;
                c
            }]),
        )?;
        root.set("raw", TagValue::Data(vec![1, 2, 3, 4, 5]))?;

        Ok(TagFile::new(TagClass::new(b"wgit"), 1, root))
    }

    #[test]
    fn round_trip_is_byte_exact() -> Result<()> {
        let tag = sample_tag()?;
        let bytes = write_tag_file(&tag)?;
        let reparsed = parse_tag_file(&bytes, &ROOT_SCHEMA, Some(TagClass::new(b"wgit")))?;
        assert_eq!(reparsed.root, tag.root);
        assert_eq!(reparsed.class, tag.class);
        assert_eq!(write_tag_file(&reparsed)?, bytes);
        Ok(())
    }

    #[test]
    fn reserved_header_bytes_survive() -> Result<()> {
        let tag = sample_tag()?;
        let mut bytes = write_tag_file(&tag)?;
        bytes[3] = 0xA5;
        bytes[50] = 0x5A;
        let reparsed = parse_tag_file(&bytes, &ROOT_SCHEMA, None)?;
        assert_eq!(write_tag_file(&reparsed)?, bytes);
        Ok(())
    }

    #[test]
    fn truncated_payload_fails_closed() -> Result<()> {
        let tag = sample_tag()?;
        let bytes = write_tag_file(&tag)?;
        let short = &bytes[..bytes.len() - 3];
        let err = parse_tag_file(short, &ROOT_SCHEMA, None).unwrap_err();
        assert!(err.downcast_ref::<TagError>().is_some() || err.to_string().contains("trailing"));
        Ok(())
    }

    #[test]
    fn absurd_reflexive_count_fails_closed() -> Result<()> {
        let tag = sample_tag()?;
        let mut bytes = write_tag_file(&tag)?;
        // The children reflexive count lives in the root fixed image.
        let children_offset = HEADER_LEN + 2 + 2 + 8 + 4 + 4 + 16;
        endian::put_u32(&mut bytes, children_offset, 0x00FF_FFFF)?;
        let err = parse_tag_file(&bytes, &ROOT_SCHEMA, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TagError>(),
            Some(TagError::OutOfBounds { .. })
        ));
        Ok(())
    }

    #[test]
    fn class_and_sentinel_are_validated() -> Result<()> {
        let tag = sample_tag()?;
        let mut bytes = write_tag_file(&tag)?;

        let err = parse_tag_file(&bytes, &ROOT_SCHEMA, Some(TagClass::new(b"senv"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TagError>(),
            Some(TagError::WrongClass { .. })
        ));

        bytes[63] = b'!';
        assert!(parse_tag_file(&bytes, &ROOT_SCHEMA, None).is_err());
        Ok(())
    }

    #[test]
    fn unknown_enum_values_are_rejected() -> Result<()> {
        let tag = sample_tag()?;
        let mut bytes = write_tag_file(&tag)?;
        endian::put_u16(&mut bytes, HEADER_LEN, 9)?;
        assert!(parse_tag_file(&bytes, &ROOT_SCHEMA, None).is_err());
        Ok(())
    }
}
