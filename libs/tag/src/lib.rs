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

// The tag model: schemas describe structures, TagStruct trees hold parsed
// instances, and file.rs moves both through the big-endian tag file format.

mod file;
mod handle;
mod schema;
mod value;

pub use crate::{
    file::{parse_tag_file, write_tag_file, TagFile, HEADER_LEN},
    handle::{NumberFormat, Scalar, ValueHandle},
    schema::{BitmaskDomain, EnumDomain, Field, FieldKind, StructSchema},
    value::{Dependency, TagStruct, TagValue},
};

use std::fmt;
use thiserror::Error;

/// A tag id that has not been resolved into a cache.
pub const NULL_TAG_ID: u32 = 0xFFFF_FFFF;

/// A null 16-bit index.
pub const NULL_INDEX: u16 = 0xFFFF;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("{length} bytes at offset {offset} escape {container} of {size} bytes")]
    OutOfBounds {
        container: &'static str,
        offset: usize,
        length: usize,
        size: usize,
    },
    #[error("bad tag header: {0}")]
    BadHeader(&'static str),
    #[error("tag class is '{found}'; expected '{expected}'")]
    WrongClass { expected: TagClass, found: TagClass },
}

/// Four-CC identifying a tag class.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TagClass(pub [u8; 4]);

impl TagClass {
    pub const fn new(fourcc: &[u8; 4]) -> Self {
        Self(*fourcc)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let b = extension.as_bytes();
        if b.len() == 4 && b.iter().all(|c| c.is_ascii_lowercase()) {
            Some(Self([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }

    pub fn extension(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TagClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02X}", b)?;
            }
        }
        Ok(())
    }
}
