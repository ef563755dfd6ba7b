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

// Built cache files, as the engine memory-maps them: a 2048 byte
// little-endian header, then tag data, model data and BSP regions. The
// CRC covers, in order, every BSP range, the model range and the tag
// data range; the tag data opens with a secondary header whose random
// number word doubles as the CRC spoof slot.

use anyhow::{anyhow, ensure, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use memmap::MmapOptions;
use std::{fs::File, ops::Range, path::Path};
use thiserror::Error;

pub const HEADER_LEN: usize = 2048;
const HEAD_MAGIC: &[u8; 4] = b"head";
const FOOT_MAGIC: &[u8; 4] = b"foot";

// Header field offsets.
const OFFSET_ENGINE: usize = 0x04;
const OFFSET_DECOMPRESSED_SIZE: usize = 0x08;
const OFFSET_TAG_DATA_OFFSET: usize = 0x10;
const OFFSET_TAG_DATA_SIZE: usize = 0x14;
const OFFSET_MODEL_DATA_OFFSET: usize = 0x18;
const OFFSET_MODEL_DATA_SIZE: usize = 0x1C;
const OFFSET_SCENARIO_NAME: usize = 0x20;
const OFFSET_BUILD_STRING: usize = 0x40;
const OFFSET_MAP_TYPE: usize = 0x60;
const OFFSET_CRC32: usize = 0x64;
const OFFSET_CEA_FLAGS: usize = 0x68;
const OFFSET_CEA_TIMESTAMP: usize = 0x6C;
const FLAG_CLASSIC_ONLY: u32 = 0;

// Tag-data secondary header offsets, relative to the tag-data start.
const OFFSET_SCENARIO_TAG_ID: usize = 0x00;
const OFFSET_RANDOM_NUMBER: usize = 0x04;
const OFFSET_TAG_ARRAY_POINTER: usize = 0x08;
const OFFSET_TAG_COUNT: usize = 0x0C;
pub const TAG_DATA_HEADER_LEN: usize = 0x10;

const TAG_ENTRY_LEN: usize = 16;
const BSP_ENTRY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not a cache file: {0}")]
    BadHeader(&'static str),
    #[error("unsupported engine version {0}")]
    UnknownEngine(u32),
    #[error("{what} range {start}..{end} escapes the cache of {size} bytes")]
    OutOfBounds {
        what: &'static str,
        start: usize,
        end: usize,
        size: usize,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CacheEngine {
    Xbox,
    Retail,
    CustomEdition,
    Anniversary,
}

impl CacheEngine {
    pub fn from_wire(v: u32) -> Result<Self> {
        Ok(match v {
            5 => Self::Xbox,
            7 => Self::Retail,
            609 => Self::CustomEdition,
            13 => Self::Anniversary,
            other => return Err(CacheError::UnknownEngine(other).into()),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Xbox => "xbox",
            Self::Retail => "retail",
            Self::CustomEdition => "custom edition",
            Self::Anniversary => "anniversary",
        }
    }

    /// The CRC procedure is undefined for Xbox and Anniversary caches.
    pub fn supports_crc(self) -> bool {
        !matches!(self, Self::Xbox | Self::Anniversary)
    }
}

#[derive(Clone, Debug)]
pub struct CacheHeader {
    pub engine: CacheEngine,
    pub decompressed_size: u32,
    pub tag_data_offset: u32,
    pub tag_data_size: u32,
    pub model_data_offset: u32,
    pub model_data_size: u32,
    pub scenario_name: String,
    pub build_string: String,
    pub map_type: u16,
    pub crc32: u32,
    /// Anniversary only.
    pub classic_only: bool,
    pub timestamp: String,
}

pub struct CacheFile {
    data: Vec<u8>,
    pub header: CacheHeader,
    pub was_compressed: bool,
}

fn parse_header(data: &[u8]) -> Result<CacheHeader> {
    if data.len() < HEADER_LEN {
        return Err(CacheError::BadHeader("shorter than the header").into());
    }
    if &data[0..4] != HEAD_MAGIC {
        return Err(CacheError::BadHeader("head magic missing").into());
    }
    if &data[HEADER_LEN - 4..HEADER_LEN] != FOOT_MAGIC {
        return Err(CacheError::BadHeader("foot magic missing").into());
    }
    let engine = CacheEngine::from_wire(LittleEndian::read_u32(&data[OFFSET_ENGINE..]))?;
    let cea = engine == CacheEngine::Anniversary;
    Ok(CacheHeader {
        engine,
        decompressed_size: LittleEndian::read_u32(&data[OFFSET_DECOMPRESSED_SIZE..]),
        tag_data_offset: LittleEndian::read_u32(&data[OFFSET_TAG_DATA_OFFSET..]),
        tag_data_size: LittleEndian::read_u32(&data[OFFSET_TAG_DATA_SIZE..]),
        model_data_offset: LittleEndian::read_u32(&data[OFFSET_MODEL_DATA_OFFSET..]),
        model_data_size: LittleEndian::read_u32(&data[OFFSET_MODEL_DATA_SIZE..]),
        scenario_name: endian::read_string32(
            &data[OFFSET_SCENARIO_NAME..OFFSET_SCENARIO_NAME + 32],
        )?,
        build_string: endian::read_string32(&data[OFFSET_BUILD_STRING..OFFSET_BUILD_STRING + 32])?,
        map_type: LittleEndian::read_u16(&data[OFFSET_MAP_TYPE..]),
        crc32: LittleEndian::read_u32(&data[OFFSET_CRC32..]),
        classic_only: cea
            && endian::flag(LittleEndian::read_u32(&data[OFFSET_CEA_FLAGS..]), FLAG_CLASSIC_ONLY),
        timestamp: if cea {
            endian::read_string32(&data[OFFSET_CEA_TIMESTAMP..OFFSET_CEA_TIMESTAMP + 32])?
        } else {
            String::new()
        },
    })
}

impl CacheFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let fp = File::open(path)
            .map_err(|e| anyhow!("cannot open cache {}: {}", path.display(), e))?;
        let map = unsafe { MmapOptions::new().map(&fp)? };
        Self::from_bytes(map.to_vec())
    }

    /// Parse a cache, inflating the body first when the header promises
    /// more bytes than the file holds and a zlib stream follows it.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = parse_header(&data)?;
        let decompressed = header.decompressed_size as usize;
        let compressed = decompressed > data.len()
            && data.len() > HEADER_LEN
            && data[HEADER_LEN] == 0x78;
        let data = if compressed {
            use std::io::Read;
            trace!(
                "inflating cache body: {} -> {} bytes",
                data.len(),
                decompressed
            );
            let mut body = Vec::with_capacity(decompressed.saturating_sub(HEADER_LEN));
            flate2::read::ZlibDecoder::new(&data[HEADER_LEN..]).read_to_end(&mut body)?;
            let mut whole = data[..HEADER_LEN].to_vec();
            whole.append(&mut body);
            ensure!(
                whole.len() == decompressed,
                "cache inflated to {} bytes; the header promised {}",
                whole.len(),
                decompressed
            );
            whole
        } else {
            data
        };
        Ok(Self {
            header,
            data,
            was_compressed: compressed,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    fn checked_range(&self, what: &'static str, start: usize, len: usize) -> Result<Range<usize>> {
        let end = start
            .checked_add(len)
            .ok_or(CacheError::OutOfBounds {
                what,
                start,
                end: usize::MAX,
                size: self.data.len(),
            })?;
        if start >= self.data.len() || end > self.data.len() {
            return Err(CacheError::OutOfBounds {
                what,
                start,
                end,
                size: self.data.len(),
            }
            .into());
        }
        Ok(start..end)
    }

    pub fn tag_data_range(&self) -> Result<Range<usize>> {
        self.checked_range(
            "tag data",
            self.header.tag_data_offset as usize,
            self.header.tag_data_size as usize,
        )
    }

    pub fn model_data_range(&self) -> Result<Range<usize>> {
        self.checked_range(
            "model data",
            self.header.model_data_offset as usize,
            self.header.model_data_size as usize,
        )
    }

    fn tag_data(&self) -> Result<&[u8]> {
        Ok(&self.data[self.tag_data_range()?])
    }

    fn tag_data_u32(&self, offset: usize) -> Result<u32> {
        let tag_data = self.tag_data()?;
        ensure!(
            offset + 4 <= tag_data.len(),
            CacheError::OutOfBounds {
                what: "tag data word",
                start: offset,
                end: offset + 4,
                size: tag_data.len(),
            }
        );
        Ok(LittleEndian::read_u32(&tag_data[offset..]))
    }

    pub fn scenario_tag_id(&self) -> Result<u32> {
        self.tag_data_u32(OFFSET_SCENARIO_TAG_ID)
    }

    pub fn random_number(&self) -> Result<u32> {
        self.tag_data_u32(OFFSET_RANDOM_NUMBER)
    }

    pub fn tag_count(&self) -> Result<u32> {
        self.tag_data_u32(OFFSET_TAG_COUNT)
    }

    /// Absolute file offset of the 4-byte random number slot.
    pub fn random_number_offset(&self) -> Result<usize> {
        Ok(self.tag_data_range()?.start + OFFSET_RANDOM_NUMBER)
    }

    /// Tag-data offset of the scenario tag's root structure.
    fn scenario_data_offset(&self) -> Result<usize> {
        let scenario_id = self.scenario_tag_id()?;
        let array = self.tag_data_u32(OFFSET_TAG_ARRAY_POINTER)? as usize;
        let count = self.tag_count()? as usize;
        let tag_data = self.tag_data()?;
        for i in 0..count {
            let entry = array + i * TAG_ENTRY_LEN;
            ensure!(
                entry + TAG_ENTRY_LEN <= tag_data.len(),
                CacheError::OutOfBounds {
                    what: "tag array",
                    start: entry,
                    end: entry + TAG_ENTRY_LEN,
                    size: tag_data.len(),
                }
            );
            if LittleEndian::read_u32(&tag_data[entry + 4..]) == scenario_id {
                return Ok(LittleEndian::read_u32(&tag_data[entry + 12..]) as usize);
            }
        }
        Err(anyhow!("scenario tag {:#010X} not in the tag array", scenario_id))
    }

    /// BSP file ranges, in `structure_bsps` reflexive order.
    pub fn bsp_ranges(&self) -> Result<Vec<Range<usize>>> {
        let scenario = self.scenario_data_offset()?;
        let count = self.tag_data_u32(scenario)? as usize;
        let pointer = self.tag_data_u32(scenario + 4)? as usize;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let entry = pointer + i * BSP_ENTRY_LEN;
            let start = self.tag_data_u32(entry)? as usize;
            let size = self.tag_data_u32(entry + 4)? as usize;
            out.push(self.checked_range("bsp", start, size)?);
        }
        Ok(out)
    }

    /// The CRC'd ranges in CRC order: BSPs, model data, tag data.
    pub fn crc_ranges(&self) -> Result<Vec<Range<usize>>> {
        let mut ranges = self.bsp_ranges()?;
        ranges.push(self.model_data_range()?);
        ranges.push(self.tag_data_range()?);
        Ok(ranges)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct CrcVerdict {
    pub crc: u32,
    /// None when the engine defines no CRC.
    pub clean: Option<bool>,
}

/// Compute the cache CRC. Engines without a defined CRC yield 0.
pub fn cache_crc(cache: &CacheFile) -> Result<u32> {
    if !cache.header.engine.supports_crc() {
        return Ok(0);
    }
    let mut value = 0u32;
    for range in cache.crc_ranges()? {
        value = crc::crc32(value, &cache.data()[range]);
    }
    Ok(value)
}

/// Compute the CRC and compare against the header-stored value.
pub fn verify_cache(cache: &CacheFile) -> Result<CrcVerdict> {
    if !cache.header.engine.supports_crc() {
        return Ok(CrcVerdict {
            crc: 0,
            clean: None,
        });
    }
    let crc = cache_crc(cache)?;
    Ok(CrcVerdict {
        crc,
        clean: Some(crc == cache.header.crc32),
    })
}

#[derive(Debug, Copy, Clone)]
pub struct SpoofOutcome {
    pub crc: u32,
    pub random_number: u32,
}

/// Force the cache CRC to `desired` by rewriting the random number word
/// in the tag-data header. The mutation happens in memory; the caller
/// persists `cache.data()` when satisfied.
pub fn spoof_cache_crc(
    cache: &mut CacheFile,
    desired: u32,
    print_progress: bool,
) -> Result<SpoofOutcome> {
    ensure!(
        cache.header.engine.supports_crc(),
        "the {} engine defines no cache CRC to spoof",
        cache.header.engine.name()
    );
    let ranges = cache.crc_ranges()?;

    // Concatenate the CRC'd ranges and locate the random number inside
    // the scratch buffer.
    let mut scratch = Vec::with_capacity(ranges.iter().map(|r| r.len()).sum());
    let random_absolute = cache.random_number_offset()?;
    let mut random_in_scratch = None;
    for range in &ranges {
        if range.contains(&random_absolute) {
            random_in_scratch = Some(scratch.len() + (random_absolute - range.start));
        }
        scratch.extend_from_slice(&cache.data[range.clone()]);
    }
    let slot =
        random_in_scratch.ok_or_else(|| anyhow!("random number lies outside the CRC'd ranges"))?;

    crc::crc_spoof_modify(&mut scratch, slot, desired, print_progress)?;
    let forged = LittleEndian::read_u32(&scratch[slot..]);

    let patch = cache.random_number_offset()?;
    cache.data[patch..patch + 4].copy_from_slice(&scratch[slot..slot + 4]);

    let crc = cache_crc(cache)?;
    ensure!(
        crc == desired,
        "spoof produced {:#010X}; wanted {:#010X}",
        crc,
        desired
    );
    Ok(SpoofOutcome {
        crc,
        random_number: forged,
    })
}
