//! Second-generation container: a fixed 51-byte header, the embedded
//! first-generation archive verbatim, then the path index section.
//!
//! Header layout, all integers little-endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0  | 11 | pragma (a version-2 header with no roots) |
//! | 11 | 16 | characteristics bitfield, all zero |
//! | 27 | 8  | dataOffset |
//! | 35 | 8  | dataSize |
//! | 43 | 8  | indexOffset (= dataOffset + dataSize) |

use std::io::{self, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::car::{CarError, CarHeader};
use crate::index::{self, IndexError, INDEX_CODEC};
use crate::wire::{self, ByteCursor, DecodeError};

/// The pragma is itself a valid first-generation header carrying version 2
/// and no roots.
pub const PRAGMA: [u8; 11] = [
    0x0a, // frame length 10
    0xa1, // map(1)
    0x67, // string(7)
    b'v', b'e', b'r', b's', b'i', b'o', b'n', // "version"
    0x02, // uint(2)
];

pub const HEADER_SIZE: usize = 51;

/// Extra bytes pulled alongside the header so a first-generation file fed
/// here still decodes far enough to report its version.
const HEADER_SLACK: usize = 59;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Car(#[from] CarError),
    #[error("unsupported container version {0}")]
    WrongContainerVersion(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub characteristics: u128,
    pub data_offset: u64,
    pub data_size: u64,
    pub index_offset: u64,
}

impl ContainerHeader {
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&PRAGMA)?;
        w.write_u128::<BigEndian>(self.characteristics)?;
        w.write_u64::<LittleEndian>(self.data_offset)?;
        w.write_u64::<LittleEndian>(self.data_size)?;
        w.write_u64::<LittleEndian>(self.index_offset)?;
        Ok(())
    }

    /// Reads and validates the container header. Consumes a little more
    /// than [`HEADER_SIZE`] bytes from `r`; callers seek to the offsets
    /// they need afterwards.
    pub fn read<R: Read>(r: &mut R) -> Result<Self, ContainerError> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + HEADER_SLACK);
        r.take((HEADER_SIZE + HEADER_SLACK) as u64)
            .read_to_end(&mut buf)?;

        let mut cur = ByteCursor::new(&buf);
        let pragma = wire::read_length_prefixed(&mut cur)?;
        let version = CarHeader::decode_bytes(pragma)?.version;
        if version != 2 {
            return Err(ContainerError::WrongContainerVersion(version));
        }

        let fixed_len = HEADER_SIZE
            .checked_sub(cur.pos())
            .ok_or(DecodeError::MalformedFrame)?;
        let mut fixed = cur.exactly(fixed_len)?;
        let characteristics = fixed.read_u128::<BigEndian>()?;
        let data_offset = fixed.read_u64::<LittleEndian>()?;
        let data_size = fixed.read_u64::<LittleEndian>()?;
        let index_offset = fixed.read_u64::<LittleEndian>()?;

        Ok(Self {
            characteristics,
            data_offset,
            data_size,
            index_offset,
        })
    }
}

/// Wraps a canonical archive into a container: header, payload verbatim,
/// index codec tag, then the records from the tree walk.
pub fn write_container<W: Write>(payload: &[u8], w: &mut W) -> Result<(), IndexError> {
    let records = index::build(payload)?;

    let header = ContainerHeader {
        characteristics: 0,
        data_offset: HEADER_SIZE as u64,
        data_size: payload.len() as u64,
        index_offset: (HEADER_SIZE + payload.len()) as u64,
    };
    header.write(w)?;
    w.write_all(payload)?;

    wire::write_varint(w, INDEX_CODEC)?;
    for record in &records {
        record.write_to(w)?;
    }
    Ok(())
}

/// [`write_container`] into a fresh buffer.
pub fn to_container(payload: &[u8]) -> Result<Vec<u8>, IndexError> {
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    write_container(payload, &mut out)?;
    Ok(out)
}
