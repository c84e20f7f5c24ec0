//! First-generation archive codec: a varint-framed DAG-CBOR header naming
//! the roots, followed by varint-framed `CID ‖ payload` blocks.
//!
//! The header is treated as opaque beyond its version and root list; the
//! CBOR boundary goes through `serde_ipld_dagcbor` and the header's own CID
//! links are re-parsed with the in-crate decoder so the rest of the crate
//! sees a single [`Cid`] type.

use std::collections::BTreeMap;
use std::io::{self, Write};

use ipld_core::cid::Cid as IpldCid;
use ipld_core::ipld::Ipld;
use thiserror::Error;

use crate::cid::Cid;
use crate::wire::{self, ByteCursor, DecodeError};

#[derive(Error, Debug)]
pub enum CarError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("invalid archive header: {0}")]
    InvalidHeader(String),
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u64),
}

// ── Header ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarHeader {
    pub version: u64,
    pub roots: Vec<Cid>,
}

impl CarHeader {
    /// Decodes the DAG-CBOR header body (the bytes inside the leading
    /// varint frame). A missing `roots` key yields an empty root list.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, CarError> {
        let ipld: Ipld = serde_ipld_dagcbor::from_slice(bytes)
            .map_err(|e| CarError::InvalidHeader(e.to_string()))?;
        let map = match ipld {
            Ipld::Map(map) => map,
            other => {
                return Err(CarError::InvalidHeader(format!(
                    "expected a map, found {other:?}"
                )))
            }
        };

        let version = match map.get("version") {
            Some(Ipld::Integer(v)) if *v >= 0 => *v as u64,
            _ => return Err(CarError::InvalidHeader("missing version".into())),
        };

        let mut roots = Vec::new();
        if let Some(Ipld::List(list)) = map.get("roots") {
            for entry in list {
                let link = match entry {
                    Ipld::Link(link) => link,
                    other => {
                        return Err(CarError::InvalidHeader(format!(
                            "root is not a link: {other:?}"
                        )))
                    }
                };
                roots.push(Cid::decode_bytes(&link.to_bytes())?);
            }
        }

        Ok(Self { version, roots })
    }

    /// Reads a varint-framed header at the cursor.
    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self, CarError> {
        let len = wire::read_varint(cur)?;
        if len == 0 {
            return Err(DecodeError::MalformedFrame.into());
        }
        Self::decode_bytes(cur.exactly(len as usize)?)
    }

    /// Encodes the full varint-framed header, ready to lead an archive.
    pub fn encode(&self) -> Result<Vec<u8>, CarError> {
        let mut roots = Vec::with_capacity(self.roots.len());
        for root in &self.roots {
            let link = IpldCid::try_from(root.to_bytes().as_slice())
                .map_err(|e| CarError::InvalidHeader(e.to_string()))?;
            roots.push(Ipld::Link(link));
        }
        let header = Ipld::Map(BTreeMap::from([
            ("roots".to_string(), Ipld::List(roots)),
            ("version".to_string(), Ipld::Integer(self.version as i128)),
        ]));
        let body = serde_ipld_dagcbor::to_vec(&header)
            .map_err(|e| CarError::InvalidHeader(e.to_string()))?;

        let mut out = Vec::with_capacity(body.len() + 2);
        wire::put_varint(&mut out, body.len() as u64);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────────

/// One framed block; the payload borrows from the archive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrame<'a> {
    pub cid: Cid,
    pub bytes: &'a [u8],
}

/// Reads one `varint(len) ‖ CID ‖ payload` frame. The frame length counts
/// the CID and payload; the payload is whatever remains after the CID.
pub fn read_block<'a>(cur: &mut ByteCursor<'a>) -> Result<BlockFrame<'a>, DecodeError> {
    let len = wire::read_varint(cur)?;
    if len == 0 {
        return Err(DecodeError::MalformedFrame);
    }
    let cid_start = cur.pos();
    let cid = Cid::decode(cur)?;
    let payload_len = (len as usize)
        .checked_sub(cur.pos() - cid_start)
        .ok_or(DecodeError::MalformedFrame)?;
    let bytes = cur.exactly(payload_len)?;
    Ok(BlockFrame { cid, bytes })
}

pub fn write_block<W: Write>(w: &mut W, cid: &Cid, payload: &[u8]) -> io::Result<()> {
    let cid_bytes = cid.to_bytes();
    wire::write_varint(w, (cid_bytes.len() + payload.len()) as u64)?;
    w.write_all(&cid_bytes)?;
    w.write_all(payload)
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Sequential reader over an in-memory archive: header first, then blocks
/// in physical order.
pub struct CarReader<'a> {
    pub header: CarHeader,
    /// Length of the framed header, i.e. where the first block starts.
    pub header_len: usize,
    cur: ByteCursor<'a>,
}

impl<'a> CarReader<'a> {
    pub fn new(archive: &'a [u8]) -> Result<Self, CarError> {
        let mut cur = ByteCursor::new(archive);
        let header = CarHeader::decode(&mut cur)?;
        if header.version != 1 {
            return Err(CarError::UnsupportedVersion(header.version));
        }
        Ok(Self {
            header,
            header_len: cur.pos(),
            cur,
        })
    }

    /// Next physical block, or `None` at a clean end of the archive.
    pub fn next_block(&mut self) -> Result<Option<BlockFrame<'a>>, DecodeError> {
        if self.cur.is_empty() {
            return Ok(None);
        }
        read_block(&mut self.cur).map(Some)
    }
}
