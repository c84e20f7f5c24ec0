//! The path index: one record per filesystem-like path in a UnixFS tree,
//! each carrying the byte range of that entry inside the embedded archive.
//!
//! Ranges cover whole frames (length prefix, CID, payload), so any record's
//! range can be copied out verbatim and still parse as archive content.
//! A directory's range spans its own block plus every descendant; a file
//! collapses its chunk blocks into a single record. Directory records are
//! emitted after their children, so the root record (path `""`) comes last.
//!
//! Wire form per record, repeated with no terminator:
//!
//! ```text
//! varint(len(path)) ‖ path ‖ varint(len(cid)) ‖ cid ‖ varint(offset) ‖ varint(length)
//! ```

use std::io::{self, Write};

use log::debug;
use thiserror::Error;

use crate::car;
use crate::cid::{self, Cid};
use crate::dagpb::{self, NodeError, UnixFsType};
use crate::wire::{self, ByteCursor, DecodeError};

/// Tag leading the index section; distinct from the upstream sorted-index
/// formats (0x0400/0x0401).
pub const INDEX_CODEC: u64 = 0x0410;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("unsupported block codec {0:#x}")]
    UnsupportedCodec(u64),
    #[error("unexpected index codec {0:#x}")]
    UnexpectedIndexCodec(u64),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathIndexRecord {
    /// Slash-joined path; the root entry uses the empty string.
    pub path: String,
    pub cid: Cid,
    /// Byte offset of the entry's first frame, relative to the start of
    /// the embedded archive.
    pub offset: u64,
    pub length: u64,
}

impl PathIndexRecord {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        wire::write_length_prefixed(w, self.path.as_bytes())?;
        wire::write_length_prefixed(w, &self.cid.to_bytes())?;
        wire::write_varint(w, self.offset)?;
        wire::write_varint(w, self.length)
    }

    fn decode(cur: &mut ByteCursor<'_>) -> Result<Self, IndexError> {
        let path = wire::read_length_prefixed_str(cur)?.to_string();
        let cid = Cid::decode_bytes(wire::read_length_prefixed(cur)?)?;
        let offset = wire::read_varint(cur)?;
        let length = wire::read_varint(cur)?;
        Ok(Self {
            path,
            cid,
            offset,
            length,
        })
    }
}

// ── Building ─────────────────────────────────────────────────────────────────

/// Walks a canonical archive and produces its path index records.
pub fn build(archive: &[u8]) -> Result<Vec<PathIndexRecord>, IndexError> {
    let mut cur = ByteCursor::new(archive);

    // The header frame is opaque here; only its extent matters.
    let header_len = wire::read_varint(&mut cur)?;
    if header_len == 0 {
        return Err(DecodeError::MalformedFrame.into());
    }
    cur.skip(header_len as usize)?;

    let mut records = Vec::new();
    walk(&mut cur, String::new(), &mut records)?;
    debug!("indexed {} paths", records.len());
    Ok(records)
}

fn walk(
    cur: &mut ByteCursor<'_>,
    path: String,
    records: &mut Vec<PathIndexRecord>,
) -> Result<(), IndexError> {
    let start = cur.pos() as u64;
    let frame = car::read_block(cur)?;

    match frame.cid.codec {
        cid::RAW => {
            records.push(PathIndexRecord {
                path,
                cid: frame.cid,
                offset: start,
                length: cur.pos() as u64 - start,
            });
            Ok(())
        }
        cid::DAG_PB => {
            let node = dagpb::decode_node(frame.bytes)?;
            match node.unixfs()?.kind()? {
                // A file's chunk blocks follow in link order; they collapse
                // into the file's own record.
                UnixFsType::Raw | UnixFsType::File => {
                    for _ in 0..node.links.len() {
                        skip_subtree(cur)?;
                    }
                    records.push(PathIndexRecord {
                        path,
                        cid: frame.cid,
                        offset: start,
                        length: cur.pos() as u64 - start,
                    });
                    Ok(())
                }
                UnixFsType::Directory => {
                    for link in &node.links {
                        let name = link.name.as_deref().unwrap_or("");
                        walk(cur, format!("{path}/{name}"), records)?;
                    }
                    records.push(PathIndexRecord {
                        path,
                        cid: frame.cid,
                        offset: start,
                        length: cur.pos() as u64 - start,
                    });
                    Ok(())
                }
                other => Err(NodeError::UnsupportedUnixFsType(other as u64).into()),
            }
        }
        other => Err(IndexError::UnsupportedCodec(other)),
    }
}

/// Advances the cursor past one block and all of its descendants without
/// emitting records.
fn skip_subtree(cur: &mut ByteCursor<'_>) -> Result<(), IndexError> {
    let frame = car::read_block(cur)?;
    match frame.cid.codec {
        cid::RAW => Ok(()),
        cid::DAG_PB => {
            let node = dagpb::decode_node(frame.bytes)?;
            for _ in 0..node.links.len() {
                skip_subtree(cur)?;
            }
            Ok(())
        }
        other => Err(IndexError::UnsupportedCodec(other)),
    }
}

// ── Reading ──────────────────────────────────────────────────────────────────

/// Streaming decoder over an index section. The only accepted terminator
/// is a clean end of input between records; truncation inside a record is
/// an error.
pub struct IndexReader<'a> {
    cur: ByteCursor<'a>,
}

impl<'a> IndexReader<'a> {
    /// Validates the leading codec tag before any record is read.
    pub fn new(index: &'a [u8]) -> Result<Self, IndexError> {
        let mut cur = ByteCursor::new(index);
        let codec = wire::read_varint(&mut cur)?;
        if codec != INDEX_CODEC {
            return Err(IndexError::UnexpectedIndexCodec(codec));
        }
        Ok(Self { cur })
    }
}

impl Iterator for IndexReader<'_> {
    type Item = Result<PathIndexRecord, IndexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_empty() {
            return None;
        }
        Some(PathIndexRecord::decode(&mut self.cur))
    }
}
