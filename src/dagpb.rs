//! DAG-PB node decoding and the UnixFS descriptor carried in its `Data`
//! field.
//!
//! The message shapes follow the dag-pb and unixfs protobuf schemas;
//! readers are hand-maintained in the generated `MessageRead` style and
//! borrow from the block buffer.

use std::borrow::Cow;

use quick_protobuf::{BytesReader, MessageRead, Result as ProtoResult};
use thiserror::Error;

use crate::cid::Cid;
use crate::wire::DecodeError;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("malformed dag-pb node: {0}")]
    Proto(#[from] quick_protobuf::Error),
    #[error("dag-pb link carries an invalid CID")]
    LinkCid(#[from] DecodeError),
    #[error("dag-pb link has no hash")]
    MissingLinkHash,
    #[error("dag-pb node has no UnixFS descriptor")]
    MissingUnixFs,
    #[error("unsupported UnixFS type {0}")]
    UnsupportedUnixFsType(u64),
}

// ── dag-pb messages ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PbLink<'a> {
    pub hash: Option<Cow<'a, [u8]>>,
    pub name: Option<Cow<'a, str>>,
    pub tsize: Option<u64>,
}

impl<'a> MessageRead<'a> for PbLink<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.hash = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(18) => msg.name = Some(r.read_string(bytes).map(Cow::Borrowed)?),
                Ok(24) => msg.tsize = Some(r.read_uint64(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PbNode<'a> {
    pub links: Vec<PbLink<'a>>,
    pub data: Option<Cow<'a, [u8]>>,
}

impl<'a> MessageRead<'a> for PbNode<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(10) => msg.data = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(18) => msg.links.push(r.read_message::<PbLink>(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl<'a> PbNode<'a> {
    /// Link targets as CIDs, in declared order.
    pub fn link_cids(&self) -> Result<Vec<Cid>, NodeError> {
        self.links
            .iter()
            .map(|link| {
                let hash = link.hash.as_deref().ok_or(NodeError::MissingLinkHash)?;
                Ok(Cid::decode_bytes(hash)?)
            })
            .collect()
    }

    /// Decodes the UnixFS descriptor from the node's `Data` field.
    pub fn unixfs(&self) -> Result<UnixFs<'_>, NodeError> {
        let data = self.data.as_deref().ok_or(NodeError::MissingUnixFs)?;
        let mut r = BytesReader::from_bytes(data);
        Ok(UnixFs::from_reader(&mut r, data)?)
    }
}

/// Decodes a dag-pb block payload.
pub fn decode_node(bytes: &[u8]) -> Result<PbNode<'_>, NodeError> {
    let mut r = BytesReader::from_bytes(bytes);
    Ok(PbNode::from_reader(&mut r, bytes)?)
}

// ── UnixFS descriptor ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnixFsType {
    Raw,
    Directory,
    File,
    Metadata,
    Symlink,
    HamtShard,
}

impl UnixFsType {
    pub fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            0 => Some(Self::Raw),
            1 => Some(Self::Directory),
            2 => Some(Self::File),
            3 => Some(Self::Metadata),
            4 => Some(Self::Symlink),
            5 => Some(Self::HamtShard),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnixFs<'a> {
    pub type_tag: u64,
    pub data: Option<Cow<'a, [u8]>>,
    pub filesize: Option<u64>,
}

impl<'a> MessageRead<'a> for UnixFs<'a> {
    fn from_reader(r: &mut BytesReader, bytes: &'a [u8]) -> ProtoResult<Self> {
        let mut msg = Self::default();
        while !r.is_eof() {
            match r.next_tag(bytes) {
                Ok(8) => msg.type_tag = r.read_uint64(bytes)?,
                Ok(18) => msg.data = Some(r.read_bytes(bytes).map(Cow::Borrowed)?),
                Ok(24) => msg.filesize = Some(r.read_uint64(bytes)?),
                Ok(t) => {
                    r.read_unknown(bytes, t)?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(msg)
    }
}

impl UnixFs<'_> {
    /// The descriptor's type, or `UnsupportedUnixFsType` for unknown tags.
    pub fn kind(&self) -> Result<UnixFsType, NodeError> {
        UnixFsType::from_tag(self.type_tag)
            .ok_or(NodeError::UnsupportedUnixFsType(self.type_tag))
    }
}
