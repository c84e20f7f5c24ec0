//! Canonical block ordering for single-root archives.
//!
//! Canonical order is a pre-order depth-first traversal: each node is
//! followed by its first subtree, subtrees by the next sibling. The visit
//! list is an explicit stack of CIDs; expanding a dag-pb node pushes its
//! links in reverse so the first link is popped next.
//!
//! # Validate
//! [`validate`] walks the expected order and the physical block sequence in
//! lock-step and returns `Ok(false)` on any divergence. Only structurally
//! unsupported content (an unknown block codec) escalates to an error.
//!
//! # Transform
//! [`transform`] re-emits the blocks in canonical order as a lazy iterator.
//! Input blocks are pulled only as far ahead as needed to resolve the next
//! expected CID; everything pulled early waits in a CID-keyed lookahead
//! cache of borrowed slices. Dropping the iterator abandons the traversal
//! and no further input is read. Cache entries are retained, so a CID the
//! DAG links twice is emitted twice.

use std::collections::HashMap;
use std::io::{self, Write};

use log::debug;
use thiserror::Error;

use crate::car::{self, BlockFrame, CarError, CarHeader, CarReader};
use crate::cid::{self, Cid};
use crate::dagpb::{self, NodeError};
use crate::wire::DecodeError;

#[derive(Error, Debug)]
pub enum CanonError {
    #[error(transparent)]
    Car(#[from] CarError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("unsupported block codec {0:#x}")]
    UnsupportedCodec(u64),
    #[error("expected exactly one root, found {0}")]
    UnsupportedRootCount(usize),
    #[error("missing block: {0}")]
    MissingBlock(Cid),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn single_root(header: &CarHeader) -> Result<Cid, CanonError> {
    match header.roots.as_slice() {
        [root] => Ok(root.clone()),
        roots => Err(CanonError::UnsupportedRootCount(roots.len())),
    }
}

/// Pushes a block's children onto the visit stack. Raw leaves have none;
/// any codec other than raw or dag-pb is unsupported.
fn expand(stack: &mut Vec<Cid>, block_cid: &Cid, bytes: &[u8]) -> Result<(), CanonError> {
    match block_cid.codec {
        cid::RAW => Ok(()),
        cid::DAG_PB => {
            let node = dagpb::decode_node(bytes)?;
            let links = node.link_cids()?;
            stack.extend(links.into_iter().rev());
            Ok(())
        }
        other => Err(CanonError::UnsupportedCodec(other)),
    }
}

/// Checks whether the archive's physical block order is already canonical.
pub fn validate(archive: &[u8]) -> Result<bool, CanonError> {
    let mut reader = CarReader::new(archive)?;
    let mut stack = vec![single_root(&reader.header)?];

    loop {
        match (stack.pop(), reader.next_block()?) {
            (None, None) => return Ok(true),
            (None, Some(_)) | (Some(_), None) => return Ok(false),
            (Some(want), Some(frame)) => {
                if frame.cid != want {
                    return Ok(false);
                }
                expand(&mut stack, &frame.cid, frame.bytes)?;
            }
        }
    }
}

// ── Transform ────────────────────────────────────────────────────────────────

/// Canonical-order view of an archive: the untouched header bytes plus a
/// lazy block iterator.
pub struct CanonicalStream<'a> {
    /// The input's framed header, copied verbatim to any output.
    pub header: &'a [u8],
    pub blocks: CanonicalBlocks<'a>,
}

/// Iterator yielding blocks in canonical order; see the module docs for
/// the lookahead and cancellation behavior.
pub struct CanonicalBlocks<'a> {
    reader: CarReader<'a>,
    stack: Vec<Cid>,
    cache: HashMap<Cid, &'a [u8]>,
}

impl<'a> CanonicalBlocks<'a> {
    /// Returns the payload for `want`, pulling further physical blocks
    /// into the cache until it turns up.
    fn resolve(&mut self, want: &Cid) -> Result<&'a [u8], CanonError> {
        loop {
            if let Some(&bytes) = self.cache.get(want) {
                return Ok(bytes);
            }
            match self.reader.next_block()? {
                Some(frame) => {
                    self.cache.insert(frame.cid, frame.bytes);
                }
                None => return Err(CanonError::MissingBlock(want.clone())),
            }
        }
    }
}

impl<'a> Iterator for CanonicalBlocks<'a> {
    type Item = Result<BlockFrame<'a>, CanonError>;

    fn next(&mut self) -> Option<Self::Item> {
        let want = self.stack.pop()?;
        let bytes = match self.resolve(&want) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.stack.clear();
                return Some(Err(e));
            }
        };
        if let Err(e) = expand(&mut self.stack, &want, bytes) {
            self.stack.clear();
            return Some(Err(e));
        }
        Some(Ok(BlockFrame { cid: want, bytes }))
    }
}

/// Starts a canonical-order traversal over `archive`.
pub fn transform(archive: &[u8]) -> Result<CanonicalStream<'_>, CanonError> {
    let reader = CarReader::new(archive)?;
    let root = single_root(&reader.header)?;
    let header = &archive[..reader.header_len];
    Ok(CanonicalStream {
        header,
        blocks: CanonicalBlocks {
            reader,
            stack: vec![root],
            cache: HashMap::new(),
        },
    })
}

/// Rewrites `archive` into canonical block order.
pub fn canonicalize(archive: &[u8]) -> Result<Vec<u8>, CanonError> {
    let stream = transform(archive)?;
    let mut out = Vec::with_capacity(archive.len());
    out.extend_from_slice(stream.header);

    let mut blocks = 0usize;
    for frame in stream.blocks {
        let frame = frame?;
        car::write_block(&mut out, &frame.cid, frame.bytes)?;
        blocks += 1;
    }
    debug!("canonicalized {blocks} blocks ({} bytes)", out.len());
    Ok(out)
}

/// Streams the canonical rewrite straight into `w`.
pub fn canonicalize_to<W: Write>(archive: &[u8], w: &mut W) -> Result<(), CanonError> {
    let stream = transform(archive)?;
    w.write_all(stream.header)?;
    for frame in stream.blocks {
        let frame = frame?;
        car::write_block(w, &frame.cid, frame.bytes)?;
    }
    Ok(())
}
