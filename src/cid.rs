//! Binary content-identifier decoding.
//!
//! Two wire forms are accepted: the legacy 34-byte form (a bare SHA2-256
//! multihash, implying version 0 and the DAG-PB codec) and the
//! self-describing form (version varint, codec varint, multihash). Digest
//! bytes are carried opaquely; nothing here recomputes a hash.

use std::fmt;

use crate::wire::{put_varint, read_varint, varint_len, ByteCursor, DecodeError};

/// Multicodec: raw binary leaf.
pub const RAW: u64 = 0x55;
/// Multicodec: protobuf-encoded node with links.
pub const DAG_PB: u64 = 0x70;
/// Multihash function code for SHA2-256.
pub const SHA2_256: u64 = 0x12;

const CIDV0_DIGEST_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Multihash {
    pub code: u64,
    pub digest: Vec<u8>,
}

impl Multihash {
    /// Decodes `code ‖ digest-length ‖ digest`. The two leading varints are
    /// sized from a peek so the cursor consumes exactly the multihash bytes.
    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
        let mut peek = cur.clone();
        let code = read_varint(&mut peek)?;
        let len = read_varint(&mut peek)?;
        if len > peek.remaining() as u64 {
            return Err(DecodeError::UnsupportedMultihash(len));
        }
        cur.skip(peek.pos() - cur.pos())?;
        let digest = cur.exactly(len as usize)?.to_vec();
        Ok(Self { code, digest })
    }

    fn encode_to(&self, out: &mut Vec<u8>) {
        put_varint(out, self.code);
        put_varint(out, self.digest.len() as u64);
        out.extend_from_slice(&self.digest);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cid {
    pub version: u64,
    pub codec: u64,
    pub hash: Multihash,
}

impl Cid {
    pub fn new_v1(codec: u64, hash: Multihash) -> Self {
        Self { version: 1, codec, hash }
    }

    /// Decodes a CID at the cursor.
    ///
    /// A leading `0x12 0x20` pair marks the legacy form: 34 bytes total,
    /// version 0, implicit DAG-PB codec. Anything else must carry an
    /// explicit version of 1.
    pub fn decode(cur: &mut ByteCursor<'_>) -> Result<Self, DecodeError> {
        let head = cur.up_to(2);
        if head.len() == 2 && head[0] == SHA2_256 as u8 && head[1] == CIDV0_DIGEST_LEN as u8 {
            let bytes = cur.exactly(2 + CIDV0_DIGEST_LEN)?;
            return Ok(Self {
                version: 0,
                codec: DAG_PB,
                hash: Multihash {
                    code: SHA2_256,
                    digest: bytes[2..].to_vec(),
                },
            });
        }

        let version = read_varint(cur)?;
        if version != 1 {
            return Err(DecodeError::UnsupportedCidVersion(version));
        }
        let codec = read_varint(cur)?;
        let hash = Multihash::decode(cur)?;
        Ok(Self { version, codec, hash })
    }

    /// Decodes a CID that occupies an entire buffer (link hashes, index
    /// records).
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut cur = ByteCursor::new(bytes);
        let cid = Self::decode(&mut cur)?;
        if !cur.is_empty() {
            return Err(DecodeError::MalformedFrame);
        }
        Ok(cid)
    }

    /// Re-encodes to the byte form [`Cid::decode`] accepts; minimal varints
    /// make this reproduce the decoded input exactly.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        if self.version != 0 {
            put_varint(&mut out, self.version);
            put_varint(&mut out, self.codec);
        }
        self.hash.encode_to(&mut out);
        out
    }

    pub fn encoded_len(&self) -> usize {
        let hash_len = varint_len(self.hash.code)
            + varint_len(self.hash.digest.len() as u64)
            + self.hash.digest.len();
        if self.version == 0 {
            hash_len
        } else {
            varint_len(self.version) + varint_len(self.codec) + hash_len
        }
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}
