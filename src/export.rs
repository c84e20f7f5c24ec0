//! Container consumers: list the index, or cut a single path back out as
//! a standalone archive.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::car::{CarError, CarHeader};
use crate::container::{ContainerError, ContainerHeader};
use crate::index::{IndexError, IndexReader, PathIndexRecord};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Car(#[from] CarError),
    #[error("path not found: {0:?}")]
    PathNotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn read_index<R: Read + Seek>(
    src: &mut R,
    header: &ContainerHeader,
) -> Result<Vec<u8>, ExportError> {
    src.seek(SeekFrom::Start(header.index_offset))?;
    let mut index = Vec::new();
    src.read_to_end(&mut index)?;
    Ok(index)
}

/// Decodes every record in the container's index section.
pub fn inspect<R: Read + Seek>(src: &mut R) -> Result<Vec<PathIndexRecord>, ExportError> {
    let header = ContainerHeader::read(src)?;
    let index = read_index(src, &header)?;
    let records = IndexReader::new(&index)?.collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

/// Writes the archive content for `path` to `out`.
///
/// The empty path streams the whole embedded archive verbatim. Any other
/// path is looked up in the index; the output is a fresh single-root
/// header followed by the record's byte range copied from the data
/// section, which together form a standalone archive.
pub fn export<R: Read + Seek, W: Write>(
    src: &mut R,
    path: &str,
    out: &mut W,
) -> Result<(), ExportError> {
    let header = ContainerHeader::read(src)?;

    if path.is_empty() {
        src.seek(SeekFrom::Start(header.data_offset))?;
        io::copy(&mut src.by_ref().take(header.data_size), out)?;
        return Ok(());
    }

    let index = read_index(src, &header)?;
    let mut found = None;
    for record in IndexReader::new(&index)? {
        let record = record?;
        if record.path == path {
            found = Some(record);
            break;
        }
    }
    let record = found.ok_or_else(|| ExportError::PathNotFound(path.to_string()))?;

    let sub_header = CarHeader {
        version: 1,
        roots: vec![record.cid.clone()],
    };
    out.write_all(&sub_header.encode()?)?;

    src.seek(SeekFrom::Start(header.data_offset + record.offset))?;
    io::copy(&mut src.by_ref().take(record.length), out)?;
    Ok(())
}
