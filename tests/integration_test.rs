use std::fs::File;
use std::io::Cursor;

use tempfile::NamedTempFile;

use highway::car::{self, CarHeader};
use highway::cid::{self, Cid, Multihash};
use highway::container::{to_container, ContainerHeader, HEADER_SIZE};
use highway::export::ExportError;
use highway::wire::put_varint;
use highway::{canonicalize, export, inspect, validate, PathIndexRecord};

// ── Fixture helpers ──────────────────────────────────────────────────────────

fn raw_cid(seed: u8) -> Cid {
    Cid::new_v1(
        cid::RAW,
        Multihash {
            code: cid::SHA2_256,
            digest: vec![seed; 32],
        },
    )
}

fn dagpb_cid(seed: u8) -> Cid {
    Cid::new_v1(
        cid::DAG_PB,
        Multihash {
            code: cid::SHA2_256,
            digest: vec![seed; 32],
        },
    )
}

fn pb_field(out: &mut Vec<u8>, tag: u8, bytes: &[u8]) {
    out.push(tag);
    put_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn pb_link(target: &Cid, name: &str, tsize: u64) -> Vec<u8> {
    let mut link = Vec::new();
    pb_field(&mut link, 0x0a, &target.to_bytes());
    pb_field(&mut link, 0x12, name.as_bytes());
    link.push(0x18);
    put_varint(&mut link, tsize);
    link
}

/// Encodes a dag-pb node: UnixFS descriptor in `Data`, then the links.
fn pb_node(unixfs_type: u64, links: &[Vec<u8>]) -> Vec<u8> {
    let mut descriptor = Vec::new();
    descriptor.push(0x08);
    put_varint(&mut descriptor, unixfs_type);

    let mut node = Vec::new();
    pb_field(&mut node, 0x0a, &descriptor);
    for link in links {
        pb_field(&mut node, 0x12, link);
    }
    node
}

const UNIXFS_DIRECTORY: u64 = 1;
const UNIXFS_FILE: u64 = 2;
const UNIXFS_SYMLINK: u64 = 4;

fn archive_of(root: &Cid, blocks: &[(&Cid, &[u8])]) -> Vec<u8> {
    let mut out = CarHeader {
        version: 1,
        roots: vec![root.clone()],
    }
    .encode()
    .unwrap();
    for (block_cid, bytes) in blocks {
        car::write_block(&mut out, block_cid, bytes).unwrap();
    }
    out
}

/// A two-entry directory: "first.txt" and "second.txt", both raw leaves.
struct DirFixture {
    dir: Cid,
    child1: Cid,
    child2: Cid,
    node: Vec<u8>,
}

fn dir_fixture() -> DirFixture {
    let child1 = raw_cid(1);
    let child2 = raw_cid(2);
    let node = pb_node(
        UNIXFS_DIRECTORY,
        &[
            pb_link(&child1, "first.txt", 5),
            pb_link(&child2, "second.txt", 6),
        ],
    );
    DirFixture {
        dir: dagpb_cid(0xd0),
        child1,
        child2,
        node,
    }
}

// ── Canonicalization ─────────────────────────────────────────────────────────

#[test]
fn test_children_before_parent_is_not_canonical() {
    let f = dir_fixture();
    let shuffled = archive_of(
        &f.dir,
        &[
            (&f.child1, b"first"),
            (&f.child2, b"second"),
            (&f.dir, &f.node),
        ],
    );
    assert!(!validate(&shuffled).unwrap());

    let ordered = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );
    assert!(validate(&ordered).unwrap());
}

#[test]
fn test_canonicalize_reorders_to_preorder() {
    let f = dir_fixture();
    let shuffled = archive_of(
        &f.dir,
        &[
            (&f.child1, b"first"),
            (&f.child2, b"second"),
            (&f.dir, &f.node),
        ],
    );
    let ordered = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );

    let canonical = canonicalize(&shuffled).unwrap();
    assert_eq!(canonical, ordered);
    assert!(validate(&canonical).unwrap());
}

#[test]
fn test_canonicalize_is_idempotent_and_deterministic() {
    let f = dir_fixture();
    let shuffled = archive_of(
        &f.dir,
        &[
            (&f.child2, b"second"),
            (&f.dir, &f.node),
            (&f.child1, b"first"),
        ],
    );

    let once = canonicalize(&shuffled).unwrap();
    let twice = canonicalize(&once).unwrap();
    assert_eq!(once, twice);

    let again = canonicalize(&shuffled).unwrap();
    assert_eq!(once, again);
}

#[test]
fn test_validate_roundtrip_over_nested_tree() {
    // root dir -> sub dir -> raw leaf, plus a raw leaf at the top level
    let leaf_top = raw_cid(0x11);
    let leaf_inner = raw_cid(0x22);
    let sub_node = pb_node(UNIXFS_DIRECTORY, &[pb_link(&leaf_inner, "inner.txt", 3)]);
    let sub = dagpb_cid(0x33);
    let root_node = pb_node(
        UNIXFS_DIRECTORY,
        &[pb_link(&leaf_top, "top.bin", 4), pb_link(&sub, "sub", 0)],
    );
    let root = dagpb_cid(0x44);

    let shuffled = archive_of(
        &root,
        &[
            (&leaf_inner, b"abc"),
            (&sub, &sub_node),
            (&root, &root_node),
            (&leaf_top, b"topp"),
        ],
    );
    assert!(!validate(&shuffled).unwrap());
    assert!(validate(&canonicalize(&shuffled).unwrap()).unwrap());
}

// ── Indexing ─────────────────────────────────────────────────────────────────

#[test]
fn test_single_raw_block_gets_one_root_record() {
    let root = raw_cid(7);
    let archive = archive_of(&root, &[(&root, b"tiny")]);
    assert!(validate(&archive).unwrap());

    let container = to_container(&archive).unwrap();
    let mut src = Cursor::new(&container);
    let records = inspect(&mut src).unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.path, "");
    assert_eq!(record.cid, root);

    // The single record covers everything after the archive header.
    let header = ContainerHeader::read(&mut Cursor::new(&container)).unwrap();
    assert_eq!(header.data_offset, HEADER_SIZE as u64);
    assert_eq!(header.index_offset, header.data_offset + header.data_size);
    assert_eq!(record.offset + record.length, header.data_size);
}

#[test]
fn test_directory_records_are_contained_and_ordered() {
    let f = dir_fixture();
    let archive = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );
    let container = to_container(&archive).unwrap();
    let records = inspect(&mut Cursor::new(&container)).unwrap();

    // Children in link order, enclosing directory last.
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].path, "/first.txt");
    assert_eq!(records[0].cid, f.child1);
    assert_eq!(records[1].path, "/second.txt");
    assert_eq!(records[1].cid, f.child2);
    assert_eq!(records[2].path, "");
    assert_eq!(records[2].cid, f.dir);

    let root = &records[2];
    for child in &records[..2] {
        assert!(root.offset <= child.offset);
        assert!(child.offset + child.length <= root.offset + root.length);
    }
    // Siblings do not overlap and appear in link order.
    assert!(records[0].offset + records[0].length <= records[1].offset);
}

#[test]
fn test_file_chunks_collapse_into_one_record() {
    let chunk1 = raw_cid(0xa1);
    let chunk2 = raw_cid(0xa2);
    let file_node = pb_node(
        UNIXFS_FILE,
        &[pb_link(&chunk1, "", 1024), pb_link(&chunk2, "", 512)],
    );
    let file = dagpb_cid(0xaf);

    let archive = archive_of(
        &file,
        &[(&file, &file_node), (&chunk1, b"aaaa"), (&chunk2, b"bb")],
    );
    let container = to_container(&archive).unwrap();
    let records = inspect(&mut Cursor::new(&container)).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path, "");
    assert_eq!(records[0].cid, file);

    let header = ContainerHeader::read(&mut Cursor::new(&container)).unwrap();
    assert_eq!(records[0].offset + records[0].length, header.data_size);
}

#[test]
fn test_nested_directory_paths() {
    let leaf = raw_cid(0x55);
    let sub_node = pb_node(UNIXFS_DIRECTORY, &[pb_link(&leaf, "inner.txt", 3)]);
    let sub = dagpb_cid(0x66);
    let root_node = pb_node(UNIXFS_DIRECTORY, &[pb_link(&sub, "sub", 0)]);
    let root = dagpb_cid(0x77);

    let archive = archive_of(
        &root,
        &[(&root, &root_node), (&sub, &sub_node), (&leaf, b"abc")],
    );
    let container = to_container(&archive).unwrap();
    let records = inspect(&mut Cursor::new(&container)).unwrap();

    let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/sub/inner.txt", "/sub", ""]);

    fn by_path<'a>(records: &'a [PathIndexRecord], p: &str) -> &'a PathIndexRecord {
        records.iter().find(|r| r.path == p).unwrap()
    }
    let inner = by_path(&records, "/sub/inner.txt");
    let sub_rec = by_path(&records, "/sub");
    let root_rec = by_path(&records, "");
    assert!(sub_rec.offset <= inner.offset);
    assert!(inner.offset + inner.length <= sub_rec.offset + sub_rec.length);
    assert!(root_rec.offset <= sub_rec.offset);
    assert!(sub_rec.offset + sub_rec.length <= root_rec.offset + root_rec.length);
}

#[test]
fn test_symlink_nodes_are_rejected() {
    let link_node = pb_node(UNIXFS_SYMLINK, &[]);
    let root = dagpb_cid(0x99);
    let archive = archive_of(&root, &[(&root, &link_node)]);
    assert!(to_container(&archive).is_err());
}

// ── Container roundtrips ─────────────────────────────────────────────────────

#[test]
fn test_export_by_path_yields_a_standalone_archive() {
    let f = dir_fixture();
    let archive = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );
    let container = to_container(&archive).unwrap();

    let mut out = Vec::new();
    export(&mut Cursor::new(&container), "/second.txt", &mut out).unwrap();

    // The export is itself a valid, trivially canonical archive.
    assert!(validate(&out).unwrap());

    let mut expected = CarHeader {
        version: 1,
        roots: vec![f.child2.clone()],
    }
    .encode()
    .unwrap();
    car::write_block(&mut expected, &f.child2, b"second").unwrap();
    assert_eq!(out, expected);
}

#[test]
fn test_export_root_path_returns_whole_archive() {
    let f = dir_fixture();
    let archive = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );
    let container = to_container(&archive).unwrap();

    let mut out = Vec::new();
    export(&mut Cursor::new(&container), "", &mut out).unwrap();
    assert_eq!(out, archive);
}

#[test]
fn test_export_unknown_path_fails() {
    let root = raw_cid(3);
    let archive = archive_of(&root, &[(&root, b"x")]);
    let container = to_container(&archive).unwrap();

    let mut out = Vec::new();
    let result = export(&mut Cursor::new(&container), "/nope.txt", &mut out);
    assert!(matches!(result, Err(ExportError::PathNotFound(p)) if p == "/nope.txt"));
    assert!(out.is_empty());
}

#[test]
fn test_container_file_roundtrip() {
    let f = dir_fixture();
    let archive = archive_of(
        &f.dir,
        &[
            (&f.dir, &f.node),
            (&f.child1, b"first"),
            (&f.child2, b"second"),
        ],
    );
    let container = to_container(&archive).unwrap();

    let temp = NamedTempFile::new().unwrap();
    std::fs::write(temp.path(), &container).unwrap();

    let mut file = File::open(temp.path()).unwrap();
    let records = inspect(&mut file).unwrap();
    assert_eq!(records.len(), 3);

    let mut file = File::open(temp.path()).unwrap();
    let mut out = Vec::new();
    export(&mut file, "/first.txt", &mut out).unwrap();
    assert!(validate(&out).unwrap());
}

#[test]
fn test_inspect_rejects_first_generation_input() {
    let root = raw_cid(5);
    let archive = archive_of(&root, &[(&root, b"not a container")]);
    let result = inspect(&mut Cursor::new(&archive));
    assert!(result.is_err());
}
