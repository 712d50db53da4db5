//! End-to-end exercise of the full pipeline against a hand-built, minimal
//! v2-superblock file: a root group with one hard link to a 1-D contiguous
//! f64 dataset. Mirrors the smallest of the seed scenarios in the design
//! notes (contiguous dataset, classic-format group, v2 superblock).

use h5range::{open, Config, Datatype, Driver, SliceDriver};

const SUPERBLOCK_SIGNATURE: u64 = 0x0A1A_0A0D_4644_4889;

fn put(buf: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if buf.len() < offset + bytes.len() {
        buf.resize(offset + bytes.len(), 0);
    }
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn build_fixture() -> (Vec<u8>, u64, u64, Vec<f64>) {
    const ROOT_HDR_ADDR: u64 = 64;
    const DATASET_HDR_ADDR: u64 = 96;
    const DATA_ADDR: u64 = 176;

    let values = vec![1.5f64, 2.5, 3.5, 4.5];

    let mut buf = vec![0u8; 256 + values.len() * 8];

    // ---- superblock v2 ----
    put(&mut buf, 0, &SUPERBLOCK_SIGNATURE.to_le_bytes());
    buf[8] = 2; // version
    buf[9] = 8; // offset_size
    buf[10] = 8; // length_size
    buf[11] = 0; // file consistency flags
    put(&mut buf, 12, &0u64.to_le_bytes()); // base_address
    put(&mut buf, 20, &u64::MAX.to_le_bytes()); // superblock extension address (none)
    put(&mut buf, 28, &(buf.len() as u64).to_le_bytes()); // end-of-file address
    put(&mut buf, 36, &ROOT_HDR_ADDR.to_le_bytes()); // root group object header address

    // ---- root group object header (v2 "new format") ----
    // one Link message naming "x" -> DATASET_HDR_ADDR
    let mut link_body = Vec::new();
    link_body.push(1u8); // link message version
    link_body.push(0x00); // flags: name_len_width = 1<<0 = 1 byte, no link-type byte (hard link implied)
    link_body.push(1u8); // name length
    link_body.push(b'x');
    link_body.extend_from_slice(&DATASET_HDR_ADDR.to_le_bytes());

    let mut root_messages = Vec::new();
    root_messages.push(0x06u8); // MSG_LINK
    root_messages.extend_from_slice(&(link_body.len() as u16).to_le_bytes());
    root_messages.push(0); // message flags
    root_messages.extend_from_slice(&link_body);

    let mut root_hdr = Vec::new();
    root_hdr.extend_from_slice(b"OHDR");
    root_hdr.push(2); // version
    root_hdr.push(0); // flags: chunk0 size width = 1<<0 = 1 byte, no times/phase-change
    root_hdr.push(root_messages.len() as u8); // chunk0 size
    root_hdr.extend_from_slice(&root_messages);
    put(&mut buf, ROOT_HDR_ADDR as usize, &root_hdr);

    // ---- dataset object header ----
    // Dataspace (version 1, rank 1, N elements)
    let mut dataspace_body = Vec::new();
    dataspace_body.push(1u8); // version
    dataspace_body.push(1u8); // dimensionality
    dataspace_body.push(0u8); // flags
    dataspace_body.extend_from_slice(&[0u8; 5]); // reserved
    dataspace_body.extend_from_slice(&(values.len() as u64).to_le_bytes());

    // Datatype: floating point, 8-byte elements
    let mut datatype_body = Vec::new();
    datatype_body.extend_from_slice(&1u32.to_le_bytes()); // class=1 (float), version/bits unused by the reader
    datatype_body.extend_from_slice(&8u32.to_le_bytes()); // type_size
    datatype_body.extend_from_slice(&[0u8; 12]); // IEEE bit-layout descriptor, skipped

    // Data layout: version 3, contiguous
    let mut layout_body = Vec::new();
    layout_body.push(3u8); // version
    layout_body.push(1u8); // class = contiguous
    layout_body.extend_from_slice(&DATA_ADDR.to_le_bytes());
    layout_body.extend_from_slice(&((values.len() * 8) as u64).to_le_bytes());

    let mut dataset_messages = Vec::new();
    for (msg_type, body) in [(0x01u8, &dataspace_body), (0x03u8, &datatype_body), (0x08u8, &layout_body)] {
        dataset_messages.push(msg_type);
        dataset_messages.extend_from_slice(&(body.len() as u16).to_le_bytes());
        dataset_messages.push(0); // message flags
        dataset_messages.extend_from_slice(body);
    }

    let mut dataset_hdr = Vec::new();
    dataset_hdr.extend_from_slice(b"OHDR");
    dataset_hdr.push(2);
    dataset_hdr.push(0x01); // flags: chunk0 size width = 1<<1 = 2 bytes
    dataset_hdr.extend_from_slice(&(dataset_messages.len() as u16).to_le_bytes());
    dataset_hdr.extend_from_slice(&dataset_messages);
    put(&mut buf, DATASET_HDR_ADDR as usize, &dataset_hdr);

    // ---- raw f64 data ----
    let mut data_bytes = Vec::new();
    for v in &values {
        data_bytes.extend_from_slice(&v.to_le_bytes());
    }
    put(&mut buf, DATA_ADDR as usize, &data_bytes);

    (buf, ROOT_HDR_ADDR, DATASET_HDR_ADDR, values)
}

#[test]
fn reads_a_contiguous_float_dataset_end_to_end() {
    let (bytes, _root, _dataset, expected) = build_fixture();
    let driver: Box<dyn Driver> = Box::new(SliceDriver::new(bytes));
    let config = Config::new().with_cache_line_size(64);

    let handle = open(driver, config).expect("open");
    let results = handle.read_datasets(&["x"], 0, h5range::ALL_ROWS, false);

    let result = results.get("x").expect("dataset present").as_ref().expect("read succeeded");
    assert_eq!(result.datatype, Datatype::FloatingPoint);
    assert_eq!(result.type_size, 8);
    assert_eq!(result.element_count, expected.len() as u64);

    let floats: Vec<f64> = result
        .data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(floats, expected);
}

#[test]
fn reads_a_row_slice() {
    let (bytes, _root, _dataset, expected) = build_fixture();
    let driver: Box<dyn Driver> = Box::new(SliceDriver::new(bytes));
    let handle = open(driver, Config::new().with_cache_line_size(64)).expect("open");

    let results = handle.read_datasets(&["x"], 1, 2, false);
    let result = results.get("x").unwrap().as_ref().unwrap();

    let floats: Vec<f64> = result
        .data
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    assert_eq!(floats, &expected[1..3]);
}

#[test]
fn leading_slash_is_equivalent_to_no_leading_slash() {
    let (bytes, _root, _dataset, _expected) = build_fixture();
    let driver: Box<dyn Driver> = Box::new(SliceDriver::new(bytes));
    let handle = open(driver, Config::new().with_cache_line_size(64)).expect("open");

    let results = handle.read_datasets(&["x", "/x"], 0, h5range::ALL_ROWS, false);
    let plain = results.get("x").unwrap().as_ref().unwrap();
    let slashed = results.get("/x").unwrap().as_ref().unwrap();
    assert_eq!(plain.data, slashed.data);
}

#[test]
fn unknown_path_is_a_format_error() {
    let (bytes, ..) = build_fixture();
    let driver: Box<dyn Driver> = Box::new(SliceDriver::new(bytes));
    let handle = open(driver, Config::new().with_cache_line_size(64)).expect("open");

    let results = handle.read_datasets(&["does_not_exist"], 0, h5range::ALL_ROWS, false);
    assert!(results.get("does_not_exist").unwrap().is_err());
}
