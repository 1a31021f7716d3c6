use polybundle::bundle::{
    detect_bundle, extract_content, read_header_record, write_bundle, BuildOptions, Footer,
    FOOTER_LEN, FOOTER_MAGIC,
};
use proptest::prelude::*;
use std::path::{Path, PathBuf};

struct Built {
    _dir: tempfile::TempDir,
    out: PathBuf,
    bytes: Vec<u8>,
}

fn build(payload: &[u8], content: &[u8], opts: &BuildOptions) -> Built {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("payload.bin");
    let c = dir.path().join("content.gguf");
    let out = dir.path().join("out.bundle");
    std::fs::write(&p, payload).unwrap();
    std::fs::write(&c, content).unwrap();
    write_bundle(&p, &c, &out, opts).unwrap();
    let bytes = std::fs::read(&out).unwrap();
    Built {
        _dir: dir,
        out,
        bytes,
    }
}

fn footer_of(bytes: &[u8]) -> Footer {
    let mut tail = [0u8; FOOTER_LEN as usize];
    tail.copy_from_slice(&bytes[bytes.len() - FOOTER_LEN as usize..]);
    Footer::from_bytes(&tail)
}

#[test]
fn scenario_1000_payload_70000_content() {
    let payload = vec![0xAAu8; 1000];
    let content = vec![0xBBu8; 70000];
    let b = build(&payload, &content, &BuildOptions::default());

    assert_eq!(b.bytes.len(), 135_556);
    assert_eq!(&b.bytes[4096..5096], payload.as_slice());
    assert_eq!(
        footer_of(&b.bytes),
        Footer {
            content_offset: 65536,
            content_size: 70000,
            magic: FOOTER_MAGIC
        }
    );

    let info = detect_bundle(&b.out).unwrap();
    assert_eq!(info.content_offset, 65536);
    assert_eq!(info.content_size, 70000);
    assert_eq!(&b.bytes[65536..65536 + 70000], content.as_slice());
}

#[test]
fn empty_content_is_a_valid_bundle() {
    let b = build(b"\x7fELFpayload", b"", &BuildOptions::default());
    let info = detect_bundle(&b.out).unwrap();
    assert_eq!(info.content_size, 0);
    assert_eq!(info.content_offset % 65536, 0);
    assert_eq!(info.content_offset + FOOTER_LEN, b.bytes.len() as u64);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn round_trip_preserves_segments(
        payload in prop::collection::vec(any::<u8>(), 0..9000),
        content_len in 0usize..140_000,
        fill in any::<u8>(),
        page_shift in 12u32..14,
        content_shift in 12u32..17,
    ) {
        let page = 1u64 << page_shift;
        let content_boundary = 1u64 << content_shift;
        let opts = BuildOptions { page_boundary: page, content_boundary };
        let content: Vec<u8> = (0..content_len).map(|i| fill ^ (i % 241) as u8).collect();
        let b = build(&payload, &content, &opts);

        let info = detect_bundle(&b.out).unwrap();
        prop_assert_eq!(info.content_offset % content_boundary, 0);
        prop_assert_eq!(info.content_offset + info.content_size + FOOTER_LEN, b.bytes.len() as u64);
        let start = info.content_offset as usize;
        prop_assert_eq!(&b.bytes[start..start + content_len], content.as_slice());

        let rec = read_header_record(&b.out).unwrap();
        prop_assert_eq!(rec.payload_offset % page, 0);
        prop_assert_eq!(rec.content_offset, info.content_offset);
        let po = rec.payload_offset as usize;
        prop_assert_eq!(&b.bytes[po..po + payload.len()], payload.as_slice());
    }
}

#[test]
fn header_values_match_layout() {
    let b = build(&[0x11; 123_457], &[0x22; 10], &BuildOptions::default());
    let rec = read_header_record(&b.out).unwrap();
    let info = detect_bundle(&b.out).unwrap();

    assert_eq!(rec.content_offset, info.content_offset);
    assert_eq!(rec.payload_offset, 4096);

    let head = String::from_utf8_lossy(&b.bytes[..rec.payload_offset as usize]).into_owned();
    assert!(head.contains(&format!("tail -c +{} ", rec.payload_offset + 1)));
    assert!(head.contains(&format!("head -c {} ", rec.payload_size)));
    assert!(head.contains(&format!("Seek({},0)", rec.payload_offset)));
    assert!(head.contains(&format!("set \"CONTENT_OFFSET={}\"", info.content_offset)));
    assert!(head.contains(&format!("CONTENT_OFFSET={} ", info.content_offset)));
}

#[test]
fn header_page_has_no_nul_bytes() {
    let b = build(&[0u8; 10], &[0u8; 10], &BuildOptions::default());
    let rec = read_header_record(&b.out).unwrap();
    assert!(!b.bytes[..rec.payload_offset as usize].contains(&0));
}

#[test]
fn extract_copies_content() {
    let content = b"the quick brown fox".to_vec();
    let b = build(b"payload", &content, &BuildOptions::default());
    let dest = b.out.with_file_name("extracted.bin");
    let n = extract_content(&b.out, &dest).unwrap();
    assert_eq!(n, content.len() as u64);
    assert_eq!(std::fs::read(dest).unwrap(), content);
}

#[test]
fn non_bundles_are_detected_as_such() {
    let dir = tempfile::tempdir().unwrap();
    let cases: &[(&str, Vec<u8>)] = &[
        ("empty", vec![]),
        ("short", vec![0x46, 0x55, 0x47, 0x47]),
        ("nineteen", vec![0xFF; 19]),
        ("text", b"#!/bin/sh\necho not a bundle\n".to_vec()),
    ];
    for (name, bytes) in cases {
        let p = dir.path().join(name);
        std::fs::write(&p, bytes).unwrap();
        assert_eq!(detect_bundle(&p), None, "{name}");
    }
    assert_eq!(detect_bundle(Path::new("/definitely/not/here")), None);
}

#[test]
fn rebuilding_overwrites_previous_output() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("p");
    let c = dir.path().join("c");
    let out = dir.path().join("o.bundle");
    std::fs::write(&p, b"payload").unwrap();
    std::fs::write(&c, vec![1u8; 5000]).unwrap();
    std::fs::write(&out, b"stale").unwrap();

    let first = write_bundle(&p, &c, &out, &BuildOptions::default()).unwrap();
    let second = write_bundle(&p, &c, &out, &BuildOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(std::fs::metadata(&out).unwrap().len(), second.total_size);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(leftovers.is_empty());
}

#[cfg(unix)]
#[test]
fn output_is_executable() {
    use std::os::unix::fs::PermissionsExt;
    let b = build(b"p", b"c", &BuildOptions::default());
    let mode = std::fs::metadata(&b.out).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
}
