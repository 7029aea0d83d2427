//! Integration tests for the indexed store: compression, index
//! construction, and chunk-driven region fetches against real files.

use annotrack::error::AnnotrackError;
use annotrack::io::IndexedBed;
use std::fs;
use std::path::PathBuf;

fn test_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data/store")
        .join(name);
    fs::remove_dir_all(&dir).ok();
    fs::create_dir_all(&dir).expect("failed to create test directory");
    dir
}

/// Compress `content` and build its index, returning the prepared path.
fn prepare(dir: &PathBuf, content: &str) -> PathBuf {
    let src = dir.join("track.bed");
    fs::write(&src, content).expect("failed to write test track");
    let gz = dir.join("track.bed.gz");
    IndexedBed::compress(&src, &gz).expect("compression failed");
    IndexedBed::build_index(&gz).expect("index build failed");
    gz
}

#[test]
fn test_contigs_in_file_order() {
    let dir = test_dir("contigs");
    let gz = prepare(
        &dir,
        "chr1\t100\t200\ta\t0\t+\n\
         chr2\t50\t80\tb\t0\t-\n\
         chrX\t10\t20\tc\t0\t+\n",
    );

    let store = IndexedBed::open(&gz).unwrap();
    assert_eq!(store.contigs(), vec!["chr1", "chr2", "chrX"]);
    assert!(store.has_contig("chr2"));
    assert!(!store.has_contig("chr3"));
}

#[test]
fn test_fetch_half_open_overlap_semantics() {
    let dir = test_dir("half_open");
    let gz = prepare(&dir, "chr1\t100\t200\ta\t0\t+\n");
    let mut store = IndexedBed::open(&gz).unwrap();

    // Touching the end coordinate is not an overlap
    assert!(store.fetch("chr1", 200, 300).unwrap().is_empty());
    // Touching the start coordinate from below is not either
    assert!(store.fetch("chr1", 50, 100).unwrap().is_empty());
    // One base of overlap on each side is
    assert_eq!(store.fetch("chr1", 199, 300).unwrap().len(), 1);
    assert_eq!(store.fetch("chr1", 50, 101).unwrap().len(), 1);
}

#[test]
fn test_fetch_returns_raw_lines_in_file_order() {
    let dir = test_dir("ordering");
    let gz = prepare(
        &dir,
        "chr1\t100\t500\ta\t0\t+\n\
         chr1\t150\t250\tb\t0\t-\n\
         chr1\t160\t170\tc\t0\t+\n\
         chr1\t800\t900\td\t0\t+\n",
    );
    let mut store = IndexedBed::open(&gz).unwrap();

    let records = store.fetch("chr1", 140, 400).unwrap();
    assert_eq!(
        records,
        vec![
            "chr1\t100\t500\ta\t0\t+",
            "chr1\t150\t250\tb\t0\t-",
            "chr1\t160\t170\tc\t0\t+",
        ]
    );
}

#[test]
fn test_fetch_unknown_contig_is_error_at_store_level() {
    let dir = test_dir("unknown_contig");
    let gz = prepare(&dir, "chr1\t100\t200\ta\t0\t+\n");
    let mut store = IndexedBed::open(&gz).unwrap();

    let err = store.fetch("chr9", 0, 1000).unwrap_err();
    assert!(matches!(err, AnnotrackError::InvalidInput { .. }));
}

#[test]
fn test_fetch_skips_comment_lines() {
    let dir = test_dir("comments");
    let gz = prepare(
        &dir,
        "# a header comment\n\
         chr1\t100\t200\ta\t0\t+\n",
    );
    let mut store = IndexedBed::open(&gz).unwrap();

    let records = store.fetch("chr1", 0, 1000).unwrap();
    assert_eq!(records, vec!["chr1\t100\t200\ta\t0\t+"]);
}

#[test]
fn test_build_index_rejects_unsorted_starts() {
    let dir = test_dir("unsorted");
    let src = dir.join("track.bed");
    fs::write(&src, "chr1\t500\t600\ta\t0\t+\nchr1\t100\t200\tb\t0\t+\n").unwrap();
    let gz = dir.join("track.bed.gz");
    IndexedBed::compress(&src, &gz).unwrap();

    let err = IndexedBed::build_index(&gz).unwrap_err();
    assert!(matches!(err, AnnotrackError::IndexBuild { .. }));
}

#[test]
fn test_build_index_rejects_interleaved_contigs() {
    let dir = test_dir("interleaved");
    let src = dir.join("track.bed");
    fs::write(
        &src,
        "chr1\t100\t200\ta\t0\t+\n\
         chr2\t100\t200\tb\t0\t+\n\
         chr1\t300\t400\tc\t0\t+\n",
    )
    .unwrap();
    let gz = dir.join("track.bed.gz");
    IndexedBed::compress(&src, &gz).unwrap();

    let err = IndexedBed::build_index(&gz).unwrap_err();
    assert!(matches!(err, AnnotrackError::IndexBuild { .. }));
}

#[test]
fn test_build_index_rejects_malformed_rows() {
    let dir = test_dir("malformed");
    let src = dir.join("track.bed");
    fs::write(&src, "chr1\tnot_a_number\t200\ta\t0\t+\n").unwrap();
    let gz = dir.join("track.bed.gz");
    IndexedBed::compress(&src, &gz).unwrap();

    let err = IndexedBed::build_index(&gz).unwrap_err();
    assert!(matches!(err, AnnotrackError::IndexBuild { .. }));
}

#[test]
fn test_fetch_across_many_blocks() {
    let dir = test_dir("many_blocks");

    // ~20k records spanning several BGZF blocks
    let mut content = String::new();
    for i in 0u64..20_000 {
        let start = i * 50;
        content.push_str(&format!("chr1\t{}\t{}\trec{}\t0\t+\n", start, start + 75, i));
    }
    let gz = prepare(&dir, &content);
    let mut store = IndexedBed::open(&gz).unwrap();

    let records = store.fetch("chr1", 500_000, 500_200).unwrap();
    let names: Vec<&str> = records
        .iter()
        .map(|r| r.split('\t').nth(3).unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["rec9999", "rec10000", "rec10001", "rec10002", "rec10003"]
    );

    // Far edge of the track still resolves
    let tail = store.fetch("chr1", 999_900, 1_000_100).unwrap();
    assert!(!tail.is_empty());

    // And a window before every record is empty without error
    // (records overlapping position 0 exist, so query just past the last one)
    let beyond = store.fetch("chr1", 1_500_000, 1_600_000).unwrap();
    assert!(beyond.is_empty());
}

#[test]
fn test_lines_iterates_whole_track_repeatedly() {
    let dir = test_dir("lines");
    let gz = prepare(
        &dir,
        "# header\n\
         chr1\t100\t200\ta\t0\t+\n\
         chr2\t10\t20\tb\t0\t-\n",
    );
    let mut store = IndexedBed::open(&gz).unwrap();

    let first: Vec<String> = store.lines().unwrap().map(|l| l.unwrap()).collect();
    assert_eq!(
        first,
        vec!["# header", "chr1\t100\t200\ta\t0\t+", "chr2\t10\t20\tb\t0\t-"]
    );

    // lines() rewinds, so a second pass sees the same content
    let second: Vec<String> = store.lines().unwrap().map(|l| l.unwrap()).collect();
    assert_eq!(first, second);
}
