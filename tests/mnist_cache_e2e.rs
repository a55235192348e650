use std::fs;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use pointfix::mnist::{
    is_cached, load_train_set, raw_dir, MnistSources, MIRROR_SOURCE, PRIMARY_SOURCE, TRAIN_IMAGES,
    TRAIN_LABELS,
};
use pointfix::{Error, Result};

fn gz(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

fn idx_images(n: u32, side: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for v in [0x0803u32, n, side, side] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend((0..n * side * side).map(|i| (i * 7 % 256) as u8));
    out
}

fn idx_labels(n: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for v in [0x0801u32, n] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend((0..n).map(|i| (i % 10) as u8));
    out
}

fn served(url: &str) -> Vec<u8> {
    if url.ends_with(TRAIN_IMAGES) {
        gz(&idx_images(9, 4))
    } else {
        gz(&idx_labels(9))
    }
}

#[test]
fn cached_files_are_used_without_fetching() {
    let dir = tempfile::tempdir().unwrap();
    let raw = raw_dir(dir.path());
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join(TRAIN_IMAGES), gz(&idx_images(5, 3))).unwrap();
    fs::write(raw.join(TRAIN_LABELS), gz(&idx_labels(5))).unwrap();
    assert!(is_cached(dir.path()));

    let set = load_train_set(dir.path(), &MnistSources::default(), |url: &str| -> Result<Vec<u8>> {
        panic!("unexpected fetch of {url}")
    })
    .unwrap();
    assert_eq!(set.len(), 5);
    assert_eq!(set.dim(), 9);
    assert_eq!(set.labels, vec![0, 1, 2, 3, 4]);
}

#[test]
fn primary_failure_falls_back_to_mirror_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let mut urls = Vec::new();
    let set = load_train_set(dir.path(), &MnistSources::default(), |url: &str| {
        urls.push(url.to_string());
        if url.starts_with(PRIMARY_SOURCE) {
            Err(Error::Download(format!("{url}: connection refused")))
        } else {
            Ok(served(url))
        }
    })
    .unwrap();

    assert_eq!(set.len(), 9);
    assert_eq!(set.dim(), 16);
    assert_eq!(urls.len(), 4);
    assert!(urls[1].starts_with(MIRROR_SOURCE) && urls[1].ends_with(TRAIN_IMAGES));
    assert!(urls[3].starts_with(MIRROR_SOURCE) && urls[3].ends_with(TRAIN_LABELS));
    assert!(is_cached(dir.path()));
}

#[test]
fn both_sources_failing_is_a_download_error_and_nothing_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let sources = MnistSources {
        primary: "http://primary.invalid/".to_string(),
        mirror: "http://mirror.invalid/".to_string(),
    };
    let err = load_train_set(dir.path(), &sources, |url: &str| -> Result<Vec<u8>> {
        Err(Error::Download(format!("{url}: unreachable")))
    })
    .unwrap_err();

    let msg = err.to_string();
    assert!(matches!(err, Error::Download(_)));
    assert!(msg.contains("primary.invalid") && msg.contains("mirror.invalid"), "{msg}");
    assert!(!is_cached(dir.path()));
}

#[test]
fn junk_from_primary_is_never_cached_and_mirror_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let mut mirror_calls = 0;
    let set = load_train_set(dir.path(), &MnistSources::default(), |url: &str| {
        if url.starts_with(PRIMARY_SOURCE) {
            Ok(b"<html>403 Forbidden</html>".to_vec())
        } else {
            mirror_calls += 1;
            Ok(served(url))
        }
    })
    .unwrap();

    assert_eq!(set.len(), 9);
    assert_eq!(mirror_calls, 2);
    let raw = raw_dir(dir.path());
    assert_eq!(fs::read(raw.join(TRAIN_IMAGES)).unwrap(), served(TRAIN_IMAGES));
    assert!(!raw.join(format!("{TRAIN_IMAGES}.partial")).exists());
}

#[test]
fn junk_from_both_sources_leaves_no_cache() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_train_set(dir.path(), &MnistSources::default(), |_: &str| -> Result<Vec<u8>> {
        Ok(b"<html>503</html>".to_vec())
    })
    .unwrap_err();
    assert!(matches!(err, Error::Download(_)));
    assert!(!is_cached(dir.path()));
}

#[test]
fn invalid_cached_file_is_downloaded_again() {
    let dir = tempfile::tempdir().unwrap();
    let raw = raw_dir(dir.path());
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join(TRAIN_IMAGES), b"<html>403 Forbidden</html>").unwrap();
    fs::write(raw.join(TRAIN_LABELS), served(TRAIN_LABELS)).unwrap();

    let mut urls = Vec::new();
    let set = load_train_set(dir.path(), &MnistSources::default(), |url: &str| {
        urls.push(url.to_string());
        Ok::<_, Error>(served(url))
    })
    .unwrap();

    assert_eq!(set.len(), 9);
    assert_eq!(urls.len(), 1);
    assert!(urls[0].ends_with(TRAIN_IMAGES));
    assert_eq!(fs::read(raw.join(TRAIN_IMAGES)).unwrap(), served(TRAIN_IMAGES));
}
