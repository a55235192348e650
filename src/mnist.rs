//! MNIST training set: IDX parsing, local cache, and download with one mirror fallback.
//!
//! Layout on disk: `<root>/MNIST/raw/<file>.gz`, the gzipped IDX files as published.
//!
//! Pixels are normalized as `(p / 255 - 0.5) / 0.5`, i.e. into `[-1, 1]`, which matches the
//! generator's `tanh` output range.
//!
//! Downloads go through a caller-supplied `fetch` closure so the fallback logic does not depend on
//! the network; [`http_fetch`] is the real one.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::batches::ImageSet;
use crate::{Error, Result};

pub const PRIMARY_SOURCE: &str = "https://yann.lecun.com/exdb/mnist/";
pub const MIRROR_SOURCE: &str = "https://ossci-datasets.s3.amazonaws.com/mnist/";

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte.gz";

/// Side length of an MNIST image.
pub const IMAGE_SIDE: usize = 28;

const IMAGES_MAGIC: u32 = 0x0000_0803;
const LABELS_MAGIC: u32 = 0x0000_0801;

// Largest payload we accept from one download (the gzipped training images are ~10 MB).
const MAX_DOWNLOAD_BYTES: u64 = 64 * 1024 * 1024;

/// Base URLs to fetch from, in order.
#[derive(Debug, Clone)]
pub struct MnistSources {
    pub primary: String,
    pub mirror: String,
}

impl Default for MnistSources {
    fn default() -> Self {
        Self {
            primary: PRIMARY_SOURCE.to_string(),
            mirror: MIRROR_SOURCE.to_string(),
        }
    }
}

/// Map a raw pixel into `[-1, 1]`.
#[inline]
pub fn normalize_pixel(p: u8) -> f32 {
    (p as f32 / 255.0 - 0.5) / 0.5
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(Error::Domain("idx header is truncated"))
}

/// Check magic and payload length; returns the header dimensions and the payload.
fn idx_header(bytes: &[u8], magic: u32, ndims: usize) -> Result<(Vec<usize>, &[u8])> {
    if read_u32(bytes, 0)? != magic {
        return Err(Error::Domain("not an idx file of the expected kind (bad magic)"));
    }
    let dims = (0..ndims)
        .map(|i| read_u32(bytes, 4 + 4 * i).map(|d| d as usize))
        .collect::<Result<Vec<_>>>()?;
    let expected = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| Error::Shape(format!("idx header {dims:?} overflows")))?;
    let payload = &bytes[4 + 4 * ndims..];
    if payload.len() != expected {
        return Err(Error::Shape(format!(
            "idx payload has {} bytes, header says {dims:?}",
            payload.len()
        )));
    }
    Ok((dims, payload))
}

/// Parse an (uncompressed) IDX3 image file into an `n × (rows * cols)` normalized matrix.
pub fn parse_idx_images(bytes: &[u8]) -> Result<Array2<f32>> {
    let (dims, payload) = idx_header(bytes, IMAGES_MAGIC, 3)?;
    let (n, dim) = (dims[0], dims[1] * dims[2]);
    let pixels = payload.iter().map(|&p| normalize_pixel(p)).collect();
    Array2::from_shape_vec((n, dim), pixels).map_err(|e| Error::Shape(e.to_string()))
}

/// Parse an (uncompressed) IDX1 label file.
pub fn parse_idx_labels(bytes: &[u8]) -> Result<Vec<u8>> {
    let (_, payload) = idx_header(bytes, LABELS_MAGIC, 1)?;
    Ok(payload.to_vec())
}

/// Check that a downloaded `file` is a gzipped IDX file of the right kind and length.
pub fn validate_download(file: &str, gz: &[u8]) -> Result<()> {
    let (magic, ndims) = if file == TRAIN_LABELS {
        (LABELS_MAGIC, 1)
    } else {
        (IMAGES_MAGIC, 3)
    };
    let raw = gunzip(gz).map_err(|e| Error::Download(format!("{file}: not gzip ({e})")))?;
    idx_header(&raw, magic, ndims)
        .map(|_| ())
        .map_err(|e| Error::Download(format!("{file}: {e}")))
}

pub fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Directory holding the cached `.gz` files.
pub fn raw_dir(root: &Path) -> PathBuf {
    root.join("MNIST").join("raw")
}

/// Both training files are present under `root`.
pub fn is_cached(root: &Path) -> bool {
    let dir = raw_dir(root);
    dir.join(TRAIN_IMAGES).is_file() && dir.join(TRAIN_LABELS).is_file()
}

/// Fetch `file` from the primary source, falling back to the mirror once.
///
/// A payload that fails [`validate_download`] counts as a failed fetch.
pub fn fetch_with_fallback(
    sources: &MnistSources,
    file: &str,
    fetch: &mut impl FnMut(&str) -> Result<Vec<u8>>,
) -> Result<Vec<u8>> {
    let mut fetch_valid = |url: &str| {
        let bytes = fetch(url)?;
        validate_download(file, &bytes)?;
        Ok::<_, Error>(bytes)
    };

    let primary = format!("{}{file}", sources.primary);
    let primary_err = match fetch_valid(&primary) {
        Ok(bytes) => return Ok(bytes),
        Err(e) => e,
    };
    warn!(url = %primary, error = %primary_err, "download failed, retrying with mirror");

    let mirror = format!("{}{file}", sources.mirror);
    fetch_valid(&mirror).map_err(|mirror_err| {
        Error::Download(format!(
            "{file}: primary ({primary_err}); mirror ({mirror_err})"
        ))
    })
}

/// Make sure `file` is cached under `root`, downloading it if needed.
pub fn ensure_file(
    root: &Path,
    sources: &MnistSources,
    file: &str,
    fetch: &mut impl FnMut(&str) -> Result<Vec<u8>>,
) -> Result<PathBuf> {
    let dir = raw_dir(root);
    let path = dir.join(file);
    if path.is_file() {
        let cached = fs::read(&path)?;
        match validate_download(file, &cached) {
            Ok(()) => {
                debug!(path = %path.display(), "using cached file");
                return Ok(path);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid cached file, downloading again");
                fs::remove_file(&path)?;
            }
        }
    }
    fs::create_dir_all(&dir)?;
    let bytes = fetch_with_fallback(sources, file, fetch)?;
    // Write then rename so an interrupted download never looks cached.
    let partial = dir.join(format!("{file}.partial"));
    fs::write(&partial, &bytes)?;
    fs::rename(&partial, &path)?;
    info!(path = %path.display(), bytes = bytes.len(), "cached");
    Ok(path)
}

/// Load the 60k-image training set, downloading into `root` if it is not cached.
pub fn load_train_set(
    root: &Path,
    sources: &MnistSources,
    mut fetch: impl FnMut(&str) -> Result<Vec<u8>>,
) -> Result<ImageSet> {
    let images_path = ensure_file(root, sources, TRAIN_IMAGES, &mut fetch)?;
    let labels_path = ensure_file(root, sources, TRAIN_LABELS, &mut fetch)?;

    let images = parse_idx_images(&gunzip(&fs::read(images_path)?)?)?;
    let labels = parse_idx_labels(&gunzip(&fs::read(labels_path)?)?)?;
    ImageSet::new(images, labels)
}

/// Read at most `limit` bytes; a longer body is an error rather than a truncated file.
pub fn read_capped(reader: impl Read, limit: u64) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Err(Error::Download(format!("body exceeds {limit} bytes")));
    }
    Ok(bytes)
}

/// Blocking HTTP GET.
pub fn http_fetch(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .timeout(Duration::from_secs(60))
        .call()
        .map_err(|e| Error::Download(format!("{url}: {e}")))?;
    read_capped(response.into_reader(), MAX_DOWNLOAD_BYTES)
        .map_err(|e| Error::Download(format!("{url}: {e}")))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn parses_images_and_normalizes_pixels() {
        let m = parse_idx_images(&idx_images(3, 2, 2)).unwrap();
        assert_eq!(m.dim(), (3, 4));
        assert_eq!(m[[0, 0]], -1.0);
        assert!(m.iter().all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(normalize_pixel(255), 1.0);
    }

    #[test]
    fn parses_labels() {
        assert_eq!(parse_idx_labels(&idx_labels(12)).unwrap()[11], 1);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut images = idx_images(2, 2, 2);
        assert!(parse_idx_labels(&images).is_err());
        images.pop();
        assert!(matches!(parse_idx_images(&images), Err(Error::Shape(_))));
        assert!(parse_idx_images(&[0, 0, 8]).is_err());
    }

    #[test]
    fn overflowing_header_is_a_shape_error() {
        let mut bytes = Vec::new();
        for v in [0x0803u32, u32::MAX, u32::MAX, u32::MAX] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(&[0; 16]);
        assert!(matches!(parse_idx_images(&bytes), Err(Error::Shape(_))));
    }

    #[test]
    fn header_larger_than_payload_is_a_shape_error() {
        let mut bytes = Vec::new();
        for v in [0x0801u32, 1_000_000] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(parse_idx_labels(&bytes), Err(Error::Shape(_))));
    }

    #[test]
    fn download_validation_checks_gzip_kind_and_length() {
        validate_download(TRAIN_IMAGES, &gzip(&idx_images(2, 3, 3))).unwrap();
        validate_download(TRAIN_LABELS, &gzip(&idx_labels(4))).unwrap();
        assert!(validate_download(TRAIN_IMAGES, b"<html>403 Forbidden</html>").is_err());
        // Right format, wrong file.
        assert!(validate_download(TRAIN_IMAGES, &gzip(&idx_labels(4))).is_err());
        let mut truncated = idx_images(2, 3, 3);
        truncated.pop();
        assert!(matches!(
            validate_download(TRAIN_IMAGES, &gzip(&truncated)),
            Err(Error::Download(_))
        ));
    }

    #[test]
    fn invalid_primary_payload_falls_back_to_mirror() {
        let sources = MnistSources::default();
        let mut mirror_calls = 0;
        let mut fetch = |url: &str| -> Result<Vec<u8>> {
            if url.starts_with(PRIMARY_SOURCE) {
                Ok(b"<html>403 Forbidden</html>".to_vec())
            } else {
                mirror_calls += 1;
                Ok(gzip(&idx_labels(2)))
            }
        };
        let bytes = fetch_with_fallback(&sources, TRAIN_LABELS, &mut fetch).unwrap();
        assert_eq!(parse_idx_labels(&gunzip(&bytes).unwrap()).unwrap(), vec![0, 1]);
        assert_eq!(mirror_calls, 1);
    }

    #[test]
    fn capped_read_rejects_oversized_bodies() {
        assert_eq!(read_capped(&[7u8; 8][..], 8).unwrap().len(), 8);
        assert!(matches!(
            read_capped(&[7u8; 9][..], 8),
            Err(Error::Download(_))
        ));
    }

    #[test]
    fn gzip_roundtrip_feeds_parser() {
        let gz = gzip(&idx_labels(5));
        assert_eq!(parse_idx_labels(&gunzip(&gz).unwrap()).unwrap().len(), 5);
    }

    #[test]
    fn falls_back_to_mirror_once() {
        let sources = MnistSources::default();
        let mut calls = Vec::new();
        let mut fetch = |url: &str| -> Result<Vec<u8>> {
            calls.push(url.to_string());
            if url.starts_with(PRIMARY_SOURCE) {
                Err(Error::Download("503".into()))
            } else {
                Ok(gzip(&idx_labels(3)))
            }
        };
        let bytes = fetch_with_fallback(&sources, TRAIN_LABELS, &mut fetch).unwrap();
        assert_eq!(bytes, gzip(&idx_labels(3)));
        assert_eq!(calls.len(), 2);
        assert!(calls[1].starts_with(MIRROR_SOURCE));
    }

    #[test]
    fn reports_both_causes_when_mirror_fails_too() {
        let sources = MnistSources::default();
        let mut attempts = 0;
        let mut fetch = |_: &str| -> Result<Vec<u8>> {
            attempts += 1;
            Err(Error::Download(format!("attempt {attempts}")))
        };
        let err = fetch_with_fallback(&sources, TRAIN_IMAGES, &mut fetch).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("attempt 1") && msg.contains("attempt 2"), "{msg}");
    }
}
