//! Sampled content identity.
//!
//! The identity is an MD5 digest over [`SAMPLE_COUNT`] windows spread evenly
//! across the file, followed by the file size. Small files are read in full;
//! large files cost at most `SAMPLE_COUNT * SAMPLE_SIZE` bytes of I/O.

use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use md5::{Digest, Md5};
use tracing::debug;

use crate::TransferError;

/// Number of windows sampled from every file.
pub const SAMPLE_COUNT: u64 = 100;

/// Upper bound on the length of a single window.
pub const SAMPLE_SIZE: u64 = 64 * 1024;

/// Byte ranges hashed for a file of `size` bytes.
///
/// Always returns [`SAMPLE_COUNT`] ranges; ranges past the end of a small
/// file are empty.
pub fn sample_ranges(size: u64) -> Vec<Range<u64>> {
    let stride = size.div_ceil(SAMPLE_COUNT);
    let window = stride.min(SAMPLE_SIZE);
    (0..SAMPLE_COUNT)
        .map(|i| {
            let start = (i * stride).min(size);
            let end = (start + window).min(size);
            start..end
        })
        .collect()
}

/// Computes the identity of the file at `path`.
///
/// `on_progress` is called after each sample with the 1-based number of
/// samples processed so far.
pub fn file_identity(
    path: &Path,
    on_progress: impl FnMut(usize),
) -> Result<String, TransferError> {
    let file = std::fs::File::open(path)?;
    let size = file.metadata()?.len();
    let identity = identity_from_reader(file, size, on_progress)?;
    debug!(path = %path.display(), size, identity = %identity, "computed file identity");
    Ok(identity)
}

/// Computes the identity of `size` bytes readable from `reader`.
pub fn identity_from_reader<R: Read + Seek>(
    mut reader: R,
    size: u64,
    mut on_progress: impl FnMut(usize),
) -> Result<String, TransferError> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; SAMPLE_SIZE as usize];

    for (i, range) in sample_ranges(size).into_iter().enumerate() {
        let len = (range.end - range.start) as usize;
        if len > 0 {
            reader.seek(SeekFrom::Start(range.start))?;
            reader.read_exact(&mut buf[..len])?;
            hasher.update(&buf[..len]);
        }
        on_progress(i + 1);
    }

    hasher.update(size.to_le_bytes());
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use tempfile::TempDir;

    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn identity_of(data: &[u8]) -> String {
        identity_from_reader(Cursor::new(data), data.len() as u64, |_| {}).unwrap()
    }

    #[test]
    fn ranges_cover_small_file_completely() {
        let ranges = sample_ranges(1000);
        assert_eq!(ranges.len(), 100);
        assert_eq!(ranges[0], 0..10);
        assert_eq!(ranges[99], 990..1000);
        let covered: u64 = ranges.iter().map(|r| r.end - r.start).sum();
        assert_eq!(covered, 1000);
    }

    #[test]
    fn ranges_are_bounded_for_large_file() {
        let size = 1000 * SAMPLE_SIZE;
        let ranges = sample_ranges(size);
        assert_eq!(ranges.len(), SAMPLE_COUNT as usize);
        for (i, r) in ranges.iter().enumerate() {
            assert_eq!(r.start, i as u64 * 10 * SAMPLE_SIZE);
            assert_eq!(r.end - r.start, SAMPLE_SIZE);
        }
    }

    #[test]
    fn ranges_past_end_are_empty() {
        let ranges = sample_ranges(5);
        assert_eq!(ranges[4], 4..5);
        assert!(ranges[5..].iter().all(|r| r.start == r.end));
    }

    #[test]
    fn identity_is_deterministic() {
        let data = pattern(123_457);
        let a = identity_of(&data);
        let b = identity_of(&data);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn identity_changes_with_sampled_content() {
        let data = pattern(4096);
        let mut changed = data.clone();
        changed[100] ^= 0xff;
        assert_ne!(identity_of(&data), identity_of(&changed));
    }

    #[test]
    fn identity_folds_in_size() {
        // Zero-filled files of different length sample identical bytes.
        let short = vec![0u8; 100];
        let long = vec![0u8; 101];
        assert_ne!(identity_of(&short), identity_of(&long));
    }

    #[test]
    fn progress_counts_every_sample() {
        let data = pattern(777);
        let mut seen = Vec::new();
        identity_from_reader(Cursor::new(&data), data.len() as u64, |n| seen.push(n)).unwrap();
        assert_eq!(seen, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn file_identity_matches_reader() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data = pattern(300_000);
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        assert_eq!(file_identity(&path, |_| {}).unwrap(), identity_of(&data));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = file_identity(&dir.path().join("nope"), |_| {}).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn short_reader_is_an_error() {
        let data = pattern(50);
        let err = identity_from_reader(Cursor::new(&data), 500, |_| {}).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
