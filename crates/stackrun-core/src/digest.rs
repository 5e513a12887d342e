//! SHA-256 content digests
//!
//! Files are streamed in fixed-size chunks so archives of any size can be
//! hashed without loading them into memory.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Chunk size used when streaming files through the hasher
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Hash a file, returning the lowercase hex digest
pub fn compute_digest(path: impl AsRef<Path>) -> io::Result<String> {
    let file = File::open(path.as_ref())?;
    digest_reader(file, CHUNK_SIZE)
}

/// Hash everything `reader` yields, reading `chunk_size` bytes at a time
pub fn digest_reader(mut reader: impl Read, chunk_size: usize) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; chunk_size.max(1)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_known_digest() {
        let digest = digest_reader(Cursor::new(b"abc"), CHUNK_SIZE).unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_input() {
        let digest = digest_reader(Cursor::new(Vec::<u8>::new()), CHUNK_SIZE).unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_larger_than_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.zip");
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let from_file = compute_digest(&path).unwrap();
        let from_memory = digest_reader(Cursor::new(&data), data.len()).unwrap();
        assert_eq!(from_file, from_memory);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compute_digest(dir.path().join("missing.zip")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    proptest! {
        #[test]
        fn digest_ignores_chunk_boundaries(
            data in proptest::collection::vec(any::<u8>(), 0..20_000),
            a in 1usize..10_000,
            b in 1usize..10_000,
        ) {
            let left = digest_reader(Cursor::new(&data), a).unwrap();
            let right = digest_reader(Cursor::new(&data), b).unwrap();
            prop_assert_eq!(left, right);
        }
    }
}
