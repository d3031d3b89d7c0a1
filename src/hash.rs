// src/hash.rs

//! Streaming content hashing
//!
//! Digests are the unit of identity for deduplication and the payload of
//! checksum sidecars. Three algorithms are supported:
//! - **SHA-256**: cryptographic, the default for both dedup and sidecars
//! - **MD5**: legacy, matches manifests and `.md5` sidecars published by older tooling
//! - **XXH128**: non-cryptographic, for fast local deduplication only
//!
//! Files are always read in fixed-size blocks; no whole-file buffering.

use crate::error::{Error, Result};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use xxhash_rust::xxh3::Xxh3;

/// Default read block size for streaming hashes
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256 (256-bit cryptographic hash)
    #[default]
    Sha256,

    /// MD5 (128-bit, legacy compatibility only)
    Md5,

    /// XXH128 (128-bit non-cryptographic hash)
    Xxh128,
}

impl HashAlgorithm {
    /// Get the hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Md5 | Self::Xxh128 => 16,
        }
    }

    /// Get the hash output length as a hex string
    #[inline]
    pub const fn hex_len(&self) -> usize {
        self.output_len() * 2
    }

    /// Get the algorithm name as a string
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Md5 => "md5",
            Self::Xxh128 => "xxh128",
        }
    }

    /// Sidecar file extension, e.g. `.sha256`
    #[inline]
    pub const fn sidecar_extension(&self) -> &'static str {
        match self {
            Self::Sha256 => ".sha256",
            Self::Md5 => ".md5",
            Self::Xxh128 => ".xxh128",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "md5" => Ok(Self::Md5),
            "xxh128" | "xxhash" | "xxh3" => Ok(Self::Xxh128),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Hash parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Unknown hash algorithm name
    UnknownAlgorithm(String),
    /// Hash string has wrong length for algorithm
    InvalidLength { expected: usize, got: usize },
    /// Hash string contains invalid hex characters
    InvalidHex(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "unknown hash algorithm: {}", name),
            Self::InvalidLength { expected, got } => {
                write!(f, "invalid hash length: expected {}, got {}", expected, got)
            }
            Self::InvalidHex(s) => write!(f, "invalid hex in hash: {}", s),
        }
    }
}

impl std::error::Error for HashError {}

/// A hash value with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    /// The algorithm used
    pub algorithm: HashAlgorithm,
    /// The hash value as a lowercase hex string
    pub value: String,
}

impl ContentHash {
    /// Create a validated hash value
    pub fn new(
        algorithm: HashAlgorithm,
        value: impl Into<String>,
    ) -> std::result::Result<Self, HashError> {
        let value = value.into();
        let expected_len = algorithm.hex_len();

        if value.len() != expected_len {
            return Err(HashError::InvalidLength {
                expected: expected_len,
                got: value.len(),
            });
        }

        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value));
        }

        Ok(Self {
            algorithm,
            value: value.to_lowercase(),
        })
    }

    /// Get the hash value as a hex string
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Incremental hasher over any supported algorithm
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

enum HasherState {
    Sha256(Sha256),
    Md5(Md5),
    Xxh128(Box<Xxh3>),
}

impl Hasher {
    /// Create a new hasher with the specified algorithm
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Sha256 => HasherState::Sha256(Sha256::new()),
            HashAlgorithm::Md5 => HasherState::Md5(Md5::new()),
            HashAlgorithm::Xxh128 => HasherState::Xxh128(Box::new(Xxh3::new())),
        };
        Self { algorithm, state }
    }

    /// Update the hasher with more data
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(hasher) => hasher.update(data),
            HasherState::Md5(hasher) => hasher.update(data),
            HasherState::Xxh128(hasher) => hasher.update(data),
        }
    }

    /// Finalize and return the hash
    pub fn finalize(self) -> ContentHash {
        let value = match self.state {
            HasherState::Sha256(hasher) => hex::encode(hasher.finalize()),
            HasherState::Md5(hasher) => hex::encode(hasher.finalize()),
            HasherState::Xxh128(hasher) => format!("{:032x}", hasher.digest128()),
        };
        ContentHash {
            algorithm: self.algorithm,
            value,
        }
    }

    /// Get the algorithm being used
    #[inline]
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Compute hash of a byte slice
pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> ContentHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute hash of data from a reader, `block_size` bytes at a time
pub fn hash_reader<R: Read>(
    algorithm: HashAlgorithm,
    reader: &mut R,
    block_size: usize,
) -> io::Result<ContentHash> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize())
}

/// Stream a file through the given algorithm
///
/// Unreadable files are a hard error naming the path.
pub fn hash_file(algorithm: HashAlgorithm, path: &Path, block_size: usize) -> Result<ContentHash> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    hash_reader(algorithm, &mut file, block_size).map_err(|e| Error::io(path, e))
}

/// Compute SHA-256 hash as hex
#[inline]
pub fn sha256(data: &[u8]) -> String {
    hash_bytes(HashAlgorithm::Sha256, data).value
}

/// Reader adaptor that hashes everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: Hasher::new(algorithm),
            bytes: 0,
        }
    }

    /// Total bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Consume the adaptor, returning the inner reader and the digest
    pub fn finish(self) -> (R, ContentHash) {
        (self.inner, self.hasher.finalize())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(
            hash.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_md5_hash() {
        let hash = hash_bytes(HashAlgorithm::Md5, b"hello world");
        assert_eq!(hash.value, "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_xxh128_streaming_matches_oneshot() {
        let data = vec![7u8; 100_000];
        let oneshot = format!("{:032x}", xxhash_rust::xxh3::xxh3_128(&data));

        let mut cursor = std::io::Cursor::new(&data);
        let streamed = hash_reader(HashAlgorithm::Xxh128, &mut cursor, 4096).unwrap();

        assert_eq!(streamed.value, oneshot);
    }

    #[test]
    fn test_hasher_incremental() {
        let full_hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"Hello, ");
        hasher.update(b"World!");

        assert_eq!(full_hash, hasher.finalize());
    }

    #[test]
    fn test_block_size_does_not_change_digest() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let mut a = std::io::Cursor::new(&data);
        let mut b = std::io::Cursor::new(&data);

        let small = hash_reader(HashAlgorithm::Sha256, &mut a, 7).unwrap();
        let large = hash_reader(HashAlgorithm::Sha256, &mut b, 1 << 20).unwrap();
        assert_eq!(small, large);
    }

    #[test]
    fn test_hash_file_identical_content_different_names() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("clang");
        let b = temp_dir.path().join("clang++");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let ha = hash_file(HashAlgorithm::Sha256, &a, DEFAULT_BLOCK_SIZE).unwrap();
        let hb = hash_file(HashAlgorithm::Sha256, &b, DEFAULT_BLOCK_SIZE).unwrap();
        assert_eq!(ha, hb);
    }

    #[test]
    fn test_hash_file_missing_names_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("lld");

        let err = hash_file(HashAlgorithm::Sha256, &missing, DEFAULT_BLOCK_SIZE).unwrap_err();
        assert!(err.to_string().contains("lld"));
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("sha256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("md5".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Md5);
        assert_eq!("xxhash".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Xxh128);
        assert!("unknown".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn test_hash_validation() {
        let hash = ContentHash::new(
            HashAlgorithm::Sha256,
            "DFFD6021BB2BD5B0AF676290809EC3A53191DD81C7F70A4B28688A362182986F",
        )
        .unwrap();
        assert_eq!(
            hash.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );

        let hash = ContentHash::new(HashAlgorithm::Md5, "abc123");
        assert!(matches!(hash, Err(HashError::InvalidLength { .. })));

        let hash = ContentHash::new(HashAlgorithm::Md5, "gggggggggggggggggggggggggggggggg");
        assert!(matches!(hash, Err(HashError::InvalidHex(_))));
    }

    #[test]
    fn test_hashing_reader_counts_bytes() {
        let data = b"part payload";
        let mut reader = HashingReader::new(&data[..], HashAlgorithm::Sha256);
        let mut sink = Vec::new();
        std::io::copy(&mut reader, &mut sink).unwrap();

        assert_eq!(reader.bytes_read(), data.len() as u64);
        let (_, digest) = reader.finish();
        assert_eq!(digest.value, sha256(data));
    }
}
