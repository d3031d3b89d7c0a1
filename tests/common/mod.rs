// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use toolpack::PackConfig;
use toolpack::hash::sha256;

/// Write a flat toolchain bin directory with known duplicates.
///
/// `clang`, `clang++` and `clang-cl` share content, as do `ld.lld` and
/// `lld`; `llvm-ar` is unique. Three names are redundant in total.
pub fn toolchain_bin(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    let compiler = pseudo_random(4096, 1);
    let linker = pseudo_random(2048, 2);
    fs::write(dir.join("clang"), &compiler).unwrap();
    fs::write(dir.join("clang++"), &compiler).unwrap();
    fs::write(dir.join("clang-cl"), &compiler).unwrap();
    fs::write(dir.join("ld.lld"), &linker).unwrap();
    fs::write(dir.join("lld"), &linker).unwrap();
    fs::write(dir.join("llvm-ar"), pseudo_random(1000, 3)).unwrap();
}

/// Deterministic bytes that zstd cannot shrink much
pub fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect()
}

/// SHA-256 of every regular file directly under `dir`, by name
pub fn dir_digests(dir: &Path) -> BTreeMap<String, String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| {
            let name = e.file_name().into_string().unwrap();
            (name, sha256(&fs::read(e.path()).unwrap()))
        })
        .collect()
}

/// Defaults tuned for quick tests: lowest zstd level, no zstd workers
pub fn fast_config() -> PackConfig {
    let mut config = PackConfig::default();
    config.compression.level = 1;
    config.compression.threads = 0;
    config.jobs = 2;
    config
}
