// src/split/joiner.rs

use super::{PartsRecord, parse_part_name};
use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, Hasher, HashingReader};
use crate::options::RunOptions;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const JOIN_BUFFER: usize = 1024 * 1024;

/// Result of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub bytes: u64,
    /// SHA-256 of the reassembled artifact
    pub sha256: String,
    /// Whether a parts record was found and checked
    pub verified: bool,
}

/// Concatenate `parts` in numeric order into `output`
///
/// The parts may be passed in any order but must all belong to the same
/// artifact and form the contiguous sequence `1..=n`. When
/// `<artifact>.parts.json` sits next to the first part, every part's length
/// and digest and the digest of the whole are checked against it. The output
/// only appears once every check has passed.
pub fn join_parts(parts: &[PathBuf], output: &Path, options: &RunOptions) -> Result<JoinOutcome> {
    let ordered = order_parts(parts)?;
    let (base, _) = &ordered[0];
    let dir = ordered[0]
        .1
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let record_path = PartsRecord::path_for(dir, base);
    let record = if record_path.exists() {
        let record = PartsRecord::load(&record_path)?;
        if ordered.len() > record.parts.len() {
            // Usually left behind by an earlier, longer split
            return Err(Error::UnexpectedPart {
                path: ordered[record.parts.len()].1.clone(),
                base: base.clone(),
                count: record.parts.len(),
            });
        }
        if ordered.len() < record.parts.len() {
            // A trailing part was left out
            return Err(Error::MissingPart {
                base: base.clone(),
                index: ordered.len() + 1,
            });
        }
        Some(record)
    } else {
        warn!(
            "No parts record at {}, joining without digest checks",
            record_path.display()
        );
        None
    };

    let out_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(out_dir).map_err(|e| Error::io(out_dir, e))?;
    let out_name = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("joined");
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", out_name))
        .suffix(".incomplete")
        .tempfile_in(out_dir)
        .map_err(|e| Error::io(out_dir, e))?;

    let total: u64 = ordered
        .iter()
        .map(|(_, p)| std::fs::metadata(p).map(|m| m.len()).unwrap_or(0))
        .sum();
    options.begin("Joining", total);

    let mut whole = Hasher::new(HashAlgorithm::Sha256);
    let mut buffer = vec![0u8; JOIN_BUFFER];
    let mut bytes = 0u64;

    for (position, (_, part)) in ordered.iter().enumerate() {
        let file = File::open(part).map_err(|e| Error::io(part, e))?;
        let mut reader = HashingReader::new(file, HashAlgorithm::Sha256);

        loop {
            options.check_cancelled("join")?;
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(part, e)),
            };
            temp.write_all(&buffer[..n])
                .map_err(|e| Error::io(output, e))?;
            whole.update(&buffer[..n]);
            options.advance(n as u64);
        }

        let length = reader.bytes_read();
        let (_, digest) = reader.finish();
        if let Some(expected) = record.as_ref().map(|r| &r.parts[position]) {
            if expected.length != length {
                return Err(Error::LengthMismatch {
                    path: part.clone(),
                    expected: expected.length,
                    actual: length,
                });
            }
            if expected.sha256 != digest.value {
                return Err(Error::ChecksumMismatch {
                    path: part.clone(),
                    algorithm: HashAlgorithm::Sha256,
                    expected: expected.sha256.clone(),
                    actual: digest.value,
                });
            }
        }
        debug!("Appended {} ({} bytes)", part.display(), length);
        bytes += length;
    }

    let sha256 = whole.finalize().value;
    if let Some(record) = &record {
        if record.size != bytes {
            return Err(Error::LengthMismatch {
                path: output.to_path_buf(),
                expected: record.size,
                actual: bytes,
            });
        }
        if record.sha256 != sha256 {
            return Err(Error::ChecksumMismatch {
                path: output.to_path_buf(),
                algorithm: HashAlgorithm::Sha256,
                expected: record.sha256.clone(),
                actual: sha256,
            });
        }
    }

    temp.as_file()
        .sync_all()
        .map_err(|e| Error::io(output, e))?;
    temp.persist(output)
        .map_err(|e| Error::io(output, e.error))?;
    options.finish("Join complete");
    info!(
        "Joined {} parts into {} ({} bytes, sha256 {})",
        ordered.len(),
        output.display(),
        bytes,
        sha256
    );

    Ok(JoinOutcome {
        bytes,
        sha256,
        verified: record.is_some(),
    })
}

/// Sort parts by index and check they form `1..=n` of one artifact
fn order_parts(parts: &[PathBuf]) -> Result<Vec<(String, PathBuf)>> {
    if parts.is_empty() {
        return Err(Error::InvalidPath("no part files given".to_string()));
    }

    let mut indexed = Vec::with_capacity(parts.len());
    for part in parts {
        let (base, index) = parse_part_name(part)?;
        indexed.push((index, base, part.clone()));
    }

    let expected_base = indexed[0].1.clone();
    if let Some((_, _, stray)) = indexed.iter().find(|(_, b, _)| *b != expected_base) {
        return Err(Error::MixedParts {
            expected: expected_base,
            found: stray.clone(),
        });
    }

    indexed.sort_by_key(|(index, _, _)| *index);
    for (position, (index, _, path)) in indexed.iter().enumerate() {
        let wanted = position + 1;
        if *index > wanted {
            return Err(Error::MissingPart {
                base: expected_base,
                index: wanted,
            });
        }
        if *index < wanted {
            // Same index given twice
            return Err(Error::InvalidPartName(path.clone()));
        }
    }

    Ok(indexed
        .into_iter()
        .map(|(_, base, path)| (base, path))
        .collect())
}
