// src/checksum.rs

//! Checksum sidecars for finished artifacts
//!
//! A sidecar is one line, `"<hex>  <filename>\n"`, stored next to the
//! artifact as `<filename>.sha256` (or `.md5`). Sidecars are only ever
//! computed from a file that has been fully written and renamed into place.

use crate::error::{Error, Result};
use crate::hash::{ContentHash, HashAlgorithm, Hasher};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// A written or parsed sidecar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    /// Location of the sidecar file
    pub path: PathBuf,
    pub digest: ContentHash,
    /// Artifact file name recorded in the sidecar
    pub file_name: String,
}

/// `<artifact>.<ext>` for the given algorithm
pub fn sidecar_path(artifact: &Path, algorithm: HashAlgorithm) -> PathBuf {
    let mut name = artifact.as_os_str().to_owned();
    name.push(algorithm.sidecar_extension());
    PathBuf::from(name)
}

/// Render a sidecar line
pub fn format_line(digest: &ContentHash, file_name: &str) -> String {
    format!("{}  {}\n", digest, file_name)
}

/// Hash a file with several algorithms in one read pass
pub fn digest_file(
    path: &Path,
    algorithms: &[HashAlgorithm],
    block_size: usize,
) -> Result<Vec<ContentHash>> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hashers: Vec<Hasher> = algorithms.iter().map(|a| Hasher::new(*a)).collect();
    let mut buffer = vec![0u8; block_size.max(1)];

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(path, e)),
        };
        for hasher in &mut hashers {
            hasher.update(&buffer[..n]);
        }
    }

    Ok(hashers.into_iter().map(Hasher::finalize).collect())
}

/// Write one sidecar per algorithm next to `artifact`
pub fn write_sidecars(
    artifact: &Path,
    algorithms: &[HashAlgorithm],
    block_size: usize,
) -> Result<Vec<Sidecar>> {
    let file_name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(format!("no file name: {}", artifact.display())))?
        .to_string();

    let digests = digest_file(artifact, algorithms, block_size)?;
    let mut sidecars = Vec::with_capacity(digests.len());
    for digest in digests {
        let path = sidecar_path(artifact, digest.algorithm);
        write_atomic(&path, format_line(&digest, &file_name).as_bytes())?;
        info!("{}: {} ({})", digest.algorithm, digest, path.display());
        sidecars.push(Sidecar {
            path,
            digest,
            file_name: file_name.clone(),
        });
    }
    Ok(sidecars)
}

/// Parse sidecar content; the algorithm comes from the file extension
///
/// Accepts both the text form `"<hex>  <name>"` and the binary-mode form
/// `"<hex> *<name>"`.
pub fn parse_sidecar(path: &Path, content: &str) -> Result<Sidecar> {
    let invalid = |reason: String| Error::InvalidSidecar {
        path: path.to_path_buf(),
        reason,
    };

    let algorithm = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| invalid("no extension to infer the algorithm from".to_string()))?
        .parse::<HashAlgorithm>()
        .map_err(|e| invalid(e.to_string()))?;

    let line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| invalid("empty file".to_string()))?;
    let (hex, rest) = line
        .split_once(' ')
        .ok_or_else(|| invalid(format!("malformed line: {}", line)))?;
    let file_name = rest
        .strip_prefix(' ')
        .or_else(|| rest.strip_prefix('*'))
        .unwrap_or(rest)
        .trim_end();
    if file_name.is_empty() {
        return Err(invalid("missing file name".to_string()));
    }

    let digest = ContentHash::new(algorithm, hex).map_err(|e| invalid(e.to_string()))?;
    Ok(Sidecar {
        path: path.to_path_buf(),
        digest,
        file_name: file_name.to_string(),
    })
}

/// Re-hash the artifact named by a sidecar and compare
pub fn verify_sidecar(path: &Path, block_size: usize) -> Result<Sidecar> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let sidecar = parse_sidecar(path, &content)?;

    let artifact = path
        .parent()
        .unwrap_or(Path::new("."))
        .join(crate::filesystem::path::sanitize_filename(&sidecar.file_name)?);
    let actual = digest_file(&artifact, &[sidecar.digest.algorithm], block_size)?
        .pop()
        .ok_or_else(|| Error::InvalidSidecar {
            path: path.to_path_buf(),
            reason: "no digest computed".to_string(),
        })?;

    if actual != sidecar.digest {
        return Err(Error::ChecksumMismatch {
            path: artifact,
            algorithm: sidecar.digest.algorithm,
            expected: sidecar.digest.value.clone(),
            actual: actual.value,
        });
    }

    info!("{}: OK ({})", sidecar.file_name, sidecar.digest.algorithm);
    Ok(sidecar)
}

/// Write bytes to `path` through a temp file in the same directory
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| Error::io(parent, e))?;
    temp.write_all(bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| Error::io(path, e))?;
    temp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
