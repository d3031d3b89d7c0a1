// src/split/splitter.rs

use super::{JOIN_SCRIPT_SUFFIX, PartRecord, PartsRecord, join_script, part_file_name};
use crate::checksum::write_atomic;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::hash::{HashAlgorithm, Hasher};
use crate::options::RunOptions;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Files produced by a split
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub parts: Vec<PathBuf>,
    pub record: PartsRecord,
    pub record_path: PathBuf,
    pub join_script: PathBuf,
}

/// Split `artifact` into `part_size`-byte parts
///
/// Parts go to `output_dir` (default: the artifact's directory). Once every
/// part is written, synced and accounted for, the original artifact is
/// removed. On failure the parts written so far are removed instead and the
/// original is left in place.
pub fn split_artifact(
    artifact: &Path,
    part_size: u64,
    output_dir: Option<&Path>,
    options: &RunOptions,
) -> Result<SplitOutcome> {
    if part_size == 0 {
        return Err(Error::InvalidConfig("part size must be positive".to_string()));
    }

    let name = artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(format!("no file name: {}", artifact.display())))?
        .to_string();
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| artifact.parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

    let mut source = File::open(artifact).map_err(|e| Error::io(artifact, e))?;
    let size = source.metadata().map_err(|e| Error::io(artifact, e))?.len();
    if size == 0 {
        return Err(Error::EmptyArtifact(artifact.to_path_buf()));
    }

    let expected_parts = size.div_ceil(part_size) as usize;
    info!(
        "Splitting {} ({} bytes) into {} parts of up to {} bytes",
        artifact.display(),
        size,
        expected_parts,
        part_size
    );
    options.begin("Splitting", size);

    let mut written: Vec<PathBuf> = Vec::with_capacity(expected_parts);
    let result = write_parts(
        &mut source,
        &name,
        &dir,
        size,
        part_size,
        options,
        &mut written,
    );

    let (records, whole) = match result {
        Ok(done) => done,
        Err(e) => {
            for part in &written {
                if let Err(remove_err) = fs::remove_file(part) {
                    warn!("Could not remove partial part {}: {}", part.display(), remove_err);
                }
            }
            return Err(e);
        }
    };

    let record = PartsRecord {
        artifact: name.clone(),
        size,
        sha256: whole,
        part_size,
        parts: records,
    };
    let record_path = PartsRecord::path_for(&dir, &name);
    record.save(&record_path)?;

    let part_names: Vec<String> = record.parts.iter().map(|p| p.file_name.clone()).collect();
    let script_path = dir.join(format!("{}{}", name, JOIN_SCRIPT_SUFFIX));
    write_atomic(&script_path, join_script(&name, &part_names).as_bytes())?;
    make_executable(&script_path)?;

    drop(source);
    fs::remove_file(artifact).map_err(|e| Error::io(artifact, e))?;
    options.finish("Split complete");
    info!(
        "Split {} into {} parts; removed the original",
        name,
        written.len()
    );

    Ok(SplitOutcome {
        parts: written,
        record,
        record_path,
        join_script: script_path,
    })
}

fn write_parts(
    source: &mut File,
    name: &str,
    dir: &Path,
    size: u64,
    part_size: u64,
    options: &RunOptions,
    written: &mut Vec<PathBuf>,
) -> Result<(Vec<PartRecord>, String)> {
    let mut whole = Hasher::new(HashAlgorithm::Sha256);
    let mut buffer = vec![0u8; DEFAULT_CHUNK_SIZE.min(part_size as usize).max(1)];
    let mut records = Vec::new();
    let mut offset = 0u64;
    let mut index = 1;

    while offset < size {
        let part_name = part_file_name(name, index);
        let part_path = dir.join(&part_name);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", part_name))
            .suffix(".incomplete")
            .tempfile_in(dir)
            .map_err(|e| Error::io(dir, e))?;

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        let mut remaining = part_size.min(size - offset);
        let mut length = 0u64;
        while remaining > 0 {
            options.check_cancelled("split")?;
            let want = (buffer.len() as u64).min(remaining) as usize;
            let n = match source.read(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::io(name, e)),
            };
            temp.write_all(&buffer[..n])
                .map_err(|e| Error::io(&part_path, e))?;
            hasher.update(&buffer[..n]);
            whole.update(&buffer[..n]);
            remaining -= n as u64;
            length += n as u64;
            options.advance(n as u64);
        }

        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(&part_path, e))?;
        let file = temp
            .persist(&part_path)
            .map_err(|e| Error::io(&part_path, e.error))?;
        written.push(part_path.clone());

        let on_disk = file.metadata().map_err(|e| Error::io(&part_path, e))?.len();
        if length == 0 || on_disk != length {
            return Err(Error::LengthMismatch {
                path: part_path,
                expected: length,
                actual: on_disk,
            });
        }

        let digest = hasher.finalize();
        debug!("{} {} ({} bytes)", digest, part_name, length);
        records.push(PartRecord {
            index,
            file_name: part_name,
            offset,
            length,
            sha256: digest.value,
        });
        offset += length;
        index += 1;
    }

    let total: u64 = records.iter().map(|r| r.length).sum();
    if total != size {
        return Err(Error::LengthMismatch {
            path: PathBuf::from(name),
            expected: size,
            actual: total,
        });
    }

    Ok((records, whole.finalize().value))
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
