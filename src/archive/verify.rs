// src/archive/verify.rs

//! Re-check a packaged archive against the policy that produced it
//!
//! Every regular file and hard link record must carry exactly the mode the
//! policy assigns to its path. All mismatches are collected before failing.

use super::policy::PermissionPolicy;
use crate::compression::open_decoder;
use crate::error::{Error, Result};
use crate::filesystem::path::archive_path;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tar::{Archive, EntryType};
use tracing::{error, info};

/// Mismatches listed in the error message before truncating
const SUMMARY_LIMIT: usize = 10;

/// One entry whose stored mode disagrees with the policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionMismatch {
    pub path: String,
    pub expected: u32,
    pub actual: u32,
}

impl fmt::Display for PermissionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {:o}, found {:o}",
            self.path, self.expected, self.actual
        )
    }
}

/// Outcome of scanning an archive
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Entries whose mode was checked
    pub checked: usize,
    pub mismatches: Vec<PermissionMismatch>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Scan a tar stream and collect mismatches without failing
pub fn scan_permissions<R: Read>(
    reader: R,
    policy: &PermissionPolicy,
    archive: &Path,
) -> Result<VerifyReport> {
    let io_err = |e: std::io::Error| Error::io(archive, e);
    let mut tar = Archive::new(reader);
    let mut report = VerifyReport::default();

    for entry in tar.entries().map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let header = entry.header();
        if !matches!(header.entry_type(), EntryType::Regular | EntryType::Link) {
            continue;
        }

        let path = archive_path(&entry.path().map_err(io_err)?);
        let actual = header.mode().map_err(io_err)? & 0o7777;
        let expected = policy.mode_for(&path);
        report.checked += 1;

        if actual != expected {
            report.mismatches.push(PermissionMismatch {
                path,
                expected,
                actual,
            });
        }
    }

    Ok(report)
}

/// Verify an archive file, failing on any mismatch
///
/// Compressed archives are decoded on the fly.
pub fn verify_archive(archive: &Path, policy: &PermissionPolicy) -> Result<VerifyReport> {
    let (_, reader) = open_decoder(archive)?;
    let report = scan_permissions(reader, policy, archive)?;

    if !report.is_clean() {
        for mismatch in &report.mismatches {
            error!("Permission mismatch in {}: {}", archive.display(), mismatch);
        }
        let mut summary = report
            .mismatches
            .iter()
            .take(SUMMARY_LIMIT)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        if report.mismatches.len() > SUMMARY_LIMIT {
            summary.push_str(&format!(
                "; and {} more",
                report.mismatches.len() - SUMMARY_LIMIT
            ));
        }
        return Err(Error::PermissionViolations {
            archive: archive.to_path_buf(),
            count: report.mismatches.len(),
            summary,
        });
    }

    info!(
        "Verified permissions of {} entries in {}",
        report.checked,
        archive.display()
    );
    Ok(report)
}
