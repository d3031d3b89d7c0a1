// src/archive/mod.rs

//! Tar archive creation, permission verification and extraction

pub mod extract;
pub mod packager;
pub mod policy;
pub mod verify;

pub use extract::{ExtractReport, extract_archive};
pub use packager::{ArchivePackager, PackageReport, source_date_epoch};
pub use policy::{PermissionPolicy, PolicyRule};
pub use verify::{PermissionMismatch, VerifyReport, verify_archive};
