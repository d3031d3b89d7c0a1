// src/filesystem/mod.rs

//! Filesystem operations
//!
//! - Path sanitization for names read from manifests and archives
//! - Expansion of a canonical store back into the full named file set
//! - Hard link inspection

pub mod expander;
pub mod links;
pub mod path;

pub use expander::{ExpansionReport, Materialized, StructureExpander, link_or_copy};
pub use links::{LinkReport, link_report};
