// tests/cli.rs

//! Run the toolpack binary and check exit codes and output.

mod common;

use common::{pseudo_random, toolchain_bin};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn toolpack() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_toolpack"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help() {
    let out = toolpack().arg("--help").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for command in ["dedup", "expand", "analyze", "package", "split", "join"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}

#[test]
fn test_analyze_reports_without_writing() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    toolchain_bin(&bin);

    let out = toolpack().args(["-q", "analyze"]).arg(&bin).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Duplicate groups (2)"));
    assert!(stdout.contains("* clang"));
    assert_eq!(fs::read_dir(&bin).unwrap().count(), 6);
}

#[test]
fn test_dedup_then_expand() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    let deduped = temp_dir.path().join("deduped");
    let expanded = temp_dir.path().join("expanded");
    toolchain_bin(&bin);

    let out = toolpack()
        .args(["-q", "dedup"])
        .arg(&bin)
        .arg(&deduped)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(deduped.join("dedup_manifest.json").exists());

    let out = toolpack()
        .args(["-q", "expand", "--verify"])
        .arg(&deduped)
        .arg(&expanded)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(fs::read_dir(&expanded).unwrap().count(), 6);
}

#[test]
fn test_expand_missing_manifest_fails() {
    let temp_dir = TempDir::new().unwrap();
    let out = toolpack()
        .args(["-q", "expand"])
        .arg(temp_dir.path())
        .arg(temp_dir.path().join("out"))
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("Error: "));
    assert!(stderr.contains("dedup_manifest.json"));
}

#[test]
fn test_split_and_join() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("big.bin");
    let data = pseudo_random(2 * 1024 * 1024 + 10, 5);
    fs::write(&file, &data).unwrap();

    let out = toolpack()
        .args(["-q", "split", "--part-size", "1"])
        .arg(&file)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(!file.exists());
    let part3 = temp_dir.path().join("big.bin.part3");
    assert!(part3.exists());

    let out = toolpack()
        .args(["-q", "join"])
        .arg(temp_dir.path().join("big.bin.part2"))
        .arg(&part3)
        .arg(temp_dir.path().join("big.bin.part1"))
        .arg(&file)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(fs::read(&file).unwrap(), data);
}

#[test]
fn test_join_missing_part_fails() {
    let temp_dir = TempDir::new().unwrap();
    let part1 = temp_dir.path().join("x.bin.part1");
    let part3 = temp_dir.path().join("x.bin.part3");
    fs::write(&part1, b"a").unwrap();
    fs::write(&part3, b"c").unwrap();

    let out = toolpack()
        .args(["-q", "join"])
        .arg(&part1)
        .arg(&part3)
        .arg(temp_dir.path().join("x.bin"))
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Missing part 2"));
    assert!(!temp_dir.path().join("x.bin").exists());
}

#[test]
fn test_package_and_verify_checksum() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    let dist = temp_dir.path().join("dist");
    toolchain_bin(&bin);

    let out = toolpack()
        .args(["-q", "package", "--name", "llvm", "--level", "1", "--threads", "0"])
        .arg(&bin)
        .arg(&dist)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(dist.join("llvm.tar.zst").exists());

    let out = toolpack()
        .args(["-q", "verify-checksum"])
        .arg(dist.join("llvm.tar.zst.sha256"))
        .output()
        .unwrap();
    assert!(out.status.success());

    let out = toolpack()
        .args(["-q", "verify"])
        .arg(dist.join("llvm.tar.zst"))
        .output()
        .unwrap();
    assert!(out.status.success());
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("toolpack.toml");
    fs::write(&config, "[compression]\nlevel = 40\n").unwrap();

    let out = toolpack()
        .arg("--config")
        .arg(&config)
        .args(["analyze"])
        .arg(temp_dir.path())
        .output()
        .unwrap();

    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("compression.level"));
}
