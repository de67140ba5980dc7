//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations,
//! such as creating per-case work directories and copying local source trees.
//!
//! 此模块提供文件系统操作的实用功能，
//! 如创建每个用例的工作目录和复制源码树。

use anyhow::{Context, Result};
use fs_extra::dir::{CopyOptions, copy};
use std::fs;
use std::path::{Path, PathBuf};

/// The directories owned by one case during a run.
/// 一次运行中某个用例拥有的目录。
#[derive(Debug, Clone)]
pub struct CaseDirs {
    /// `<output>/<case>`: holds `debug.log`.
    pub root: PathBuf,
    /// `<output>/<case>/work`: scratch space for fetched sources and builds.
    pub workdir: PathBuf,
}

impl CaseDirs {
    pub fn log_path(&self) -> PathBuf {
        self.root.join("debug.log")
    }
}

/// Turns a case name into a safe directory name.
pub fn sanitize_name(case_name: &str) -> String {
    case_name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

/// Creates a fresh directory tree for a case under `output_dir`.
/// A leftover tree from an earlier run is removed first.
///
/// # Arguments
/// * `output_dir` - The run's output directory
/// * `case_name` - Name of the test case, used to create a unique directory name
pub fn create_case_dirs(output_dir: &Path, case_name: &str) -> Result<CaseDirs> {
    let root = output_dir.join(sanitize_name(case_name));

    if root.exists() {
        fs::remove_dir_all(&root).with_context(|| {
            format!("Failed to clean up old case directory: {}", root.display())
        })?;
    }

    let workdir = root.join("work");
    fs::create_dir_all(&workdir)
        .with_context(|| format!("Failed to create work directory: {}", workdir.display()))?;

    Ok(CaseDirs { root, workdir })
}

/// Copies the entire content of a source directory into a destination directory,
/// creating `to/<name of from>`.
///
/// # Arguments
/// * `from` - Source directory path
/// * `to` - Destination directory path
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<PathBuf> {
    fs::create_dir_all(to).with_context(|| format!("Failed to create {}", to.display()))?;
    let mut options = CopyOptions::new();
    options.overwrite = true;
    copy(from, to, &options).with_context(|| {
        format!("Failed to copy {} to {}", from.display(), to.display())
    })?;
    let name = from
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("source"));
    Ok(to.join(name))
}
