//! # Asset Fetching Module / 资源获取模块
//!
//! The Asset Fetcher capability: download a tarball, zip or single file, or clone
//! a git repository, into a cache shared between runs, and extract archives into
//! a case's work directory. Cached copies are reused until they are older than the
//! request's expiry (`"7d"`, `"12h"`, ...); without an expiry they never go stale.
//! Local paths are copied again on every fetch.
//!
//! 资源获取能力：将 tarball、zip、单个文件下载（或克隆 git 仓库）到多次运行共享的缓存中，
//! 并将归档解压到用例的工作目录。缓存副本在超过请求的过期时间（`"7d"`、`"12h"` 等）
//! 之前会被复用；未设置过期时间时永不过期。

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::infra::command::{CommandRequest, ProcessRunner, quote};

/// How an asset is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// A file fetched over HTTP(S)/FTP, or copied from a local path.
    #[default]
    Download,
    /// A git repository, shallow-cloned.
    Git,
}

/// What to fetch.
/// 要获取的资源。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    /// The file (or directory, for git) name inside the cache.
    /// 缓存中的文件名（git 为目录名）。
    pub name: String,
    /// Mirrors, tried in order until one succeeds.
    /// 镜像地址，按顺序尝试直到成功。
    pub locations: Vec<String>,
    /// Maximum age of a cached copy, e.g. `"7d"`.
    /// 缓存副本的最长有效期，例如 `"7d"`。
    #[serde(default)]
    pub expire: Option<String>,
    #[serde(default)]
    pub kind: AssetKind,
    /// Branch or tag to clone (git only).
    #[serde(default)]
    pub branch: Option<String>,
}

impl AssetRequest {
    pub fn download(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locations: vec![location.into()],
            expire: None,
            kind: AssetKind::Download,
            branch: None,
        }
    }

    pub fn git(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Git,
            ..Self::download(name, location)
        }
    }

    pub fn expire(mut self, expire: impl Into<String>) -> Self {
        self.expire = Some(expire.into());
        self
    }

    /// A download whose every location is a local path. Local copies are taken
    /// afresh on each fetch instead of being served from the cache.
    pub fn is_local(&self) -> bool {
        self.kind == AssetKind::Download && !self.locations.iter().any(|l| is_remote(l))
    }

    /// The cache directory key: stable across runs for the same primary location.
    pub fn cache_key(&self) -> String {
        let primary = self.locations.first().map(String::as_str).unwrap_or("");
        let digest = Sha256::digest(format!("{}\n{}", primary, self.name).as_bytes());
        format!("{:x}", digest)[..16].to_string()
    }
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Returns the path of the (possibly cached) asset.
    async fn fetch(&self, request: &AssetRequest) -> Result<PathBuf>;

    /// Extracts `archive` into `dest`. Returns the single top-level directory the
    /// archive created, or `dest` itself when it created several entries.
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf>;
}

/// Parses an expiry such as `"7d"`, `"12h"`, `"30m"`, `"45s"` or a bare number of seconds.
pub fn parse_expiry(text: &str) -> Result<Duration> {
    let text = text.trim();
    let (number, unit) = match text.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&text[..idx], c),
        _ => (text, 's'),
    };
    let value: u64 = number
        .trim()
        .parse()
        .with_context(|| format!("invalid expiry '{}'", text))?;
    let seconds = match unit.to_ascii_lowercase() {
        's' => value,
        'm' => value * 60,
        'h' => value * 3600,
        'd' => value * 86_400,
        other => bail!("invalid expiry unit '{}' in '{}'", other, text),
    };
    Ok(Duration::from_secs(seconds))
}

/// A cached copy is fresh if it exists and is younger than `expire`.
pub fn is_fresh(path: &Path, expire: Option<Duration>) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    match expire {
        None => true,
        Some(limit) => metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age < limit)
            .unwrap_or(false),
    }
}

fn is_remote(location: &str) -> bool {
    ["http://", "https://", "ftp://"]
        .iter()
        .any(|scheme| location.starts_with(scheme))
}

/// The extraction command for an archive, chosen by file name.
pub fn extract_command(archive: &Path, dest: &Path) -> Result<String> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let archive_q = quote(&archive.to_string_lossy());
    let dest_q = quote(&dest.to_string_lossy());
    let tar_suffixes = [
        ".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tbz2", ".tar.xz", ".txz",
    ];
    if tar_suffixes.iter().any(|s| name.ends_with(s)) {
        Ok(format!("tar -xf {} -C {}", archive_q, dest_q))
    } else if name.ends_with(".zip") {
        Ok(format!("unzip -o -q {} -d {}", archive_q, dest_q))
    } else {
        bail!("don't know how to extract '{}'", archive.display())
    }
}

/// Fetches assets with `curl` and `git` into `cache_dir`.
pub struct CachedFetcher {
    runner: Arc<dyn ProcessRunner>,
    cache_dir: PathBuf,
}

impl CachedFetcher {
    pub fn new(runner: Arc<dyn ProcessRunner>, cache_dir: PathBuf) -> Self {
        Self { runner, cache_dir }
    }

    pub fn cache_path(&self, request: &AssetRequest) -> PathBuf {
        self.cache_dir.join(request.cache_key()).join(&request.name)
    }

    async fn download(&self, request: &AssetRequest, target: &Path) -> Result<()> {
        let partial = target.with_extension("part");
        let mut errors = Vec::new();
        for location in &request.locations {
            if !is_remote(location) {
                match fs::copy(location, &partial) {
                    Ok(_) => {
                        fs::rename(&partial, target)?;
                        return Ok(());
                    }
                    Err(e) => {
                        errors.push(format!("{}: {}", location, e));
                        continue;
                    }
                }
            }
            let command = format!(
                "curl -fsSL --retry 2 -o {} {}",
                quote(&partial.to_string_lossy()),
                quote(location)
            );
            let result = self.runner.run(&CommandRequest::shell(command)).await?;
            if result.success() {
                fs::rename(&partial, target).with_context(|| {
                    format!("Failed to move downloaded asset to {}", target.display())
                })?;
                return Ok(());
            }
            errors.push(format!("{}: {}", location, result.status_display()));
        }
        let _ = fs::remove_file(&partial);
        bail!(
            "failed to fetch asset '{}' from any location ({})",
            request.name,
            errors.join(", ")
        )
    }

    async fn clone(&self, request: &AssetRequest, target: &Path) -> Result<()> {
        if target.exists() {
            fs::remove_dir_all(target).with_context(|| {
                format!("Failed to remove stale clone {}", target.display())
            })?;
        }
        let mut errors = Vec::new();
        for location in &request.locations {
            let branch = request
                .branch
                .as_deref()
                .map(|b| format!("-b {} ", quote(b)))
                .unwrap_or_default();
            let command = format!(
                "git clone --depth 1 {}{} {}",
                branch,
                quote(location),
                quote(&target.to_string_lossy())
            );
            let result = self.runner.run(&CommandRequest::shell(command)).await?;
            if result.success() {
                return Ok(());
            }
            errors.push(format!("{}: {}", location, result.status_display()));
        }
        bail!(
            "failed to clone '{}' from any location ({})",
            request.name,
            errors.join(", ")
        )
    }
}

#[async_trait]
impl AssetFetcher for CachedFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<PathBuf> {
        if request.locations.is_empty() {
            bail!("asset '{}' has no locations", request.name);
        }
        let expire = request.expire.as_deref().map(parse_expiry).transpose()?;
        let target = self.cache_path(request);
        if !request.is_local() && is_fresh(&target, expire) {
            return Ok(target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create asset cache {}", parent.display())
            })?;
        }
        match request.kind {
            AssetKind::Download => self.download(request, &target).await?,
            AssetKind::Git => self.clone(request, &target).await?,
        }
        Ok(target)
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let before = list_entries(dest)?;
        let command = extract_command(archive, dest)?;
        let result = self.runner.run(&CommandRequest::shell(command)).await?;
        if !result.success() {
            bail!(
                "failed to extract {}: {}\n{}",
                archive.display(),
                result.status_display(),
                result.stderr
            );
        }
        let created: Vec<PathBuf> = list_entries(dest)?
            .into_iter()
            .filter(|entry| !before.contains(entry))
            .collect();
        match created.as_slice() {
            [single] if single.is_dir() => Ok(single.clone()),
            _ => Ok(dest.to_path_buf()),
        }
    }
}

fn list_entries(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut entries = HashSet::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        entries.insert(entry?.path());
    }
    Ok(entries)
}
