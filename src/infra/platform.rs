//! # Platform Detection Module / 平台检测模块
//!
//! A snapshot of the machine under test, taken once per run: architecture,
//! distribution, kernel release and the `/proc` files cases use to decide
//! whether they apply at all.
//!
//! 被测机器的快照，每次运行采集一次：架构、发行版、内核版本，
//! 以及用例用来判断自身是否适用的 `/proc` 文件。

use serde::Serialize;
use std::fs;

/// The broad package-management family of a distribution.
/// 发行版所属的包管理家族。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistroFamily {
    RedHat,
    Debian,
    Suse,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Platform {
    /// Kernel-style architecture name, e.g. `x86_64`, `ppc64le`, `aarch64`.
    pub arch: String,
    /// os-release `ID`, lowercase (e.g. `rhel`, `ubuntu`, `sles`).
    pub distro: String,
    pub distro_version: String,
    pub kernel_release: String,
    #[serde(skip)]
    pub cpuinfo: String,
    #[serde(skip)]
    pub meminfo: String,
}

impl Platform {
    /// Reads the running system. Files that cannot be read leave their field empty.
    pub fn detect() -> Self {
        let read = |path: &str| fs::read_to_string(path).unwrap_or_default();
        let (distro, distro_version) = parse_os_release(&read("/etc/os-release"));
        Self {
            arch: normalized_arch().to_string(),
            distro,
            distro_version,
            kernel_release: read("/proc/sys/kernel/osrelease").trim().to_string(),
            cpuinfo: read("/proc/cpuinfo"),
            meminfo: read("/proc/meminfo"),
        }
    }

    pub fn family(&self) -> DistroFamily {
        match self.distro.as_str() {
            "rhel" | "centos" | "fedora" | "rocky" | "almalinux" | "ol" => DistroFamily::RedHat,
            "ubuntu" | "debian" => DistroFamily::Debian,
            "sles" | "sled" | "opensuse" | "opensuse-leap" | "opensuse-tumbleweed" => {
                DistroFamily::Suse
            }
            _ => DistroFamily::Unknown,
        }
    }

    /// IBM PowerVM LPAR.
    pub fn is_power_vm(&self) -> bool {
        self.cpuinfo.contains("pSeries")
    }

    /// IBM PowerNV (bare metal OPAL).
    pub fn is_power_nv(&self) -> bool {
        self.cpuinfo.contains("PowerNV")
    }

    pub fn is_power(&self) -> bool {
        self.arch.starts_with("ppc64")
    }

    pub fn has_meminfo_key(&self, key: &str) -> bool {
        meminfo_value(&self.meminfo, key).is_some()
    }
}

/// Maps Rust's architecture names onto the ones `uname -m` reports.
pub fn normalized_arch() -> &'static str {
    match std::env::consts::ARCH {
        "powerpc64" if cfg!(target_endian = "little") => "ppc64le",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Returns the `ID` and `VERSION_ID` of an os-release document.
pub fn parse_os_release(content: &str) -> (String, String) {
    let mut id = String::new();
    let mut version = String::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key.trim() {
            "ID" => id = value.to_lowercase(),
            "VERSION_ID" => version = value.to_string(),
            _ => {}
        }
    }
    (id, version)
}

/// Reads the numeric value of `key` from `/proc/meminfo` text,
/// e.g. `HugePages_Total:      10` or `Hugepagesize:    2048 kB`.
pub fn meminfo_value(meminfo: &str, key: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != key {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}
