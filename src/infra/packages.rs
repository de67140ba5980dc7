//! # Package Management Module / 软件包管理模块
//!
//! The Dependency Resolver capability: is a package installed, and if not,
//! can it be installed? The real implementation drives the distribution's
//! package manager through the process runner.
//!
//! 依赖解析能力：软件包是否已安装？若未安装，能否安装？
//! 真实实现通过进程运行器驱动发行版的包管理器。

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;

use crate::infra::command::{CommandRequest, ProcessRunner, quote};
use crate::infra::platform::{DistroFamily, Platform};

#[async_trait]
pub trait DependencyResolver: Send + Sync {
    async fn is_installed(&self, package: &str) -> Result<bool>;

    /// Tries to install `package`; `Ok(false)` means the package manager refused.
    async fn install(&self, package: &str) -> Result<bool>;

    /// Installed already, or installed now.
    async fn ensure(&self, package: &str) -> Result<bool> {
        if self.is_installed(package).await? {
            return Ok(true);
        }
        self.install(package).await
    }
}

/// The package manager front end for a distribution family.
/// 某个发行版家族的包管理器前端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageBackend {
    Dnf,
    Apt,
    Zypper,
}

impl PackageBackend {
    pub fn for_family(family: DistroFamily) -> Option<Self> {
        match family {
            DistroFamily::RedHat => Some(PackageBackend::Dnf),
            DistroFamily::Debian => Some(PackageBackend::Apt),
            DistroFamily::Suse => Some(PackageBackend::Zypper),
            DistroFamily::Unknown => None,
        }
    }

    pub fn query_command(self, package: &str) -> String {
        let package = quote(package);
        match self {
            PackageBackend::Dnf | PackageBackend::Zypper => format!("rpm -q {}", package),
            PackageBackend::Apt => format!(
                "dpkg-query -W -f='${{Status}}' {} 2>/dev/null | grep -q 'install ok installed'",
                package
            ),
        }
    }

    pub fn install_command(self, package: &str) -> String {
        let package = quote(package);
        match self {
            PackageBackend::Dnf => format!("dnf -y install {}", package),
            PackageBackend::Apt => format!(
                "DEBIAN_FRONTEND=noninteractive apt-get -y install {}",
                package
            ),
            PackageBackend::Zypper => format!("zypper --non-interactive install {}", package),
        }
    }
}

/// Resolves packages with the distribution's own tools.
pub struct SoftwareManager {
    runner: Arc<dyn ProcessRunner>,
    backend: Option<PackageBackend>,
    distro: String,
}

impl SoftwareManager {
    pub fn new(runner: Arc<dyn ProcessRunner>, platform: &Platform) -> Self {
        Self {
            runner,
            backend: PackageBackend::for_family(platform.family()),
            distro: platform.distro.clone(),
        }
    }

    fn backend(&self) -> Result<PackageBackend> {
        self.backend.ok_or_else(|| {
            anyhow!(
                "no package manager known for distribution '{}'",
                self.distro
            )
        })
    }
}

#[async_trait]
impl DependencyResolver for SoftwareManager {
    async fn is_installed(&self, package: &str) -> Result<bool> {
        let backend = self.backend()?;
        let result = self
            .runner
            .run(&CommandRequest::shell(backend.query_command(package)))
            .await?;
        Ok(result.success())
    }

    async fn install(&self, package: &str) -> Result<bool> {
        let backend = self.backend()?;
        let result = self
            .runner
            .run(&CommandRequest::shell(backend.install_command(package)).sudo())
            .await?;
        Ok(result.success())
    }
}
