//! # Built-in Test Cases Module / 内置测试用例模块
//!
//! The catalogue of case kinds a suite file can name in its `kind` field.
//! Each kind decodes its parameters into a typed options struct when the suite
//! is loaded, so a misspelt key or ill-typed value is reported before anything runs.
//!
//! 套件文件可以在 `kind` 字段中引用的用例类型目录。
//! 每种类型在加载套件时就把参数解码为强类型选项结构体，
//! 因此拼写错误的键或类型错误的值会在任何用例运行之前被报告。

pub mod distro_tools;
pub mod ebizzy_perf_top;
pub mod error_cleanup;
pub mod flail;
pub mod fs_fuzz;
pub mod hugepage_sysctl;
pub mod imc_nonzero;
pub mod perf_options;
pub mod script;
pub mod smt_folding;
pub mod soft_dirty;

use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;

use crate::core::config::{CaseEntry, Params, TestSuite};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, cancel};
use crate::infra::assets::AssetRequest;
use crate::infra::platform::{DistroFamily, Platform};
use crate::infra::t;

/// Default location of the ebizzy 0.3 tarball.
pub const EBIZZY_URL: &str =
    "https://sourceforge.net/projects/ebizzy/files/ebizzy/0.3/ebizzy-0.3.tar.gz";

/// One entry of the catalogue.
pub struct CaseKind {
    pub name: &'static str,
    /// i18n key of the one-line description shown by `list`.
    pub summary_key: &'static str,
    build: fn(&Params) -> Result<Box<dyn TestCase>>,
}

impl CaseKind {
    pub fn build(&self, params: &Params) -> Result<Box<dyn TestCase>> {
        (self.build)(params)
    }

    pub fn summary(&self, locale: &str) -> String {
        t!(self.summary_key, locale = locale).to_string()
    }
}

static KINDS: &[CaseKind] = &[
    CaseKind {
        name: "script",
        summary_key: "kinds.script",
        build: script::build,
    },
    CaseKind {
        name: "distro_tools",
        summary_key: "kinds.distro_tools",
        build: distro_tools::build,
    },
    CaseKind {
        name: "hugepage_sysctl",
        summary_key: "kinds.hugepage_sysctl",
        build: hugepage_sysctl::build,
    },
    CaseKind {
        name: "soft_dirty",
        summary_key: "kinds.soft_dirty",
        build: soft_dirty::build,
    },
    CaseKind {
        name: "fs_fuzz",
        summary_key: "kinds.fs_fuzz",
        build: fs_fuzz::build,
    },
    CaseKind {
        name: "flail",
        summary_key: "kinds.flail",
        build: flail::build,
    },
    CaseKind {
        name: "error_cleanup",
        summary_key: "kinds.error_cleanup",
        build: error_cleanup::build,
    },
    CaseKind {
        name: "imc_nonzero",
        summary_key: "kinds.imc_nonzero",
        build: imc_nonzero::build,
    },
    CaseKind {
        name: "smt_folding",
        summary_key: "kinds.smt_folding",
        build: smt_folding::build,
    },
    CaseKind {
        name: "ebizzy_perf_top",
        summary_key: "kinds.ebizzy_perf_top",
        build: ebizzy_perf_top::build,
    },
    CaseKind {
        name: "perf_options",
        summary_key: "kinds.perf_options",
        build: perf_options::build,
    },
];

pub fn kinds() -> &'static [CaseKind] {
    KINDS
}

pub fn find(name: &str) -> Option<&'static CaseKind> {
    KINDS.iter().find(|k| k.name == name)
}

/// Builds the case behind a suite entry from already-resolved parameters.
pub fn instantiate(entry: &CaseEntry, params: &Params) -> Result<Box<dyn TestCase>> {
    let kind = find(&entry.kind).ok_or_else(|| {
        anyhow!(
            "case '{}': unknown case kind '{}' (see `kernel-test-runner list`)",
            entry.name,
            entry.kind
        )
    })?;
    kind.build(params)
        .with_context(|| format!("case '{}' ({})", entry.name, entry.kind))
}

/// Resolves the parameters of a suite entry and builds its case.
pub fn prepare(entry: &CaseEntry) -> Result<Box<dyn TestCase>> {
    let params = entry
        .resolve_params()
        .with_context(|| format!("case '{}'", entry.name))?;
    instantiate(entry, &params)
}

/// Checks every case of a suite up front. All problems are reported together.
pub fn validate_suite(suite: &TestSuite) -> Result<()> {
    let problems: Vec<String> = suite
        .cases
        .iter()
        .filter_map(|entry| prepare(entry).err().map(|e| format!("{:#}", e)))
        .collect();
    if !problems.is_empty() {
        bail!("invalid cases:\n  {}", problems.join("\n  "));
    }
    Ok(())
}

/// The packages that provide `perf` on this distribution.
pub(crate) fn perf_packages(platform: &Platform) -> CaseResult<Vec<String>> {
    match platform.family() {
        DistroFamily::Debian if platform.distro == "ubuntu" => Ok(vec![
            "linux-tools-common".to_string(),
            format!("linux-tools-{}", platform.kernel_release),
        ]),
        DistroFamily::Debian => Ok(vec!["linux-perf".to_string()]),
        DistroFamily::RedHat | DistroFamily::Suse => Ok(vec!["perf".to_string()]),
        DistroFamily::Unknown => Err(cancel(format!(
            "perf is not supported on {}",
            display_distro(platform)
        ))),
    }
}

fn display_distro(platform: &Platform) -> &str {
    if platform.distro.is_empty() {
        "this distribution"
    } else {
        &platform.distro
    }
}

/// The file name at the end of a URL or path, used as the cache name.
pub(crate) fn asset_name(location: &str) -> String {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("asset")
        .to_string()
}

/// Fetches, extracts, configures and builds ebizzy; returns its source directory.
pub(crate) async fn build_ebizzy(
    ctx: &mut CaseContext,
    location: &str,
    patch: Option<&str>,
    make_args: &str,
) -> CaseResult<PathBuf> {
    let request = AssetRequest::download(asset_name(location), location).expire("7d");
    let tarball = ctx.fetch_asset(&request).await?;
    let source_dir = ctx.extract(&tarball).await?;

    if let Some(patch) = patch {
        let patch_request = AssetRequest::download(asset_name(patch), patch);
        let patch_file = ctx.fetch_asset(&patch_request).await?;
        let command = format!(
            "patch -p0 < {}",
            crate::infra::command::quote(&patch_file.to_string_lossy())
        );
        let result = ctx.shell_in(&source_dir, command).await?;
        if !result.success() {
            return Err(cancel(format!(
                "could not apply {}: {}",
                patch,
                result.status_display()
            )));
        }
    }

    ctx.configure(&source_dir, "").await?;
    ctx.make(&source_dir, None, make_args).await?;
    Ok(source_dir)
}
