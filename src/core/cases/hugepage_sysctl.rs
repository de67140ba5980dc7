//! Configures the default-size hugepage pool through `/etc/sysctl.conf` and
//! checks that the kernel reports the requested number of pages.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::core::config::Params;
use crate::core::evaluator::{Evaluation, ExitPolicy};
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase, skip};
use crate::core::models::Outcome;
use crate::infra::platform::meminfo_value;

const SYSCTL_CONF: &str = "/etc/sysctl.conf";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HugepageSysctlOptions {
    #[serde(default = "default_num_pages", alias = "num_huge")]
    pub num_pages: u64,
    /// Hugepage size in MB, only reported.
    #[serde(default)]
    pub hpagesize: Option<u64>,
}

fn default_num_pages() -> u64 {
    10
}

pub struct HugepageSysctl {
    options: HugepageSysctlOptions,
    appended: bool,
}

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    Ok(Box::new(HugepageSysctl::new(params.decode()?)))
}

impl HugepageSysctl {
    pub fn new(options: HugepageSysctlOptions) -> Self {
        Self {
            options,
            appended: false,
        }
    }
}

#[async_trait]
impl TestCase for HugepageSysctl {
    fn kind(&self) -> &'static str {
        "hugepage_sysctl"
    }

    async fn setup(&mut self, ctx: &mut CaseContext) -> CaseResult<()> {
        let Some(size_kb) = meminfo_value(&ctx.platform.meminfo, "Hugepagesize") else {
            return Err(skip("Hugepagesize not defined in kernel."));
        };
        let size_mb = self.options.hpagesize.unwrap_or(size_kb / 1024);
        ctx.log
            .info(format!("Current default hugepage size is {}MB", size_mb));
        Ok(())
    }

    async fn run(&mut self, ctx: &mut CaseContext) -> CaseResult<Outcome> {
        let mut outcome = Outcome::new();
        let append = ctx
            .sudo(format!(
                "echo \"vm.nr_hugepages={}\" >> {}",
                self.options.num_pages, SYSCTL_CONF
            ))
            .await?;
        self.appended = append.success();
        outcome.push("append", append);
        outcome.push("apply", ctx.sudo("sysctl -p").await?);
        outcome.push("meminfo", ctx.shell("cat /proc/meminfo").await?);
        Ok(outcome)
    }

    fn evaluate(&self, outcome: &Outcome) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let policy = ExitPolicy::zero_only();
        if let Some(append) = outcome.result("append") {
            evaluation.check_exit(append, &policy, "could not update /etc/sysctl.conf");
        }
        if let Some(apply) = outcome.result("apply") {
            evaluation.check_exit(apply, &policy, "could not apply /etc/sysctl.conf");
        }
        let reported = outcome
            .result("meminfo")
            .and_then(|r| meminfo_value(&r.stdout, "HugePages_Total"));
        match reported {
            Some(count) if count == self.options.num_pages => {
                evaluation.note(format!("{} number of hugepages are configured", count));
            }
            Some(count) => evaluation.fail(format!(
                "Hugepage configuration failed: HugePages_Total is {}, expected {}",
                count, self.options.num_pages
            )),
            None => evaluation.fail("Hugepage configuration failed: HugePages_Total not reported"),
        }
        evaluation
    }

    async fn teardown(&mut self, ctx: &mut CaseContext) -> Result<()> {
        if !self.appended {
            return Ok(());
        }
        let result = ctx
            .sudo(format!("sed -i '$d' {}", SYSCTL_CONF))
            .await?;
        if !result.success() {
            bail!("could not restore {}: {}", SYSCTL_CONF, result.status_display());
        }
        self.appended = false;
        Ok(())
    }
}
