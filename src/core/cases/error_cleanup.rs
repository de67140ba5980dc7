//! A do-nothing case whose teardown always fails. Used to check that cleanup
//! errors are surfaced as harness errors rather than swallowed.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::core::config::Params;
use crate::core::evaluator::Evaluation;
use crate::core::lifecycle::{CaseContext, CaseResult, TestCase};
use crate::core::models::Outcome;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorCleanupOptions {}

pub struct ErrorCleanup;

pub fn build(params: &Params) -> Result<Box<dyn TestCase>> {
    let _options: ErrorCleanupOptions = params.decode()?;
    Ok(Box::new(ErrorCleanup))
}

#[async_trait]
impl TestCase for ErrorCleanup {
    fn kind(&self) -> &'static str {
        "error_cleanup"
    }

    async fn setup(&mut self, _ctx: &mut CaseContext) -> CaseResult<()> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &mut CaseContext) -> CaseResult<Outcome> {
        Ok(Outcome::new())
    }

    fn evaluate(&self, _outcome: &Outcome) -> Evaluation {
        Evaluation::new()
    }

    async fn teardown(&mut self, _ctx: &mut CaseContext) -> Result<()> {
        bail!("Test a bug in tearDown()")
    }

    fn teardown_is_fatal(&self) -> bool {
        true
    }
}
