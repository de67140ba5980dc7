//! # Evaluator Unit Tests / 评估器单元测试
//!
//! Rule scanning, exit policies, numeric thresholds and the aggregation of
//! failure reasons.
//!
//! 规则扫描、退出码策略、数值阈值以及失败原因的汇总。

use kernel_test_runner::core::evaluator::{
    Evaluation, ExitJudgement, ExitPolicy, Rule, RuleSet, Severity, Threshold, column_values,
    exceeds, number_before, parse_number, zero_percent,
};
use kernel_test_runner::core::models::{CommandResult, Verdict};

#[cfg(test)]
mod rule_set_tests {
    use super::*;

    #[test]
    fn test_scan_reports_first_matching_line_per_rule() {
        let rules = RuleSet::failing_on(["FAIL", "Segmentation fault"]);
        let text = "step 1 ok\nstep 2 FAIL: bits lost\nstep 3 FAIL again\n";

        let findings = rules.scan(text);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule.pattern, "FAIL");
        assert_eq!(findings[0].line, "step 2 FAIL: bits lost");
        assert_eq!(
            findings[0].describe("stdout"),
            "'FAIL' found in stdout: step 2 FAIL: bits lost"
        );
    }

    #[test]
    fn test_ignore_case_rules_match_any_case() {
        let strict = RuleSet::new(vec![Rule::fail("call trace:")]);
        let relaxed = RuleSet::new(vec![Rule::fail("call trace:").ignore_case()]);
        let text = "[  12.3] Call Trace:\n";

        assert!(strict.scan(text).is_empty());
        assert_eq!(relaxed.scan(text).len(), 1);
    }

    #[test]
    fn test_custom_message_replaces_generic_description() {
        let rules = RuleSet::new(vec![
            Rule::fail("soft lockup").with_message("CPU got stuck"),
        ]);
        let findings = rules.scan("watchdog: BUG: soft lockup - CPU#3 stuck for 22s!  ");

        assert_eq!(
            findings[0].describe("dmesg"),
            "CPU got stuck (dmesg: watchdog: BUG: soft lockup - CPU#3 stuck for 22s!)"
        );
    }

    #[test]
    fn test_apply_sorts_findings_by_severity() {
        let rules = RuleSet::new(vec![
            Rule::fail("Oops"),
            Rule::warn("deprecated"),
            Rule::info("tainted"),
        ]);
        let mut evaluation = Evaluation::new();

        rules.apply(
            "dmesg",
            "Kernel tainted\nflag deprecated\nOops: 0000 [#1] SMP\n",
            &mut evaluation,
        );

        assert_eq!(evaluation.failures().len(), 1);
        assert_eq!(evaluation.warnings().len(), 1);
        assert_eq!(evaluation.notes().len(), 1);
        assert_eq!(evaluation.verdict(), Verdict::Fail);
    }

    #[test]
    fn test_warnings_alone_do_not_fail() {
        let rules = RuleSet::new(vec![Rule::warn("slow path")]);
        let mut evaluation = Evaluation::new();
        rules.apply("stdout", "took the slow path", &mut evaluation);

        assert_eq!(evaluation.verdict(), Verdict::Pass);
        assert_eq!(evaluation.reason(), None);
    }

    #[test]
    fn test_kernel_oops_catches_the_usual_markers() {
        let oops = RuleSet::kernel_oops();
        let clean = "[    0.000000] Linux version 6.8.0\n[    1.2] EXT4-fs mounted\n";
        let broken = "[  100.1] BUG: unable to handle page fault\n[  100.2] call trace:\n";

        assert!(oops.scan(clean).is_empty());
        let patterns: Vec<_> = oops
            .scan(broken)
            .into_iter()
            .map(|f| f.rule.pattern)
            .collect();
        assert_eq!(patterns, vec!["BUG:".to_string(), "Call Trace:".to_string()]);
    }

    #[test]
    fn test_rule_set_deserializes_from_toml_list() {
        #[derive(serde::Deserialize)]
        struct Holder {
            rules: RuleSet,
        }
        let holder: Holder = toml::from_str(
            r#"
            rules = [
                { pattern = "FAIL" },
                { pattern = "warning", severity = "warn", ignore_case = true },
            ]
            "#,
        )
        .unwrap();

        assert_eq!(holder.rules.rules().len(), 2);
        assert_eq!(holder.rules.rules()[0].severity, Severity::Fail);
        assert_eq!(holder.rules.rules()[1].severity, Severity::Warn);
        assert!(holder.rules.rules()[1].ignore_case);
    }
}

#[cfg(test)]
mod exit_policy_tests {
    use super::*;

    fn exited(code: Option<i32>) -> CommandResult {
        CommandResult::new("tool --flag", code, "", "")
    }

    #[test]
    fn test_zero_only_is_the_default() {
        let policy = ExitPolicy::default();
        assert_eq!(policy.judge(&exited(Some(0))), ExitJudgement::Accepted);
        assert_eq!(policy.judge(&exited(Some(1))), ExitJudgement::Rejected);
        assert_eq!(policy.judge(&exited(None)), ExitJudgement::Rejected);
    }

    #[test]
    fn test_non_standard_codes_and_not_applicable() {
        let policy = ExitPolicy::accepting(&[0, 1]).with_not_applicable(&[129]);
        assert_eq!(policy.judge(&exited(Some(1))), ExitJudgement::Accepted);
        assert_eq!(policy.judge(&exited(Some(129))), ExitJudgement::NotApplicable);
        assert_eq!(policy.judge(&exited(Some(2))), ExitJudgement::Rejected);
    }

    #[test]
    fn test_timeout_is_always_rejected_unless_ignored() {
        let mut result = exited(Some(0));
        result.timed_out = true;

        assert_eq!(ExitPolicy::zero_only().judge(&result), ExitJudgement::Rejected);
        assert_eq!(
            ExitPolicy::ignore_status().judge(&result),
            ExitJudgement::Accepted
        );
    }

    #[test]
    fn test_check_exit_records_the_command_and_status() {
        let mut evaluation = Evaluation::new();
        let judgement = evaluation.check_exit(
            &exited(Some(3)),
            &ExitPolicy::zero_only(),
            "fsfuzz exited abnormally",
        );

        assert_eq!(judgement, ExitJudgement::Rejected);
        assert_eq!(
            evaluation.failures(),
            &["fsfuzz exited abnormally (`tool --flag`: exit status 3)".to_string()]
        );
    }
}

#[cfg(test)]
mod threshold_tests {
    use super::*;

    #[test]
    fn test_zero_count_threshold() {
        let samples = [1.0, 0.0, 3.0, 0.0];
        assert!(Threshold::ZeroCountAtMost(2).check(&samples).is_ok());
        assert_eq!(
            Threshold::ZeroCountAtMost(1).check(&samples).unwrap_err(),
            "2 of 4 samples are zero (at most 1 allowed)"
        );
    }

    #[test]
    fn test_zero_percent_threshold() {
        let samples = [0.0, 0.0, 5.0, 5.0];
        assert_eq!(zero_percent(&samples), 50.0);
        assert_eq!(zero_percent(&[]), 0.0);
        assert!(Threshold::ZeroPercentAtMost(50.0).check(&samples).is_ok());
        assert_eq!(
            Threshold::ZeroPercentAtMost(20.0).check(&samples).unwrap_err(),
            "50.0% of samples are zero (at most 20.0% allowed)"
        );
    }

    #[test]
    fn test_at_least_threshold_names_the_offending_sample() {
        assert!(Threshold::AtLeast(1.0).check(&[1.0, 2.5]).is_ok());
        assert_eq!(
            Threshold::AtLeast(1.0).check(&[1.0, 0.5]).unwrap_err(),
            "sample 0.5 is below the minimum 1"
        );
    }

    #[test]
    fn test_exceeds_is_strict() {
        assert!(exceeds(10.0, 9.5));
        assert!(!exceeds(10.0, 10.0));
    }
}

#[cfg(test)]
mod extraction_tests {
    use super::*;

    #[test]
    fn test_parse_number_handles_thousands_separators() {
        assert_eq!(parse_number("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_number(" 42.5 "), Some(42.5));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_number_before_marker() {
        let output = "12 threads\n38,400 records/s\n";
        assert_eq!(number_before(output, "records/s"), Some(38_400.0));
        assert_eq!(number_before(output, "bytes/s"), None);
    }

    #[test]
    fn test_column_values_skips_headers_and_garbage() {
        let output = "\
#           time             counts unit events
     1.001  0      hv_24x7/PM_PB_CYC/
     2.002  1,024  hv_24x7/PM_PB_CYC/

     3.003  <not counted>  hv_24x7/PM_PB_CYC/
";
        let values = column_values(output, 1, &["#"]);
        assert_eq!(values, vec![0.0, 1024.0]);
    }
}

#[cfg(test)]
mod evaluation_tests {
    use super::*;

    #[test]
    fn test_reason_aggregates_multiple_failures() {
        let mut evaluation = Evaluation::new();
        assert_eq!(evaluation.verdict(), Verdict::Pass);

        evaluation.fail("a");
        assert_eq!(evaluation.reason().as_deref(), Some("a"));

        evaluation.fail("b");
        assert_eq!(evaluation.verdict(), Verdict::Fail);
        assert_eq!(evaluation.reason().as_deref(), Some("2 failures: a; b"));
    }
}
