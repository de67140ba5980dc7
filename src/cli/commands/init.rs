//! # Suite Initialization Module / 套件初始化模块
//!
//! This module provides functionality for initializing a new suite file
//! through an interactive command-line wizard. It helps users create a
//! `TestSuite.toml` file from templates of the built-in case kinds.
//!
//! 此模块通过交互式命令行向导提供初始化新套件文件的功能。
//! 它帮助用户根据内置用例类型的模板创建 `TestSuite.toml` 文件。

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::config::{CaseEntry, ParamValue, Params, TestSuite};
use crate::infra::t;

/// File written by `init`.
pub const SUITE_FILE: &str = "TestSuite.toml";

/// The templates offered by the wizard: `(key, kind)`.
const TEMPLATES: &[(&str, &str)] = &[
    ("script", "script"),
    ("netstat", "distro_tools"),
    ("hugepages", "hugepage_sysctl"),
    ("soft_dirty", "soft_dirty"),
    ("fs_fuzz", "fs_fuzz"),
];

fn list(items: &[&str]) -> ParamValue {
    ParamValue::List(items.iter().map(|s| ParamValue::from(*s)).collect())
}

fn template(key: &str) -> Option<CaseEntry> {
    let mut case = match key {
        "script" => {
            let mut case = CaseEntry::new("kernel-version", "script");
            case.with = Params::new()
                .with("command", "uname -r")
                .with("fail_patterns", list(&["unknown"]));
            case
        }
        "netstat" => {
            let mut case = CaseEntry::new("netstat", "distro_tools");
            case.with = Params::new()
                .with("tool", "netstat")
                .with("test_opt", "s,r,i");
            case
        }
        "hugepages" => {
            let mut case = CaseEntry::new("hugepage-sysctl", "hugepage_sysctl");
            case.with = Params::new().with("num_pages", 10i64);
            case.tags = vec!["memory".to_string()];
            case
        }
        "soft_dirty" => {
            let mut case = CaseEntry::new("soft-dirty", "soft_dirty");
            case.tags = vec!["memory".to_string()];
            case
        }
        "fs_fuzz" => {
            let mut case = CaseEntry::new("fs-fuzz", "fs_fuzz");
            case.tags = vec!["fs".to_string()];
            case
        }
        _ => return None,
    };
    case.timeout_secs = Some(600);
    Some(case)
}

fn default_suite(language: &str) -> TestSuite {
    TestSuite {
        language: language.to_string(),
        output_dir: PathBuf::from("kernel-test-results"),
        cache_dir: PathBuf::from("~/.cache/kernel-test-runner"),
        cases: ["script", "netstat", "hugepages"]
            .iter()
            .filter_map(|key| template(key))
            .collect(),
    }
}

/// Runs the interactive wizard to generate a `TestSuite.toml` file.
///
/// 运行交互式向导以生成 `TestSuite.toml` 文件。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    run_init_wizard_at(Path::new(SUITE_FILE), language, non_interactive)
}

pub fn run_init_wizard_at(config_path: &Path, language: &str, non_interactive: bool) -> Result<()> {
    let theme = ColorfulTheme::default();
    let path_str = config_path.display().to_string();

    if non_interactive {
        return write_config(config_path, &default_suite(language), language);
    }

    println!("\n{}", t!("init_wizard_welcome", locale = language).cyan().bold());
    println!("{}", t!("init_wizard_description", locale = language));

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init_overwrite_prompt", locale = language, path = &path_str))
            .default(false)
            .interact()
            .context(t!("init_user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init_aborted", locale = language));
            return Ok(());
        }
    }

    let labels: Vec<String> = TEMPLATES
        .iter()
        .map(|(key, kind)| {
            format!(
                "{} ({})",
                t!(format!("init_template_{}", key), locale = language),
                kind
            )
        })
        .collect();

    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init_case_selection_prompt", locale = language))
        .items(&labels)
        .interact()
        .context(t!("init_user_confirmation_failed", locale = language).to_string())?;

    if selections.is_empty() {
        println!("{}", t!("init_no_cases_selected", locale = language).yellow());
        return write_config(config_path, &default_suite(language), language);
    }

    let mut cases = Vec::new();
    for i in selections {
        let Some(mut case) = template(TEMPLATES[i].0) else {
            continue;
        };
        if case.kind == "script" {
            let command: String = Input::with_theme(&theme)
                .with_prompt(t!("init_custom_command_prompt", locale = language))
                .default("uname -r".to_string())
                .interact_text()?;
            case.with.insert("command", command);
        }
        cases.push(case);
    }

    let mut suite = default_suite(language);
    suite.cases = cases;
    write_config(config_path, &suite, language)
}

fn write_config(path: &Path, suite: &TestSuite, language: &str) -> Result<()> {
    let path_str = path.display().to_string();
    let toml_string = toml::to_string_pretty(suite)
        .context(t!("init_serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init_write_failed", locale = language, path = &path_str).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init_success_created", locale = language, path = &path_str).bold()
    );
    println!("{}", t!("init_usage_hint", locale = language));

    Ok(())
}
