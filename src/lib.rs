//! # Kernel Test Runner Library / 内核测试运行器库
//!
//! This library provides the harness behind the `kernel-test-runner` tool: a
//! configuration-driven executor for kernel and OS validation test cases. Each
//! case resolves its OS dependencies, fetches and builds third-party tools,
//! runs them and judges their output, logs or the kernel ring buffer.
//!
//! 此库为 `kernel-test-runner` 工具提供测试框架：
//! 一个配置驱动的内核与操作系统验证用例执行器。每个用例会解析操作系统依赖、
//! 获取并构建第三方工具、运行它们并根据输出、日志或内核环形缓冲区判定结果。
//!
//! ## Modules / 模块
//!
//! - `core` - Test case lifecycle, result evaluation, configuration and the built-in case catalogue
//! - `infra` - Capabilities backed by external commands: processes, packages, assets, builds
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 测试用例生命周期、结果评估、配置以及内置用例目录
//! - `infra` - 基于外部命令的能力：进程、软件包、资源、构建
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::evaluator;
pub use core::lifecycle;
pub use core::models;

/// Initializes the application's internationalization (i18n) based on the system locale.
///
/// This function detects the user's system locale and sets the appropriate
/// language for the application's user interface. It attempts to match the full
/// locale (e.g., "zh-CN"), then just the language code (e.g., "en"), and
/// finally falls back to the default language ("en").
pub fn init() {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    set_language(&locale);
}

/// Selects the closest available locale for `requested` and activates it.
/// Returns the locale that was actually applied.
///
/// 为 `requested` 选择最接近的可用语言并激活它，返回实际应用的语言。
pub fn set_language(requested: &str) -> String {
    let available_locales = rust_i18n::available_locales!();

    let lang = if available_locales.contains(&requested) {
        requested
    } else {
        requested
            .split('-')
            .next()
            .filter(|lang_code| available_locales.contains(lang_code))
            .unwrap_or("en")
    };

    rust_i18n::set_locale(lang);
    lang.to_string()
}

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");
