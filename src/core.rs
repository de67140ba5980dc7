//! # Core Module / 核心模块
//!
//! This module contains the core functionality of the runner:
//! data models, configuration, the test case lifecycle, result evaluation,
//! execution planning and the catalogue of built-in test cases.
//!
//! 此模块包含运行器的核心功能：
//! 数据模型、配置、测试用例生命周期、结果评估、执行计划以及内置测试用例目录。

pub mod cases;
pub mod config;
pub mod evaluator;
pub mod execution;
pub mod lifecycle;
pub mod models;
pub mod planner;

// Re-exports
pub use config::TestSuite;
pub use execution::run_test_case;
pub use models::{TestResult, Verdict};
