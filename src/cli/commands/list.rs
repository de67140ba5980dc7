//! # List Command Module / 列表命令模块
//!
//! Prints the built-in case kinds a suite file can use.
//! 打印套件文件可以使用的内置用例类型。

use colored::*;

use crate::core::cases;
use crate::infra::t;

pub fn execute(locale: &str) {
    println!("{}", t!("list_header", locale = locale).bold());
    for kind in cases::kinds() {
        println!("  {:<18} {}", kind.name.cyan(), kind.summary(locale));
    }
}
