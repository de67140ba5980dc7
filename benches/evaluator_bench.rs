use criterion::{Criterion, criterion_group, criterion_main};
use kernel_test_runner::core::evaluator::{RuleSet, column_values};
use std::hint::black_box;

fn synthetic_dmesg(lines: usize) -> String {
    let mut text = String::with_capacity(lines * 64);
    for i in 0..lines {
        text.push_str(&format!(
            "[{:>8}.{:06}] EXT4-fs (sda{}): mounted filesystem with ordered data mode\n",
            i / 1000,
            i % 1000,
            i % 8
        ));
    }
    text.push_str("[ 9999.000001] BUG: soft lockup - CPU#3 stuck for 22s!\n");
    text
}

fn synthetic_perf_stat(samples: usize) -> String {
    let mut text = String::from("#           time             counts unit events\n");
    for i in 0..samples {
        text.push_str(&format!(
            "{:>14.9} {:>18} hv_24x7/PM_PB_CYC,chip=0/\n",
            i as f64 * 0.1,
            (i * 1_013) % 100_000
        ));
    }
    text
}

fn bench_kernel_oops_scan(c: &mut Criterion) {
    let dmesg = synthetic_dmesg(50_000);
    let rules = RuleSet::kernel_oops();

    c.bench_function("kernel_oops_scan_50k_lines", |b| {
        b.iter(|| rules.scan(black_box(&dmesg)));
    });
}

fn bench_column_values(c: &mut Criterion) {
    let output = synthetic_perf_stat(20_000);

    c.bench_function("column_values_20k_samples", |b| {
        b.iter(|| column_values(black_box(&output), 1, &["#"]));
    });
}

criterion_group!(benches, bench_kernel_oops_scan, bench_column_values);
criterion_main!(benches);
