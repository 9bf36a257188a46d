//! Benchmarks for filter list compilation.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ep_compiler::{build, parse_line, CompilerConfig, ListInput, ListSpec};
use ep_core::types::Disposition;

/// A synthetic list with the usual EasyList mix of line kinds.
fn synthetic_list(lines: usize) -> String {
    let mut out = String::from("[Adblock Plus 2.0]\n! Title: Synthetic\n");
    for i in 0..lines {
        let line = match i % 6 {
            0 => format!("||ads{i}.example^$third-party"),
            1 => format!("/banner{i}/*$image,script"),
            2 => format!("@@||cdn{i}.example^$domain=site{i}.com"),
            3 => format!("##.ad-slot-{i}"),
            4 => format!("site{i}.com,~m.site{i}.com##.promo-{i}"),
            _ => format!("site{i}.com#?#div:has(> .sponsored-{i})"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn bench_parse_line(c: &mut Criterion) {
    let lines = [
        "||adnetwork.com/track^$image,third-party",
        "@@||trusted.com^$domain=example.com|~sub.example.com",
        "/ads/banner-*.gif$image,domain=a.com|b.com",
    ];

    let mut group = c.benchmark_group("parse_line");
    for line in lines {
        let pass = if line.starts_with("@@") {
            Disposition::Allow
        } else {
            Disposition::Block
        };
        group.bench_with_input(BenchmarkId::from_parameter(line.len()), line, |b, l| {
            b.iter(|| parse_line(black_box(l), 1, pass))
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let config = CompilerConfig::default();

    let mut group = c.benchmark_group("build");
    for size in [1_000usize, 10_000, 50_000] {
        let lists = vec![ListInput::fetched(
            ListSpec::new("synthetic", "https://lists.test/synthetic.txt", 0),
            synthetic_list(size),
        )];
        group.bench_with_input(BenchmarkId::from_parameter(size), &lists, |b, lists| {
            b.iter(|| build(black_box(lists), &config))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse_line, bench_build);
criterion_main!(benches);
