//! Benchmarks for hot-path emulator operations.
//!
//! Models realistic byte streams hitting the terminal: plain output
//! (logs, compiler noise), scroll-heavy output, attribute-heavy output
//! (colored ls / git diff), and UTF-8 with codec translation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use rfbterm_core::{Depth, Terminal, VoidListener};

/// Terminal pixel sizes that represent real usage.
const SIZES: [(usize, usize); 2] = [
    (640, 384),  // 80x24, the classic console
    (1024, 768), // 128x48
];

fn terminal(width: usize, height: usize) -> Terminal<VoidListener> {
    Terminal::new(width, height, Depth::D8, 512, VoidListener)
}

/// A line of plain ASCII ending in CRLF.
fn ascii_line(cols: usize) -> Vec<u8> {
    let mut line: Vec<u8> = (0..cols - 1).map(|i| b'a' + (i % 26) as u8).collect();
    line.extend_from_slice(b"\r\n");
    line
}

/// An SGR-heavy line: every word recolored, like `ls --color`.
fn sgr_line(cols: usize) -> Vec<u8> {
    let mut line = Vec::new();
    let mut col = 0;
    let mut color = 0;
    while col + 8 < cols {
        line.extend_from_slice(format!("\x1b[1;3{}mword", color % 8).as_bytes());
        line.extend_from_slice(b"\x1b[m ");
        color += 1;
        col += 8;
    }
    line.extend_from_slice(b"\r\n");
    line
}

/// UTF-8 box drawing through the IBM-PC codec.
fn utf8_line(cols: usize) -> Vec<u8> {
    let mut line = b"\x1b(U".to_vec();
    for _ in 0..cols - 1 {
        line.extend_from_slice("─".as_bytes());
    }
    line.extend_from_slice(b"\r\n");
    line
}

fn bench_plain_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("plain_output");
    for (w, h) in SIZES {
        let cols = w / 8;
        let line = ascii_line(cols);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &line, |b, line| {
            let mut term = terminal(w, h);
            b.iter(|| {
                for _ in 0..50 {
                    term.process(black_box(line));
                }
            });
        });
    }
    group.finish();
}

fn bench_sgr_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("sgr_output");
    for (w, h) in SIZES {
        let cols = w / 8;
        let line = sgr_line(cols);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &line, |b, line| {
            let mut term = terminal(w, h);
            b.iter(|| {
                for _ in 0..50 {
                    term.process(black_box(line));
                }
            });
        });
    }
    group.finish();
}

fn bench_utf8_output(c: &mut Criterion) {
    let mut group = c.benchmark_group("utf8_output");
    for (w, h) in SIZES {
        let cols = w / 8;
        let line = utf8_line(cols);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &line, |b, line| {
            let mut term = terminal(w, h);
            b.iter(|| {
                for _ in 0..50 {
                    term.process(black_box(line));
                }
            });
        });
    }
    group.finish();
}

fn bench_scroll_region(c: &mut Criterion) {
    let mut group = c.benchmark_group("scroll_region");
    for (w, h) in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &(), |b, _| {
            let mut term = terminal(w, h);
            // Pin a sub-region so every linefeed moves rows in place.
            term.process(b"\x1b[5;20r\x1b[20;1H");
            b.iter(|| {
                for _ in 0..50 {
                    term.process(black_box(b"scrolling inside a region\n"));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_plain_output,
    bench_sgr_output,
    bench_utf8_output,
    bench_scroll_region
);
criterion_main!(benches);
