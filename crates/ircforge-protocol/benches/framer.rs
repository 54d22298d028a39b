use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use ircforge_protocol::{frame, frame_reference, CommandParser, CommandRegistry};

/// Builds a buffer of `lines` protocol lines with mixed terminators.
fn mixed_buffer(lines: usize) -> Vec<u8> {
    let terminators: [&[u8]; 3] = [b"\r\n", b"\n", b"\r"];
    let mut buf = Vec::with_capacity(lines * 48);
    for i in 0..lines {
        buf.extend_from_slice(format!(":u{i}!u@host PRIVMSG #bench :line {i}").as_bytes());
        buf.extend_from_slice(terminators[i % terminators.len()]);
    }
    buf
}

fn framing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");
    for lines in [1_000usize, 100_000, 500_000] {
        let buf = mixed_buffer(lines);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_function(format!("scan_{lines}"), |b| {
            b.iter(|| frame(black_box(&buf)))
        });
        group.bench_function(format!("regex_{lines}"), |b| {
            b.iter(|| frame_reference(black_box(&buf)))
        });
    }
    group.finish();
}

fn parsing_benchmark(c: &mut Criterion) {
    let parser = CommandParser::new(Arc::new(CommandRegistry::with_builtins()));
    let buf = mixed_buffer(10_000);

    let mut group = c.benchmark_group("parsing");
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("privmsg_10000", |b| b.iter(|| parser.parse(black_box(&buf))));
    group.finish();
}

criterion_group!(benches, framing_benchmark, parsing_benchmark);
criterion_main!(benches);
