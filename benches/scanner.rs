use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flate2::write::GzEncoder;
use flate2::Compression;
use ip_blocklist_service::core::{scan_gzip, DetectionConfig, ThresholdClassifier};

fn sample_log(lines: usize) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    writeln!(encoder, "#Version: 1.0").unwrap();
    for i in 0..lines {
        let status = if i % 4 == 0 { "503" } else { "200" };
        writeln!(
            encoder,
            "2024-01-01\t10:{:02}:{:02}\tIAD89-C1\t2390\t10.0.{}.{}\tGET\td111111abcdef8.cloudfront.net\t/index.html\t{}\t-\tMozilla/5.0\t-",
            (i / 60) % 60,
            i % 60,
            (i / 256) % 256,
            i % 256,
            status
        )
        .unwrap();
    }
    encoder.finish().unwrap()
}

fn scanner_benchmark(c: &mut Criterion) {
    let config = DetectionConfig::new(["500", "502", "503", "504"], 5);
    let log = sample_log(50_000);

    c.bench_function("scan_and_classify_50k_lines", |b| {
        b.iter(|| {
            let summary = scan_gzip(black_box(log.as_slice()), &config).unwrap();
            ThresholdClassifier::new(&config).classify(&summary.table)
        })
    });
}

criterion_group!(benches, scanner_benchmark);
criterion_main!(benches);
