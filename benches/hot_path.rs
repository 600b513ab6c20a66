// Hot-path microbenchmarks: sanitize, validate, admit
//
// These three run on every log call; delivery cost is amortized across a
// batch and is dominated by I/O, so it is not measured here.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use auditcore_core::{
    fields, sanitize_fields, validate, FieldKind, FieldMap, FieldSpec, FieldValue, SanitizerConfig,
    Schema,
};
use auditcore_limit::{RateLimiter, RateLimiterConfig};

fn clean_payload() -> FieldMap {
    fields! {
        "user" => "alice",
        "action" => "document.read",
        "attempts" => 1i64,
        "context" => FieldValue::Mapping(fields! {
            "ip" => "10.0.0.1",
            "region" => "eu-west-1",
            "tags" => vec!["prod", "primary"],
        }),
    }
}

fn dirty_payload() -> FieldMap {
    fields! {
        "user" => "alice",
        "password" => "hunter2",
        "note" => "cGFzc3dvcmQ9aHVudGVyMg==",
        "query" => "user%3Da%26api_key%3Dzzz",
    }
}

fn bench_sanitize(c: &mut Criterion) {
    let config = SanitizerConfig::default();

    c.bench_function("sanitize/clean", |b| {
        b.iter(|| sanitize_fields(black_box(clean_payload()), &config))
    });

    c.bench_function("sanitize/dirty", |b| {
        b.iter(|| sanitize_fields(black_box(dirty_payload()), &config))
    });

    let plaintext_only = SanitizerConfig {
        encoded_scan: false,
        ..SanitizerConfig::default()
    };
    c.bench_function("sanitize/clean_no_encoded_scan", |b| {
        b.iter(|| sanitize_fields(black_box(clean_payload()), &plaintext_only))
    });
}

fn bench_validate(c: &mut Criterion) {
    let schema = Schema::new("audit")
        .field(FieldSpec::new("user", FieldKind::String).required())
        .field(FieldSpec::new("action", FieldKind::String).required())
        .field(
            FieldSpec::new("attempts", FieldKind::Number)
                .coercing()
                .with_range(Some(0.0), Some(100.0)),
        );
    let payload = clean_payload();

    c.bench_function("validate/declared", |b| {
        b.iter(|| validate(black_box(&payload), &schema))
    });

    let open = Schema::new("open");
    c.bench_function("validate/open_schema", |b| {
        b.iter(|| validate(black_box(&payload), &open))
    });
}

fn bench_admit(c: &mut Criterion) {
    let limiter = RateLimiter::new(RateLimiterConfig {
        capacity: 1_000_000.0,
        refill_per_sec: 1_000_000.0,
    });

    c.bench_function("admit/single_key", |b| {
        b.iter(|| limiter.admit(black_box("tenant-a"), 1.0))
    });

    let keys: Vec<String> = (0..64).map(|i| format!("tenant-{}", i)).collect();
    let mut next = 0usize;
    c.bench_function("admit/rotating_keys", |b| {
        b.iter(|| {
            next = (next + 1) % keys.len();
            limiter.admit(black_box(&keys[next]), 1.0)
        })
    });
}

criterion_group!(benches, bench_sanitize, bench_validate, bench_admit);
criterion_main!(benches);
