//! Performance benchmarks for a3s-firewall
//!
//! Run with: cargo bench

use a3s_firewall::merge::merge;
use a3s_firewall::{
    Classifier, ConfigHandle, ExtractorAdapter, FirewallConfig, RegexMatcher, Sanitizer,
};
use criterion::{criterion_group, criterion_main, Criterion};

const PROMPT: &str = "Hi, I'm Alice. Email alice@corp.example or call 555-123-4567. \
    Card 4111 1111 1111 1111, SSN 123-45-6789, IBAN DE89370400440532013000. \
    Please summarize the attached quarterly report for the board.";

fn bench_regex_matcher(c: &mut Criterion) {
    let matcher = RegexMatcher::with_custom(&[], 0.85).unwrap();

    c.bench_function("RegexMatcher::find", |b| {
        b.iter(|| matcher.find(PROMPT));
    });

    let long = PROMPT.repeat(40);
    c.bench_function("RegexMatcher::find (long prompt)", |b| {
        b.iter(|| matcher.find(&long));
    });
}

fn bench_merge_and_sanitize(c: &mut Criterion) {
    let matcher = RegexMatcher::with_custom(&[], 0.85).unwrap();
    let spans = matcher.find(PROMPT);

    c.bench_function("merge", |b| {
        b.iter(|| merge(spans.clone(), spans.clone()));
    });

    let merged = merge(Vec::new(), spans);
    let sanitizer = Sanitizer::default();
    c.bench_function("Sanitizer::sanitize", |b| {
        b.iter(|| sanitizer.sanitize(PROMPT, &merged));
    });
}

fn bench_classify(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let classifier = Classifier::new(
        ConfigHandle::new(FirewallConfig::default()).unwrap(),
        ExtractorAdapter::regex_only(),
    );

    c.bench_function("Classifier::classify (regex only)", |b| {
        b.to_async(&rt).iter(|| async { classifier.classify(PROMPT).await });
    });
}

criterion_group!(
    benches,
    bench_regex_matcher,
    bench_merge_and_sanitize,
    bench_classify
);
criterion_main!(benches);
