use std::cmp::Ordering;
use std::time::Instant;

use adless_core::RuleSet;
use adless_rewrite::{Document, Pipeline};

pub struct BenchOptions<'a> {
    pub url: &'a str,
    pub iterations: usize,
    pub warmup: usize,
}

struct BenchResult {
    iterations: usize,
    total_ms: f64,
    avg_us: f64,
    p50_us: f64,
    p95_us: f64,
    p99_us: f64,
    mb_per_sec: f64,
}

/// Target latency for one document rewrite.
const BUDGET_P99_US: f64 = 5000.0;

pub fn run(pipeline: &Pipeline, rule_set: &RuleSet, html: &[u8], opts: &BenchOptions<'_>) -> Result<(), String> {
    println!("============================================================");
    println!("adless Pipeline Benchmark");
    println!("============================================================");
    println!("URL:        {}", opts.url);
    println!("Document:   {} bytes", html.len());
    println!("Rules:      {} network, {} cosmetic", rule_set.len(), rule_set.cosmetics().len());
    println!("Iterations: {}", opts.iterations);
    println!();

    let document = Document::from_bytes(html);

    let first = pipeline
        .run(rule_set, opts.url, &document)
        .map_err(|e| format!("Pipeline failed: {}", e))?;
    println!(
        "Per run: {} resolved, {} blocked, {} redirected, {} hidden by signature",
        first.stats.resolved, first.stats.blocked, first.stats.redirected, first.stats.hidden_by_signature
    );

    println!("Warming up...");
    for _ in 0..opts.warmup {
        let _ = pipeline.run(rule_set, opts.url, &document);
    }

    let mut latencies = Vec::with_capacity(opts.iterations);
    for _ in 0..opts.iterations {
        let start = Instant::now();
        let _ = pipeline.run(rule_set, opts.url, &document);
        latencies.push(start.elapsed().as_secs_f64() * 1_000_000.0);
    }

    let result = summarize(latencies, html.len());
    println!("------------------------------------------------------------");
    println!("{}", format_result(&result));
    println!("------------------------------------------------------------");
    println!("Target: <{:.0}μs P99", BUDGET_P99_US);
    println!("Status: {}", if result.p99_us < BUDGET_P99_US { "✓ PASS" } else { "✗ FAIL" });

    Ok(())
}

fn summarize(mut latencies: Vec<f64>, bytes: usize) -> BenchResult {
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let total_us: f64 = latencies.iter().sum();
    let avg_us = if latencies.is_empty() { 0.0 } else { total_us / latencies.len() as f64 };

    BenchResult {
        iterations: latencies.len(),
        total_ms: total_us / 1000.0,
        avg_us,
        p50_us: percentile(&latencies, 0.50),
        p95_us: percentile(&latencies, 0.95),
        p99_us: percentile(&latencies, 0.99),
        mb_per_sec: if avg_us > 0.0 { bytes as f64 / avg_us } else { 0.0 },
    }
}

fn format_result(result: &BenchResult) -> String {
    format!(
        "Iterations:  {}\nTotal time:  {:.2}ms\nAvg latency: {:.2}μs\nP50 latency: {:.2}μs\nP95 latency: {:.2}μs\nP99 latency: {:.2}μs\nThroughput:  {:.1} MB/s",
        result.iterations,
        result.total_ms,
        result.avg_us,
        result.p50_us,
        result.p95_us,
        result.p99_us,
        result.mb_per_sec,
    )
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}
