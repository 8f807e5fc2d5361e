// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic backend-bridge usage.
//!
//! Demonstrates:
//! 1. Asking the advisor which backend fits a project
//! 2. Wrapping the local backend in the resilient pipeline
//! 3. Cached reads and a retried transient failure
//! 4. Planning and running a local → local migration
//! 5. Displaying collector summaries and facade metrics
//!
//! Runs entirely in-process; no Docker needed.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;
use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use backend_bridge::advisor::{Feature, ProjectRequirements, ProviderAdvisor};
use backend_bridge::migration::{MigrationExecutor, MigrationOptions, MigrationPlanner};
use backend_bridge::provider::{BackendKind, DataProvider, ErrorCode, LocalBackend, Operation};
use backend_bridge::{BridgeConfig, ProviderRuntime, ResilientProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Which backend?
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧭 Ranking backends for a small realtime app...");
    let requirements = ProjectRequirements {
        traffic: 50_000,
        ..ProjectRequirements::new(500).require(Feature::Realtime)
    };
    let advisor = ProviderAdvisor::builtin()?;
    for recommendation in advisor.recommend(&requirements) {
        println!(
            "   └─ {:<8} score {:>3}  ${:.2}/month",
            recommendation.backend, recommendation.score, recommendation.estimated_cost.monthly
        );
        for reason in &recommendation.reasoning {
            println!("      • {}", reason);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Resilient provider over the local backend
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📦 Building resilient provider (local backend, in-process cache)...");
    let config = BridgeConfig::from_json_str(
        r#"{ "retry": { "max_retries": 3, "base_delay_ms": 20, "max_jitter_ms": 10 } }"#,
    )?;
    let runtime = ProviderRuntime::in_process(&config);
    let provider = Arc::new(ResilientProvider::new(LocalBackend::default(), runtime));

    let entries = vec![
        ("alice", json!({"name": "Alice", "role": "admin"})),
        ("bob", json!({"name": "Bob", "role": "user"})),
        ("carol", json!({"name": "Carol", "role": "user"})),
    ];
    for (id, data) in &entries {
        provider.create_record("users", Some(*id), data.clone()).await?;
        println!("   └─ Created users/{} → {}", id, data);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Cached reads and a transient failure
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading twice (second read should be a cache hit)...");
    for pass in 1..=2 {
        let start = Instant::now();
        for (id, _) in &entries {
            provider.get_record("users", id).await?;
        }
        println!("   └─ Pass {}: {:?}", pass, start.elapsed());
    }
    let stats = provider.runtime().cache.stats();
    println!(
        "   ⚡ Cache: {} local hits, {} misses, hit rate {:.0}%",
        stats.local_hits,
        stats.misses,
        stats.hit_rate() * 100.0
    );

    println!("\n💥 Injecting 2 transient failures into list_collections...");
    provider
        .inner()
        .inject_fault(Operation::ListCollections, ErrorCode::Unavailable, 2);
    let collections = provider.list_collections().await?;
    println!(
        "   ✅ Succeeded after {} attempts: {:?}",
        provider.inner().call_count(Operation::ListCollections),
        collections
    );
    for breaker in provider.runtime().breakers.snapshot() {
        println!(
            "   └─ breaker {}/{}: {:?} ({} calls)",
            breaker.provider, breaker.operation, breaker.state, breaker.calls
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Migration
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚚 Planning local → local migration...");
    let plan = MigrationPlanner::new().create_plan(BackendKind::Local, BackendKind::Local);
    println!("   Effort: {} ({})", plan.effort, plan.estimated_time);
    for step in &plan.steps {
        println!(
            "   └─ {} [{}] {}",
            step.name,
            if step.automated { "auto" } else { "manual" },
            step.estimated_time
        );
    }

    let target = Arc::new(LocalBackend::default());
    let executor = MigrationExecutor::new(provider.clone(), target.clone());
    let cancel = CancellationToken::new();

    let dry = executor.execute(&plan, &MigrationOptions::dry_run(), &cancel).await?;
    println!("   └─ Dry run: {} items would move", dry.total_migrated());

    let result = executor.execute(&plan, &MigrationOptions::default(), &cancel).await?;
    println!(
        "   ✅ Migrated {} items in {}ms (success: {})",
        result.total_migrated(),
        result.duration_ms,
        result.success
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Collector summary (last hour):");
    for (name, summary) in provider.runtime().metrics.get_summary() {
        println!(
            "   └─ {:<28} count {:>3}  avg {:>8.3}  max {:>8.3}",
            name, summary.count, summary.avg, summary.max
        );
    }

    println!("\n📈 Facade metrics:");
    dump_metrics(&snapshotter);

    println!("\n🛑 Flushing collector...");
    let flushed = provider.runtime().shutdown().await?;
    println!("   ✅ Flushed {} records", flushed);

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name, label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let avg = if count > 0 { sum / count as f64 } else { 0.0 };
                histograms.push((name, label_str, count, avg));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.2}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, avg) in &histograms {
            println!("      └─ {}{} count={} avg={:.3}", name, labels, count, avg);
        }
    }
}
