// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Clustered tiered-cache example.
//!
//! Demonstrates:
//! 1. Declaring a shared resource pool and a heap + offheap cache layout
//! 2. Opening a manager against the clustered store
//! 3. Ten deterministic writes (sha2-derived values)
//! 4. Reading them back through the local tiers
//! 5. Displaying tier stats and captured metrics
//! 6. Clean shutdown
//!
//! The remote tier is the in-process store, so no server is needed. Set
//! `TIERED_CACHE_SERVER_URL` to change the address the manager connects to.
//!
//! # Run
//!
//! ```bash
//! cargo run --example clustered_demo
//! ```

use std::time::Instant;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use sha2::{Digest, Sha256};
use tiered_cache::{
    CacheConfig, CacheManager, InMemoryConnector, ManagerConfig, PoolUnit, SharedPoolConfig,
    TierConfig,
};

const DEFAULT_SERVER_URL: &str = "cluster://localhost:9410";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           tiered-cache: Clustered Example                     ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure the layout
    // ─────────────────────────────────────────────────────────────────────────
    let server_url = std::env::var("TIERED_CACHE_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.into());
    println!("📦 Configuring cache manager for {}...", server_url);

    let config = ManagerConfig {
        server_url,
        shared_pools: vec![SharedPoolConfig::new("resource-pool-a", PoolUnit::Bytes, 10 * 1024 * 1024)],
        caches: vec![CacheConfig::new(
            "clustered-cache",
            vec![
                TierConfig::new("heap", PoolUnit::Count, 1000),
                TierConfig::new("offheap", PoolUnit::Bytes, 1024 * 1024).with_shared_pool("resource-pool-a"),
            ],
        )],
        ..Default::default()
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Open the manager
    // ─────────────────────────────────────────────────────────────────────────
    let connector = InMemoryConnector::<u64, String>::new();
    let manager = CacheManager::open(config, &connector).await?;
    println!("   ✅ Manager ready! State: {}", manager.state());

    let cache = manager
        .get_cache("clustered-cache")
        .ok_or("clustered-cache missing after open")?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Deterministic writes
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Writing 10 entries (write-through)...");
    for key in 0..10u64 {
        let value = derived_value(key);
        let start = Instant::now();
        cache.put(key, value.clone()).await?;
        println!("   └─ {} → {}… ({:?})", key, &value[..16], start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Read back
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📖 Reading entries back (local hits)...");
    for key in 0..10u64 {
        let start = Instant::now();
        match cache.get(&key).await? {
            Some(value) if value == derived_value(key) => {
                println!("   └─ {} ✓ ({:?})", key, start.elapsed())
            }
            Some(_) => println!("   └─ {} ✗ value mismatch", key),
            None => println!("   └─ {} → NOT FOUND", key),
        }
    }
    println!("   └─ Remote holds {} entries", connector.store().len());

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Stats and metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Tier Stats:");
    for tier in cache.stats().tiers {
        println!(
            "   ├─ {}: {} entries, hit rate {:.0}%",
            tier.name,
            tier.entries,
            tier.hit_rate() * 100.0
        );
        for pool in &tier.pools {
            println!(
                "   │  └─ {}: {}/{} {} ({:.3}%)",
                pool.name,
                pool.usage,
                pool.limit,
                pool.unit,
                pool.utilization() * 100.0
            );
        }
    }

    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Closing...");
    manager.close().await?;
    println!("   ✅ Closed! State: {}", manager.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Hex SHA-256 of "value-{key}": stable across runs.
fn derived_value(key: u64) -> String {
    hex::encode(Sha256::digest(format!("value-{}", key).as_bytes()))
}

/// Dump all captured metrics, grouped by kind
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut counters = vec![];
    let mut gauges = vec![];
    let mut histograms = vec![];

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
        let name = format!("{}{}", key.name(), label_str);

        match value {
            DebugValue::Counter(v) => counters.push((name, v)),
            DebugValue::Gauge(v) => gauges.push((name, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    println!("   ┌─ Counters (cumulative)");
    for (name, value) in &counters {
        println!("   │  └─ {} = {}", name, value);
    }
    println!("   ├─ Gauges (current value)");
    for (name, value) in &gauges {
        println!("   │  └─ {} = {:.2}", name, value);
    }
    println!("   └─ Histograms");
    for (name, count, sum) in &histograms {
        let avg = if *count > 0 { sum / *count as f64 } else { 0.0 };
        println!("      └─ {} count={} avg={:.6}s", name, count, avg);
    }
}
