//! coedit Benchmark
//!
//! Measures apply throughput of the conflict resolution engine under
//! sequential and concurrent editing.
//!
//! Run with: cargo run --example benchmark --release

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use coedit_core::{ConflictResolutionService, DocumentId, Operation, Result, VectorClock};

/// Benchmark configuration
struct BenchConfig {
    /// Number of concurrent authors
    clients: usize,
    /// Operations per author
    ops_per_client: usize,
}

/// Benchmark results
#[derive(Debug)]
struct BenchResults {
    name: String,
    total_ops: u64,
    duration: Duration,
    successful: u64,
    failed: u64,
    ops_per_sec: f64,
    avg_latency_us: f64,
}

impl BenchResults {
    fn new(name: &str, successful: u64, failed: u64, duration: Duration, latency_ns: u64) -> Self {
        let total_ops = successful + failed;
        Self {
            name: name.to_string(),
            total_ops,
            duration,
            successful,
            failed,
            ops_per_sec: total_ops as f64 / duration.as_secs_f64(),
            avg_latency_us: latency_ns as f64 / total_ops.max(1) as f64 / 1000.0,
        }
    }

    fn print(&self) {
        println!("\n╔══════════════════════════════════════════════════════════╗");
        println!("║  {} ", self.name);
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("║  Total operations:    {:>10}                         ║", self.total_ops);
        println!("║  Successful:          {:>10}                         ║", self.successful);
        println!("║  Failed:              {:>10}                         ║", self.failed);
        println!("║  Duration:            {:>10.2?}                       ║", self.duration);
        println!("║  Throughput:          {:>10.0} ops/sec                ║", self.ops_per_sec);
        println!("║  Avg latency:         {:>10.0} µs                     ║", self.avg_latency_us);
        println!("╚══════════════════════════════════════════════════════════╝");
    }
}

/// Benchmark: one author typing and deleting with full causal knowledge
fn bench_sequential(config: &BenchConfig) -> Result<BenchResults> {
    let service = ConflictResolutionService::new();
    let id = DocumentId::new("bench:sequential")?;
    service.create_document(id.clone(), "", "bench")?;

    let total = config.clients * config.ops_per_client;
    let mut successful = 0;
    let mut failed = 0;
    let mut latency_ns = 0u64;

    let start = Instant::now();
    for i in 0..total {
        let seen: VectorClock = [("bench", i as u64)].into_iter().collect();
        let op = if i % 4 == 3 {
            Operation::delete(0, 1, "bench")
        } else {
            Operation::insert(0, "x", "bench")
        };

        let op_start = Instant::now();
        match service.apply_operation(&id, op.with_vector(seen)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
        latency_ns += op_start.elapsed().as_nanos() as u64;
    }

    Ok(BenchResults::new(
        "SEQUENTIAL (single author)",
        successful,
        failed,
        start.elapsed(),
        latency_ns,
    ))
}

/// Benchmark: authors that never see each other's edits, so every
/// operation lands on a contended anchor
async fn bench_concurrent(config: &BenchConfig) -> Result<BenchResults> {
    let service = Arc::new(ConflictResolutionService::new());
    let id = DocumentId::new("bench:concurrent")?;
    service.create_document(id.clone(), "seed", "bench")?;

    let barrier = Arc::new(Barrier::new(config.clients));
    let successful = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let total_latency_ns = Arc::new(AtomicU64::new(0));

    let mut handles = vec![];
    let start = Instant::now();

    for client_id in 0..config.clients {
        let ops = config.ops_per_client;
        let service = service.clone();
        let id = id.clone();
        let barrier = barrier.clone();
        let successful = successful.clone();
        let failed = failed.clone();
        let total_latency = total_latency_ns.clone();

        handles.push(tokio::task::spawn_blocking(move || {
            let author = format!("client-{}", client_id);
            barrier.wait();

            for i in 0..ops {
                let seen: VectorClock = [(author.as_str(), i as u64)].into_iter().collect();
                let op = Operation::insert(0, "y", author.as_str()).with_vector(seen);

                let op_start = Instant::now();
                match service.apply_operation(&id, op) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
                total_latency.fetch_add(op_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(BenchResults::new(
        "CONCURRENT (shared anchor)",
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
        total_latency_ns.load(Ordering::Relaxed),
    ))
}

/// Benchmark: presence updates from many users on one document
fn bench_presence(config: &BenchConfig) -> Result<BenchResults> {
    let service = ConflictResolutionService::new();
    let id = DocumentId::new("bench:presence")?;
    service.create_document(id.clone(), "", "bench")?;

    for client_id in 0..config.clients {
        let user = format!("user-{}", client_id);
        service.join_document(&id, &user, &user)?;
    }

    let mut successful = 0;
    let mut failed = 0;
    let mut latency_ns = 0u64;

    let start = Instant::now();
    for i in 0..config.ops_per_client {
        for client_id in 0..config.clients {
            let user = format!("user-{}", client_id);
            let op_start = Instant::now();
            match service.update_user_state(&id, &user, i, None) {
                Ok(true) => successful += 1,
                _ => failed += 1,
            }
            latency_ns += op_start.elapsed().as_nanos() as u64;
        }
    }

    Ok(BenchResults::new("PRESENCE updates", successful, failed, start.elapsed(), latency_ns))
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("coedit Benchmark\n");

    let config = BenchConfig {
        clients: 4,
        ops_per_client: 500,
    };

    println!(
        "Configuration: {} authors x {} operations",
        config.clients, config.ops_per_client
    );

    bench_sequential(&config)?.print();
    bench_concurrent(&config).await?.print();
    bench_presence(&config)?.print();

    Ok(())
}
