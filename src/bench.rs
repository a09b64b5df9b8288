//! Benchmark harness.
//!
//! Two measurements:
//!
//! - **Index benchmark** for one representation: repair orphans, drop the
//!   managed indexes, time every catalog task, create the indexes, time
//!   again, and report per-task gain plus the storage footprint on both
//!   sides. The flat collections are mirrored again after the repair so
//!   they cannot keep orphans copied before it.
//! - **Representation comparison**: sample movie ids from the embedded
//!   collection and measure the mean full-read latency of one movie from
//!   the flat collections versus the embedded one.
//!
//! Sampling uses SQLite's `RANDOM()` without a seed, so only aggregate
//! timings are reproducible, never the exact sampled set.

use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use cinegraph_core::catalog::QueryId;
use cinegraph_core::executor::{QueryExecutor, Representation};

use crate::context::{executor_for, EngineContext};
use crate::docstore::{database_bytes, Filter};
use crate::indexes::IndexManager;
use crate::mirror::{mirror_flat, ENTITY_TABLES};
use crate::repair::repair_orphans;
use crate::stats::format_bytes;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskTiming {
    pub task: String,
    pub rows: usize,
    pub latency_before_ms: f64,
    pub latency_after_ms: f64,
    pub gain_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexBenchmarkReport {
    pub representation: Representation,
    pub generated_at: String,
    pub tasks: Vec<TaskTiming>,
    pub footprint_before_bytes: i64,
    pub footprint_after_bytes: i64,
    pub footprint_delta_bytes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub generated_at: String,
    pub min_year: i64,
    pub sampled: usize,
    pub flat_mean_ms: f64,
    pub embedded_mean_ms: f64,
    /// Flat mean divided by embedded mean.
    pub speedup: f64,
    pub flat_bytes: i64,
    pub embedded_bytes: i64,
}

/// Signed improvement of `after` over `before`, in percent of `before`.
pub fn gain_percent(before_ms: f64, after_ms: f64) -> f64 {
    if before_ms > 0.0 {
        (before_ms - after_ms) / before_ms * 100.0
    } else {
        0.0
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The fixed task list: every catalog query with its configured parameters.
pub fn tasks(ctx: &EngineContext) -> Vec<(QueryId, Vec<(String, String)>)> {
    QueryId::ALL
        .iter()
        .map(|id| (*id, ctx.config.benchmark.params.for_query(id.code())))
        .collect()
}

async fn footprint(ctx: &EngineContext, repr: Representation) -> Result<i64> {
    match repr {
        Representation::Normalized => database_bytes(&ctx.normalized).await,
        Representation::Flat | Representation::Embedded => ctx.documents.storage_bytes().await,
    }
}

/// Run every task once, returning `(rows, elapsed_ms)` per task.
async fn time_tasks(
    executor: &dyn QueryExecutor,
    tasks: &[(QueryId, Vec<(String, String)>)],
) -> Result<Vec<(usize, f64)>> {
    let mut out = Vec::with_capacity(tasks.len());
    for (id, params) in tasks {
        let start = Instant::now();
        let rows = executor.execute(id.code(), params).await?;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(task = %id, rows = rows.len(), ms, "task timed");
        out.push((rows.len(), ms));
    }
    Ok(out)
}

pub async fn run_index_benchmark(ctx: &EngineContext, repr: Representation) -> Result<IndexBenchmarkReport> {
    repair_orphans(ctx).await?;
    if repr == Representation::Flat {
        mirror_flat(ctx).await?;
    }

    let manager = IndexManager::new(ctx, repr);
    manager.drop().await?;
    let footprint_before_bytes = footprint(ctx, repr).await?;

    let executor = executor_for(ctx, repr);
    let task_list = tasks(ctx);
    info!(representation = %repr, "timing without indexes");
    let before = time_tasks(executor.as_ref(), &task_list).await?;

    manager.create().await?;
    let footprint_after_bytes = footprint(ctx, repr).await?;
    info!(representation = %repr, "timing with indexes");
    let after = time_tasks(executor.as_ref(), &task_list).await?;

    let tasks = task_list
        .iter()
        .zip(before.iter().zip(after.iter()))
        .map(|((id, _), ((rows, b), (_, a)))| TaskTiming {
            task: id.to_string(),
            rows: *rows,
            latency_before_ms: *b,
            latency_after_ms: *a,
            gain_percent: gain_percent(*b, *a),
        })
        .collect();

    Ok(IndexBenchmarkReport {
        representation: repr,
        generated_at: now_rfc3339(),
        tasks,
        footprint_before_bytes,
        footprint_after_bytes,
        footprint_delta_bytes: footprint_after_bytes - footprint_before_bytes,
    })
}

/// Sample movie ids with `year > min_year` from the embedded collection.
pub async fn sample_movie_ids(ctx: &EngineContext, n: usize, min_year: i64) -> Result<Vec<String>> {
    let collection = ctx.embedded_collection();
    ctx.documents.require_collection(collection).await?;
    let docs = ctx
        .documents
        .sample(collection, &Filter::Gt("year".into(), json!(min_year)), n)
        .await?;
    Ok(docs
        .iter()
        .filter_map(|d| d["_id"].as_str().map(str::to_string))
        .collect())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

pub async fn run_comparison(ctx: &EngineContext, sample_size: Option<usize>) -> Result<ComparisonReport> {
    let n = sample_size.unwrap_or(ctx.config.benchmark.sample_size);
    let min_year = ctx.config.benchmark.sample_min_year;
    let ids = sample_movie_ids(ctx, n, min_year).await?;
    if ids.is_empty() {
        warn!(min_year, "no movies to sample");
    }
    for table in ENTITY_TABLES {
        ctx.documents.require_collection(table).await?;
    }

    let flat = ctx.flat();
    let embedded = ctx.embedded();
    let mut flat_ms = Vec::with_capacity(ids.len());
    let mut embedded_ms = Vec::with_capacity(ids.len());
    for id in &ids {
        let start = Instant::now();
        flat.read_movie(id).await?;
        flat_ms.push(start.elapsed().as_secs_f64() * 1000.0);

        let start = Instant::now();
        embedded.read_movie(id).await?;
        embedded_ms.push(start.elapsed().as_secs_f64() * 1000.0);
    }

    let mut flat_bytes = 0;
    for table in ENTITY_TABLES {
        flat_bytes += ctx.documents.collection_bytes(table).await?;
    }
    let embedded_bytes = ctx.documents.collection_bytes(ctx.embedded_collection()).await?;

    let flat_mean_ms = mean(&flat_ms);
    let embedded_mean_ms = mean(&embedded_ms);
    Ok(ComparisonReport {
        generated_at: now_rfc3339(),
        min_year,
        sampled: ids.len(),
        flat_mean_ms,
        embedded_mean_ms,
        speedup: if embedded_mean_ms > 0.0 {
            flat_mean_ms / embedded_mean_ms
        } else {
            0.0
        },
        flat_bytes,
        embedded_bytes,
    })
}

pub fn print_index_report(report: &IndexBenchmarkReport) {
    println!("Index benchmark: {} ({})", report.representation, report.generated_at);
    println!();
    println!(
        "  {:<24} {:>6} {:>12} {:>12} {:>9}",
        "TASK", "ROWS", "BEFORE (ms)", "AFTER (ms)", "GAIN %"
    );
    println!("  {}", "-".repeat(67));
    for t in &report.tasks {
        println!(
            "  {:<24} {:>6} {:>12.2} {:>12.2} {:>9.1}",
            t.task, t.rows, t.latency_before_ms, t.latency_after_ms, t.gain_percent
        );
    }
    println!();
    println!(
        "  Footprint: {} -> {} ({})",
        format_bytes(report.footprint_before_bytes),
        format_bytes(report.footprint_after_bytes),
        format_bytes(report.footprint_delta_bytes)
    );
}

pub fn print_comparison(report: &ComparisonReport) {
    println!("Flat vs embedded full read ({})", report.generated_at);
    println!();
    println!("  Sampled movies (year > {}): {}", report.min_year, report.sampled);
    println!("  Flat mean:      {:.3} ms", report.flat_mean_ms);
    println!("  Embedded mean:  {:.3} ms", report.embedded_mean_ms);
    println!("  Speedup:        {:.1}x", report.speedup);
    println!();
    println!("  Flat size:      {}", format_bytes(report.flat_bytes));
    println!("  Embedded size:  {}", format_bytes(report.embedded_bytes));
}
