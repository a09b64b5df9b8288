//! # Cinegraph CLI (`cine`)
//!
//! The `cine` binary drives the engine: orphan repair, flat mirroring,
//! embedded rebuild, catalog queries, index management, benchmarks and the
//! cross-representation equivalence check.
//!
//! ## Usage
//!
//! ```bash
//! cine --config ./config/cine.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cine repair` | Delete orphan rows from the normalized store |
//! | `cine repair --check` | Report orphans without deleting, fail if any |
//! | `cine mirror` | Copy every normalized table into a flat collection |
//! | `cine rebuild` | Rebuild the embedded movie collection and swap it in |
//! | `cine stats` | Row and document counts, storage sizes |
//! | `cine query <id>` | Run one catalog query against one representation |
//! | `cine index create\|drop` | Manage the secondary indexes of a representation |
//! | `cine bench indexes` | Time every query without and with indexes |
//! | `cine bench compare` | Flat versus embedded single-movie reads |
//! | `cine verify` | Compare query results across representations |
//!
//! ## Examples
//!
//! ```bash
//! # Prepare all three representations
//! cine repair
//! cine mirror
//! cine rebuild
//!
//! # Top action movies of the 2000s from the embedded collection
//! cine query q2 --repr embedded --param genre=Action --param year_from=2000 \
//!     --param year_to=2009 --param n=5
//!
//! # Index benchmark on the normalized store, as JSON
//! cine bench indexes --repr normalized --json
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`
//! (default `cinegraph=info`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cinegraph::bench;
use cinegraph::config;
use cinegraph::context::{executor_for, EngineContext};
use cinegraph::indexes::{self, IndexManager};
use cinegraph::mirror;
use cinegraph::rebuild;
use cinegraph::repair;
use cinegraph::stats;
use cinegraph::verify;
use cinegraph_core::executor::Representation;

/// Cinegraph CLI: one movie graph, three storage models and the same
/// analytical queries over each.
#[derive(Parser)]
#[command(
    name = "cine",
    about = "Cross-model analytical queries over a movie and person graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cine.toml`. Store paths, rebuild batch size and
    /// benchmark parameters are read from this file.
    #[arg(long, global = true, default_value = "./config/cine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete rows whose foreign key points at a missing movie or person.
    Repair {
        /// Only count orphans; exit with an error if any exist.
        #[arg(long)]
        check: bool,
    },

    /// Copy every normalized table into a flat document collection.
    Mirror,

    /// Rebuild the embedded movie collection from the normalized store.
    ///
    /// The new collection is built aside and swapped in only once complete.
    Rebuild,

    /// Show row counts per representation and storage sizes.
    Stats,

    /// Run one catalog query.
    Query {
        /// `q1`..`q9` or the query name (e.g. `top-by-genre`).
        id: String,

        /// Representation to query.
        #[arg(long, default_value = "normalized")]
        repr: Representation,

        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Print rows as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage secondary indexes.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Run benchmarks.
    Bench {
        #[command(subcommand)]
        action: BenchAction,
    },

    /// Check that all representations return the same results.
    Verify {
        /// Print the checks as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Create the documented index set (idempotent).
    Create {
        #[arg(long)]
        repr: Representation,
    },
    /// Drop the indexes previously created by `index create`.
    Drop {
        #[arg(long)]
        repr: Representation,
    },
}

#[derive(Subcommand)]
enum BenchAction {
    /// Time every catalog query without and then with indexes.
    Indexes {
        #[arg(long)]
        repr: Representation,

        #[arg(long)]
        json: bool,
    },
    /// Compare flat and embedded full reads of sampled movies.
    Compare {
        /// Number of movies to sample (defaults to the configured size).
        #[arg(long)]
        sample: Option<usize>,

        #[arg(long)]
        json: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cinegraph=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    let ctx = EngineContext::open(&cfg).await?;

    match cli.command {
        Commands::Repair { check } => {
            if check {
                let outcomes = repair::check_integrity(&ctx).await?;
                repair::print_report(&outcomes);
                println!("No orphans found.");
            } else {
                let outcomes = repair::repair_orphans(&ctx).await?;
                repair::print_report(&outcomes);
            }
        }
        Commands::Mirror => {
            let counts = mirror::mirror_flat(&ctx).await?;
            mirror::print_counts(&counts);
        }
        Commands::Rebuild => {
            let report = rebuild::rebuild_embedded(&ctx).await?;
            println!(
                "Rebuilt '{}': {} movies in {:.0} ms",
                report.collection, report.movies, report.elapsed_ms
            );
        }
        Commands::Stats => {
            stats::run_stats(&ctx).await?;
        }
        Commands::Query {
            id,
            repr,
            params,
            json,
        } => {
            let executor = executor_for(&ctx, repr);
            let rows = executor.execute(&id, &params).await?;
            if json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No results.");
            } else {
                for (i, row) in rows.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, row);
                }
            }
        }
        Commands::Index { action } => {
            let report = match action {
                IndexAction::Create { repr } => IndexManager::new(&ctx, repr).create().await?,
                IndexAction::Drop { repr } => IndexManager::new(&ctx, repr).drop().await?,
            };
            indexes::print_report(&report);
        }
        Commands::Bench { action } => match action {
            BenchAction::Indexes { repr, json } => {
                let report = bench::run_index_benchmark(&ctx, repr).await?;
                if json {
                    print_json(&report)?;
                } else {
                    bench::print_index_report(&report);
                }
            }
            BenchAction::Compare { sample, json } => {
                let report = bench::run_comparison(&ctx, sample).await?;
                if json {
                    print_json(&report)?;
                } else {
                    bench::print_comparison(&report);
                }
            }
        },
        Commands::Verify { json } => {
            let checks = verify::verify_equivalence(&ctx).await?;
            if json {
                print_json(&checks)?;
            } else {
                verify::print_checks(&checks);
            }
            verify::require_equivalent(&checks)?;
        }
    }

    ctx.close().await;
    Ok(())
}
