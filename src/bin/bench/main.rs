// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench Runner
//
// Monte Carlo over generated campuses with Poisson churn and per-tick audits.
//
// Usage:
//   cargo run --release --bin bench                      # All scenarios, 30 runs each
//   cargo run --release --bin bench -- --runs 5          # Quick mode
//   cargo run --release --bin bench -- hotspot           # Filter by name, label or category
//   cargo run --release --bin bench -- --time-series     # Per-seed JSONL output
//   cargo run --release --bin bench -- --seed 42 --ticks 100

mod churn;
mod monte_carlo;
mod report;
mod scenarios;
mod time_series;

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use report::{BenchReport, Summary};
use scenarios::{scenarios, Scenario};

/// A scenario passes when at least this share of its runs pass.
const PASS_THRESHOLD: f64 = 0.933;

#[derive(Parser, Debug)]
#[command(name = "bench", about = "Monte Carlo benchmark for the APFlow balancing engine")]
struct Cli {
    /// Runs per scenario.
    #[arg(long, default_value_t = 30)]
    runs: usize,

    /// Base seed; run i uses seed + i.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Override every scenario's tick count.
    #[arg(long)]
    ticks: Option<u64>,

    /// Write per-seed JSONL time series under benchmark-results/time-series/.
    #[arg(long)]
    time_series: bool,

    /// Engine debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Only run scenarios whose name, label or category contains this.
    filter: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info,apflow_engine=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_target(false)
        .init();

    let all_scenarios = scenarios();
    let to_run: Vec<&Scenario> = match &cli.filter {
        Some(f) => {
            let f = f.to_lowercase();
            all_scenarios
                .iter()
                .filter(|s| {
                    s.name.to_lowercase().contains(&f)
                        || s.label.to_lowercase().contains(&f)
                        || s.category.to_lowercase().contains(&f)
                })
                .collect()
        }
        None => all_scenarios.iter().collect(),
    };
    if to_run.is_empty() {
        bail!("no scenarios match filter {:?}", cli.filter);
    }

    let ts_dir: Option<PathBuf> = cli.time_series.then(|| PathBuf::from("benchmark-results/time-series"));

    info!(runs = cli.runs, seed = cli.seed, scenarios = to_run.len(), "starting bench");
    println!("\n  APFlow Bench Runner");
    println!("  PRNG: ChaCha8Rng | Runs/scenario: {} | Base seed: {}", cli.runs, cli.seed);
    println!("  Running {} scenario(s)...\n", to_run.len());
    println!(
        "  {:<36} {:>5} {:>12} {:>8} {:>8} {:>7} {:>6} {:>7}",
        "Scenario", "Pass%", "Served%", "Cost/u", "PeakOvl", "Moves", "Abort", "Time"
    );
    println!("  {}", "-".repeat(100));

    let suite_start = Instant::now();
    let mut mc_reports = Vec::new();

    for scenario in &to_run {
        let report = monte_carlo::run_monte_carlo(scenario, cli.runs, cli.seed, cli.ticks, ts_dir.as_deref())?;

        let status = if report.pass_rate >= PASS_THRESHOLD { "PASS" } else { "FAIL" };
        println!(
            "  {:<36} {:>4}% {:>6.1}±{:<4.1} {:>8.3} {:>8.1} {:>7.0} {:>6.1} {:>5.0}ms  {}",
            report.label,
            (report.pass_rate * 100.0) as u32,
            report.served_rate.mean * 100.0,
            report.served_rate.half_width() * 100.0,
            report.cost_per_user.mean,
            report.peak_overloaded_aps.mean,
            report.moves.mean,
            report.solves_aborted.mean,
            report.elapsed_ms.mean,
            status,
        );
        for run in report.individual_runs.iter().filter(|r| !r.pass) {
            info!(scenario = scenario.name, seed = run.seed, failures = ?run.failures, "run failed");
        }

        mc_reports.push(report);
    }

    // ─── Summary ────────────────────────────────────────────────────────

    let total = mc_reports.len();
    let passed = mc_reports.iter().filter(|r| r.pass_rate >= PASS_THRESHOLD).count();
    let failed = total - passed;
    let total_invariant_violations: u64 = mc_reports
        .iter()
        .flat_map(|r| r.individual_runs.iter())
        .map(|r| r.invariant_violations)
        .sum();

    println!("  {}", "-".repeat(100));
    println!(
        "  Total: {}  Passed: {}  Failed: {}  Invariant violations: {}  Suite time: {:.1}s\n",
        total,
        passed,
        failed,
        total_invariant_violations,
        suite_start.elapsed().as_secs_f64()
    );

    // ─── Write JSON Report ──────────────────────────────────────────────

    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis().to_string();
    let report = BenchReport {
        timestamp: timestamp.clone(),
        version: env!("CARGO_PKG_VERSION"),
        prng: "ChaCha8Rng",
        n_runs_per_scenario: cli.runs,
        base_seed: cli.seed,
        summary: Summary {
            total,
            passed,
            failed,
            pass_rate: passed as f64 / total as f64,
            total_invariant_violations,
        },
        scenarios: mc_reports,
    };

    let dir = Path::new("benchmark-results");
    std::fs::create_dir_all(dir).context("failed to create benchmark-results/")?;
    let path = dir.join(format!("bench-{timestamp}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("  Results saved to: {}\n", path.display());

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
