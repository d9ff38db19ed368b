// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench: Report Types
//
// Structured output for offline analysis of assignment quality.

use serde::Serialize;

// ─── Statistics (per-metric Monte Carlo aggregation) ────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub n: usize,
}

impl Stats {
    /// Sample mean with a normal-approximation 95% confidence interval.
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std_dev: 0.0, ci_lower: 0.0, ci_upper: 0.0, min: 0.0, max: 0.0, n: 0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = match n {
            1 => 0.0,
            _ => samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64,
        };
        let std_dev = variance.sqrt();
        let half_width = 1.96 * std_dev / (n as f64).sqrt();
        Self {
            mean,
            std_dev,
            ci_lower: mean - half_width,
            ci_upper: mean + half_width,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            n,
        }
    }

    pub fn half_width(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }

    pub fn of<T>(runs: &[T], metric: impl Fn(&T) -> f64) -> Self {
        Self::from_samples(&runs.iter().map(metric).collect::<Vec<_>>())
    }
}

// ─── Single-Run Result ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    pub scenario: String,
    pub name: String,
    pub category: String,
    pub seed: u64,
    pub pass: bool,
    pub failures: Vec<String>,
    pub ticks: u64,
    pub elapsed_ms: u128,
    pub ticks_per_sec: f64,
    pub max_tick_ms: f64,
    pub final_users: usize,
    pub mean_served_rate: f64,
    pub min_served_rate: f64,
    pub mean_cost_per_user: f64,
    pub peak_overloaded_aps: usize,
    pub final_overloaded_aps: usize,
    pub solves_completed: u64,
    pub solves_aborted: u64,
    pub total_moves: u64,
    pub total_placements: u64,
    pub stranded_events: u64,
    pub unreachable_reports: u64,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub churn_arrivals: u32,
    pub churn_departures: u32,
    pub invariant_violations: u64,
}

// ─── Monte Carlo Report (per-scenario aggregation) ──────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MonteCarloReport {
    pub scenario_name: String,
    pub label: String,
    pub category: String,
    pub n_runs: usize,
    pub pass_rate: f64,
    pub served_rate: Stats,
    pub cost_per_user: Stats,
    pub peak_overloaded_aps: Stats,
    pub moves: Stats,
    pub stranded_events: Stats,
    pub solves_aborted: Stats,
    pub max_tick_ms: Stats,
    pub elapsed_ms: Stats,
    pub ticks_per_sec: Stats,
    pub invariant_violations: Stats,
    pub individual_runs: Vec<BenchResult>,
}

// ─── Top-Level Report ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub timestamp: String,
    pub version: &'static str,
    pub prng: &'static str,
    pub n_runs_per_scenario: usize,
    pub base_seed: u64,
    pub summary: Summary,
    pub scenarios: Vec<MonteCarloReport>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
    pub total_invariant_violations: u64,
}
