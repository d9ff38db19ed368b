// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench: Monte Carlo Runner
//
// N runs per scenario with seeds base..base+N, aggregated as mean ± 95% CI.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use apflow_engine::{Engine, OptimizerEvent, UserId};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::churn::ChurnGenerator;
use crate::report::{BenchResult, MonteCarloReport, Stats};
use crate::scenarios::Scenario;
use crate::time_series::TimeSeriesRecorder;

/// Keeps churn draws independent of the engine's movement stream.
const CHURN_STREAM: u64 = 0x9e37_79b9_7f4a_7c15;

/// Run one scenario with one seed. `ticks` overrides the scenario length.
pub fn run_single(
    scenario: &Scenario,
    seed: u64,
    ticks: Option<u64>,
    time_series_dir: Option<&Path>,
) -> anyhow::Result<BenchResult> {
    let start = Instant::now();
    let ticks = ticks.unwrap_or(scenario.ticks);

    let config = scenario.build_config(seed);
    let campus = config.campus.clone();
    let mut engine = Engine::initialize(config).with_context(|| format!("{} seed {seed}", scenario.name))?;
    engine.start()?;

    let mut churn = ChurnGenerator::new(ChaCha8Rng::seed_from_u64(seed ^ CHURN_STREAM));
    let mut time_series = time_series_dir.map(|_| TimeSeriesRecorder::new());

    let mut served_samples = Vec::with_capacity(ticks as usize);
    let mut cost_samples = Vec::with_capacity(ticks as usize);
    let mut peak_overloaded = 0usize;
    let mut final_overloaded = 0usize;
    let mut unreachable_reports = 0u64;
    let mut max_tick_ms = 0.0_f64;

    for tick in 0..ticks {
        let mut commands = scenario.mid_event.map(|event| event(tick, &engine)).unwrap_or_default();
        let present: Vec<UserId> = engine.users().keys().copied().collect();
        commands.extend(churn.generate_tick(scenario.churn, &campus, &present));
        for command in commands {
            if let Err(e) = engine.submit(command) {
                debug!(tick, error = %e, "command refused at submit");
            }
        }

        let tick_start = Instant::now();
        let snapshot = engine.tick_core()?;
        max_tick_ms = max_tick_ms.max(tick_start.elapsed().as_secs_f64() * 1000.0);

        let users = snapshot.users.len();
        let assigned = users - snapshot.unassigned_user_ids.len();
        served_samples.push(if users == 0 { 1.0 } else { assigned as f64 / users as f64 });
        if assigned > 0 {
            cost_samples.push(snapshot.total_cost / assigned as f64);
        }
        final_overloaded = snapshot.access_points.iter().filter(|ap| ap.overloaded).count();
        peak_overloaded = peak_overloaded.max(final_overloaded);
        if let OptimizerEvent::Committed { unreachable_user_ids, .. } = &snapshot.events.optimizer {
            unreachable_reports += unreachable_user_ids.len() as u64;
        }

        if let Some(ts) = time_series.as_mut() {
            ts.record(&snapshot);
        }
    }

    if let (Some(ts), Some(dir)) = (&time_series, time_series_dir) {
        let path = dir.join(format!("seed-{seed}.jsonl"));
        if let Err(e) = ts.write_jsonl(&path) {
            warn!(path = %path.display(), error = %e, "failed to write time series");
        }
    }

    let final_users = engine.users().len();
    let stats = engine.teardown();

    let elapsed = start.elapsed();
    let mean = |xs: &[f64]| if xs.is_empty() { 0.0 } else { xs.iter().sum::<f64>() / xs.len() as f64 };
    let mean_served_rate = mean(&served_samples);
    let min_served_rate = served_samples.iter().copied().fold(1.0, f64::min);

    // Pass/fail
    let criteria = &scenario.criteria;
    let mut failures = Vec::new();
    if stats.invariant_violations > criteria.max_invariant_violations {
        failures.push(format!("{} invariant violations", stats.invariant_violations));
    }
    if let Some(min) = criteria.min_served_rate {
        if mean_served_rate < min {
            failures.push(format!("served rate {mean_served_rate:.3} below {min}"));
        }
    }
    if criteria.require_optimizer_commit && stats.solves_completed == 0 {
        failures.push("optimizer never committed".to_string());
    }
    if let Some(max) = criteria.max_overloaded_at_end {
        if final_overloaded > max {
            failures.push(format!("{final_overloaded} APs overloaded at end"));
        }
    }

    debug!(scenario = scenario.name, seed, pass = failures.is_empty(), "run complete");

    Ok(BenchResult {
        scenario: scenario.label.to_string(),
        name: scenario.name.to_string(),
        category: scenario.category.to_string(),
        seed,
        pass: failures.is_empty(),
        failures,
        ticks,
        elapsed_ms: elapsed.as_millis(),
        ticks_per_sec: ticks as f64 / elapsed.as_secs_f64().max(0.001),
        max_tick_ms,
        final_users,
        mean_served_rate,
        min_served_rate,
        mean_cost_per_user: mean(&cost_samples),
        peak_overloaded_aps: peak_overloaded,
        final_overloaded_aps: final_overloaded,
        solves_completed: stats.solves_completed,
        solves_aborted: stats.solves_aborted,
        total_moves: stats.total_moves,
        total_placements: stats.total_placements,
        stranded_events: stats.stranded_events,
        unreachable_reports,
        commands_applied: stats.commands_applied,
        commands_rejected: stats.commands_rejected,
        churn_arrivals: churn.arrivals,
        churn_departures: churn.departures,
        invariant_violations: stats.invariant_violations,
    })
}

/// N runs of a scenario, aggregated.
pub fn run_monte_carlo(
    scenario: &Scenario,
    n_runs: usize,
    base_seed: u64,
    ticks: Option<u64>,
    time_series_base: Option<&Path>,
) -> anyhow::Result<MonteCarloReport> {
    let ts_dir = time_series_base.map(|base| base.join(scenario.name.to_lowercase()));

    let results = (0..n_runs)
        .map(|i| run_single(scenario, base_seed + i as u64, ticks, ts_dir.as_deref()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(aggregate(scenario, results))
}

fn aggregate(scenario: &Scenario, results: Vec<BenchResult>) -> MonteCarloReport {
    let n = results.len();
    let passed = results.iter().filter(|r| r.pass).count();

    MonteCarloReport {
        scenario_name: scenario.name.to_string(),
        label: scenario.label.to_string(),
        category: scenario.category.to_string(),
        n_runs: n,
        pass_rate: if n == 0 { 0.0 } else { passed as f64 / n as f64 },
        served_rate: Stats::of(&results, |r| r.mean_served_rate),
        cost_per_user: Stats::of(&results, |r| r.mean_cost_per_user),
        peak_overloaded_aps: Stats::of(&results, |r| r.peak_overloaded_aps as f64),
        moves: Stats::of(&results, |r| r.total_moves as f64),
        stranded_events: Stats::of(&results, |r| r.stranded_events as f64),
        solves_aborted: Stats::of(&results, |r| r.solves_aborted as f64),
        max_tick_ms: Stats::of(&results, |r| r.max_tick_ms),
        elapsed_ms: Stats::of(&results, |r| r.elapsed_ms as f64),
        ticks_per_sec: Stats::of(&results, |r| r.ticks_per_sec),
        invariant_violations: Stats::of(&results, |r| r.invariant_violations as f64),
        individual_runs: results,
    }
}
