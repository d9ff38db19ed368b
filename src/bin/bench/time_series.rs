// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench: Per-Tick JSONL Time Series
//
// One JSON line per tick, flattened from the engine snapshot.

use std::io::Write;
use std::path::Path;

use apflow_engine::{OptimizerEvent, TickSnapshot, UserStatus};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub users: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub unreachable: usize,
    pub stranded: usize,
    pub overloaded_aps: usize,
    pub total_cost: f64,
    pub mean_utilization: f64,
    pub max_utilization: f64,
    pub optimizer: &'static str,
    pub solve_flow: Option<i64>,
    pub moves: usize,
    pub placements: usize,
    pub applied_commands: u32,
    pub rejected_commands: usize,
    pub invariant_violations: usize,
}

impl TickRecord {
    pub fn from_snapshot(snapshot: &TickSnapshot) -> Self {
        let count = |status: UserStatus| snapshot.users.iter().filter(|u| u.status == status).count();
        let utilizations: Vec<f64> = snapshot.access_points.iter().map(|ap| ap.utilization).collect();
        let mean_utilization = if utilizations.is_empty() {
            0.0
        } else {
            utilizations.iter().sum::<f64>() / utilizations.len() as f64
        };
        let (optimizer, solve_flow) = match &snapshot.events.optimizer {
            OptimizerEvent::Skipped => ("skipped", None),
            OptimizerEvent::Committed { flow, .. } => ("committed", Some(*flow)),
            OptimizerEvent::Aborted { .. } => ("aborted", None),
        };
        let rebalance = snapshot.events.rebalance.as_ref();

        Self {
            tick: snapshot.tick,
            users: snapshot.users.len(),
            assigned: snapshot.users.len() - snapshot.unassigned_user_ids.len(),
            unassigned: snapshot.unassigned_user_ids.len(),
            unreachable: count(UserStatus::Unreachable),
            stranded: count(UserStatus::StrandedOverloaded),
            overloaded_aps: snapshot.access_points.iter().filter(|ap| ap.overloaded).count(),
            total_cost: snapshot.total_cost,
            mean_utilization,
            max_utilization: utilizations.iter().copied().fold(0.0, f64::max),
            optimizer,
            solve_flow,
            moves: rebalance.map_or(0, |r| r.moves.len()),
            placements: rebalance.map_or(0, |r| r.placements.len()),
            applied_commands: snapshot.events.applied_commands,
            rejected_commands: snapshot.events.rejected_commands.len(),
            invariant_violations: snapshot.events.invariant_violations.len(),
        }
    }
}

#[derive(Default)]
pub struct TimeSeriesRecorder {
    records: Vec<TickRecord>,
}

impl TimeSeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: &TickSnapshot) {
        self.records.push(TickRecord::from_snapshot(snapshot));
    }

    pub fn write_jsonl(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for record in &self.records {
            serde_json::to_writer(&mut file, record)?;
            writeln!(file)?;
        }
        file.flush()?;
        Ok(())
    }
}
