// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Simulation Core

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wasm_bindgen::prelude::*;

use crate::commands::{Command, CommandError, CommandQueue, CommandReceipt, PendingCommand};
use crate::config::{ConfigError, EngineConfig};
use crate::cost::{compute_interference, CostFunction};
use crate::flow::{FlowGraphBuilder, MinCostMaxFlow};
use crate::invariants::{self, InvariantLedger};
use crate::load::LoadTracker;
use crate::rebalance::GreedyRebalancer;
use crate::signal::SignalModel;
use crate::types::*;

// ─── Clock ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ClockState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine is {0:?}; ticks only run while Running")]
    NotRunning(ClockState),

    #[error("cannot move the clock from {from:?} to {to:?}")]
    InvalidTransition { from: ClockState, to: ClockState },
}

// ─── Engine struct ───────────────────────────────────────────────────────────

#[wasm_bindgen]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) clock: ClockState,
    /// Index of the next tick to run.
    pub(crate) tick: u64,

    /// Static topology, sorted by id.
    pub(crate) aps: Vec<AccessPoint>,
    pub(crate) users: BTreeMap<UserId, User>,
    pub(crate) assignment: Assignment,
    pub(crate) load: LoadTracker,

    pub(crate) signal: SignalModel,
    pub(crate) cost: CostFunction,
    pub(crate) rng: ChaCha8Rng,

    pub(crate) commands: CommandQueue,
    pub(crate) next_user_id: UserId,

    pub(crate) invariants: InvariantLedger,
    pub(crate) stats: EngineStats,
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

impl Engine {
    /// Validate `config` and build an idle engine seeded from `config.seed`.
    pub fn initialize(config: EngineConfig) -> Result<Self, ConfigError> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::with_rng(config, rng)
    }

    /// Like [`Engine::initialize`], with the movement RNG supplied by the caller.
    pub fn with_rng(config: EngineConfig, rng: ChaCha8Rng) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut aps: Vec<AccessPoint> = config.access_points.iter().map(|a| a.to_access_point()).collect();
        aps.sort_by_key(|ap| ap.id);
        compute_interference(&mut aps);

        let users: BTreeMap<UserId, User> = config
            .users
            .iter()
            .map(|u| (u.id, u.to_user(config.default_airtime_demand)))
            .collect();
        let next_user_id = users.keys().next_back().map_or(1, |&id| id + 1);

        let mut engine = Self {
            clock: ClockState::Idle,
            tick: 0,
            load: LoadTracker::new(&aps),
            aps,
            users,
            assignment: Assignment::new(),
            signal: config.signal.clone(),
            cost: CostFunction::new(config.weights.clone(), config.thresholds.rssi_usable_dbm),
            rng,
            commands: CommandQueue::new(),
            next_user_id,
            invariants: InvariantLedger::new(),
            stats: EngineStats::default(),
            config,
        };
        engine.refresh_signal();
        engine.refresh_load();

        info!(
            access_points = engine.aps.len(),
            users = engine.users.len(),
            interval = engine.config.optimizer.interval_ticks,
            seed = engine.config.seed,
            "engine initialized"
        );
        Ok(engine)
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(ClockState::Idle, ClockState::Running)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.transition(ClockState::Running, ClockState::Stopped)
    }

    /// Stop from any state, drop queued commands and hand back the counters.
    pub fn teardown(&mut self) -> EngineStats {
        let dropped = self.commands.len();
        self.commands.clear();
        self.clock = ClockState::Stopped;
        info!(ticks = self.stats.ticks, dropped_commands = dropped, "engine torn down");
        self.stats.clone()
    }

    fn transition(&mut self, from: ClockState, to: ClockState) -> Result<(), EngineError> {
        if self.clock != from {
            return Err(EngineError::InvalidTransition { from: self.clock, to });
        }
        self.clock = to;
        debug!(?from, ?to, "clock transition");
        Ok(())
    }

    pub fn state(&self) -> ClockState {
        self.clock
    }

    /// Ticks completed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn access_points(&self) -> &[AccessPoint] {
        &self.aps
    }

    pub fn users(&self) -> &BTreeMap<UserId, User> {
        &self.users
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn load(&self) -> &LoadTracker {
        &self.load
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn invariant_ledger(&self) -> &InvariantLedger {
        &self.invariants
    }

    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    fn ap(&self, id: ApId) -> Option<&AccessPoint> {
        self.aps.binary_search_by_key(&id, |ap| ap.id).ok().map(|i| &self.aps[i])
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

impl Engine {
    /// Queue `command` for the next tick boundary. `AddUser` receives its id now.
    pub fn submit(&mut self, command: Command) -> Result<CommandReceipt, CommandError> {
        if self.clock == ClockState::Stopped {
            return Err(CommandError::NotAccepting);
        }
        command.validate(
            &self.config.campus,
            |id| self.users.contains_key(&id) || self.commands.reserves(id),
            |ap| self.ap(ap).is_some(),
        )?;
        let reserved = match command {
            Command::AddUser { .. } => {
                let id = self.next_user_id;
                self.next_user_id += 1;
                Some(id)
            }
            _ => None,
        };
        debug!(kind = command.kind(), ?reserved, "command queued");
        Ok(self.commands.enqueue(command, reserved))
    }

    fn apply_commands(&mut self, events: &mut TickEvents) {
        for pending in self.commands.drain() {
            let verdict = pending.command.validate(
                &self.config.campus,
                |id| self.users.contains_key(&id),
                |ap| self.ap(ap).is_some(),
            );
            match verdict {
                Ok(()) => {
                    self.apply_command(pending);
                    events.applied_commands += 1;
                    self.stats.commands_applied += 1;
                }
                Err(e) => {
                    warn!(sequence = pending.sequence, kind = pending.command.kind(), error = %e, "command rejected");
                    events.rejected_commands.push(RejectedCommand { sequence: pending.sequence, reason: e.to_string() });
                    self.stats.commands_rejected += 1;
                }
            }
        }
    }

    fn apply_command(&mut self, pending: PendingCommand) {
        match pending.command {
            Command::AddUser { position, airtime_demand } => {
                let id = pending.reserved_user.unwrap_or_else(|| {
                    let id = self.next_user_id;
                    self.next_user_id += 1;
                    id
                });
                let demand = airtime_demand.unwrap_or(self.config.default_airtime_demand);
                self.users.insert(id, User::new(id, position, demand));
                info!(user = id, %position, "user added");
            }
            Command::RemoveUser { id } => {
                self.users.remove(&id);
                self.assignment.unassign(id);
                info!(user = id, "user removed");
            }
            Command::SetBand { ap, band } => {
                let Ok(i) = self.aps.binary_search_by_key(&ap, |a| a.id) else { return };
                let channel = pick_channel(&self.aps, i, band);
                self.aps[i].band = band;
                self.aps[i].channel = channel;
                compute_interference(&mut self.aps);
                info!(ap, %band, channel, "band changed");
            }
            Command::Relocate { id, position } => {
                if let Some(user) = self.users.get_mut(&id) {
                    user.position = position;
                    info!(user = id, %position, "user relocated");
                }
            }
        }
    }
}

/// Least-used channel of `band`'s plan among same-floor neighbours already on
/// that band. Ties go to the lowest channel.
fn pick_channel(aps: &[AccessPoint], index: usize, band: Band) -> u16 {
    let floor = aps[index].position.floor;
    let plan = band.channel_plan();
    let usage = |channel: u16| {
        aps.iter()
            .enumerate()
            .filter(|&(j, a)| j != index && a.band == band && a.position.floor == floor && a.channel == channel)
            .count()
    };
    plan.iter().copied().min_by_key(|&c| (usage(c), c)).unwrap_or(plan[0])
}

// ─── Internal Logic (Testable, pure Rust) ────────────────────────────────────

impl Engine {
    pub fn tick_core(&mut self) -> Result<TickSnapshot, EngineError> {
        if self.clock != ClockState::Running {
            return Err(EngineError::NotRunning(self.clock));
        }
        let tick = self.tick;
        let mut events = TickEvents::default();

        // 0. External commands, drained at the boundary
        self.apply_commands(&mut events);

        // 1. Movement
        self.advance_users();

        // 2. Signal
        self.refresh_signal();

        // 3. Load bookkeeping
        self.refresh_load();

        // 4. Global optimizer on cadence, local repair every tick
        if self.config.optimizer.is_due(tick) {
            events.optimizer = self.run_optimizer(tick);
        }
        events.rebalance = Some(self.rebalance());

        // 5. Finalize
        self.reprice();
        self.accrue_airtime();
        events.invariant_violations = self.audit();

        let snapshot = self.build_snapshot(tick, events);
        self.tick += 1;
        self.stats.ticks += 1;
        debug!(
            tick,
            assigned = self.assignment.len(),
            unassigned = snapshot.unassigned_user_ids.len(),
            total_cost = snapshot.total_cost,
            "tick complete"
        );
        Ok(snapshot)
    }

    /// View of the current state without advancing. Reports the most recently
    /// completed tick (0 before the first one).
    pub fn snapshot(&self) -> TickSnapshot {
        self.build_snapshot(self.tick.saturating_sub(1), TickEvents::default())
    }

    fn advance_users(&mut self) {
        let mobility = &self.config.mobility;
        let campus = &self.config.campus;
        for user in self.users.values_mut() {
            mobility.step(user, campus, &mut self.rng);
        }
    }

    fn refresh_signal(&mut self) {
        for user in self.users.values_mut() {
            user.rssi_by_ap = self.signal.scan(&user.position, &self.aps);
        }
    }

    /// Drop links that fell below the usable threshold, then rebuild loads,
    /// overload flags and user statuses from the assignment.
    fn refresh_load(&mut self) {
        let threshold = self.cost.rssi_threshold();
        let lost: Vec<UserId> = self
            .assignment
            .iter()
            .filter(|(u, link)| !self.users.get(u).is_some_and(|user| user.is_usable(link.ap, threshold)))
            .map(|(u, _)| u)
            .collect();
        for user in lost {
            if let Some(link) = self.assignment.unassign(user) {
                debug!(user, ap = link.ap, "link lost");
            }
        }
        self.load.rebuild(&self.assignment, &self.users);
        self.load.refresh_flags(&self.aps, self.config.thresholds.overload_fraction);
        self.refresh_statuses();
    }

    fn refresh_statuses(&mut self) {
        let threshold = self.cost.rssi_threshold();
        for user in self.users.values_mut() {
            user.status = if self.assignment.ap_of(user.id).is_some() {
                UserStatus::Connected
            } else if user.usable_aps(threshold).next().is_none() {
                UserStatus::Unreachable
            } else {
                UserStatus::Unassigned
            };
        }
    }

    /// Solve on a private flow network; commit only if the solve finishes
    /// within budget and passes the flow audit.
    fn run_optimizer(&mut self, tick: u64) -> OptimizerEvent {
        let snapshot = self.load.snapshot();
        let builder = FlowGraphBuilder::new(&self.cost, &self.aps, &snapshot)
            .with_airtime_limit(self.config.thresholds.overload_fraction, self.config.default_airtime_demand);
        let mut graph = builder.build(self.users.values().map(|u| (u, self.assignment.ap_of(u.id))));
        let solver = MinCostMaxFlow::new(self.config.optimizer.budget());
        let target = graph.supply();

        let result = match solver.solve(&mut graph.network, Some(target)) {
            Ok(result) => result,
            Err(e) => {
                warn!(tick, error = %e, "optimizer aborted; keeping previous assignment");
                self.stats.solves_aborted += 1;
                return OptimizerEvent::Aborted { reason: e.to_string() };
            }
        };

        let violations = invariants::check_flow(&graph.network);
        if !violations.is_empty() {
            let messages = self.invariants.record(&violations);
            self.stats.invariant_violations += messages.len() as u64;
            self.stats.solves_aborted += 1;
            return OptimizerEvent::Aborted { reason: messages.join("; ") };
        }

        self.assignment = Assignment::from_links(
            graph.extract().into_iter().map(|l| (l.user, Link { ap: l.ap, cost: l.cost })),
        );
        self.load.rebuild(&self.assignment, &self.users);
        self.load.refresh_flags(&self.aps, self.config.thresholds.overload_fraction);
        self.refresh_statuses();
        self.stats.solves_completed += 1;

        let unassigned = graph.unserved();
        if !graph.unreachable().is_empty() || !unassigned.is_empty() {
            info!(
                tick,
                unreachable = graph.unreachable().len(),
                unassigned = unassigned.len(),
                "optimizer left users without an AP"
            );
        }
        OptimizerEvent::Committed {
            flow: result.flow,
            cost: result.cost as f64 / 1000.0,
            unreachable_user_ids: graph.unreachable().to_vec(),
            unassigned_user_ids: unassigned,
        }
    }

    fn rebalance(&mut self) -> RebalanceSummary {
        let rebalancer = GreedyRebalancer::new(&self.cost, self.config.thresholds.overload_fraction);
        let summary = rebalancer.rebalance(&self.aps, &mut self.users, &mut self.assignment, &mut self.load);
        self.stats.total_moves += summary.moves.len() as u64;
        self.stats.total_placements += summary.placements.len() as u64;
        self.stats.stranded_events += summary.stranded.len() as u64;
        if !summary.still_overloaded.is_empty() {
            warn!(aps = ?summary.still_overloaded, "access points remain overloaded after rebalance");
        }
        summary
    }

    /// Re-cost every link against the loads it actually produces.
    fn reprice(&mut self) {
        let snapshot = self.load.snapshot();
        let priced: Vec<(UserId, f64)> = self
            .assignment
            .iter()
            .filter_map(|(u, link)| {
                let user = self.users.get(&u)?;
                let ap = self.ap(link.ap)?;
                let rssi = user.rssi_to(link.ap)?;
                Some((u, self.cost.cost(user, ap, rssi, &snapshot, Some(link.ap))))
            })
            .collect();
        for (user, cost) in priced {
            self.assignment.set_cost(user, cost);
        }
    }

    fn accrue_airtime(&mut self) {
        for (user_id, _) in self.assignment.iter() {
            if let Some(user) = self.users.get_mut(&user_id) {
                user.airtime_usage += user.airtime_demand;
            }
        }
    }

    fn audit(&mut self) -> Vec<String> {
        let violations = invariants::check_assignment(
            &self.assignment,
            &self.users,
            &self.aps,
            &self.load,
            self.config.thresholds.overload_fraction,
        );
        let messages = self.invariants.record(&violations);
        self.stats.invariant_violations += messages.len() as u64;
        messages
    }

    fn build_snapshot(&self, tick: u64, events: TickEvents) -> TickSnapshot {
        let users: Vec<UserView> = self
            .users
            .values()
            .map(|u| UserView {
                id: u.id,
                position: u.position,
                assigned_ap: self.assignment.ap_of(u.id),
                rssi_by_ap: u.rssi_by_ap.clone(),
                airtime_usage: u.airtime_usage,
                airtime_demand: u.airtime_demand,
                status: u.status,
            })
            .collect();
        let access_points = self
            .aps
            .iter()
            .map(|ap| ApView {
                id: ap.id,
                band: ap.band,
                channel: ap.channel,
                current_load: self.load.airtime(ap.id),
                utilization: self.load.utilization(ap),
                assigned_user_ids: self.load.get(ap.id).map(|l| l.users.iter().copied().collect()).unwrap_or_default(),
                overloaded: self.load.is_flagged(ap.id),
            })
            .collect();
        let unassigned_user_ids = users.iter().filter(|u| u.assigned_ap.is_none()).map(|u| u.id).collect();

        TickSnapshot {
            tick,
            users,
            access_points,
            total_cost: self.assignment.total_cost(),
            unassigned_user_ids,
            events,
        }
    }
}
