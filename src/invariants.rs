// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Invariant Checks

//! End-of-tick audits.
//!
//! Flow checks run against every solved network before it is committed:
//! capacity bounds, conservation at every interior node, and maximality (no
//! augmenting path left in the residual graph). Assignment checks run at the
//! end of every tick: each user sits on at most one known AP, the load ledger
//! agrees with the assignment, and every AP over its limits is flagged.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::flow::FlowNetwork;
use crate::load::{LoadTracker, AIRTIME_EPSILON};
use crate::types::{AccessPoint, ApId, Assignment, User, UserId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("edge {edge} carries {flow} units against capacity {capacity}")]
    EdgeCapacity { edge: usize, flow: i64, capacity: i64 },

    #[error("node {node} is out of balance by {imbalance}")]
    FlowNotConserved { node: usize, imbalance: i64 },

    #[error("flow {flow} is not maximal: an augmenting path remains")]
    FlowNotMaximal { flow: i64 },

    #[error("assignment references unknown user {0}")]
    UnknownUser(UserId),

    #[error("user {user} is assigned to unknown access point {ap}")]
    UnknownAccessPoint { user: UserId, ap: ApId },

    #[error("user {user} appears on {count} access points")]
    MultipleAttachments { user: UserId, count: usize },

    #[error("load ledger for access point {0} disagrees with the assignment")]
    LedgerMismatch(ApId),

    #[error("access point {0} is over its limits but not flagged overloaded")]
    UnflaggedOverload(ApId),
}

// ---------------------------------------------------------------------------
// Flow checks
// ---------------------------------------------------------------------------

pub fn check_flow(net: &FlowNetwork) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (id, edge) in net.forward_edges() {
        if edge.flow < 0 || edge.flow > edge.capacity {
            violations.push(InvariantViolation::EdgeCapacity { edge: id, flow: edge.flow, capacity: edge.capacity });
        }
    }

    for node in 0..net.node_count() {
        if node == net.source() || node == net.sink() {
            continue;
        }
        let imbalance = net.net_outflow(node);
        if imbalance != 0 {
            violations.push(InvariantViolation::FlowNotConserved { node, imbalance });
        }
    }

    if has_augmenting_path(net) {
        violations.push(InvariantViolation::FlowNotMaximal { flow: net.total_flow() });
    }
    violations
}

/// Breadth-first search for a source → sink path with positive residual.
pub fn has_augmenting_path(net: &FlowNetwork) -> bool {
    let mut seen = vec![false; net.node_count()];
    let mut queue = VecDeque::from([net.source()]);
    seen[net.source()] = true;
    while let Some(u) = queue.pop_front() {
        if u == net.sink() {
            return true;
        }
        for &e in net.edges_from(u) {
            let edge = net.edge(e);
            if edge.residual() > 0 && !seen[edge.to] {
                seen[edge.to] = true;
                queue.push_back(edge.to);
            }
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Assignment checks
// ---------------------------------------------------------------------------

pub fn check_assignment(
    assignment: &Assignment,
    users: &BTreeMap<UserId, User>,
    aps: &[AccessPoint],
    load: &LoadTracker,
    overload_fraction: f64,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (user, link) in assignment.iter() {
        if !users.contains_key(&user) {
            violations.push(InvariantViolation::UnknownUser(user));
        }
        if load.get(link.ap).is_none() {
            violations.push(InvariantViolation::UnknownAccessPoint { user, ap: link.ap });
        }
    }

    let mut attachments: BTreeMap<UserId, usize> = BTreeMap::new();
    for (_, entry) in load.iter() {
        for &user in &entry.users {
            *attachments.entry(user).or_default() += 1;
        }
    }
    for (user, count) in attachments {
        if count > 1 {
            violations.push(InvariantViolation::MultipleAttachments { user, count });
        }
    }

    for ap in aps {
        let Some(entry) = load.get(ap.id) else { continue };
        let expected: Vec<UserId> = assignment.users_on(ap.id).collect();
        let airtime: f64 = expected
            .iter()
            .filter_map(|u| users.get(u))
            .map(|u| u.airtime_demand)
            .sum();
        let same_users = entry.users.iter().copied().eq(expected.iter().copied());
        if !same_users || (entry.airtime - airtime).abs() > 1e-6 {
            violations.push(InvariantViolation::LedgerMismatch(ap.id));
        }
        let over = entry.airtime > ap.airtime_budget(overload_fraction) + AIRTIME_EPSILON
            || entry.users.len() > ap.user_capacity as usize;
        if over && !entry.overloaded {
            violations.push(InvariantViolation::UnflaggedOverload(ap.id));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Running record of audit results across ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvariantLedger {
    pub checks: u64,
    pub total_violations: u64,
    pub consecutive_dirty_checks: u32,
    pub last_violations: Vec<String>,
}

impl InvariantLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one audit; returns the violations rendered as messages.
    pub fn record(&mut self, violations: &[InvariantViolation]) -> Vec<String> {
        self.checks += 1;
        let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
        if messages.is_empty() {
            self.consecutive_dirty_checks = 0;
        } else {
            self.total_violations += messages.len() as u64;
            self.consecutive_dirty_checks += 1;
            for m in &messages {
                tracing::error!(violation = %m, "invariant violated");
            }
        }
        self.last_violations = messages.clone();
        messages
    }

    pub fn is_clean(&self) -> bool {
        self.total_violations == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Band, Position};

    fn ap(id: ApId, users: u32) -> AccessPoint {
        AccessPoint {
            id,
            position: Position::new(1, 0.0, 0.0),
            band: Band::Ghz5,
            channel: 36,
            user_capacity: users,
            airtime_capacity: f64::from(users),
            interference: 0.0,
        }
    }

    fn users(n: u32) -> BTreeMap<UserId, User> {
        (1..=n).map(|id| (id, User::new(id, Position::new(1, 0.0, 0.0), 1.0))).collect()
    }

    #[test]
    fn detects_leaky_node_and_missing_augmentation() {
        let mut net = FlowNetwork::new(3, 0, 2);
        let a = net.add_edge(0, 1, 1, 0);
        net.add_edge(1, 2, 1, 0);
        net.push(a, 1);
        let violations = check_flow(&net);
        assert!(violations.contains(&InvariantViolation::FlowNotConserved { node: 1, imbalance: -1 }));

        let mut idle = FlowNetwork::new(3, 0, 2);
        idle.add_edge(0, 1, 1, 0);
        idle.add_edge(1, 2, 1, 0);
        assert_eq!(check_flow(&idle), vec![InvariantViolation::FlowNotMaximal { flow: 0 }]);
    }

    #[test]
    fn consistent_assignment_is_clean() {
        let aps = vec![ap(1, 2), ap(2, 2)];
        let users = users(3);
        let mut assignment = Assignment::new();
        assignment.assign(1, 1, 0.0);
        assignment.assign(2, 2, 0.0);
        let mut load = LoadTracker::new(&aps);
        load.rebuild(&assignment, &users);
        load.refresh_flags(&aps, 1.0);
        assert!(check_assignment(&assignment, &users, &aps, &load, 1.0).is_empty());
    }

    #[test]
    fn flags_stale_ledger_and_unflagged_overload() {
        let aps = vec![ap(1, 1)];
        let users = users(2);
        let mut assignment = Assignment::new();
        assignment.assign(1, 1, 0.0);
        assignment.assign(2, 1, 0.0);
        let mut load = LoadTracker::new(&aps);
        load.attach(1, 1, 1.0);

        let violations = check_assignment(&assignment, &users, &aps, &load, 1.0);
        assert!(violations.contains(&InvariantViolation::LedgerMismatch(1)));

        load.attach(1, 2, 1.0);
        let violations = check_assignment(&assignment, &users, &aps, &load, 1.0);
        assert_eq!(violations, vec![InvariantViolation::UnflaggedOverload(1)]);
    }

    #[test]
    fn ledger_counts_dirty_streaks() {
        let mut ledger = InvariantLedger::new();
        ledger.record(&[]);
        ledger.record(&[InvariantViolation::UnknownUser(4)]);
        ledger.record(&[InvariantViolation::UnknownUser(4)]);
        assert_eq!(ledger.consecutive_dirty_checks, 2);
        assert_eq!(ledger.total_violations, 2);
        assert!(!ledger.is_clean());
        ledger.record(&[]);
        assert_eq!(ledger.consecutive_dirty_checks, 0);
        assert_eq!(ledger.checks, 4);
    }
}
