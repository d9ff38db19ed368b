// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Greedy Rebalancer

//! Cheap local repair between optimizer runs.
//!
//! A pass has two phases. Placement first: unassigned users that still see a
//! usable AP are placed on the cheapest AP with room, most constrained user
//! first. Then eviction: for every AP over its limits, assigned users are
//! drained through a [`StableHeap`] keyed by eviction score (weak signal and
//! heavy demand go first) and moved to the cheapest alternative with room.
//! A user with no alternative is marked stranded and stays put.
//!
//! Each user is popped at most once per phase, so a pass always terminates.
//! Moves and placements only target APs with room, so no AP that was within
//! its limits before the pass ends up over them.

use std::collections::BTreeMap;

use tracing::debug;

use crate::cost::CostFunction;
use crate::load::LoadTracker;
use crate::priority::{ScoreHeap, StableHeap};
use crate::types::{AccessPoint, ApId, Assignment, Move, RebalanceSummary, User, UserId, UserStatus};

/// dB of RSSI credit one unit of airtime demand is worth when ranking evictions.
pub const DEMAND_EVICTION_WEIGHT: f64 = 5.0;

/// Lower scores are evicted first.
pub fn eviction_score(rssi_dbm: f64, airtime_demand: f64) -> f64 {
    rssi_dbm - DEMAND_EVICTION_WEIGHT * airtime_demand
}

pub struct GreedyRebalancer<'a> {
    cost: &'a CostFunction,
    overload_fraction: f64,
}

impl<'a> GreedyRebalancer<'a> {
    pub fn new(cost: &'a CostFunction, overload_fraction: f64) -> Self {
        Self { cost, overload_fraction }
    }

    /// One bounded pass over `assignment`. `aps` must be sorted by id.
    pub fn rebalance(
        &self,
        aps: &[AccessPoint],
        users: &mut BTreeMap<UserId, User>,
        assignment: &mut Assignment,
        load: &mut LoadTracker,
    ) -> RebalanceSummary {
        let mut summary = RebalanceSummary {
            overloaded_before: load.refresh_flags(aps, self.overload_fraction),
            ..RebalanceSummary::default()
        };

        self.place_unassigned(aps, users, assignment, load, &mut summary);

        for &ap_id in &summary.overloaded_before.clone() {
            let Some(ap) = aps.iter().find(|a| a.id == ap_id) else { continue };
            self.drain(ap, aps, users, assignment, load, &mut summary);
        }

        summary.still_overloaded = load.refresh_flags(aps, self.overload_fraction);
        if !summary.moves.is_empty() || !summary.stranded.is_empty() {
            debug!(
                placements = summary.placements.len(),
                moves = summary.moves.len(),
                stranded = summary.stranded.len(),
                still_overloaded = summary.still_overloaded.len(),
                "rebalance pass"
            );
        }
        summary
    }

    /// Cheapest AP other than `exclude` that `user` can use and that has room
    /// for its demand. Ties go to the lower AP id.
    pub fn best_alternative(
        &self,
        user: &User,
        exclude: Option<ApId>,
        aps: &[AccessPoint],
        load: &LoadTracker,
    ) -> Option<(ApId, f64)> {
        let snapshot = load.snapshot();
        let mut best: Option<(ApId, f64)> = None;
        for ap in aps {
            if Some(ap.id) == exclude || !load.has_room_for(ap, user.airtime_demand, self.overload_fraction) {
                continue;
            }
            let Some(cost) = self.cost.edge_cost(user, ap, &snapshot, exclude) else { continue };
            match best {
                Some((best_id, best_cost)) if cost > best_cost || (cost == best_cost && ap.id > best_id) => {}
                _ => best = Some((ap.id, cost)),
            }
        }
        best
    }

    fn place_unassigned(
        &self,
        aps: &[AccessPoint],
        users: &mut BTreeMap<UserId, User>,
        assignment: &mut Assignment,
        load: &mut LoadTracker,
        summary: &mut RebalanceSummary,
    ) {
        let threshold = self.cost.rssi_threshold();
        let mut queue = StableHeap::new(|a: &usize, b: &usize| a.cmp(b));
        for user in users.values() {
            if assignment.ap_of(user.id).is_some() {
                continue;
            }
            let options = user.usable_aps(threshold).count();
            if options > 0 {
                queue.push(user.id, options);
            }
        }

        while let Some((user_id, _)) = queue.pop() {
            let Some(user) = users.get_mut(&user_id) else { continue };
            let Some((ap, cost)) = self.best_alternative(user, None, aps, load) else { continue };
            assignment.assign(user_id, ap, cost);
            load.attach(ap, user_id, user.airtime_demand);
            user.status = UserStatus::Connected;
            summary.placements.push(Move { user: user_id, from: None, to: ap, cost });
        }
    }

    fn drain(
        &self,
        ap: &AccessPoint,
        aps: &[AccessPoint],
        users: &mut BTreeMap<UserId, User>,
        assignment: &mut Assignment,
        load: &mut LoadTracker,
        summary: &mut RebalanceSummary,
    ) {
        let mut queue = ScoreHeap::by_score();
        for user_id in assignment.users_on(ap.id) {
            if let Some(user) = users.get(&user_id) {
                let rssi = user.rssi_to(ap.id).unwrap_or(f64::NEG_INFINITY);
                queue.push(user_id, eviction_score(rssi, user.airtime_demand));
            }
        }

        while load.is_over(ap, self.overload_fraction) {
            let Some((user_id, _)) = queue.pop() else { break };
            let Some(user) = users.get_mut(&user_id) else { continue };
            match self.best_alternative(user, Some(ap.id), aps, load) {
                Some((to, cost)) => {
                    load.detach(ap.id, user_id, user.airtime_demand);
                    load.attach(to, user_id, user.airtime_demand);
                    assignment.assign(user_id, to, cost);
                    user.status = UserStatus::Connected;
                    summary.moves.push(Move { user: user_id, from: Some(ap.id), to, cost });
                }
                None => {
                    user.status = UserStatus::StrandedOverloaded;
                    summary.stranded.push(user_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::CostWeights;
    use crate::signal::SignalModel;
    use crate::types::{Band, Position};

    fn ap(id: ApId, x: f64, users: u32, airtime: f64) -> AccessPoint {
        AccessPoint {
            id,
            position: Position::new(1, x, 100.0),
            band: Band::Ghz5,
            channel: if id % 2 == 0 { 48 } else { 36 },
            user_capacity: users,
            airtime_capacity: airtime,
            interference: 0.0,
        }
    }

    fn scanned(id: UserId, x: f64, aps: &[AccessPoint]) -> User {
        let mut u = User::new(id, Position::new(1, x, 100.0), 1.0);
        u.rssi_by_ap = SignalModel::default().scan(&u.position, aps);
        u
    }

    fn fixture(aps: &[AccessPoint], xs: &[f64]) -> BTreeMap<UserId, User> {
        xs.iter()
            .enumerate()
            .map(|(i, &x)| (i as UserId + 1, scanned(i as UserId + 1, x, aps)))
            .collect()
    }

    #[test]
    fn evicts_weakest_users_until_within_capacity() {
        let aps = vec![ap(1, 100.0, 3, 3.0), ap(2, 200.0, 2, 2.0)];
        let mut users = fixture(&aps, &[110.0, 120.0, 130.0, 140.0, 150.0]);
        let mut assignment = Assignment::new();
        for id in 1..=5 {
            assignment.assign(id, 1, 0.0);
        }
        let mut load = LoadTracker::new(&aps);
        load.rebuild(&assignment, &users);

        let cost = CostFunction::new(CostWeights::default(), -75.0);
        let summary = GreedyRebalancer::new(&cost, 1.0).rebalance(&aps, &mut users, &mut assignment, &mut load);

        assert_eq!(summary.overloaded_before, vec![1]);
        let moved: Vec<UserId> = summary.moves.iter().map(|m| m.user).collect();
        assert_eq!(moved, vec![5, 4]);
        assert!(summary.moves.iter().all(|m| m.to == 2));
        assert_eq!(load.user_count(1), 3);
        assert_eq!(load.user_count(2), 2);
        assert!(summary.stranded.is_empty());
        assert!(summary.still_overloaded.is_empty());
    }

    #[test]
    fn strands_users_without_alternative() {
        let aps = vec![ap(1, 100.0, 1, 1.0), ap(2, 200.0, 1, 1.0)];
        let mut users = fixture(&aps, &[100.0, 105.0, 110.0]);
        let mut assignment = Assignment::new();
        for id in 1..=3 {
            assignment.assign(id, 1, 0.0);
        }
        let mut load = LoadTracker::new(&aps);
        load.rebuild(&assignment, &users);

        let cost = CostFunction::new(CostWeights::default(), -75.0);
        let summary = GreedyRebalancer::new(&cost, 1.0).rebalance(&aps, &mut users, &mut assignment, &mut load);

        // user 3 fits on AP 2; users 2 and 1 find it full afterwards
        assert_eq!(summary.moves.len(), 1);
        assert_eq!(summary.moves[0].user, 3);
        assert_eq!(summary.stranded, vec![2, 1]);
        assert_eq!(summary.still_overloaded, vec![1]);
        let stranded = summary.stranded[0];
        assert_eq!(users[&stranded].status, UserStatus::StrandedOverloaded);
        assert_eq!(assignment.ap_of(stranded), Some(1));
        assert!(!load.is_over(&aps[1], 1.0));
    }

    #[test]
    fn places_most_constrained_user_first() {
        // AP 2 has one slot; user 1 can only use AP 2, user 2 can use both.
        let aps = vec![ap(1, 100.0, 4, 4.0), ap(2, 200.0, 1, 1.0)];
        let mut users = fixture(&aps, &[190.0, 195.0]);
        if let Some(u) = users.get_mut(&1) {
            u.rssi_by_ap.remove(&1);
        }
        if let Some(u) = users.get_mut(&2) {
            u.rssi_by_ap.insert(1, -60.0);
            u.rssi_by_ap.insert(2, -45.0);
        }
        let mut assignment = Assignment::new();
        let mut load = LoadTracker::new(&aps);

        let cost = CostFunction::new(CostWeights::default(), -75.0);
        let summary = GreedyRebalancer::new(&cost, 1.0).rebalance(&aps, &mut users, &mut assignment, &mut load);

        assert_eq!(summary.placements.len(), 2);
        assert_eq!(assignment.ap_of(1), Some(2));
        assert_eq!(assignment.ap_of(2), Some(1));
        assert_eq!(users[&1].status, UserStatus::Connected);
    }

    #[test]
    fn alternative_ties_go_to_lower_ap_id() {
        let mut aps = vec![ap(1, 100.0, 2, 2.0), ap(2, 100.0, 2, 2.0), ap(3, 100.0, 2, 2.0)];
        aps[1].channel = 36;
        aps[2].channel = 36;
        let user = scanned(1, 100.0, &aps);
        let load = LoadTracker::new(&aps);
        let cost = CostFunction::new(CostWeights::default(), -75.0);
        let rebalancer = GreedyRebalancer::new(&cost, 1.0);
        assert_eq!(rebalancer.best_alternative(&user, Some(1), &aps, &load).map(|(a, _)| a), Some(2));
        assert_eq!(rebalancer.best_alternative(&user, None, &aps, &load).map(|(a, _)| a), Some(1));
    }

    #[test]
    fn eviction_prefers_heavy_and_weak_users() {
        assert!(eviction_score(-70.0, 1.0) < eviction_score(-50.0, 1.0));
        assert!(eviction_score(-50.0, 3.0) < eviction_score(-50.0, 1.0));
    }
}
