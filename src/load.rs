// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Load Tracking

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{AccessPoint, ApId, Assignment, User, UserId};

/// Slack for airtime sums built by repeated add/subtract.
pub const AIRTIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApLoad {
    pub airtime: f64,
    pub users: BTreeSet<UserId>,
    pub overloaded: bool,
}

/// Per-AP load bookkeeping, indexed densely in ascending AP id order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTracker {
    ids: Vec<ApId>,
    entries: Vec<ApLoad>,
}

impl LoadTracker {
    pub fn new(aps: &[AccessPoint]) -> Self {
        let mut ids: Vec<ApId> = aps.iter().map(|ap| ap.id).collect();
        ids.sort_unstable();
        ids.dedup();
        let entries = vec![ApLoad::default(); ids.len()];
        Self { ids, entries }
    }

    pub fn index_of(&self, ap: ApId) -> Option<usize> {
        self.ids.binary_search(&ap).ok()
    }

    pub fn get(&self, ap: ApId) -> Option<&ApLoad> {
        self.index_of(ap).map(|i| &self.entries[i])
    }

    pub fn airtime(&self, ap: ApId) -> f64 {
        self.get(ap).map_or(0.0, |l| l.airtime)
    }

    pub fn user_count(&self, ap: ApId) -> usize {
        self.get(ap).map_or(0, |l| l.users.len())
    }

    pub fn is_flagged(&self, ap: ApId) -> bool {
        self.get(ap).is_some_and(|l| l.overloaded)
    }

    /// Add `user` to `ap`. Returns false for an unknown AP or a user already attached there.
    pub fn attach(&mut self, ap: ApId, user: UserId, demand: f64) -> bool {
        let Some(i) = self.index_of(ap) else { return false };
        let entry = &mut self.entries[i];
        if !entry.users.insert(user) {
            return false;
        }
        entry.airtime += demand;
        true
    }

    pub fn detach(&mut self, ap: ApId, user: UserId, demand: f64) -> bool {
        let Some(i) = self.index_of(ap) else { return false };
        let entry = &mut self.entries[i];
        if !entry.users.remove(&user) {
            return false;
        }
        entry.airtime = if entry.users.is_empty() { 0.0 } else { (entry.airtime - demand).max(0.0) };
        true
    }

    /// Recompute every aggregate from the authoritative assignment.
    pub fn rebuild(&mut self, assignment: &Assignment, users: &BTreeMap<UserId, User>) {
        for entry in &mut self.entries {
            entry.airtime = 0.0;
            entry.users.clear();
        }
        for (user_id, link) in assignment.iter() {
            let demand = users.get(&user_id).map_or(0.0, |u| u.airtime_demand);
            self.attach(link.ap, user_id, demand);
        }
    }

    pub fn is_over(&self, ap: &AccessPoint, overload_fraction: f64) -> bool {
        self.get(ap.id).is_some_and(|l| {
            l.airtime > ap.airtime_budget(overload_fraction) + AIRTIME_EPSILON
                || l.users.len() > ap.user_capacity as usize
        })
    }

    /// Whether `ap` can take one more user of `demand` without crossing either limit.
    pub fn has_room_for(&self, ap: &AccessPoint, demand: f64, overload_fraction: f64) -> bool {
        self.get(ap.id).is_some_and(|l| {
            l.users.len() < ap.user_capacity as usize
                && l.airtime + demand <= ap.airtime_budget(overload_fraction) + AIRTIME_EPSILON
        })
    }

    /// Re-derive overload flags; returns the overloaded AP ids.
    pub fn refresh_flags(&mut self, aps: &[AccessPoint], overload_fraction: f64) -> Vec<ApId> {
        let mut overloaded = Vec::new();
        for ap in aps {
            let over = self.is_over(ap, overload_fraction);
            if let Some(i) = self.index_of(ap.id) {
                self.entries[i].overloaded = over;
            }
            if over {
                overloaded.push(ap.id);
            }
        }
        overloaded
    }

    pub fn overloaded_ids(&self) -> Vec<ApId> {
        self.ids
            .iter()
            .zip(&self.entries)
            .filter(|(_, l)| l.overloaded)
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn utilization(&self, ap: &AccessPoint) -> f64 {
        if ap.airtime_capacity > 0.0 { self.airtime(ap.id) / ap.airtime_capacity } else { 0.0 }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApId, &ApLoad)> + '_ {
        self.ids.iter().copied().zip(&self.entries)
    }

    pub fn snapshot(&self) -> LoadSnapshot {
        LoadSnapshot {
            ids: self.ids.clone(),
            airtime: self.entries.iter().map(|l| l.airtime).collect(),
            users: self.entries.iter().map(|l| l.users.len()).collect(),
        }
    }
}

/// Immutable copy of per-AP aggregates, read by the cost function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadSnapshot {
    ids: Vec<ApId>,
    airtime: Vec<f64>,
    users: Vec<usize>,
}

impl LoadSnapshot {
    pub fn airtime_of(&self, ap: ApId) -> f64 {
        self.ids.binary_search(&ap).map_or(0.0, |i| self.airtime[i])
    }

    pub fn users_on(&self, ap: ApId) -> usize {
        self.ids.binary_search(&ap).map_or(0, |i| self.users[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Band, Position};

    fn ap(id: ApId, users: u32, airtime: f64) -> AccessPoint {
        AccessPoint {
            id,
            position: Position::new(1, 0.0, 0.0),
            band: Band::Ghz5,
            channel: 36,
            user_capacity: users,
            airtime_capacity: airtime,
            interference: 0.0,
        }
    }

    #[test]
    fn attach_and_detach_keep_aggregates() {
        let aps = vec![ap(2, 4, 10.0), ap(1, 4, 10.0)];
        let mut tracker = LoadTracker::new(&aps);
        assert!(tracker.attach(1, 10, 2.5));
        assert!(tracker.attach(1, 11, 1.5));
        assert!(!tracker.attach(1, 10, 2.5), "double attach must be refused");
        assert!(!tracker.attach(99, 12, 1.0), "unknown AP");
        assert_eq!(tracker.user_count(1), 2);
        assert!((tracker.airtime(1) - 4.0).abs() < 1e-12);

        assert!(tracker.detach(1, 10, 2.5));
        assert!(!tracker.detach(1, 10, 2.5));
        assert!((tracker.airtime(1) - 1.5).abs() < 1e-12);
        assert!(tracker.detach(1, 11, 1.5));
        assert_eq!(tracker.airtime(1), 0.0);
    }

    #[test]
    fn overload_on_either_limit() {
        let aps = vec![ap(1, 2, 10.0), ap(2, 10, 3.0)];
        let mut tracker = LoadTracker::new(&aps);
        for u in 0..3 {
            tracker.attach(1, u, 1.0);
        }
        tracker.attach(2, 7, 4.0);
        let over = tracker.refresh_flags(&aps, 1.0);
        assert_eq!(over, vec![1, 2]);
        assert!(tracker.is_flagged(1) && tracker.is_flagged(2));

        tracker.detach(1, 0, 1.0);
        tracker.detach(2, 7, 4.0);
        assert!(tracker.refresh_flags(&aps, 1.0).is_empty());
        assert!(tracker.overloaded_ids().is_empty());
    }

    #[test]
    fn overload_fraction_tightens_budget() {
        let aps = vec![ap(1, 10, 10.0)];
        let mut tracker = LoadTracker::new(&aps);
        tracker.attach(1, 1, 8.5);
        assert!(!tracker.is_over(&aps[0], 1.0));
        assert!(tracker.is_over(&aps[0], 0.8));
        assert!(!tracker.has_room_for(&aps[0], 1.0, 0.9));
        assert!(tracker.has_room_for(&aps[0], 1.0, 1.0));
    }

    #[test]
    fn rebuild_matches_assignment() {
        let aps = vec![ap(1, 4, 10.0), ap(2, 4, 10.0)];
        let mut users = BTreeMap::new();
        for id in 0..3 {
            users.insert(id, User::new(id, Position::new(1, 0.0, 0.0), 1.0 + id as f64));
        }
        let mut assignment = Assignment::new();
        assignment.assign(0, 1, 0.0);
        assignment.assign(1, 2, 0.0);
        assignment.assign(2, 2, 0.0);

        let mut tracker = LoadTracker::new(&aps);
        tracker.attach(1, 42, 9.0);
        tracker.rebuild(&assignment, &users);
        assert_eq!(tracker.user_count(1), 1);
        assert!((tracker.airtime(2) - 5.0).abs() < 1e-12);

        let snap = tracker.snapshot();
        assert_eq!(snap.users_on(2), 2);
        assert_eq!(snap.airtime_of(1), 1.0);
        assert_eq!(snap.airtime_of(77), 0.0);
    }
}
