// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Assignment Cost

//! Scalar cost of attaching a user to an access point.
//!
//! ```text
//! cost = w_d * distance/scale + w_s * signal_penalty(rssi) + w_a * utilization
//!      + w_k * [ap != current] + w_i * interference
//! ```
//!
//! Lower is better. Every term is non-negative, so the cost is too.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::load::{LoadSnapshot, LoadTracker};
use crate::types::{AccessPoint, ApId, User, UserId};

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

const WEIGHT_DISTANCE: f64 = 0.2;
const WEIGHT_SIGNAL: f64 = 0.5;
const WEIGHT_AIRTIME: f64 = 1.0;
const WEIGHT_STICKY: f64 = 0.5;
const WEIGHT_INTERFERENCE: f64 = 0.2;

/// RSSI at or above this level carries no signal penalty.
const SIGNAL_PENALTY_CEILING_DBM: f64 = -40.0;
/// Channels closer than this on the same band partially overlap.
const ADJACENT_CHANNEL_SPAN: u16 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostWeights {
    pub distance: f64,
    pub signal: f64,
    pub airtime: f64,
    pub sticky: f64,
    pub interference: f64,
    /// Metres per distance unit fed into the distance term.
    pub distance_scale_m: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            distance: WEIGHT_DISTANCE,
            signal: WEIGHT_SIGNAL,
            airtime: WEIGHT_AIRTIME,
            sticky: WEIGHT_STICKY,
            interference: WEIGHT_INTERFERENCE,
            distance_scale_m: 10.0,
        }
    }
}

impl CostWeights {
    /// Name of the first weight that is negative or non-finite.
    pub fn first_invalid(&self) -> Option<&'static str> {
        [
            ("distance", self.distance),
            ("signal", self.signal),
            ("airtime", self.airtime),
            ("sticky", self.sticky),
            ("interference", self.interference),
        ]
        .into_iter()
        .find(|(_, w)| !w.is_finite() || *w < 0.0)
        .map(|(name, _)| name)
        .or_else(|| {
            (!self.distance_scale_m.is_finite() || self.distance_scale_m <= 0.0)
                .then_some("distance_scale_m")
        })
    }
}

/// Convert a cost to the integer milli-units used inside the flow network.
pub fn to_milli(cost: f64) -> i64 {
    (cost * 1000.0).round() as i64
}

pub fn signal_penalty(rssi_dbm: f64) -> f64 {
    ((SIGNAL_PENALTY_CEILING_DBM - rssi_dbm) / 10.0).max(0.0)
}

// ---------------------------------------------------------------------------
// CostFunction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CostFunction {
    weights: CostWeights,
    rssi_threshold_dbm: f64,
}

impl CostFunction {
    pub fn new(weights: CostWeights, rssi_threshold_dbm: f64) -> Self {
        Self { weights, rssi_threshold_dbm }
    }

    pub fn weights(&self) -> &CostWeights {
        &self.weights
    }

    pub fn rssi_threshold(&self) -> f64 {
        self.rssi_threshold_dbm
    }

    /// Cost of the (user, ap) edge, or `None` when the link is too weak to
    /// appear in the flow graph at all.
    pub fn edge_cost(
        &self,
        user: &User,
        ap: &AccessPoint,
        load: &LoadSnapshot,
        current: Option<ApId>,
    ) -> Option<f64> {
        let rssi = user.rssi_to(ap.id)?;
        if rssi < self.rssi_threshold_dbm {
            return None;
        }
        Some(self.cost(user, ap, rssi, load, current))
    }

    /// Total cost for a known RSSI. Never negative, never NaN.
    pub fn cost(
        &self,
        user: &User,
        ap: &AccessPoint,
        rssi_dbm: f64,
        load: &LoadSnapshot,
        current: Option<ApId>,
    ) -> f64 {
        let w = &self.weights;
        let distance = user.position.planar_distance(&ap.position);
        let distance_term = if distance.is_finite() { distance / w.distance_scale_m } else { 0.0 };

        // Utilization the AP would see with this user on it.
        let own = if current == Some(ap.id) { user.airtime_demand } else { 0.0 };
        let projected = (load.airtime_of(ap.id) - own).max(0.0) + user.airtime_demand;
        let utilization = if ap.airtime_capacity > 0.0 { projected / ap.airtime_capacity } else { 0.0 };

        let sticky = match current {
            Some(cur) if cur != ap.id => 1.0,
            _ => 0.0,
        };

        let total = w.distance * distance_term
            + w.signal * signal_penalty(rssi_dbm)
            + w.airtime * utilization
            + w.sticky * sticky
            + w.interference * ap.interference;

        if total.is_finite() { total.max(0.0) } else { 0.0 }
    }

    /// Sum of link costs for `links`, each priced against the load the links
    /// themselves induce.
    pub fn realized_total(
        &self,
        aps: &[AccessPoint],
        users: &BTreeMap<UserId, User>,
        links: impl IntoIterator<Item = (UserId, ApId)>,
    ) -> f64 {
        let links: Vec<(UserId, ApId)> = links.into_iter().collect();
        let mut tracker = LoadTracker::new(aps);
        for &(u, ap) in &links {
            if let Some(user) = users.get(&u) {
                tracker.attach(ap, u, user.airtime_demand);
            }
        }
        let snapshot = tracker.snapshot();
        links
            .iter()
            .filter_map(|&(u, ap_id)| {
                let user = users.get(&u)?;
                let ap = aps.iter().find(|a| a.id == ap_id)?;
                let rssi = user.rssi_to(ap_id)?;
                Some(self.cost(user, ap, rssi, &snapshot, Some(ap_id)))
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Interference
// ---------------------------------------------------------------------------

/// Co-channel score for every AP: +1.0 per same-band, same-floor neighbour on
/// an identical channel, +0.5 per neighbour within the adjacent-channel span.
pub fn compute_interference(aps: &mut [AccessPoint]) {
    let scores: Vec<f64> = aps
        .iter()
        .map(|ap| {
            aps.iter()
                .filter(|o| o.id != ap.id && o.band == ap.band && o.position.floor == ap.position.floor)
                .map(|o| match o.channel.abs_diff(ap.channel) {
                    0 => 1.0,
                    d if d <= ADJACENT_CHANNEL_SPAN => 0.5,
                    _ => 0.0,
                })
                .sum()
        })
        .collect();
    for (ap, score) in aps.iter_mut().zip(scores) {
        ap.interference = score;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
