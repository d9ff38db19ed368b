// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Signal Model

//! Log-distance path loss for client/AP links.
//!
//! ```text
//! RSSI = P_tx - PL(d0, band) - 10 * n(band) * log10(max(d, d_min)) - L_floor * floors - L_obstruction
//! ```
//!
//! Higher bands carry both a larger reference loss and a steeper exponent, so
//! at any distance 6 GHz < 5 GHz < 2.4 GHz. The result never drops below the
//! receiver noise floor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AccessPoint, ApId, Position};

/// Distances are clamped to the 1 m reference distance before the logarithm.
pub const MIN_DISTANCE_M: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SignalModel {
    pub tx_power_dbm: f64,
    pub noise_floor_dbm: f64,
    /// Extra loss per floor slab between client and AP.
    pub floor_penetration_db: f64,
}

impl Default for SignalModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: 20.0,
            noise_floor_dbm: -100.0,
            floor_penetration_db: 15.0,
        }
    }
}

impl SignalModel {
    pub fn path_loss_db(&self, distance: f64, ap: &AccessPoint) -> f64 {
        let d = if distance.is_finite() { distance.max(MIN_DISTANCE_M) } else { MIN_DISTANCE_M };
        ap.band.reference_loss_db() + 10.0 * ap.band.path_loss_exponent() * d.log10()
    }

    /// Received signal strength for a client at `position`.
    ///
    /// Negative or NaN obstruction values count as no obstruction.
    pub fn rssi(&self, position: &Position, ap: &AccessPoint, obstruction_db: Option<f64>) -> f64 {
        let distance = position.planar_distance(&ap.position);
        let floors = position.floors_between(&ap.position) as f64;
        let obstruction = obstruction_db.unwrap_or(0.0).max(0.0);
        let loss = self.path_loss_db(distance, ap) + floors * self.floor_penetration_db + obstruction;
        (self.tx_power_dbm - loss).max(self.noise_floor_dbm)
    }

    pub fn in_range(&self, position: &Position, ap: &AccessPoint) -> bool {
        position.planar_distance(&ap.position) <= ap.band.sensor_radius()
    }

    /// RSSI towards every AP within sensor range.
    pub fn scan(&self, position: &Position, aps: &[AccessPoint]) -> BTreeMap<ApId, f64> {
        aps.iter()
            .filter(|ap| self.in_range(position, ap))
            .map(|ap| (ap.id, self.rssi(position, ap, None)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Band;

    fn ap(band: Band) -> AccessPoint {
        AccessPoint {
            id: 1,
            position: Position::new(1, 0.0, 0.0),
            band,
            channel: band.channel_plan()[0],
            user_capacity: 10,
            airtime_capacity: 10.0,
            interference: 0.0,
        }
    }

    #[test]
    fn rssi_decreases_with_distance() {
        let model = SignalModel::default();
        let ap = ap(Band::Ghz5);
        let mut last = f64::INFINITY;
        for d in [2.0, 5.0, 20.0, 80.0, 200.0] {
            let rssi = model.rssi(&Position::new(1, d, 0.0), &ap, None);
            assert!(rssi < last, "rssi {} at {}m not below {}", rssi, d, last);
            last = rssi;
        }
    }

    #[test]
    fn higher_bands_attenuate_faster() {
        let model = SignalModel::default();
        for d in [0.5, 1.0, 10.0, 60.0] {
            let p = Position::new(1, d, 0.0);
            let r24 = model.rssi(&p, &ap(Band::Ghz2_4), None);
            let r5 = model.rssi(&p, &ap(Band::Ghz5), None);
            let r6 = model.rssi(&p, &ap(Band::Ghz6), None);
            assert!(r24 > r5 && r5 > r6, "band ordering broken at {}m: {} {} {}", d, r24, r5, r6);
        }
    }

    #[test]
    fn zero_distance_is_clamped_and_finite() {
        let model = SignalModel::default();
        let ap = ap(Band::Ghz6);
        let at_ap = model.rssi(&Position::new(1, 0.0, 0.0), &ap, None);
        let at_one_metre = model.rssi(&Position::new(1, 1.0, 0.0), &ap, None);
        assert!(at_ap.is_finite());
        assert_eq!(at_ap, at_one_metre);
    }

    #[test]
    fn floors_and_obstructions_cost_signal() {
        let model = SignalModel::default();
        let ap = ap(Band::Ghz5);
        let same = model.rssi(&Position::new(1, 20.0, 0.0), &ap, None);
        let above = model.rssi(&Position::new(2, 20.0, 0.0), &ap, None);
        let walled = model.rssi(&Position::new(1, 20.0, 0.0), &ap, Some(6.0));
        assert!((same - above - 15.0).abs() < 1e-9);
        assert!((same - walled - 6.0).abs() < 1e-9);
        let nan = model.rssi(&Position::new(1, 20.0, 0.0), &ap, Some(f64::NAN));
        assert_eq!(nan, same);
    }

    #[test]
    fn rssi_bottoms_out_at_noise_floor() {
        let model = SignalModel::default();
        let rssi = model.rssi(&Position::new(9, 5000.0, 0.0), &ap(Band::Ghz6), Some(60.0));
        assert_eq!(rssi, model.noise_floor_dbm);
    }

    #[test]
    fn scan_respects_sensor_radius() {
        let model = SignalModel::default();
        let near = ap(Band::Ghz6);
        let mut far = ap(Band::Ghz6);
        far.id = 2;
        far.position = Position::new(1, 400.0, 0.0);
        let seen = model.scan(&Position::new(1, 10.0, 0.0), &[near, far]);
        assert!(seen.contains_key(&1));
        assert!(!seen.contains_key(&2));
    }
}
