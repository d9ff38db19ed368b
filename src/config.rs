// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Static Configuration

//! Everything the engine reads once at start: campus geometry, the AP list,
//! the initial user list, cost weights, thresholds and optimizer cadence.
//!
//! Every section defaults, so `{}` is a valid (empty) configuration. A
//! configuration is only accepted after [`EngineConfig::validate`] passes.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cost::CostWeights;
use crate::flow::SolveBudget;
use crate::mobility::MobilityConfig;
use crate::signal::SignalModel;
use crate::types::{AccessPoint, ApId, Band, Position, User, UserId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate access point id {0}")]
    DuplicateAccessPoint(ApId),

    #[error("duplicate user id {0}")]
    DuplicateUser(UserId),

    #[error("access point {ap}: {field} must be positive")]
    NonPositiveCapacity { ap: ApId, field: &'static str },

    #[error("access point {ap}: channel {channel} is not legal on the {band} GHz band")]
    IllegalChannel { ap: ApId, band: Band, channel: u16 },

    #[error("optimizer interval must be at least one tick")]
    ZeroOptimizerInterval,

    #[error("overload fraction {0} must lie in (0, 1]")]
    OverloadFraction(f64),

    #[error("{entity} at {position} lies outside the campus")]
    OutOfCampus { entity: String, position: Position },

    #[error("campus must have positive extent and min_floor <= max_floor")]
    Campus,

    #[error("{entity}: airtime demand {demand} must be positive and finite")]
    InvalidDemand { entity: String, demand: f64 },

    #[error("cost weight `{0}` must be finite and non-negative")]
    InvalidWeight(&'static str),

    #[error("mobility speed range [{min}, {max}] is invalid")]
    SpeedRange { min: f64, max: f64 },

    #[error("mobility hotspot {0} has a non-finite position or a negative radius")]
    InvalidHotspot(usize),

    #[error("hotspot speed cap {0} must be finite and non-negative")]
    HotspotSpeed(f64),
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CampusConfig {
    pub width: f64,
    pub height: f64,
    pub min_floor: i32,
    pub max_floor: i32,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self { width: 1200.0, height: 1200.0, min_floor: 1, max_floor: 7 }
    }
}

impl CampusConfig {
    pub fn contains(&self, p: &Position) -> bool {
        p.x.is_finite()
            && p.y.is_finite()
            && (0.0..=self.width).contains(&p.x)
            && (0.0..=self.height).contains(&p.y)
            && (self.min_floor..=self.max_floor).contains(&p.floor)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessPointConfig {
    pub id: ApId,
    pub floor: i32,
    pub x: f64,
    pub y: f64,
    pub band: Band,
    /// Defaults to the first channel of the band plan.
    #[serde(default)]
    pub channel: Option<u16>,
    pub user_capacity: u32,
    pub airtime_capacity: f64,
}

impl AccessPointConfig {
    pub fn to_access_point(&self) -> AccessPoint {
        AccessPoint {
            id: self.id,
            position: Position::new(self.floor, self.x, self.y),
            band: self.band,
            channel: self.channel.unwrap_or(self.band.channel_plan()[0]),
            user_capacity: self.user_capacity,
            airtime_capacity: self.airtime_capacity,
            interference: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    pub id: UserId,
    pub floor: i32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub airtime_demand: Option<f64>,
}

impl UserConfig {
    pub fn to_user(&self, default_demand: f64) -> User {
        User::new(
            self.id,
            Position::new(self.floor, self.x, self.y),
            self.airtime_demand.unwrap_or(default_demand),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// Links weaker than this never enter the flow graph.
    pub rssi_usable_dbm: f64,
    /// Share of airtime capacity an AP may carry before it counts as overloaded.
    pub overload_fraction: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { rssi_usable_dbm: -75.0, overload_fraction: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// The optimizer runs on ticks where `tick % interval_ticks == 0`.
    pub interval_ticks: u64,
    pub time_budget_ms: Option<u64>,
    pub max_augmentations: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { interval_ticks: 5, time_budget_ms: Some(50), max_augmentations: None }
    }
}

impl OptimizerConfig {
    pub fn budget(&self) -> SolveBudget {
        SolveBudget {
            max_duration: self.time_budget_ms.map(Duration::from_millis),
            max_augmentations: self.max_augmentations,
        }
    }

    pub fn is_due(&self, tick: u64) -> bool {
        self.interval_ticks > 0 && tick % self.interval_ticks == 0
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub campus: CampusConfig,
    pub access_points: Vec<AccessPointConfig>,
    pub users: Vec<UserConfig>,
    pub weights: CostWeights,
    pub thresholds: Thresholds,
    pub optimizer: OptimizerConfig,
    pub mobility: MobilityConfig,
    pub signal: SignalModel,
    pub seed: u64,
    pub default_airtime_demand: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            campus: CampusConfig::default(),
            access_points: Vec::new(),
            users: Vec::new(),
            weights: CostWeights::default(),
            thresholds: Thresholds::default(),
            optimizer: OptimizerConfig::default(),
            mobility: MobilityConfig::default(),
            signal: SignalModel::default(),
            seed: 42,
            default_airtime_demand: 1.0,
        }
    }
}

impl EngineConfig {
    /// Parse and validate in one step.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// First problem found, in a fixed order: campus, global knobs, APs, users.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.campus;
        if !(c.width.is_finite() && c.width > 0.0 && c.height.is_finite() && c.height > 0.0)
            || c.min_floor > c.max_floor
        {
            return Err(ConfigError::Campus);
        }
        if self.optimizer.interval_ticks == 0 {
            return Err(ConfigError::ZeroOptimizerInterval);
        }
        let f = self.thresholds.overload_fraction;
        if !(f > 0.0 && f <= 1.0) {
            return Err(ConfigError::OverloadFraction(f));
        }
        if let Some(name) = self.weights.first_invalid() {
            return Err(ConfigError::InvalidWeight(name));
        }
        let m = &self.mobility;
        if !(m.speed_min.is_finite() && m.speed_max.is_finite())
            || m.speed_min < 0.0
            || m.speed_min > m.speed_max
            || !(0.0..=1.0).contains(&m.direction_change_prob)
            || !(0.0..=1.0).contains(&m.hotspot_prob)
        {
            return Err(ConfigError::SpeedRange { min: m.speed_min, max: m.speed_max });
        }
        if !(m.hotspot_speed_max.is_finite() && m.hotspot_speed_max >= 0.0) {
            return Err(ConfigError::HotspotSpeed(m.hotspot_speed_max));
        }
        if let Some(i) = m
            .hotspots
            .iter()
            .position(|h| !(h.x.is_finite() && h.y.is_finite() && h.radius.is_finite() && h.radius >= 0.0))
        {
            return Err(ConfigError::InvalidHotspot(i));
        }
        check_demand("default_airtime_demand", self.default_airtime_demand)?;

        let mut ap_ids = BTreeSet::new();
        for ap in &self.access_points {
            if !ap_ids.insert(ap.id) {
                return Err(ConfigError::DuplicateAccessPoint(ap.id));
            }
            if ap.user_capacity == 0 {
                return Err(ConfigError::NonPositiveCapacity { ap: ap.id, field: "user_capacity" });
            }
            if !(ap.airtime_capacity.is_finite() && ap.airtime_capacity > 0.0) {
                return Err(ConfigError::NonPositiveCapacity { ap: ap.id, field: "airtime_capacity" });
            }
            if let Some(channel) = ap.channel {
                if !ap.band.is_legal_channel(channel) {
                    return Err(ConfigError::IllegalChannel { ap: ap.id, band: ap.band, channel });
                }
            }
            let position = Position::new(ap.floor, ap.x, ap.y);
            if !c.contains(&position) {
                return Err(ConfigError::OutOfCampus { entity: format!("access point {}", ap.id), position });
            }
        }

        let mut user_ids = BTreeSet::new();
        for user in &self.users {
            if !user_ids.insert(user.id) {
                return Err(ConfigError::DuplicateUser(user.id));
            }
            let position = Position::new(user.floor, user.x, user.y);
            if !c.contains(&position) {
                return Err(ConfigError::OutOfCampus { entity: format!("user {}", user.id), position });
            }
            if let Some(demand) = user.airtime_demand {
                check_demand(&format!("user {}", user.id), demand)?;
            }
        }
        Ok(())
    }
}

fn check_demand(entity: &str, demand: f64) -> Result<(), ConfigError> {
    if demand.is_finite() && demand > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidDemand { entity: entity.to_string(), demand })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ap_json(id: u32, extra: &str) -> String {
        format!(
            r#"{{"id": {id}, "floor": 1, "x": 10, "y": 10, "band": "5", "user_capacity": 4, "airtime_capacity": 4.0{extra}}}"#
        )
    }

    #[test]
    fn empty_object_is_a_valid_config() {
        let config = EngineConfig::from_json("{}").expect("test: parse");
        assert_eq!(config.optimizer.interval_ticks, 5);
        assert_eq!(config.thresholds.rssi_usable_dbm, -75.0);
        assert!(config.access_points.is_empty());
    }

    #[test]
    fn parses_access_points_and_users() {
        let json = format!(
            r#"{{"access_points": [{}], "users": [{{"id": 3, "floor": 1, "x": 5, "y": 5, "airtime_demand": 2.0}}]}}"#,
            ap_json(1, r#", "channel": 44"#)
        );
        let config = EngineConfig::from_json(&json).expect("test: parse");
        let ap = config.access_points[0].to_access_point();
        assert_eq!(ap.channel, 44);
        assert_eq!(ap.band, Band::Ghz5);
        assert_eq!(Band::default(), Band::Ghz5);
        let user = config.users[0].to_user(config.default_airtime_demand);
        assert_eq!(user.airtime_demand, 2.0);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = format!(r#"{{"access_points": [{}, {}]}}"#, ap_json(1, ""), ap_json(1, ""));
        assert!(matches!(EngineConfig::from_json(&json), Err(ConfigError::DuplicateAccessPoint(1))));
    }

    #[test]
    fn rejects_unknown_band() {
        let json = r#"{"access_points": [{"id": 1, "floor": 1, "x": 1, "y": 1, "band": "60", "user_capacity": 1, "airtime_capacity": 1.0}]}"#;
        assert!(matches!(EngineConfig::from_json(json), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn rejects_bad_capacity_and_channel() {
        let json = format!(r#"{{"access_points": [{}]}}"#, ap_json(1, "").replace("\"user_capacity\": 4", "\"user_capacity\": 0"));
        assert!(matches!(
            EngineConfig::from_json(&json),
            Err(ConfigError::NonPositiveCapacity { ap: 1, field: "user_capacity" })
        ));

        let mut config = EngineConfig::default();
        config.access_points.push(AccessPointConfig {
            id: 3,
            floor: 1,
            x: 1.0,
            y: 1.0,
            band: Band::Ghz2_4,
            channel: Some(36),
            user_capacity: 1,
            airtime_capacity: 1.0,
        });
        assert!(matches!(config.validate(), Err(ConfigError::IllegalChannel { ap: 3, channel: 36, .. })));
    }

    #[test]
    fn rejects_bad_global_knobs() {
        let mut config = EngineConfig::default();
        config.optimizer.interval_ticks = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroOptimizerInterval)));

        let mut config = EngineConfig::default();
        config.thresholds.overload_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::OverloadFraction(_))));

        let mut config = EngineConfig::default();
        config.weights.airtime = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidWeight("airtime"))));

        let mut config = EngineConfig::default();
        config.campus.min_floor = 5;
        config.campus.max_floor = 2;
        assert!(matches!(config.validate(), Err(ConfigError::Campus)));
    }

    #[test]
    fn rejects_unusable_hotspot_settings() {
        let mut config = EngineConfig::default();
        config.mobility.hotspot_speed_max = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::HotspotSpeed(_))));

        let mut config = EngineConfig::default();
        config.mobility.hotspot_speed_max = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::HotspotSpeed(_))));

        let mut config = EngineConfig::default();
        config.mobility.hotspots[1].radius = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHotspot(1))));

        let mut config = EngineConfig::default();
        config.mobility.hotspots.push(crate::mobility::Hotspot { x: f64::INFINITY, y: 0.0, radius: 10.0 });
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHotspot(3))));
    }

    #[test]
    fn rejects_entities_outside_campus() {
        let mut config = EngineConfig::default();
        config.users.push(UserConfig { id: 1, floor: 1, x: 1300.0, y: 5.0, airtime_demand: None });
        assert!(matches!(config.validate(), Err(ConfigError::OutOfCampus { .. })));

        let mut config = EngineConfig::default();
        config.users.push(UserConfig { id: 1, floor: 9, x: 10.0, y: 5.0, airtime_demand: None });
        assert!(matches!(config.validate(), Err(ConfigError::OutOfCampus { .. })));
    }

    #[test]
    fn optimizer_cadence_starts_at_tick_zero() {
        let opt = OptimizerConfig::default();
        assert!(opt.is_due(0));
        assert!(!opt.is_due(4));
        assert!(opt.is_due(5));
        assert_eq!(opt.budget().max_duration, Some(Duration::from_millis(50)));
    }
}
