// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Type Definitions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub type UserId = u32;
pub type ApId = u32;

// ─── Band ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Band {
    #[serde(rename = "2.4")]
    Ghz2_4,
    #[default]
    #[serde(rename = "5")]
    Ghz5,
    #[serde(rename = "6")]
    Ghz6,
}

impl Band {
    pub const ALL: [Band; 3] = [Band::Ghz2_4, Band::Ghz5, Band::Ghz6];

    /// Log-distance path loss exponent (n).
    pub fn path_loss_exponent(&self) -> f64 {
        match self {
            Self::Ghz2_4 => 2.0,
            Self::Ghz5 => 2.2,
            Self::Ghz6 => 2.4,
        }
    }

    /// Free-space loss at the 1 m reference distance, band centre frequency.
    pub fn reference_loss_db(&self) -> f64 {
        match self {
            Self::Ghz2_4 => 40.05,
            Self::Ghz5 => 46.42,
            Self::Ghz6 => 48.0,
        }
    }

    /// Planar radius within which clients scan this AP at all.
    pub fn sensor_radius(&self) -> f64 {
        match self {
            Self::Ghz2_4 => 600.0,
            Self::Ghz5 => 450.0,
            Self::Ghz6 => 250.0,
        }
    }

    pub fn is_legal_channel(&self, channel: u16) -> bool {
        match self {
            Self::Ghz2_4 => (1..=14).contains(&channel),
            Self::Ghz5 => (36..=177).contains(&channel),
            Self::Ghz6 => (1..=233).contains(&channel),
        }
    }

    /// Non-overlapping channels handed out when an AP is moved onto this band.
    pub fn channel_plan(&self) -> &'static [u16] {
        match self {
            Self::Ghz2_4 => &[1, 6, 11],
            Self::Ghz5 => &[36, 40, 44, 48],
            Self::Ghz6 => &[5, 21, 37, 53, 69],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ghz2_4 => "2.4",
            Self::Ghz5 => "5",
            Self::Ghz6 => "6",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.label() == label.trim())
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub floor: i32,
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(floor: i32, x: f64, y: f64) -> Self {
        Self { floor, x, y }
    }

    /// Distance on the campus plane, ignoring floors.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn floors_between(&self, other: &Position) -> u32 {
        self.floor.abs_diff(other.floor)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(floor {}, {:.1}, {:.1})", self.floor, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

// ─── User ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UserStatus {
    Connected,
    Unassigned,
    /// No AP above the usable RSSI threshold.
    Unreachable,
    /// Left on an overloaded AP because no alternative had room.
    StrandedOverloaded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub position: Position,
    /// `None` until the mobility policy assigns a first heading.
    #[serde(default)]
    pub velocity: Option<Velocity>,
    pub airtime_demand: f64,
    /// Cumulative airtime consumed while assigned.
    #[serde(default)]
    pub airtime_usage: f64,
    #[serde(default)]
    pub rssi_by_ap: BTreeMap<ApId, f64>,
    pub status: UserStatus,
}

impl User {
    pub fn new(id: UserId, position: Position, airtime_demand: f64) -> Self {
        Self {
            id,
            position,
            velocity: None,
            airtime_demand,
            airtime_usage: 0.0,
            rssi_by_ap: BTreeMap::new(),
            status: UserStatus::Unassigned,
        }
    }

    pub fn rssi_to(&self, ap: ApId) -> Option<f64> {
        self.rssi_by_ap.get(&ap).copied()
    }

    pub fn is_usable(&self, ap: ApId, threshold_dbm: f64) -> bool {
        self.rssi_to(ap).is_some_and(|rssi| rssi >= threshold_dbm)
    }

    /// APs this user could attach to, in ascending AP id order.
    pub fn usable_aps(&self, threshold_dbm: f64) -> impl Iterator<Item = (ApId, f64)> + '_ {
        self.rssi_by_ap
            .iter()
            .filter(move |&(_, &rssi)| rssi >= threshold_dbm)
            .map(|(&ap, &rssi)| (ap, rssi))
    }
}

// ─── AccessPoint ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessPoint {
    pub id: ApId,
    pub position: Position,
    pub band: Band,
    pub channel: u16,
    pub user_capacity: u32,
    pub airtime_capacity: f64,
    /// Co-channel interference score against same-band neighbours on the floor.
    #[serde(default)]
    pub interference: f64,
}

impl AccessPoint {
    /// Airtime the AP may carry before it counts as overloaded.
    pub fn airtime_budget(&self, overload_fraction: f64) -> f64 {
        self.airtime_capacity * overload_fraction
    }
}

// ─── Assignment ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub ap: ApId,
    pub cost: f64,
}

/// Authoritative user → AP mapping. A user absent from the map is unassigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    links: BTreeMap<UserId, Link>,
}

impl Assignment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_links(links: impl IntoIterator<Item = (UserId, Link)>) -> Self {
        Self { links: links.into_iter().collect() }
    }

    pub fn ap_of(&self, user: UserId) -> Option<ApId> {
        self.links.get(&user).map(|l| l.ap)
    }

    pub fn link(&self, user: UserId) -> Option<&Link> {
        self.links.get(&user)
    }

    /// Attach `user` to `ap`, returning the link it replaced.
    pub fn assign(&mut self, user: UserId, ap: ApId, cost: f64) -> Option<Link> {
        self.links.insert(user, Link { ap, cost })
    }

    pub fn unassign(&mut self, user: UserId) -> Option<Link> {
        self.links.remove(&user)
    }

    pub fn set_cost(&mut self, user: UserId, cost: f64) {
        if let Some(link) = self.links.get_mut(&user) {
            link.cost = cost;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, &Link)> + '_ {
        self.links.iter().map(|(&u, l)| (u, l))
    }

    pub fn users_on(&self, ap: ApId) -> impl Iterator<Item = UserId> + '_ {
        self.links.iter().filter(move |(_, l)| l.ap == ap).map(|(&u, _)| u)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn total_cost(&self) -> f64 {
        self.links.values().map(|l| l.cost).sum()
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSnapshot {
    pub tick: u64,
    pub users: Vec<UserView>,
    pub access_points: Vec<ApView>,
    pub total_cost: f64,
    pub unassigned_user_ids: Vec<UserId>,
    pub events: TickEvents,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub position: Position,
    #[serde(rename = "assignedAP")]
    pub assigned_ap: Option<ApId>,
    #[serde(rename = "rssiByAP")]
    pub rssi_by_ap: BTreeMap<ApId, f64>,
    pub airtime_usage: f64,
    pub airtime_demand: f64,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApView {
    pub id: ApId,
    pub band: Band,
    pub channel: u16,
    pub current_load: f64,
    pub utilization: f64,
    pub assigned_user_ids: Vec<UserId>,
    pub overloaded: bool,
}

// ─── Tick Events ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvents {
    pub optimizer: OptimizerEvent,
    pub rebalance: Option<RebalanceSummary>,
    pub applied_commands: u32,
    pub rejected_commands: Vec<RejectedCommand>,
    pub invariant_violations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum OptimizerEvent {
    #[default]
    Skipped,
    #[serde(rename_all = "camelCase")]
    Committed {
        flow: i64,
        cost: f64,
        unreachable_user_ids: Vec<UserId>,
        unassigned_user_ids: Vec<UserId>,
    },
    Aborted {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct Move {
    pub user: UserId,
    pub from: Option<ApId>,
    pub to: ApId,
    pub cost: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceSummary {
    pub overloaded_before: Vec<ApId>,
    pub placements: Vec<Move>,
    pub moves: Vec<Move>,
    pub stranded: Vec<UserId>,
    pub still_overloaded: Vec<ApId>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RejectedCommand {
    pub sequence: u64,
    pub reason: String,
}

// ─── EngineStats ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineStats {
    pub ticks: u64,
    pub solves_completed: u64,
    pub solves_aborted: u64,
    pub total_moves: u64,
    pub total_placements: u64,
    pub stranded_events: u64,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub invariant_violations: u64,
}
