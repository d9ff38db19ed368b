// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench: Scenario Definitions
//
// Every scenario runs on a generated grid campus. Scenario logic lives in the
// grid spec, the placement policy and the mid-run event hook; the engine is
// driven only through its public command interface.

use std::f64::consts::TAU;

use apflow_engine::config::{AccessPointConfig, CampusConfig, EngineConfig, OptimizerConfig, UserConfig};
use apflow_engine::mobility::{Hotspot, MobilityConfig};
use apflow_engine::{ApId, Band, Command, Engine, Position};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::churn::ChurnRates;

// ─── Scenario Configuration ─────────────────────────────────────────────────

pub struct GridSpec {
    pub floors: i32,
    pub cols: u32,
    pub rows: u32,
    pub spacing_m: f64,
    pub band: Band,
    pub user_capacity: u32,
    pub airtime_capacity: f64,
}

impl GridSpec {
    pub fn campus(&self) -> CampusConfig {
        CampusConfig {
            width: f64::from(self.cols) * self.spacing_m,
            height: f64::from(self.rows) * self.spacing_m,
            min_floor: 1,
            max_floor: self.floors,
        }
    }

    /// One AP per grid cell centre per floor, ids from 1, channels cycling
    /// through the band plan so neighbours differ.
    pub fn access_points(&self) -> Vec<AccessPointConfig> {
        let plan = self.band.channel_plan();
        let mut aps = Vec::new();
        for floor in 1..=self.floors {
            for row in 0..self.rows {
                for col in 0..self.cols {
                    let id = aps.len() as ApId + 1;
                    aps.push(AccessPointConfig {
                        id,
                        floor,
                        x: (f64::from(col) + 0.5) * self.spacing_m,
                        y: (f64::from(row) + 0.5) * self.spacing_m,
                        band: self.band,
                        channel: Some(plan[(row + col) as usize % plan.len()]),
                        user_capacity: self.user_capacity,
                        airtime_capacity: self.airtime_capacity,
                    });
                }
            }
        }
        aps
    }
}

pub enum Placement {
    Uniform,
    /// Around a point given as fractions of campus width and height.
    Cluster { x_frac: f64, y_frac: f64, radius: f64 },
}

pub struct Scenario {
    pub name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub grid: GridSpec,
    pub users: u32,
    pub placement: Placement,
    pub ticks: u64,
    pub churn: ChurnRates,
    pub optimizer: OptimizerConfig,
    pub criteria: PassCriteria,
    /// Commands to inject before the given tick runs.
    pub mid_event: Option<fn(u64, &Engine) -> Vec<Command>>,
}

pub struct PassCriteria {
    pub max_invariant_violations: u64,
    /// Mean share of users holding an AP across the run.
    pub min_served_rate: Option<f64>,
    pub require_optimizer_commit: bool,
    pub max_overloaded_at_end: Option<usize>,
}

impl Default for PassCriteria {
    fn default() -> Self {
        Self {
            max_invariant_violations: 0,
            min_served_rate: None,
            require_optimizer_commit: true,
            max_overloaded_at_end: None,
        }
    }
}

impl Scenario {
    pub fn build_config(&self, seed: u64) -> EngineConfig {
        let campus = self.grid.campus();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let users = (1..=self.users)
            .map(|id| {
                let (x, y) = self.place(&campus, &mut rng);
                UserConfig {
                    id,
                    floor: rng.gen_range(campus.min_floor..=campus.max_floor),
                    x,
                    y,
                    airtime_demand: None,
                }
            })
            .collect();

        let hotspots = vec![Hotspot { x: campus.width / 2.0, y: campus.height / 2.0, radius: self.grid.spacing_m / 2.0 }];

        EngineConfig {
            access_points: self.grid.access_points(),
            users,
            optimizer: self.optimizer.clone(),
            mobility: MobilityConfig { hotspots, ..MobilityConfig::default() },
            seed,
            campus,
            ..EngineConfig::default()
        }
    }

    fn place(&self, campus: &CampusConfig, rng: &mut ChaCha8Rng) -> (f64, f64) {
        match self.placement {
            Placement::Uniform => (rng.gen_range(0.0..=campus.width), rng.gen_range(0.0..=campus.height)),
            Placement::Cluster { x_frac, y_frac, radius } => {
                let angle = rng.gen_range(0.0..TAU);
                let r = radius * rng.gen::<f64>().sqrt();
                let x = (campus.width * x_frac + r * angle.cos()).clamp(0.0, campus.width);
                let y = (campus.height * y_frac + r * angle.sin()).clamp(0.0, campus.height);
                (x, y)
            }
        }
    }
}

// ─── Mid-run Events ─────────────────────────────────────────────────────────

const EVENT_TICK: u64 = 100;

/// 150 arrivals on a sunflower spiral around the campus centre.
fn flash_crowd(tick: u64, engine: &Engine) -> Vec<Command> {
    if tick != EVENT_TICK {
        return Vec::new();
    }
    let campus = &engine.config().campus;
    let (cx, cy) = (campus.width / 2.0, campus.height / 2.0);
    let golden = TAU * (1.0 - 1.0 / 1.618_033_988_75);
    (0..150u32)
        .map(|i| {
            let r = 4.0 * f64::from(i).sqrt();
            let a = golden * f64::from(i);
            let x = (cx + r * a.cos()).clamp(0.0, campus.width);
            let y = (cy + r * a.sin()).clamp(0.0, campus.height);
            let floor = campus.min_floor + (i as i32 % (campus.max_floor - campus.min_floor + 1));
            Command::AddUser { position: Position::new(floor, x, y), airtime_demand: None }
        })
        .collect()
}

/// Every even-numbered AP moves to 6 GHz.
fn band_shift(tick: u64, engine: &Engine) -> Vec<Command> {
    if tick != EVENT_TICK {
        return Vec::new();
    }
    engine
        .access_points()
        .iter()
        .filter(|ap| ap.id % 2 == 0)
        .map(|ap| Command::SetBand { ap: ap.id, band: Band::Ghz6 })
        .collect()
}

// ─── Scenario Table ─────────────────────────────────────────────────────────

fn office_grid() -> GridSpec {
    GridSpec {
        floors: 2,
        cols: 4,
        rows: 4,
        spacing_m: 60.0,
        band: Band::Ghz5,
        user_capacity: 12,
        airtime_capacity: 12.0,
    }
}

const LIGHT_CHURN: ChurnRates = ChurnRates { arrivals: 0.5, departures: 0.5 };

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "BASELINE",
            label: "Baseline office campus",
            category: "steady",
            grid: office_grid(),
            users: 200,
            placement: Placement::Uniform,
            ticks: 300,
            churn: LIGHT_CHURN,
            optimizer: OptimizerConfig::default(),
            criteria: PassCriteria { min_served_rate: Some(0.9), ..PassCriteria::default() },
            mid_event: None,
        },
        Scenario {
            name: "FLASH_CROWD",
            label: "Flash crowd at campus centre",
            category: "surge",
            grid: office_grid(),
            users: 150,
            placement: Placement::Uniform,
            ticks: 300,
            churn: LIGHT_CHURN,
            optimizer: OptimizerConfig::default(),
            criteria: PassCriteria::default(),
            mid_event: Some(flash_crowd),
        },
        Scenario {
            name: "BAND_SHIFT_6GHZ",
            label: "Half the APs move to 6 GHz",
            category: "topology",
            grid: office_grid(),
            users: 200,
            placement: Placement::Uniform,
            ticks: 300,
            churn: LIGHT_CHURN,
            optimizer: OptimizerConfig::default(),
            criteria: PassCriteria::default(),
            mid_event: Some(band_shift),
        },
        Scenario {
            name: "DENSE_HOTSPOT",
            label: "Dense hotspot beyond capacity",
            category: "surge",
            grid: GridSpec {
                floors: 1,
                cols: 3,
                rows: 3,
                spacing_m: 50.0,
                band: Band::Ghz5,
                user_capacity: 25,
                airtime_capacity: 25.0,
            },
            users: 300,
            placement: Placement::Cluster { x_frac: 0.5, y_frac: 0.5, radius: 40.0 },
            ticks: 200,
            churn: ChurnRates::NONE,
            optimizer: OptimizerConfig::default(),
            criteria: PassCriteria::default(),
            mid_event: None,
        },
        Scenario {
            name: "TIGHT_SOLVE_BUDGET",
            label: "Optimizer starved, rebalancer only",
            category: "budget",
            grid: office_grid(),
            users: 200,
            placement: Placement::Uniform,
            ticks: 200,
            churn: LIGHT_CHURN,
            optimizer: OptimizerConfig { max_augmentations: Some(20), ..OptimizerConfig::default() },
            criteria: PassCriteria {
                min_served_rate: Some(0.9),
                require_optimizer_commit: false,
                ..PassCriteria::default()
            },
            mid_event: None,
        },
        Scenario {
            name: "USER_CHURN",
            label: "Heavy arrivals and departures",
            category: "steady",
            grid: office_grid(),
            users: 150,
            placement: Placement::Uniform,
            ticks: 300,
            churn: ChurnRates { arrivals: 4.0, departures: 4.0 },
            optimizer: OptimizerConfig::default(),
            criteria: PassCriteria::default(),
            mid_event: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_scenario_builds_a_valid_config() {
        for scenario in scenarios() {
            let config = scenario.build_config(3);
            assert!(config.validate().is_ok(), "{} config rejected", scenario.name);
            assert_eq!(config.users.len(), scenario.users as usize);
        }
    }

    #[test]
    fn grid_channels_come_from_the_band_plan() {
        let grid = office_grid();
        let aps = grid.access_points();
        assert_eq!(aps.len(), 32);
        assert!(aps.iter().all(|ap| grid.band.channel_plan().contains(&ap.channel.unwrap_or(0))));
        assert_ne!(aps[0].channel, aps[1].channel);
    }
}
