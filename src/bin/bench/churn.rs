// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - Bench: Poisson User Churn
//
// Arrivals and departures are Poisson per tick and reach the engine through
// the ordinary command queue, the same path an operator console would use.

use apflow_engine::config::CampusConfig;
use apflow_engine::{Command, Position, UserId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, Copy)]
pub struct ChurnRates {
    /// Expected new users per tick.
    pub arrivals: f64,
    /// Expected departures per tick.
    pub departures: f64,
}

impl ChurnRates {
    pub const NONE: ChurnRates = ChurnRates { arrivals: 0.0, departures: 0.0 };
}

pub struct ChurnGenerator {
    rng: ChaCha8Rng,
    pub arrivals: u32,
    pub departures: u32,
}

impl ChurnGenerator {
    pub fn new(rng: ChaCha8Rng) -> Self {
        Self { rng, arrivals: 0, departures: 0 }
    }

    /// Commands for one tick. Departures pick distinct users from `present`.
    pub fn generate_tick(&mut self, rates: ChurnRates, campus: &CampusConfig, present: &[UserId]) -> Vec<Command> {
        let mut commands = Vec::new();

        let leaving = (poisson_sample(&mut self.rng, rates.departures) as usize).min(present.len());
        let mut pool = present.to_vec();
        for _ in 0..leaving {
            let idx = self.rng.gen_range(0..pool.len());
            let id = pool.swap_remove(idx);
            commands.push(Command::RemoveUser { id });
            self.departures += 1;
        }

        for _ in 0..poisson_sample(&mut self.rng, rates.arrivals) {
            let floor = self.rng.gen_range(campus.min_floor..=campus.max_floor);
            let x = self.rng.gen_range(0.0..=campus.width);
            let y = self.rng.gen_range(0.0..=campus.height);
            commands.push(Command::AddUser { position: Position::new(floor, x, y), airtime_demand: None });
            self.arrivals += 1;
        }

        commands
    }
}

/// Knuth's method below λ = 30, normal approximation above.
fn poisson_sample(rng: &mut ChaCha8Rng, lambda: f64) -> u32 {
    if lambda <= 0.0 {
        return 0;
    }
    if lambda < 30.0 {
        let l = (-lambda).exp();
        let mut k: u32 = 0;
        let mut p: f64 = 1.0;
        loop {
            k += 1;
            p *= rng.gen::<f64>();
            if p <= l {
                return k - 1;
            }
        }
    } else {
        let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rng.gen();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (lambda + lambda.sqrt() * z).round().max(0.0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn poisson_mean_tracks_lambda() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let lambda = 3.0;
        let n = 10_000;
        let sum: u64 = (0..n).map(|_| poisson_sample(&mut rng, lambda) as u64).sum();
        let mean = sum as f64 / n as f64;
        assert!((mean - lambda).abs() < 0.2, "Poisson mean {} far from λ={}", mean, lambda);
    }

    #[test]
    fn departures_never_repeat_a_user() {
        let mut churn = ChurnGenerator::new(ChaCha8Rng::seed_from_u64(7));
        let campus = CampusConfig::default();
        let present: Vec<UserId> = (1..=4).collect();
        let rates = ChurnRates { arrivals: 0.0, departures: 50.0 };
        let commands = churn.generate_tick(rates, &campus, &present);
        let mut removed: Vec<UserId> = commands
            .iter()
            .filter_map(|c| match c {
                Command::RemoveUser { id } => Some(*id),
                _ => None,
            })
            .collect();
        removed.sort_unstable();
        assert_eq!(removed, present);
    }

    #[test]
    fn arrivals_land_inside_the_campus() {
        let mut churn = ChurnGenerator::new(ChaCha8Rng::seed_from_u64(9));
        let campus = CampusConfig { width: 50.0, height: 20.0, min_floor: 2, max_floor: 3 };
        let rates = ChurnRates { arrivals: 20.0, departures: 0.0 };
        for command in churn.generate_tick(rates, &campus, &[]) {
            let Command::AddUser { position, .. } = command else { panic!("unexpected {command:?}") };
            assert!(campus.contains(&position));
        }
        assert!(churn.arrivals > 0);
    }
}
