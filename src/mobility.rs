// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine - User Movement

//! Random-drift movement with occasional hotspot attraction.
//!
//! Every step a user keeps its velocity, except that with a small probability
//! it picks a fresh random heading, and with a smaller one it turns toward a
//! randomly chosen hotspot. Positions reflect off campus edges. Floors never
//! change through movement; only a relocate command moves a user between
//! floors.

use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::CampusConfig;
use crate::types::{User, Velocity};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Hotspot {
    pub x: f64,
    pub y: f64,
    /// Users already within this radius are not pulled further in.
    pub radius: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MobilityConfig {
    pub speed_min: f64,
    pub speed_max: f64,
    /// Per-step chance of a new random heading.
    pub direction_change_prob: f64,
    /// Per-step chance of turning toward a hotspot.
    pub hotspot_prob: f64,
    pub hotspot_speed_max: f64,
    pub hotspots: Vec<Hotspot>,
}

impl Default for MobilityConfig {
    fn default() -> Self {
        Self {
            speed_min: 0.5,
            speed_max: 1.5,
            direction_change_prob: 0.05,
            hotspot_prob: 0.02,
            hotspot_speed_max: 1.2,
            hotspots: vec![
                Hotspot { x: 200.0, y: 300.0, radius: 40.0 },
                Hotspot { x: 800.0, y: 500.0, radius: 50.0 },
                Hotspot { x: 600.0, y: 900.0, radius: 60.0 },
            ],
        }
    }
}

impl MobilityConfig {
    /// A configuration under which nobody moves.
    pub fn stationary() -> Self {
        Self {
            speed_min: 0.0,
            speed_max: 0.0,
            direction_change_prob: 0.0,
            hotspot_prob: 0.0,
            hotspot_speed_max: 0.0,
            hotspots: Vec::new(),
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.speed_max <= 0.0
    }

    /// Advance `user` by one tick inside `campus`.
    pub fn step<R: Rng + ?Sized>(&self, user: &mut User, campus: &CampusConfig, rng: &mut R) {
        if self.is_stationary() {
            return;
        }
        let mut velocity = match user.velocity {
            Some(v) => v,
            None => self.random_velocity(rng),
        };

        if rng.gen_bool(self.direction_change_prob.clamp(0.0, 1.0)) {
            velocity = self.random_velocity(rng);
        }

        if !self.hotspots.is_empty() && rng.gen_bool(self.hotspot_prob.clamp(0.0, 1.0)) {
            let hotspot = self.hotspots[rng.gen_range(0..self.hotspots.len())];
            let dx = hotspot.x - user.position.x;
            let dy = hotspot.y - user.position.y;
            let dist = dx.hypot(dy);
            if dist > hotspot.radius && dist > 0.0 {
                let speed = self.sample_speed(rng, self.hotspot_speed_max);
                velocity = Velocity { vx: dx / dist * speed, vy: dy / dist * speed };
            }
        }

        let (x, vx) = reflect(user.position.x + velocity.vx, velocity.vx, campus.width);
        let (y, vy) = reflect(user.position.y + velocity.vy, velocity.vy, campus.height);
        user.position.x = x;
        user.position.y = y;
        user.velocity = Some(Velocity { vx, vy });
    }

    fn random_velocity<R: Rng + ?Sized>(&self, rng: &mut R) -> Velocity {
        let angle = rng.gen_range(0.0..TAU);
        let speed = self.sample_speed(rng, self.speed_max);
        Velocity { vx: angle.cos() * speed, vy: angle.sin() * speed }
    }

    fn sample_speed<R: Rng + ?Sized>(&self, rng: &mut R, max: f64) -> f64 {
        if max > self.speed_min {
            rng.gen_range(self.speed_min..max)
        } else {
            self.speed_min
        }
    }
}

/// Bounce off `[0, limit]`, flipping the velocity component on contact.
fn reflect(pos: f64, v: f64, limit: f64) -> (f64, f64) {
    if pos < 0.0 || pos > limit {
        (pos.clamp(0.0, limit), -v)
    } else {
        (pos, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Position;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn campus() -> CampusConfig {
        CampusConfig { width: 100.0, height: 50.0, min_floor: 1, max_floor: 3 }
    }

    #[test]
    fn users_stay_inside_campus() {
        let config = MobilityConfig { speed_min: 3.0, speed_max: 9.0, direction_change_prob: 0.3, ..MobilityConfig::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut user = User::new(1, Position::new(2, 99.0, 1.0), 1.0);
        for _ in 0..2_000 {
            config.step(&mut user, &campus(), &mut rng);
            assert!((0.0..=100.0).contains(&user.position.x));
            assert!((0.0..=50.0).contains(&user.position.y));
            assert_eq!(user.position.floor, 2);
        }
    }

    #[test]
    fn same_seed_same_trajectory() {
        let config = MobilityConfig::default();
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut user = User::new(1, Position::new(1, 50.0, 25.0), 1.0);
            for _ in 0..200 {
                config.step(&mut user, &campus(), &mut rng);
            }
            user.position
        };
        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }

    #[test]
    fn first_step_assigns_velocity_within_speed_range() {
        let config = MobilityConfig { direction_change_prob: 0.0, hotspot_prob: 0.0, ..MobilityConfig::default() };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut user = User::new(1, Position::new(1, 50.0, 25.0), 1.0);
        config.step(&mut user, &campus(), &mut rng);
        let v = user.velocity.expect("test: velocity assigned");
        let speed = v.vx.hypot(v.vy);
        assert!((0.5..=1.5).contains(&speed), "speed {}", speed);
    }

    #[test]
    fn reflect_flips_velocity_at_edges() {
        assert_eq!(reflect(-2.0, -3.0, 10.0), (0.0, 3.0));
        assert_eq!(reflect(12.0, 3.0, 10.0), (10.0, -3.0));
        assert_eq!(reflect(5.0, 3.0, 10.0), (5.0, 3.0));
    }

    #[test]
    fn stationary_config_never_moves() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut user = User::new(1, Position::new(1, 10.0, 10.0), 1.0);
        MobilityConfig::stationary().step(&mut user, &campus(), &mut rng);
        assert_eq!(user.position, Position::new(1, 10.0, 10.0));
        assert!(user.velocity.is_none());
    }
}
