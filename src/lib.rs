// Copyright 2026 Hypermesh Foundation. All rights reserved.
// APFlow Wireless Balancing Engine

pub mod types;
pub mod config;
pub mod signal;
pub mod cost;
pub mod load;
pub mod flow;
pub mod priority;
pub mod rebalance;
pub mod mobility;
pub mod commands;
pub mod invariants;
pub mod simulation;

pub use types::*;
pub use commands::{Command, CommandError, CommandReceipt};
pub use config::{ConfigError, EngineConfig};
pub use simulation::{ClockState, Engine, EngineError};

use wasm_bindgen::prelude::*;

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ─── WASM Interface ──────────────────────────────────────────────────────────

#[wasm_bindgen]
impl Engine {
    /// Build and start an engine from a plain JS configuration object.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<Engine, JsValue> {
        #[cfg(target_arch = "wasm32")]
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));

        let config: EngineConfig = serde_wasm_bindgen::from_value(config).map_err(js_error)?;
        let mut engine = Engine::initialize(config).map_err(js_error)?;
        engine.start().map_err(js_error)?;
        Ok(engine)
    }

    pub fn tick(&mut self) -> Result<JsValue, JsValue> {
        let snapshot = self.tick_core().map_err(js_error)?;
        serde_wasm_bindgen::to_value(&snapshot).map_err(js_error)
    }

    /// Returns the id reserved for the new user.
    pub fn add_user(&mut self, floor: i32, x: f64, y: f64) -> Result<u32, JsValue> {
        let receipt = self
            .submit(Command::AddUser { position: Position::new(floor, x, y), airtime_demand: None })
            .map_err(js_error)?;
        receipt.user.ok_or_else(|| js_error("no user id reserved"))
    }

    pub fn remove_user(&mut self, id: u32) -> Result<(), JsValue> {
        self.submit(Command::RemoveUser { id }).map(drop).map_err(js_error)
    }

    pub fn set_band(&mut self, ap: u32, band: &str) -> Result<(), JsValue> {
        let band = Band::parse(band).ok_or_else(|| js_error(format!("unknown band {band:?}")))?;
        self.submit(Command::SetBand { ap, band }).map(drop).map_err(js_error)
    }

    pub fn relocate(&mut self, id: u32, floor: i32, x: f64, y: f64) -> Result<(), JsValue> {
        self.submit(Command::Relocate { id, position: Position::new(floor, x, y) })
            .map(drop)
            .map_err(js_error)
    }

    pub fn get_stats(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self.stats()).unwrap_or(JsValue::NULL)
    }

    pub fn get_snapshot(&self) -> JsValue {
        serde_wasm_bindgen::to_value(&self.snapshot()).unwrap_or(JsValue::NULL)
    }

    /// Run up to `ticks` ticks without returning snapshots (fast batch mode
    /// for benchmarking). Returns the number actually run.
    pub fn run_batch(&mut self, ticks: u32) -> u32 {
        let mut done = 0;
        for _ in 0..ticks {
            if self.tick_core().is_err() {
                break;
            }
            done += 1;
        }
        done
    }

    /// Rebuild from the original configuration and start again.
    pub fn reset(&mut self) -> Result<(), JsValue> {
        let mut fresh = Engine::initialize(self.config.clone()).map_err(js_error)?;
        fresh.start().map_err(js_error)?;
        *self = fresh;
        Ok(())
    }
}
