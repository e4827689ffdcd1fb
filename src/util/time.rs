//! Time utilities for the simulation loop

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Simulation tick rate. Both peers run the same fixed step, so the tuning
/// constants in `game::car` are expressed per tick rather than per second.
pub const SIMULATION_TPS: u32 = 60;
pub const TICK_DURATION: Duration = Duration::from_micros(1_000_000 / SIMULATION_TPS as u64);
