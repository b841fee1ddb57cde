//! Simulated switch matrix device.
//!
//! Provides the single shared device model with:
//! - Two switches with four paths each
//! - A fixed actuation delay during which the device reports busy
//! - Readback codes confirming the selected switch/path pair
//! - The legacy 1..8 path numbering

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// Readback code reported when no pair is selected
pub const DEFAULT_READBACK: &str = "0x0000";

/// Readback codes indexed by `[switch - 1][path - 1]`
const READBACK_TABLE: [[&str; 4]; 2] = [
    ["0x1101", "0x1102", "0x1103", "0x1104"],
    ["0x2101", "0x2102", "0x2103", "0x2104"],
];

/// Look up the readback code for a switch/path pair.
pub fn readback_code(switch: u8, path: u8) -> &'static str {
    match (switch, path) {
        (1..=2, 1..=4) => READBACK_TABLE[usize::from(switch - 1)][usize::from(path - 1)],
        _ => DEFAULT_READBACK,
    }
}

/// Map a legacy path index (1..8) to its switch/path pair.
pub fn legacy_pair(n: u64) -> Option<(u8, u8)> {
    match n {
        1..=4 => Some((1, n as u8)),
        5..=8 => Some((2, (n - 4) as u8)),
        _ => None,
    }
}

/// Consistent view of the device at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub switch: u8,
    pub path: u8,
    pub busy: bool,
    #[serde(rename = "switchReadback")]
    pub switch_readback: &'static str,
}

#[derive(Debug)]
struct Registers {
    switch: u8,
    /// 0 until the first selection is applied
    path: u8,
    busy: bool,
}

/// Shared device state
pub struct DeviceState {
    /// Held for reads and for the whole apply sequence
    registers: Mutex<Registers>,
    /// How long a selection keeps the device busy
    actuation_delay: Duration,
}

impl DeviceState {
    /// Create a new device instance
    pub fn new(actuation_delay: Duration) -> Arc<Self> {
        info!(
            actuation_delay_ms = actuation_delay.as_millis() as u64,
            "Initializing device"
        );
        Arc::new(Self {
            registers: Mutex::new(Registers {
                switch: 1,
                path: 0,
                busy: false,
            }),
            actuation_delay,
        })
    }

    /// Apply an already-validated selection.
    ///
    /// The device is busy for the actuation delay and the lock is held
    /// throughout, so selections from different connections serialize and
    /// `snapshot` never sees a half-applied selection.
    pub async fn apply_selection(&self, switch: u8, path: u8) {
        let mut registers = self.registers.lock().await;
        registers.busy = true;
        trace!(switch, path, "Actuating");

        tokio::time::sleep(self.actuation_delay).await;

        registers.switch = switch;
        registers.path = path;
        registers.busy = false;
        debug!(switch, path, "Selection applied");
    }

    /// Read the current state together with its readback code
    pub async fn snapshot(&self) -> Snapshot {
        let registers = self.registers.lock().await;
        Snapshot {
            switch: registers.switch,
            path: registers.path,
            busy: registers.busy,
            switch_readback: readback_code(registers.switch, registers.path),
        }
    }
}
