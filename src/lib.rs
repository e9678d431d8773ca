//! Cycle-driven hardware emulator core for a battery-powered wireless
//! display cube built around an 8051-family microcontroller.
//!
//! One [`Hardware`] instance models a single cube: the multiplexed
//! graphics bus shared between CPU, external flash and LCD, the
//! address latches, the peripheral tick scheduler, the NVM
//! programming model and the SFR dispatch the interpreter calls into.
//! The instruction-set interpreter itself, the persistent storage
//! backend, the debugger UI and the VCD file writer are host
//! collaborators; their contracts live in [`cpu`], [`nvm`],
//! [`hardware`] and [`vcd`].

use std::path::PathBuf;

pub mod accel;
pub mod adc;
pub mod backlight;
pub mod bus;
pub mod clock;
pub mod cpu;
pub mod extflash;
pub mod hardware;
pub mod i2c;
pub mod lcd;
pub mod mdu;
pub mod neighbors;
pub mod nvm;
pub mod radio;
pub mod rng;
pub mod sfr;
pub mod spi;
pub mod trace;
pub mod vcd;

pub use clock::{TickDeadline, VirtualClock, HZ};
pub use cpu::{Cpu, Exception};
pub use hardware::{DebugHandler, Hardware};
pub use nvm::FlashStorage;

/// Construction-time failures. Runtime hardware faults never surface
/// as errors; they go through the exception counter instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read firmware image: {0}")]
    FirmwareIo(#[from] std::io::Error),
    #[error("malformed firmware image at line {line}: {reason}")]
    FirmwareFormat { line: usize, reason: &'static str },
}

/// Per-cube construction config.
pub struct Config {
    /// Intel HEX firmware image. Without one, code memory is filled
    /// with a branch-to-self pattern.
    pub firmware: Option<PathBuf>,
    /// Host-provided flash backing, e.g. restored from disk. A fresh
    /// erased record is used when absent.
    pub storage: Option<Box<FlashStorage>>,
    /// Debugger capability for this cube.
    pub debug: Option<Box<dyn DebugHandler>>,
    /// Hand exceptions to the attached debugger instead of logging.
    pub stop_on_exception: bool,
    /// Seed for the RNG peripheral and the accelerometer dither.
    pub rng_seed: u16,
    /// Cube instance id, used in diagnostics.
    pub id: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            firmware: None,
            storage: None,
            debug: None,
            stop_on_exception: false,
            rng_seed: 0xACE1,
            id: 0,
        }
    }
}
