//! Waveform signal registry.
//!
//! The actual VCD writer lives with the host UI; the contract here is
//! the fixed table of monitored signals. Names, widths and bit
//! offsets are stable, and every signal is sampled through the owning
//! [`Hardware`] so the writer never holds pointers into emulator
//! state.

use crate::cpu::{
    ADDR_PORT, ADDR_PORT_DIR, BUS_PORT, BUS_PORT_DIR, CTRL_PORT, CTRL_PORT_DIR, MISC_PORT,
    MISC_PORT_DIR, REG_DEBUG, REG_IRCON, REG_SP, REG_TCON, REG_TH0, REG_TH1, REG_TH2, REG_TL0,
    REG_TL1, REG_TL2,
};
use crate::hardware::Hardware;
use crate::neighbors::{PIN_BOTTOM_IDX, PIN_LEFT_IDX, PIN_RIGHT_IDX, PIN_TOP_IDX};
use crate::radio;

/// Where a signal's backing value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A byte of the SFR file.
    Sfr(usize),
    /// Interrupt nesting depth.
    IrqCount,
    /// Program counter.
    Pc,
    /// Timer input sampling latch; carries the neighbor input after
    /// the misc-port bit is acknowledged.
    T012,
    /// Signal owned by the radio module.
    Radio(radio::Signal),
}

/// One monitored signal: a bit slice of some emulator byte or word.
#[derive(Debug, Clone)]
pub struct SignalDef {
    pub scope: &'static str,
    pub name: &'static str,
    pub width: u8,
    pub offset: u8,
    pub source: Source,
}

impl SignalDef {
    pub(crate) fn new(
        scope: &'static str,
        name: &'static str,
        width: u8,
        offset: u8,
        source: Source,
    ) -> Self {
        Self {
            scope,
            name,
            width,
            offset,
            source,
        }
    }
}

fn sfr(scope: &'static str, name: &'static str, width: u8, offset: u8, reg: usize) -> SignalDef {
    SignalDef::new(scope, name, width, offset, Source::Sfr(reg))
}

impl Hardware {
    /// The full monitored-signal table, grouped by scope name.
    pub fn waveform_signals(&self) -> Vec<SignalDef> {
        let mut signals = vec![
            // Parallel busses
            sfr("gpio", "addr", 8, 0, ADDR_PORT),
            sfr("gpio", "addr_dir", 8, 0, ADDR_PORT_DIR),
            sfr("gpio", "bus", 8, 0, BUS_PORT),
            sfr("gpio", "bus_dir", 8, 0, BUS_PORT_DIR),
            // Control port, broken out
            sfr("gpio", "lcd_dcx", 1, 0, CTRL_PORT),
            sfr("gpio", "flash_lat1", 1, 1, CTRL_PORT),
            sfr("gpio", "flash_lat2", 1, 2, CTRL_PORT),
            sfr("gpio", "en3v3", 1, 3, CTRL_PORT),
            sfr("gpio", "ds_en", 1, 4, CTRL_PORT),
            sfr("gpio", "flash_we", 1, 5, CTRL_PORT),
            sfr("gpio", "flash_oe", 1, 6, CTRL_PORT),
            sfr("gpio", "ctrl_dir", 8, 0, CTRL_PORT_DIR),
            // Misc port, broken out per neighbor side
            sfr("gpio", "nb_top", 1, PIN_TOP_IDX, MISC_PORT),
            sfr("gpio", "nb_top_dir", 1, PIN_TOP_IDX, MISC_PORT_DIR),
            sfr("gpio", "nb_left", 1, PIN_LEFT_IDX, MISC_PORT),
            sfr("gpio", "nb_left_dir", 1, PIN_LEFT_IDX, MISC_PORT_DIR),
            sfr("gpio", "nb_bottom", 1, PIN_BOTTOM_IDX, MISC_PORT),
            sfr("gpio", "nb_bottom_dir", 1, PIN_BOTTOM_IDX, MISC_PORT_DIR),
            sfr("gpio", "nb_right", 1, PIN_RIGHT_IDX, MISC_PORT),
            sfr("gpio", "nb_right_dir", 1, PIN_RIGHT_IDX, MISC_PORT_DIR),
            // The misc-port input bit is cleared by the firmware
            // acknowledge before a sampler can see it; the timer
            // sampling latch keeps the copy we export.
            SignalDef::new("gpio", "nb_in", 1, 6, Source::T012),
            sfr("gpio", "nb_in_dir", 1, 6, MISC_PORT_DIR),
            // CPU internals
            SignalDef::new("cpu", "irq_count", 3, 0, Source::IrqCount),
            SignalDef::new("cpu", "PC", 16, 0, Source::Pc),
            sfr("cpu", "TL0", 8, 0, REG_TL0),
            sfr("cpu", "TH0", 8, 0, REG_TH0),
            sfr("cpu", "TL1", 8, 0, REG_TL1),
            sfr("cpu", "TH1", 8, 0, REG_TH1),
            sfr("cpu", "TL2", 8, 0, REG_TL2),
            sfr("cpu", "TH2", 8, 0, REG_TH2),
            sfr("cpu", "TCON", 8, 0, REG_TCON),
            sfr("cpu", "IRCON", 8, 0, REG_IRCON),
            sfr("cpu", "SP", 8, 0, REG_SP),
            sfr("cpu", "DEBUG", 8, 0, REG_DEBUG),
        ];
        signals.extend(radio::Radio::waveform_signals());
        signals
    }

    /// Sample one signal, masked to its declared width.
    pub fn sample_signal(&self, def: &SignalDef) -> u16 {
        let raw: u16 = match def.source {
            Source::Sfr(reg) => self.cpu.sfr[reg] as u16,
            Source::IrqCount => self.cpu.irq_count as u16,
            Source::Pc => self.cpu.pc,
            Source::T012 => self.cpu.t012 as u16,
            Source::Radio(sig) => self.spi.radio.sample(sig),
        };
        let mask = if def.width >= 16 {
            u16::MAX
        } else {
            (1u16 << def.width) - 1
        };
        (raw >> def.offset) & mask
    }
}
