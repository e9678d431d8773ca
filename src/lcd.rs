//! LCD bus interface model.
//!
//! Only the side of the controller the graphics bus can observe:
//! write strobes, the data/command select line, and frame pacing for
//! the host renderer. The pixel pipeline proper is a separate module
//! outside this core. The read strobe is strapped inactive, so the
//! panel never drives the shared bus.

use crate::clock::{TickDeadline, HZ};
use crate::cpu::Cpu;

/// Panel refresh period in CPU cycles, roughly 60 Hz.
pub const FRAME_CYCLES: u64 = HZ / 60;

// Command bytes the core reacts to.
pub const CMD_SLPIN: u8 = 0x10;
pub const CMD_SLPOUT: u8 = 0x11;
pub const CMD_DISPOFF: u8 = 0x28;
pub const CMD_DISPON: u8 = 0x29;
pub const CMD_RAMWR: u8 = 0x2C;

/// Pin state presented to the panel for one bus cycle.
#[derive(Debug, Clone, Copy)]
pub struct Pins {
    pub power: bool,
    pub csx: bool,
    pub dcx: bool,
    pub wrx: bool,
    pub rdx: bool,
    pub data_in: u8,
}

pub struct Lcd {
    prev_wrx: bool,
    powered: bool,
    sleeping: bool,
    display_on: bool,
    current_cmd: u8,
    cmd_count: u64,
    pixel_bytes: u64,
    frame_count: u32,
    next_frame: u64,
}

impl Lcd {
    pub fn new() -> Self {
        Self {
            prev_wrx: false,
            powered: false,
            sleeping: true,
            display_on: false,
            current_cmd: 0,
            cmd_count: 0,
            pixel_bytes: 0,
            frame_count: 0,
            next_frame: FRAME_CYCLES,
        }
    }

    /// One graphics-bus cycle. Bytes are latched on the rising edge of
    /// the write strobe while the panel rail is up.
    pub fn cycle(&mut self, pins: &Pins) {
        if pins.power != self.powered {
            self.powered = pins.power;
            if !pins.power {
                // Rail dropped: controller state is lost.
                self.sleeping = true;
                self.display_on = false;
                self.prev_wrx = false;
                return;
            }
        }

        if self.powered && pins.wrx && !self.prev_wrx {
            if pins.dcx {
                if self.current_cmd == CMD_RAMWR {
                    self.pixel_bytes += 1;
                }
            } else {
                self.command(pins.data_in);
            }
        }
        self.prev_wrx = pins.wrx;
    }

    fn command(&mut self, cmd: u8) {
        self.current_cmd = cmd;
        self.cmd_count += 1;
        match cmd {
            CMD_SLPIN => self.sleeping = true,
            CMD_SLPOUT => self.sleeping = false,
            CMD_DISPON => self.display_on = true,
            CMD_DISPOFF => self.display_on = false,
            CMD_RAMWR => self.pixel_bytes = 0,
            _ => {}
        }
    }

    /// Frame pacing; keeps one deadline per refresh so the host can
    /// sample a stable frame counter.
    pub fn tick(&mut self, deadline: &mut TickDeadline, cpu: &mut Cpu) {
        let now = cpu.clock.now();
        while self.next_frame <= now {
            if self.display_on {
                self.frame_count = self.frame_count.wrapping_add(1);
            }
            self.next_frame += FRAME_CYCLES;
        }
        deadline.set(self.next_frame);
    }

    /// The panel never drives the shared data bus (rdx strapped low).
    #[inline]
    pub fn data_drv(&self) -> bool {
        false
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Pixel bytes written since the last RAMWR.
    pub fn pixel_bytes(&self) -> u64 {
        self.pixel_bytes
    }

    pub fn command_count(&self) -> u64 {
        self.cmd_count
    }
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strobe(lcd: &mut Lcd, dcx: bool, byte: u8) {
        let mut pins = Pins {
            power: true,
            csx: false,
            dcx,
            wrx: false,
            rdx: false,
            data_in: byte,
        };
        lcd.cycle(&pins);
        pins.wrx = true;
        lcd.cycle(&pins);
    }

    #[test]
    fn latches_on_rising_wrx_only() {
        let mut lcd = Lcd::new();
        strobe(&mut lcd, false, CMD_SLPOUT);
        assert!(!lcd.is_sleeping());

        // Held-high strobe does not latch again
        let pins = Pins {
            power: true,
            csx: false,
            dcx: false,
            wrx: true,
            rdx: false,
            data_in: CMD_SLPIN,
        };
        lcd.cycle(&pins);
        assert!(!lcd.is_sleeping());
    }

    #[test]
    fn pixel_bytes_follow_ramwr() {
        let mut lcd = Lcd::new();
        strobe(&mut lcd, false, CMD_RAMWR);
        strobe(&mut lcd, true, 0xAB);
        strobe(&mut lcd, true, 0xCD);
        assert_eq!(lcd.pixel_bytes(), 2);
        strobe(&mut lcd, false, CMD_RAMWR);
        assert_eq!(lcd.pixel_bytes(), 0);
    }

    #[test]
    fn power_drop_resets_controller() {
        let mut lcd = Lcd::new();
        strobe(&mut lcd, false, CMD_SLPOUT);
        let off = Pins {
            power: false,
            csx: false,
            dcx: false,
            wrx: false,
            rdx: false,
            data_in: 0,
        };
        lcd.cycle(&off);
        assert!(lcd.is_sleeping());
    }
}
