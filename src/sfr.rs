//! SFR read/write dispatch.
//!
//! The interpreter stores a written value into the SFR file first and
//! then calls [`sfr_write`]; reads come through [`sfr_read`] before
//! the interpreter consumes them. Everything is synchronous: a write
//! that can change the graphics bus runs the bus update before the
//! instruction commits.
//!
//! [`sfr_write`]: Hardware::sfr_write
//! [`sfr_read`]: Hardware::sfr_read

use crate::cpu::{
    ADDR_PORT, ADDR_PORT_DIR, BUS_PORT, BUS_PORT_DIR, CTRL_PORT, CTRL_PORT_DIR, MISC_PORT,
    MISC_PORT_DIR, REG_ADCCON1, REG_ARCON, REG_DEBUG, REG_MD0, REG_RFCON, REG_RNGCTL, REG_RNGDAT,
    REG_SPIRDAT, REG_W2CON0, REG_W2CON1, REG_W2DAT, RFCON_RFCE, RFCON_RFCKEN, RFCON_RFCSN,
};
use crate::hardware::Hardware;

impl Hardware {
    /// Route the side effects of a write to SFR index `reg`. The new
    /// value is already in the SFR file.
    pub fn sfr_write(&mut self, reg: usize) {
        let value = self.cpu.sfr[reg];
        match reg {
            BUS_PORT | ADDR_PORT | CTRL_PORT | BUS_PORT_DIR | ADDR_PORT_DIR | CTRL_PORT_DIR => {
                self.graphics_tick();
            }
            MISC_PORT | MISC_PORT_DIR => self.neighbors.io_update(&mut self.cpu),
            REG_RFCON => {
                self.rfcken = value & RFCON_RFCKEN != 0;
                self.spi.radio.set_ce(value & RFCON_RFCE != 0);
                self.spi.radio.set_csn(value & RFCON_RFCSN != 0);
                self.cpu.need_hardware_tick = true;
            }
            REG_SPIRDAT => self.spi.write_data(value, &mut self.cpu),
            REG_W2CON0 => self.i2c.write_con0(&mut self.cpu),
            REG_W2DAT => self.i2c.write_data(value, &mut self.cpu),
            REG_RNGCTL => self.rng.write_ctl(value),
            REG_ADCCON1 => self.adc.write_con1(&mut self.cpu),
            REG_MD0..=REG_ARCON => self.mdu.write(reg - REG_MD0, value),
            REG_DEBUG => self.debug_byte(),
            _ => {}
        }
        self.service_exceptions();
    }

    /// Capture peripheral state for a read of SFR index `reg`.
    pub fn sfr_read(&mut self, reg: usize) -> u8 {
        let value = match reg {
            REG_SPIRDAT => self.spi.read_data(&mut self.cpu),
            REG_W2DAT => self.i2c.read_data(&mut self.cpu),
            REG_W2CON1 => self.i2c.read_con1(&mut self.cpu),
            REG_RNGCTL => self.rng.read_ctl(),
            REG_RNGDAT => self.rng.read_data(),
            REG_MD0..=REG_ARCON => self.mdu.read(reg - REG_MD0),
            _ => self.cpu.sfr[reg],
        };
        self.service_exceptions();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::cpu::{REG_ARCON, REG_MD0, REG_MD1, REG_MD2, REG_MD3};
    use crate::mdu::OP_MUL16;
    use crate::Config;
    use std::rc::Rc;

    fn hardware() -> Hardware {
        Hardware::new(Rc::new(VirtualClock::new()), Config::default()).unwrap()
    }

    fn write(hw: &mut Hardware, reg: usize, value: u8) {
        hw.cpu.sfr[reg] = value;
        hw.sfr_write(reg);
    }

    #[test]
    fn port_write_reaches_the_bus() {
        let mut hw = hardware();
        write(&mut hw, CTRL_PORT_DIR, 0);
        write(&mut hw, ADDR_PORT_DIR, 0);
        write(&mut hw, CTRL_PORT, 0);
        write(&mut hw, ADDR_PORT, 0x54);
        write(&mut hw, CTRL_PORT, crate::bus::Ctrl::FLASH_LAT1.bits());
        assert_eq!(hw.lat1(), 0x2A);
    }

    #[test]
    fn rfcon_shadow_bits() {
        let mut hw = hardware();
        write(&mut hw, REG_RFCON, RFCON_RFCKEN);
        assert!(hw.rfcken());
        assert!(hw.cpu.need_hardware_tick);
        write(&mut hw, REG_RFCON, 0);
        assert!(!hw.rfcken());
    }

    #[test]
    fn mdu_register_window() {
        let mut hw = hardware();
        write(&mut hw, REG_MD0, 0x05);
        write(&mut hw, REG_MD1, 0x00);
        write(&mut hw, REG_MD2, 0x07);
        write(&mut hw, REG_MD3, 0x00);
        write(&mut hw, REG_ARCON, OP_MUL16);
        assert_eq!(hw.sfr_read(REG_MD0), 35);
        assert_eq!(hw.sfr_read(REG_MD1), 0);
    }

    #[test]
    fn rng_gated_by_control() {
        let mut hw = hardware();
        assert_eq!(hw.sfr_read(REG_RNGDAT), 0);
        write(&mut hw, REG_RNGCTL, crate::rng::CTL_RUN);
        assert_ne!(hw.sfr_read(REG_RNGCTL) & crate::rng::CTL_READY, 0);
        let a = hw.sfr_read(REG_RNGDAT);
        let b = hw.sfr_read(REG_RNGDAT);
        assert!(a != 0 || b != 0);
    }

    #[test]
    fn plain_sfr_reads_pass_through() {
        let mut hw = hardware();
        hw.cpu.sfr[crate::cpu::REG_ACC] = 0x42;
        assert_eq!(hw.sfr_read(crate::cpu::REG_ACC), 0x42);
    }
}
