//! SPI master engine between the CPU core and the radio.
//!
//! One-deep transmit and receive FIFOs over a cycle-counted shift
//! register. The control SFR is sampled live at every tick so a
//! firmware that reconfigures mid-transfer sees the same edge the
//! real part produces.

use crate::clock::TickDeadline;
use crate::cpu::{Cpu, Exception, IRCON_SPI, REG_IRCON, REG_SPIRSTAT};
use crate::radio::Radio;

// SPIRCON0 bits.
pub const CON0_ENABLE: u8 = 1 << 0;
/// Clock divider select, two bits: divider is `2 << field`.
pub const CON0_CLKDIV_SHIFT: u8 = 1;

// SPIRSTAT bits.
pub const STAT_TX_READY: u8 = 1 << 0;
pub const STAT_RX_READY: u8 = 1 << 1;

#[derive(Debug, Clone, Copy)]
struct Shift {
    byte: u8,
    done_at: u64,
}

pub struct SpiBus {
    pub radio: Radio,
    tx: Option<u8>,
    rx: Option<u8>,
    shift: Option<Shift>,
}

impl SpiBus {
    pub fn new() -> Self {
        Self {
            radio: Radio::new(),
            tx: None,
            rx: None,
            shift: None,
        }
    }

    /// Data SFR written: queue a byte for transmission.
    pub fn write_data(&mut self, byte: u8, cpu: &mut Cpu) {
        if self.tx.is_some() {
            cpu.raise(Exception::SpiXrun);
            return;
        }
        self.tx = Some(byte);
        cpu.need_hardware_tick = true;
        self.update_status(cpu);
    }

    /// Data SFR read: pop the receive FIFO.
    pub fn read_data(&mut self, cpu: &mut Cpu) -> u8 {
        match self.rx.take() {
            Some(byte) => {
                self.update_status(cpu);
                byte
            }
            None => {
                cpu.raise(Exception::SpiXrun);
                0
            }
        }
    }

    pub fn tick(&mut self, deadline: &mut TickDeadline, con0: u8, cpu: &mut Cpu) {
        let now = cpu.clock.now();

        if let Some(shift) = self.shift {
            if now >= shift.done_at {
                let miso = self.radio.spi_byte(shift.byte);
                if self.rx.replace(miso).is_some() {
                    cpu.raise(Exception::SpiXrun);
                }
                cpu.sfr[REG_IRCON] |= IRCON_SPI;
                self.shift = None;
            } else {
                deadline.set(shift.done_at);
            }
        }

        if self.shift.is_none() && con0 & CON0_ENABLE != 0 {
            if let Some(byte) = self.tx.take() {
                let div = 2u64 << ((con0 >> CON0_CLKDIV_SHIFT) & 0x3);
                let done_at = now + 8 * div;
                self.shift = Some(Shift { byte, done_at });
                deadline.set(done_at);
            }
        }

        self.update_status(cpu);
    }

    fn update_status(&self, cpu: &mut Cpu) {
        let mut stat = 0;
        if self.tx.is_none() {
            stat |= STAT_TX_READY;
        }
        if self.rx.is_some() {
            stat |= STAT_RX_READY;
        }
        cpu.sfr[REG_SPIRSTAT] = stat;
    }
}

impl Default for SpiBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::rc::Rc;

    fn fixture() -> (Rc<VirtualClock>, Cpu, TickDeadline, SpiBus) {
        let clock = Rc::new(VirtualClock::new());
        let mut cpu = Cpu::new(0, clock.clone());
        cpu.reset(true);
        let dl = TickDeadline::new(clock.clone());
        (clock, cpu, dl, SpiBus::new())
    }

    #[test]
    fn byte_shifts_after_divided_clock() {
        let (clock, mut cpu, mut dl, mut spi) = fixture();
        spi.radio.set_csn(false);

        spi.write_data(0xFF, &mut cpu); // NOP command, returns STATUS
        dl.reset();
        spi.tick(&mut dl, CON0_ENABLE, &mut cpu);
        assert_eq!(dl.at(), 16); // divider field 0 -> /2

        clock.advance(16);
        dl.reset();
        spi.tick(&mut dl, CON0_ENABLE, &mut cpu);
        assert_ne!(cpu.sfr[REG_SPIRSTAT] & STAT_RX_READY, 0);
        let _ = spi.read_data(&mut cpu);
        assert_eq!(cpu.sfr[REG_SPIRSTAT] & STAT_RX_READY, 0);
        assert!(cpu.pending.is_empty());
    }

    #[test]
    fn tx_overrun_raises() {
        let (_clock, mut cpu, _dl, mut spi) = fixture();
        spi.write_data(0x01, &mut cpu);
        spi.write_data(0x02, &mut cpu);
        assert_eq!(cpu.pending, vec![Exception::SpiXrun]);
    }

    #[test]
    fn rx_underrun_raises() {
        let (_clock, mut cpu, _dl, mut spi) = fixture();
        assert_eq!(spi.read_data(&mut cpu), 0);
        assert_eq!(cpu.pending, vec![Exception::SpiXrun]);
    }

    #[test]
    fn disabled_engine_holds_tx() {
        let (clock, mut cpu, mut dl, mut spi) = fixture();
        spi.write_data(0xAA, &mut cpu);
        clock.advance(1000);
        dl.reset();
        spi.tick(&mut dl, 0, &mut cpu);
        assert_eq!(cpu.sfr[REG_SPIRSTAT] & STAT_RX_READY, 0);
        assert_eq!(cpu.sfr[REG_SPIRSTAT] & STAT_TX_READY, 0);
    }
}
