//! Two-wire (I2C) engine and the devices behind it.
//!
//! The engine moves one byte per transfer slot at two-wire timing and
//! reports completion through W2CON1, which reads as clear-on-read
//! the way the hardware does. The accelerometer is the only device on
//! the cube's bus; anything else NACKs.

use crate::accel::{self, Accel};
use crate::clock::TickDeadline;
use crate::cpu::{Cpu, Exception, REG_W2CON0, REG_W2CON1};

// W2CON0 bits.
pub const CON0_ENABLE: u8 = 1 << 0;
pub const CON0_MASTER: u8 = 1 << 1;
pub const CON0_START: u8 = 1 << 4;
pub const CON0_STOP: u8 = 1 << 5;

// W2CON1 flags, clear-on-read.
pub const CON1_READY: u8 = 1 << 0;
pub const CON1_NACK: u8 = 1 << 1;

/// Cycles one address or data byte occupies the bus (9 bit times at
/// 400 kHz against the 16 MHz core clock).
pub const BYTE_CYCLES: u64 = 360;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Address(u8),
    Write(u8),
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// START queued; the next data write is the address byte.
    Started,
    /// Addressed for writing; the first byte selects the register.
    SelectReg,
    Writing,
    Reading,
}

pub struct I2cBus {
    pub accel: Accel,
    phase: Phase,
    inflight: Option<(Op, u64)>,
    rx: u8,
    flags: u8,
}

impl I2cBus {
    pub fn new() -> Self {
        Self {
            accel: Accel::new(),
            phase: Phase::Idle,
            inflight: None,
            rx: 0,
            flags: 0,
        }
    }

    /// Control SFR written. START and STOP are self-clearing.
    pub fn write_con0(&mut self, cpu: &mut Cpu) {
        let con0 = cpu.sfr[REG_W2CON0];
        if con0 & CON0_ENABLE == 0 {
            self.phase = Phase::Idle;
            self.inflight = None;
            return;
        }
        if con0 & CON0_START != 0 {
            self.phase = Phase::Started;
        }
        if con0 & CON0_STOP != 0 {
            self.phase = Phase::Idle;
        }
        cpu.sfr[REG_W2CON0] = con0 & !(CON0_START | CON0_STOP);
    }

    /// Data SFR written: address byte right after a START, a register
    /// select or payload byte otherwise.
    pub fn write_data(&mut self, byte: u8, cpu: &mut Cpu) {
        if self.inflight.is_some() {
            cpu.raise(Exception::I2c);
            return;
        }
        let op = match self.phase {
            Phase::Started => Op::Address(byte),
            Phase::SelectReg | Phase::Writing => Op::Write(byte),
            _ => {
                cpu.raise(Exception::I2c);
                return;
            }
        };
        self.inflight = Some((op, cpu.clock.now() + BYTE_CYCLES));
        cpu.need_hardware_tick = true;
    }

    /// Data SFR read: pops the last received byte and clocks in the
    /// next one while a read transfer is open.
    pub fn read_data(&mut self, cpu: &mut Cpu) -> u8 {
        let byte = self.rx;
        if self.phase == Phase::Reading && self.inflight.is_none() {
            self.inflight = Some((Op::Read, cpu.clock.now() + BYTE_CYCLES));
            cpu.need_hardware_tick = true;
        }
        byte
    }

    /// W2CON1 is clear-on-read.
    pub fn read_con1(&mut self, cpu: &mut Cpu) -> u8 {
        let flags = self.flags;
        self.flags = 0;
        cpu.sfr[REG_W2CON1] = 0;
        flags
    }

    pub fn tick(&mut self, deadline: &mut TickDeadline, cpu: &mut Cpu) {
        let Some((op, done_at)) = self.inflight else {
            return;
        };
        if cpu.clock.now() < done_at {
            deadline.set(done_at);
            return;
        }
        self.inflight = None;

        match op {
            Op::Address(byte) => {
                if byte >> 1 == accel::I2C_ADDR {
                    if byte & 1 != 0 {
                        self.phase = Phase::Reading;
                        // Clock the first data byte immediately.
                        self.rx = self.accel.read_byte();
                    } else {
                        self.phase = Phase::SelectReg;
                    }
                    self.complete(cpu, 0);
                } else {
                    self.phase = Phase::Idle;
                    self.complete(cpu, CON1_NACK);
                }
            }
            Op::Write(byte) => {
                if self.phase == Phase::SelectReg {
                    self.accel.select(byte);
                    self.phase = Phase::Writing;
                } else {
                    self.accel.write_byte(byte);
                }
                self.complete(cpu, 0);
            }
            Op::Read => {
                self.rx = self.accel.read_byte();
                self.complete(cpu, 0);
            }
        }
    }

    fn complete(&mut self, cpu: &mut Cpu, extra: u8) {
        self.flags |= CON1_READY | extra;
        cpu.sfr[REG_W2CON1] = self.flags;
    }
}

impl Default for I2cBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::rc::Rc;

    struct Fix {
        clock: Rc<VirtualClock>,
        cpu: Cpu,
        dl: TickDeadline,
        i2c: I2cBus,
    }

    fn fixture() -> Fix {
        let clock = Rc::new(VirtualClock::new());
        let mut cpu = Cpu::new(0, clock.clone());
        cpu.reset(true);
        cpu.sfr[REG_W2CON0] = CON0_ENABLE | CON0_MASTER;
        let dl = TickDeadline::new(clock.clone());
        Fix {
            clock,
            cpu,
            dl,
            i2c: I2cBus::new(),
        }
    }

    fn run_byte(f: &mut Fix) {
        f.clock.advance(BYTE_CYCLES);
        f.dl.reset();
        f.i2c.tick(&mut f.dl, &mut f.cpu);
    }

    fn start(f: &mut Fix) {
        f.cpu.sfr[REG_W2CON0] |= CON0_START;
        f.i2c.write_con0(&mut f.cpu);
    }

    #[test]
    fn addressed_read_returns_who_am_i() {
        let mut f = fixture();
        start(&mut f);
        f.i2c.write_data(accel::I2C_ADDR << 1, &mut f.cpu);
        run_byte(&mut f);
        assert_eq!(f.i2c.read_con1(&mut f.cpu) & CON1_READY, CON1_READY);

        f.i2c.write_data(accel::REG_WHO_AM_I, &mut f.cpu); // register select
        run_byte(&mut f);

        start(&mut f);
        f.i2c.write_data((accel::I2C_ADDR << 1) | 1, &mut f.cpu);
        run_byte(&mut f);
        assert_eq!(f.i2c.read_data(&mut f.cpu), accel::WHO_AM_I);
    }

    #[test]
    fn unknown_address_nacks() {
        let mut f = fixture();
        start(&mut f);
        f.i2c.write_data(0x77 << 1, &mut f.cpu);
        run_byte(&mut f);
        let con1 = f.i2c.read_con1(&mut f.cpu);
        assert_ne!(con1 & CON1_NACK, 0);
        // clear-on-read
        assert_eq!(f.i2c.read_con1(&mut f.cpu), 0);
    }

    #[test]
    fn data_write_while_busy_raises() {
        let mut f = fixture();
        start(&mut f);
        f.i2c.write_data(accel::I2C_ADDR << 1, &mut f.cpu);
        f.i2c.write_data(0x00, &mut f.cpu);
        assert_eq!(f.cpu.pending, vec![Exception::I2c]);
    }
}
