//! Diagnostic trace hooks the CPU core calls into.
//!
//! Everything here is emit-only: no hook mutates emulator state, so
//! the core may call them at any point of an instruction without
//! affecting timing.

use log::{debug, trace, warn};

use crate::cpu::{
    ADDR_PORT, BUS_PORT, PSW_RS0, PSW_RS1, REG_ACC, REG_DEBUG, REG_DPH, REG_DPH1, REG_DPL,
    REG_DPL1, REG_DPS, REG_P0, REG_P0DIR, REG_P1, REG_P1DIR, REG_P2, REG_P2DIR, REG_P3, REG_P3DIR,
    REG_PSW, REG_RTC2CMP0, REG_RTC2CMP1, REG_TH0, REG_TH1, REG_TH2, REG_TL0, REG_TL1, REG_TL2,
};
use crate::hardware::Hardware;

impl Hardware {
    /// One line per executed instruction. The disassembly is supplied
    /// by the interpreter, which already decoded the opcode.
    pub fn trace_execution(&self, assembly: &str) {
        if !log::log_enabled!(log::Level::Trace) {
            return;
        }
        let cpu = &self.cpu;
        let bank = ((cpu.sfr[REG_PSW] & (PSW_RS0 | PSW_RS1)) >> 3) as usize;
        let regs = &cpu.data[bank * 8..bank * 8 + 8];

        trace!(
            "@{:04X} i{} a{:02X} reg{}[{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}] \
             dptr{}[{:04X}{:04X}] port[{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}] \
             lat[{:02x}.{:02x}] wdt{}[{:06x}] tmr[{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}] \
             rtc[{:04x}-{:02x}{:02x}]  {}",
            cpu.pc,
            cpu.irq_count,
            cpu.sfr[REG_ACC],
            bank,
            regs[0],
            regs[1],
            regs[2],
            regs[3],
            regs[4],
            regs[5],
            regs[6],
            regs[7],
            cpu.sfr[REG_DPS] & 1,
            (cpu.sfr[REG_DPH] as u16) << 8 | cpu.sfr[REG_DPL] as u16,
            (cpu.sfr[REG_DPH1] as u16) << 8 | cpu.sfr[REG_DPL1] as u16,
            cpu.sfr[REG_P0],
            cpu.sfr[REG_P1],
            cpu.sfr[REG_P2],
            cpu.sfr[REG_P3],
            cpu.sfr[REG_P0DIR],
            cpu.sfr[REG_P1DIR],
            cpu.sfr[REG_P2DIR],
            cpu.sfr[REG_P3DIR],
            self.lat2(),
            self.lat1(),
            cpu.wdt_enabled as u8,
            cpu.wdt_counter,
            cpu.sfr[REG_TH0],
            cpu.sfr[REG_TL0],
            cpu.sfr[REG_TH1],
            cpu.sfr[REG_TL1],
            cpu.sfr[REG_TH2],
            cpu.sfr[REG_TL2],
            cpu.rtc2,
            cpu.sfr[REG_RTC2CMP1],
            cpu.sfr[REG_RTC2CMP0],
            assembly,
        );
    }

    /// Called by the CPU core just before it services a watchdog
    /// reset. A verify fault shows up here as the latched bus address
    /// and the expected byte in the accumulator.
    pub fn log_watchdog_reset(&self) {
        warn!(
            "CUBE[{}]: Watchdog reset. pc={:04x} bus=[{:02x}.{:02x}.{:02x} -> {:02x}] a={:02x}",
            self.cpu.id,
            self.cpu.pc,
            self.lat2(),
            self.lat1(),
            self.cpu.sfr[ADDR_PORT],
            self.cpu.sfr[BUS_PORT],
            self.cpu.sfr[REG_ACC],
        );
    }

    /// Firmware wrote its debug register.
    pub(crate) fn debug_byte(&self) {
        debug!("DEBUG[{}]: {:02x}", self.cpu.id, self.cpu.sfr[REG_DEBUG]);
    }
}
