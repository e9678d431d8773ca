//! Per-cube hardware instance.
//!
//! One [`Hardware`] owns the CPU state record, the flash storage and
//! every peripheral of a single cube. The interpreter drives it
//! through the callback surface (`sfr_read`/`sfr_write`, the NVM
//! operations, `except`) and through [`hardware_tick`] whenever the
//! cached deadline passes.
//!
//! [`hardware_tick`]: Hardware::hardware_tick

use std::rc::Rc;

use log::{error, trace};
use rand_core::RngCore;

use crate::adc::Adc;
use crate::backlight::Backlight;
use crate::bus::Ctrl;
use crate::clock::{TickDeadline, VirtualClock};
use crate::cpu::{
    Cpu, Exception, CTRL_PORT, CTRL_PORT_DIR, MISC_PORT, REG_FSR, REG_P1, REG_P2, REG_P3,
    REG_SPIRCON0, REG_WUOPC0, REG_WUOPC1,
};
use crate::extflash::ExtFlash;
use crate::i2c::I2cBus;
use crate::lcd::Lcd;
use crate::mdu::Mdu;
use crate::neighbors::Neighbors;
use crate::nvm::{FlashStorage, FSR_WEN, HWID_LEN, NVM_PROGRAM_CYCLES};
use crate::rng::{Prng, Rng};
use crate::spi::SpiBus;
use crate::{Config, Error};

/// Touch sense input, misc port bit 7.
pub const MISC_TOUCH: u8 = 1 << 7;

/// Simulated battery level seeded into the accelerometer's auxiliary
/// ADC at power-up.
const BATTERY_ADC1: u16 = 0x8760;

/// Debugger capability. Attached per-instance at construction so
/// several cubes can run side by side without shared state.
pub trait DebugHandler {
    /// An exception fired on the debugged cube. Return true to claim
    /// it: the standard diagnostic line is suppressed and the
    /// debugger owns the stop.
    fn on_exception(&mut self, cpu: &Cpu, exc: Exception) -> bool;
}

pub struct Hardware {
    pub cpu: Cpu,
    pub storage: Box<FlashStorage>,
    pub flash: ExtFlash,
    pub lcd: Lcd,
    pub spi: SpiBus,
    pub i2c: I2cBus,
    pub adc: Adc,
    pub mdu: Mdu,
    pub rng: Rng,
    pub neighbors: Neighbors,
    pub backlight: Backlight,
    pub deadline: TickDeadline,

    pub(crate) lat1: u8,
    pub(crate) lat2: u8,
    pub(crate) bus: u8,
    pub(crate) prev_ctrl_port: u8,
    pub(crate) flash_drv: bool,
    pub(crate) rfcken: bool,

    exception_count: u32,
    dither: Prng,
    debug: Option<Box<dyn DebugHandler>>,
    stop_on_exception: bool,
}

impl Hardware {
    /// Build one cube: wire the peripherals, hard-reset the CPU and
    /// load firmware (or the idle pattern) into code memory.
    pub fn new(clock: Rc<VirtualClock>, config: Config) -> Result<Self, Error> {
        let mut cpu = Cpu::new(config.id, clock.clone());
        cpu.reset(true);
        match &config.firmware {
            Some(path) => cpu.load_firmware(path)?,
            None => cpu.fill_sbt(),
        }

        let mut hw = Self {
            cpu,
            storage: config.storage.unwrap_or_default(),
            flash: ExtFlash::new(),
            lcd: Lcd::new(),
            spi: SpiBus::new(),
            i2c: I2cBus::new(),
            adc: Adc::new(),
            mdu: Mdu::new(),
            rng: Rng::new(config.rng_seed),
            neighbors: Neighbors::new(),
            backlight: Backlight::new(),
            deadline: TickDeadline::new(clock),
            lat1: 0,
            lat2: 0,
            bus: 0,
            prev_ctrl_port: 0,
            flash_drv: false,
            rfcken: false,
            exception_count: 0,
            dither: Prng::new(config.rng_seed),
            debug: config.debug,
            stop_on_exception: config.stop_on_exception,
        };

        hw.set_touch(false);
        // Simulated battery level on the accelerometer's aux channel.
        hw.i2c.accel.set_aux_adc1(BATTERY_ADC1);
        Ok(hw)
    }

    /// Soft reset: the CPU restarts, flash contents survive.
    pub fn reset(&mut self) {
        self.cpu.reset(false);
    }

    /// Full reset: both flash arrays are erased to the factory state
    /// before the soft reset.
    pub fn full_reset(&mut self) {
        self.storage.erase();
        self.reset();
    }

    /// The cube's hardware identifier, straight from NVM. All-ones
    /// until the firmware has programmed one.
    pub fn get_hwid(&self) -> u64 {
        let mut bytes = [0; HWID_LEN];
        bytes.copy_from_slice(&self.storage.nvm[..HWID_LEN]);
        u64::from_le_bytes(bytes)
    }

    pub fn get_exception_count(&self) -> u32 {
        self.exception_count
    }

    pub fn is_debugging(&self) -> bool {
        self.debug.is_some()
    }

    /// Report an exception: count it, trace it, then either hand it
    /// to the attached debugger or emit the diagnostic line.
    pub fn except(&mut self, exc: Exception) {
        self.exception_count += 1;
        trace!("@{:04x} EXCEPTION: {}", self.cpu.pc, exc.name());

        if self.stop_on_exception {
            if let Some(handler) = self.debug.as_mut() {
                if handler.on_exception(&self.cpu, exc) {
                    return;
                }
            }
        }
        error!(
            "[{:2}] EXCEPTION at 0x{:04x}: {}",
            self.cpu.id,
            self.cpu.pc,
            exc.name()
        );
    }

    /// Drain exceptions peripherals queued during a bus or tick
    /// cycle. Handlers may themselves raise; keep going until quiet.
    pub(crate) fn service_exceptions(&mut self) {
        while !self.cpu.pending.is_empty() {
            let pending = std::mem::take(&mut self.cpu.pending);
            for exc in pending {
                self.except(exc);
            }
        }
    }

    /// One hardware tick: fan out to every peripheral in fixed order
    /// and recompute the next-event deadline. Peripherals observe SFR
    /// bytes earlier entries may have written, so the order is part
    /// of the contract.
    pub fn hardware_tick(&mut self) {
        self.cpu.need_hardware_tick = false;
        self.deadline.reset();

        self.lcd.tick(&mut self.deadline, &mut self.cpu);
        self.adc.tick(&mut self.deadline, &mut self.cpu);
        let con0 = self.cpu.sfr[REG_SPIRCON0];
        self.spi.tick(&mut self.deadline, con0, &mut self.cpu);
        self.i2c.tick(&mut self.deadline, &mut self.cpu);
        let now = self.cpu.clock.now();
        self.flash.tick(&mut self.deadline, now);
        self.spi.radio.tick(self.rfcken, &mut self.cpu);

        self.service_exceptions();
    }

    // NVM callback surface.

    /// Program one NVM byte. Returns the self-timed cycle count the
    /// CPU must stall for; zero when the write was refused.
    pub fn nvm_write(&mut self, addr: u16, data: u8) -> u32 {
        if self.cpu.sfr[REG_FSR] & FSR_WEN == 0 {
            // Write gate closed.
            self.except(Exception::Nvm);
            return 0;
        }
        let Some(slot) = self.storage.nvm.get_mut(addr as usize) else {
            self.except(Exception::Nvm);
            return 0;
        };
        // Programming only clears bits.
        *slot &= data;
        NVM_PROGRAM_CYCLES
    }

    pub fn nvm_read(&mut self, addr: u16) -> u8 {
        self.storage.nvm.get(addr as usize).copied().unwrap_or(0xFF)
    }

    /// Drive the touch-sense input.
    pub fn set_touch(&mut self, touching: bool) {
        if touching {
            self.cpu.sfr[MISC_PORT] |= MISC_TOUCH;
        } else {
            self.cpu.sfr[MISC_PORT] &= !MISC_TOUCH;
        }
    }

    /// Set the cube's acceleration in G, per axis. Values are scaled
    /// to the accelerometer's +/-2 g full range with a little dither.
    pub fn set_acceleration(&mut self, x_g: f32, y_g: f32, z_g: f32) {
        let x = self.scale_accel_axis(x_g);
        let y = self.scale_accel_axis(y_g);
        let z = self.scale_accel_axis(z_g);
        self.i2c.accel.set_vector(x, y, z);
    }

    /// Scale one axis to a two's-complement accelerometer reading,
    /// with saturation at the range ends and dithered quantization.
    pub fn scale_accel_axis(&mut self, g: f32) -> i16 {
        const RANGE: i32 = 1 << 15;
        const FULL_SCALE: f32 = 2.0;
        const NOISE_AMOUNT: u32 = 0x60; // just under 1 LSB after truncation

        let bits = self.dither.next_u32();
        let mut noise = (((bits & 0xFFFF) * NOISE_AMOUNT) >> 16) as i32;
        if bits & 0x1_0000 != 0 {
            noise = -noise;
        }

        // Saturation binds on the undithered product: noise cannot
        // pull a pegged axis back inside the range.
        let base = (g * (RANGE as f32 / FULL_SCALE)) as i32;
        if base >= RANGE {
            return (RANGE - 1) as i16;
        }
        if base <= -RANGE {
            return (-RANGE) as i16;
        }

        let scaled = base + noise;
        let truncated = scaled as i16;
        if scaled != truncated as i32 {
            if scaled > 0 {
                (RANGE - 1) as i16
            } else {
                (-RANGE) as i16
            }
        } else {
            truncated
        }
    }

    /// Wake-on-pin evaluation, run by the CPU core while asleep.
    ///
    /// INT2 drives LAT1 through a pull-up, so with the latch pin
    /// configured as input its data bit has to keep following the
    /// accelerometer here, outside any port write.
    pub fn test_wake_on_pin(&mut self) -> bool {
        if self.cpu.sfr[CTRL_PORT_DIR] & Ctrl::FLASH_LAT1.bits() != 0 {
            if self.i2c.accel.int_pin(1) {
                self.cpu.sfr[CTRL_PORT] |= Ctrl::FLASH_LAT1.bits();
            } else {
                self.cpu.sfr[CTRL_PORT] &= !Ctrl::FLASH_LAT1.bits();
            }
        }

        let c0 = self.cpu.sfr[REG_WUOPC0];
        let c1 = self.cpu.sfr[REG_WUOPC1];
        let p0 = self.cpu.sfr[REG_P2];
        let p1 = (self.cpu.sfr[REG_P1] & 0x80) | (self.cpu.sfr[REG_P3] & 0x7F);

        (c0 & p0) | (c1 & p1) != 0
    }

    /// First address latch, upper 7 address bits.
    pub fn lat1(&self) -> u8 {
        self.lat1
    }

    /// Second address latch.
    pub fn lat2(&self) -> u8 {
        self.lat2
    }

    /// Last settled value of the shared data bus.
    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Whether the external flash drove the bus on the last cycle.
    pub fn flash_driving(&self) -> bool {
        self.flash_drv
    }

    pub fn rfcken(&self) -> bool {
        self.rfcken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware() -> Hardware {
        Hardware::new(Rc::new(VirtualClock::new()), Config::default()).unwrap()
    }

    #[test]
    fn accel_axis_saturates() {
        let mut hw = hardware();
        for g in [2.0, 3.0, 100.0] {
            assert_eq!(hw.scale_accel_axis(g), i16::MAX);
        }
        for g in [-2.0, -3.0, -100.0] {
            assert_eq!(hw.scale_accel_axis(g), i16::MIN);
        }
    }

    #[test]
    fn accel_axis_dithers_around_zero() {
        let mut hw = hardware();
        for _ in 0..32 {
            let v = hw.scale_accel_axis(0.0) as i32;
            assert!(v.abs() <= 0x60, "dither out of bounds: {v}");
        }
    }

    #[test]
    fn touch_bit_round_trips() {
        let mut hw = hardware();
        let before = hw.cpu.sfr[MISC_PORT] & MISC_TOUCH;
        hw.set_touch(true);
        assert_ne!(hw.cpu.sfr[MISC_PORT] & MISC_TOUCH, 0);
        hw.set_touch(false);
        assert_eq!(hw.cpu.sfr[MISC_PORT] & MISC_TOUCH, before);
    }

    #[test]
    fn wake_follows_int2_through_lat1() {
        let mut hw = hardware();
        // LAT1 as input (reset default), wake condition on P2 bit 1.
        hw.cpu.sfr[REG_WUOPC0] = Ctrl::FLASH_LAT1.bits();
        hw.cpu.sfr[REG_P2] = 0;

        hw.i2c.accel.set_int_pin(1, true);
        assert!(hw.test_wake_on_pin());
        hw.i2c.accel.set_int_pin(1, false);
        assert!(!hw.test_wake_on_pin());
    }

    #[test]
    fn wake_needs_matching_wuopc_bit() {
        let mut hw = hardware();
        hw.cpu.sfr[REG_WUOPC0] = 0;
        hw.cpu.sfr[REG_WUOPC1] = 0;
        hw.cpu.sfr[REG_P2] = 0;
        hw.cpu.sfr[REG_P1] = 0;
        hw.cpu.sfr[REG_P3] = 0;
        hw.i2c.accel.set_int_pin(1, true);
        assert!(!hw.test_wake_on_pin());
    }

    #[test]
    fn nvm_write_gate() {
        let mut hw = hardware();
        hw.cpu.sfr[REG_FSR] = 0;
        assert_eq!(hw.nvm_write(0, 0x00), 0);
        assert_eq!(hw.storage.nvm[0], 0xFF);
        assert_eq!(hw.get_exception_count(), 1);

        hw.cpu.sfr[REG_FSR] = FSR_WEN;
        assert_eq!(hw.nvm_write(0, 0xA5), NVM_PROGRAM_CYCLES);
        assert_eq!(hw.storage.nvm[0], 0xA5);
        assert_eq!(hw.get_exception_count(), 1);
    }

    #[test]
    fn nvm_out_of_range_is_refused() {
        let mut hw = hardware();
        hw.cpu.sfr[REG_FSR] = FSR_WEN;
        assert_eq!(hw.nvm_write(0x7000, 0x00), 0);
        assert_eq!(hw.get_exception_count(), 1);
        assert_eq!(hw.nvm_read(0x7000), 0xFF);
    }
}
