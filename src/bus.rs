//! Graphics bus: the shared 8-bit data bus between CPU, external
//! flash and LCD, plus the address latches that stretch the narrow
//! address port to 22 bits.
//!
//! Runs only in response to relevant port writes, not on every clock.
//! Within one call the order is fixed: effective port values, flash
//! and LCD pin cycles, the backlight edge, latch capture, then bus
//! resolution and SFR write-back.

use bitflags::bitflags;

use crate::cpu::{
    Exception, ADDR_PORT, ADDR_PORT_DIR, BUS_PORT, BUS_PORT_DIR, CTRL_PORT, CTRL_PORT_DIR,
};
use crate::hardware::Hardware;
use crate::{extflash, lcd};

bitflags! {
    /// Control-port bit assignments.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ctrl: u8 {
        const LCD_DCX = 1 << 0;
        const FLASH_LAT1 = 1 << 1;
        const FLASH_LAT2 = 1 << 2;
        const EN_3V3 = 1 << 3;
        const DS_EN = 1 << 4;
        const FLASH_WE = 1 << 5;
        const FLASH_OE = 1 << 6;
    }
}

/// Control bits that must both be up for the backlight to latch on.
const BACKLIGHT_MASK: u8 = Ctrl::EN_3V3.bits() | Ctrl::LCD_DCX.bits();

impl Hardware {
    /// Update the graphics (LCD and flash) bus after a write to one
    /// of the participating ports or direction registers.
    pub fn graphics_tick(&mut self) {
        // Port output values, pull-up when floating.
        let bus_port = self.cpu.sfr[BUS_PORT] | self.cpu.sfr[BUS_PORT_DIR];
        let addr_port = self.cpu.sfr[ADDR_PORT] | self.cpu.sfr[ADDR_PORT_DIR];
        let ctrl_port = self.cpu.sfr[CTRL_PORT] | self.cpu.sfr[CTRL_PORT_DIR];

        // 7-bit address in the high bits of the address port.
        let addr7 = addr_port >> 1;

        // Bit A21 comes from the accelerometer's INT2 pin.
        let a21 = self.i2c.accel.int_pin(1);

        // Is the MCU driving any bit of the shared bus?
        let mcu_data_drv = self.cpu.sfr[BUS_PORT_DIR] != 0xFF;

        let ctrl = Ctrl::from_bits_retain(ctrl_port);
        let now = self.cpu.clock.now();

        let flash_pins = extflash::Pins {
            addr: addr7 as u32
                | (self.lat1 as u32) << 7
                | (self.lat2 as u32) << 14
                | (a21 as u32) << 21,
            power: ctrl.contains(Ctrl::DS_EN),
            oe: ctrl.contains(Ctrl::FLASH_OE),
            ce: false,
            we: ctrl.contains(Ctrl::FLASH_WE),
            data_in: self.bus,
        };

        let lcd_pins = lcd::Pins {
            power: ctrl.contains(Ctrl::EN_3V3),
            csx: false,
            dcx: ctrl.contains(Ctrl::LCD_DCX),
            wrx: addr_port & 1 != 0,
            rdx: false,
            data_in: self.bus,
        };

        let flash_fault = self.flash.cycle(&flash_pins, &mut self.storage, now);
        self.lcd.cycle(&lcd_pins);

        // Backlight latch, clocked by the same LAT1 rising edge.
        if ctrl_port & Ctrl::FLASH_LAT1.bits() != 0
            && self.prev_ctrl_port & Ctrl::FLASH_LAT1.bits() == 0
        {
            self.backlight
                .cycle(ctrl_port & BACKLIGHT_MASK == BACKLIGHT_MASK, now);
        }

        // Address latch write cycles, triggered by rising edge.
        if ctrl_port & Ctrl::FLASH_LAT1.bits() != 0
            && self.prev_ctrl_port & Ctrl::FLASH_LAT1.bits() == 0
        {
            self.lat1 = addr7;
        }
        if ctrl_port & Ctrl::FLASH_LAT2.bits() != 0
            && self.prev_ctrl_port & Ctrl::FLASH_LAT2.bits() == 0
        {
            self.lat2 = addr7;
        }
        self.prev_ctrl_port = ctrl_port;

        // Resolve the new state of the shared bus.
        match (mcu_data_drv, self.flash.data_drv()) {
            (false, false) => {} // floating, pull-ups hold the old value
            (false, true) => self.bus = self.flash.data_out(),
            (true, false) => self.bus = bus_port,
            (true, true) => self.cpu.raise(Exception::BusContention),
        }

        self.flash_drv = self.flash.data_drv();
        self.cpu.sfr[BUS_PORT] = self.bus;

        if let Some(exc) = flash_fault {
            self.cpu.raise(exc);
        }
        self.service_exceptions();
    }
}
