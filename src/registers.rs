//! These are low-level definitions for the STC3115 gas gauge

use crate::fmt::bitflags;

/// This is a list of registers exposed by the gauge
pub mod regs {
    #![allow(dead_code)]
    pub const MODE: u8 = 0x00;
    pub const CTRL: u8 = 0x01;
    pub const SOC: u8 = 0x02;
    pub const COUNTER: u8 = 0x04;
    pub const CURRENT: u8 = 0x06;
    pub const VOLTAGE: u8 = 0x08;
    pub const TEMPERATURE: u8 = 0x0A;
    pub const CC_ADJ_HIGH: u8 = 0x0B;
    pub const VM_ADJ_HIGH: u8 = 0x0C;
    pub const OCV: u8 = 0x0D;
    pub const CC_CNF: u8 = 0x0F;
    pub const VM_CNF: u8 = 0x11;
    pub const ALARM_SOC: u8 = 0x13;
    pub const ALARM_VOLTAGE: u8 = 0x14;
    pub const CURRENT_THRES: u8 = 0x15;
    pub const RELAX_COUNT: u8 = 0x16;
    pub const RELAX_MAX: u8 = 0x17;
    pub const ID: u8 = 0x18;
    pub const CC_ADJ_LOW: u8 = 0x19;
    pub const VM_ADJ_LOW: u8 = 0x1A;

    // 16 byte windows
    pub const RAM: u8 = 0x20;
    pub const OCVTAB: u8 = 0x30;
}

/// Fixed chip constants. None of these change at runtime
pub mod chip {
    /// Expected contents of the ID register
    pub const ID: u8 = 0x14;

    /// Default 7-bit bus address
    pub const I2C_ADDRESS: u8 = 0x70;

    pub const RAM_SIZE: usize = 16;
    pub const OCVTAB_SIZE: usize = 16;

    /// Registers 0x00..0x10 hold status and all the measurements
    pub const MEASUREMENT_SIZE: usize = 16;

    /// Mode register value with the gauge halted, used while changing parameters
    pub const MODE_STANDBY: u8 = 0x09;

    /// Clears PORDET and BATFAIL, releases the alarm pin and resets the conversion counter
    pub const CTRL_CLEAR: u8 = 0x03;

    /// Releases the IO0 pin, everything else cleared
    pub const CTRL_RELEASE: u8 = 0x01;

    /// Requests a soft power-on reset
    pub const CTRL_SOFT_POR: u8 = 0x11;

    /// Number of conversions to wait for before the readings are trusted
    pub const SETTLE_CONVERSIONS: u16 = 4;

    /// Raw OCV below this value means the cell is empty (roughly 3.3V)
    pub const OCV_EMPTY_FLOOR: i32 = 6000;

    pub const VOLTAGE_FACTOR: i32 = 9011;
    pub const CURRENT_FACTOR: i32 = 24084;

    /// 100.0% in tenths of a percent
    pub const MAX_SOC: i32 = 1000;

    /// High resolution SOC unit, 1/512 of a percent
    pub const HRSOC_PER_PERCENT: i32 = 512;
}

bitflags! {
    /// REG_MODE bits
    pub struct ModeFlags: u8 {
        const VMODE = 1 << 0;
        const CLR_VM_ADJ = 1 << 1;
        const CLR_CC_ADJ = 1 << 2;
        const ALM_ENA = 1 << 3;
        const GG_RUN = 1 << 4;
        const FORCE_CC = 1 << 5;
        const FORCE_VM = 1 << 6;
    }
}

bitflags! {
    /// REG_CTRL bits
    pub struct ControlFlags: u8 {
        const IO0DATA = 1 << 0;
        const GG_RST = 1 << 1;
        const GG_VM = 1 << 2;
        const BATFAIL = 1 << 3;
        const PORDET = 1 << 4;
        const ALM_SOC = 1 << 5;
        const ALM_VOLT = 1 << 6;
    }
}

bitflags! {
    /// REG_MODE and REG_CTRL read together as a little endian word, top bit dropped
    pub struct StatusFlags: u16 {
        const VMODE = 1 << 0;
        const CLR_VM_ADJ = 1 << 1;
        const CLR_CC_ADJ = 1 << 2;
        const ALM_ENA = 1 << 3;
        const GG_RUN = 1 << 4;
        const FORCE_CC = 1 << 5;
        const FORCE_VM = 1 << 6;
        const IO0DATA = 1 << 8;
        const GG_RST = 1 << 9;
        const GG_VM = 1 << 10;
        const BATFAIL = 1 << 11;
        const PORDET = 1 << 12;
        const ALM_SOC = 1 << 13;
        const ALM_VOLT = 1 << 14;

        /// Evidence of a power failure, the gauge state cannot be trusted
        const POWER_FAIL = (1 << 11) | (1 << 12);
    }
}

impl From<u16> for StatusFlags {
    fn from(value: u16) -> Self {
        StatusFlags::from_bits_truncate(value & 0x7FFF)
    }
}

impl StatusFlags {
    pub fn mode(&self) -> ModeFlags {
        ModeFlags::from_bits_truncate(self.bits() as u8)
    }

    pub fn control(&self) -> ControlFlags {
        ControlFlags::from_bits_truncate((self.bits() >> 8) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_word_splits_into_mode_and_control() {
        let status = StatusFlags::from(0x1810);

        assert!(status.contains(StatusFlags::GG_RUN));
        assert!(status.intersects(StatusFlags::POWER_FAIL));
        assert_eq!(status.mode(), ModeFlags::GG_RUN);
        assert_eq!(
            status.control(),
            ControlFlags::BATFAIL | ControlFlags::PORDET
        );
    }

    #[test]
    fn status_word_drops_the_top_bit() {
        assert_eq!(StatusFlags::from(0x8010).bits(), 0x0010);
    }
}
