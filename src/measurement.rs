//! Decoding of the measurement registers (0x00..0x10) into physical units

use byteorder::{ByteOrder, LittleEndian};

use crate::config::ChipConfig;
use crate::registers::{chip, StatusFlags};

/// One reading of the gauge. The derived fields (charge, remaining time, presence)
/// are only meaningful after a lifecycle tick filled them in
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryMeasurement {
    pub status: StatusFlags,
    /// 1/512 of a percent
    pub high_resolution_soc: u16,
    /// Tenths of a percent, 0..=1000
    pub soc: i32,
    pub conversion_counter: u16,
    /// Milliamps, negative while discharging
    pub current: i32,
    /// Millivolts
    pub voltage: i32,
    /// Tenths of a degree Celsius
    pub temperature: i32,
    /// Millivolts
    pub open_circuit_voltage: i32,
    /// Milliamp hours left
    pub charge_value: i32,
    /// Minutes until empty, -1 when unknown
    pub remaining_time: i32,
    pub battery_present: bool,
}

/// Interprets the low `bits` of `value` as a two's complement number
pub fn sign_extend(value: u16, bits: u32) -> i32 {
    let value = (value as i32) & ((1 << bits) - 1);

    if value >= 1 << (bits - 1) {
        value - (1 << bits)
    } else {
        value
    }
}

/// Fixed point scaling used for all analog readings: `raw * factor / 4096`,
/// rounded half up
pub fn convert(raw: i32, factor: i32) -> i32 {
    let value = (raw * factor) >> 11;
    (value + 1) / 2
}

pub fn soc_from_hrsoc(hrsoc: u16) -> i32 {
    (hrsoc as i32 * 10 + 256) / 512
}

pub fn current_from_raw(raw: u16, config: &ChipConfig) -> i32 {
    convert(sign_extend(raw, 14), config.current_factor)
}

pub fn voltage_from_raw(raw: u16, config: &ChipConfig) -> i32 {
    convert(sign_extend(raw, 12), config.voltage_factor)
}

pub fn temperature_from_raw(raw: u8) -> i32 {
    (raw as i8) as i32 * 10
}

pub fn ocv_from_raw(raw: u16, config: &ChipConfig) -> i32 {
    let value = convert(sign_extend(raw, 14), config.voltage_factor);
    (value + 2) / 4
}

impl BatteryMeasurement {
    /// Decodes a snapshot of registers 0x00..0x10
    pub fn decode(raw: &[u8; chip::MEASUREMENT_SIZE], config: &ChipConfig) -> Self {
        let high_resolution_soc = LittleEndian::read_u16(&raw[2..4]);

        Self {
            status: StatusFlags::from(LittleEndian::read_u16(&raw[0..2])),
            high_resolution_soc,
            soc: soc_from_hrsoc(high_resolution_soc),
            conversion_counter: LittleEndian::read_u16(&raw[4..6]),
            current: current_from_raw(LittleEndian::read_u16(&raw[6..8]), config),
            voltage: voltage_from_raw(LittleEndian::read_u16(&raw[8..10]), config),
            temperature: temperature_from_raw(raw[10]),
            open_circuit_voltage: ocv_from_raw(LittleEndian::read_u16(&raw[13..15]), config),
            charge_value: 0,
            remaining_time: -1,
            battery_present: false,
        }
    }
}
