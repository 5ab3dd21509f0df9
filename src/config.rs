//! Battery and application parameters, and the chip tuning values derived from them

use crate::registers::chip;

/// Sense resistor assumed when the configured value is zero
const DEFAULT_SENSE_RESISTOR_MOHM: u32 = 10;

/// Gauge algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VoltageMode {
    /// Coulomb counting. The chip implements it as mixed mode
    CoulombCounter,
    /// Voltage only, the sense resistor is not used for SOC
    VoltageMode,
    /// Coulomb counter with voltage based correction
    Mixed,
}

/// Reasons a configuration can't be turned into chip parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    ZeroCapacity,
    /// The coulomb counter or voltage mode gain does not fit the 16-bit register
    GainOverflow,
}

/// User facing configuration. The defaults describe a 1500mAh cell on a 50mΩ shunt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaugeConfig {
    pub capacity_mah: u32,
    pub sense_resistor_mohm: u32,
    pub internal_resistance_mohm: u32,
    pub mode: VoltageMode,
    /// Low SOC alarm in percent, 0 keeps the chip default
    pub alarm_soc_percent: u8,
    /// Low voltage alarm in millivolts, 0 keeps the chip default
    pub alarm_voltage_mv: u32,
    /// Drive the ALM pin when an alarm fires
    pub alarm_enabled: bool,
    /// The application shuts down below this voltage
    pub cutoff_voltage_mv: i32,
    /// Charge current below which the cell is considered full
    pub end_of_charge_current_ma: i32,
    pub ocv_offsets: [i8; chip::OCVTAB_SIZE],
}

impl Default for GaugeConfig {
    fn default() -> Self {
        Self {
            capacity_mah: 1500,
            sense_resistor_mohm: 50,
            internal_resistance_mohm: 200,
            mode: VoltageMode::Mixed,
            alarm_soc_percent: 10,
            alarm_voltage_mv: 3600,
            alarm_enabled: false,
            cutoff_voltage_mv: 3000,
            end_of_charge_current_ma: 75,
            ocv_offsets: [0; chip::OCVTAB_SIZE],
        }
    }
}

impl GaugeConfig {
    pub fn new(capacity_mah: u32, sense_resistor_mohm: u32) -> Self {
        Self {
            capacity_mah,
            sense_resistor_mohm,
            ..Default::default()
        }
    }

    pub fn with_internal_resistance(mut self, milliohms: u32) -> Self {
        self.internal_resistance_mohm = milliohms;
        self
    }

    pub fn with_mode(mut self, mode: VoltageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_alarms(mut self, soc_percent: u8, voltage_mv: u32, enabled: bool) -> Self {
        self.alarm_soc_percent = soc_percent;
        self.alarm_voltage_mv = voltage_mv;
        self.alarm_enabled = enabled;
        self
    }

    pub fn with_cutoff_voltage(mut self, millivolts: i32) -> Self {
        self.cutoff_voltage_mv = millivolts;
        self
    }

    pub fn with_end_of_charge_current(mut self, milliamps: i32) -> Self {
        self.end_of_charge_current_ma = milliamps;
        self
    }

    pub fn with_ocv_offsets(mut self, offsets: [i8; chip::OCVTAB_SIZE]) -> Self {
        self.ocv_offsets = offsets;
        self
    }
}

/// Tuning values as the chip wants them
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipConfig {
    pub voltage_mode: VoltageMode,
    pub nominal_capacity: i32,
    pub sense_resistor: i32,
    pub cc_gain: u16,
    pub vm_gain: u16,
    pub relaxation_current: i32,
    pub alarm_soc: i32,
    pub alarm_voltage: i32,
    pub alarm_enabled: bool,
    pub cutoff_voltage: i32,
    pub end_of_charge_current: i32,
    pub ocv_offsets: [i8; chip::OCVTAB_SIZE],
    pub current_factor: i32,
    pub voltage_factor: i32,
}

impl ChipConfig {
    pub fn derive(config: &GaugeConfig) -> Result<Self, ConfigError> {
        if config.capacity_mah == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let sense_resistor = match config.sense_resistor_mohm {
            0 => DEFAULT_SENSE_RESISTOR_MOHM,
            r => r,
        };

        let capacity = config.capacity_mah as u64;

        let cc_gain = (capacity * sense_resistor as u64 * 250 + 6194) / 12389;
        let vm_gain = (capacity * config.internal_resistance_mohm as u64 * 50 + 24444) / 48889;

        let cc_gain = u16::try_from(cc_gain).map_err(|_| ConfigError::GainOverflow)?;
        let vm_gain = u16::try_from(vm_gain).map_err(|_| ConfigError::GainOverflow)?;

        // A gain that fits 16 bits bounds both inputs well below i32::MAX
        let nominal_capacity = config.capacity_mah as i32;

        Ok(Self {
            voltage_mode: config.mode,
            nominal_capacity,
            sense_resistor: sense_resistor as i32,
            cc_gain,
            vm_gain,
            relaxation_current: nominal_capacity / 20,
            alarm_soc: config.alarm_soc_percent as i32,
            alarm_voltage: config.alarm_voltage_mv.min(i32::MAX as u32) as i32,
            alarm_enabled: config.alarm_enabled,
            cutoff_voltage: config.cutoff_voltage_mv,
            end_of_charge_current: config.end_of_charge_current_ma,
            ocv_offsets: config.ocv_offsets,
            current_factor: chip::CURRENT_FACTOR / sense_resistor as i32,
            voltage_factor: chip::VOLTAGE_FACTOR,
        })
    }

    /// Only the voltage mode drops the coulomb counter, mixed is the default otherwise
    pub fn is_voltage_mode(&self) -> bool {
        self.voltage_mode == VoltageMode::VoltageMode
    }

    /// REG_ALARM_SOC value, 0.5% per LSB
    pub fn alarm_soc_register(&self) -> u8 {
        (self.alarm_soc * 2).clamp(0, u8::MAX as i32) as u8
    }

    /// REG_ALARM_VOLTAGE value, 17.6mV per LSB
    pub fn alarm_voltage_register(&self) -> u8 {
        let value = ((self.alarm_voltage as i64) << 9) / self.voltage_factor as i64;
        value.clamp(0, u8::MAX as i64) as u8
    }

    /// REG_CURRENT_THRES value, 7 bits wide
    pub fn current_threshold_register(&self) -> u8 {
        if self.current_factor == 0 {
            return 0;
        }

        let value = ((self.relaxation_current as i64) << 9) / self.current_factor as i64;
        (value & 0x7F) as u8
    }

    /// Raw OCV below which the battery is treated as empty
    pub fn empty_ocv_floor(&self) -> i32 {
        chip::OCV_EMPTY_FLOOR + self.ocv_offsets[0] as i32
    }
}
