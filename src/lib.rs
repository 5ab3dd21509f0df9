#![cfg_attr(not(test), no_std)]

//! A small driver for the STMicroelectronics STC3115 battery gas gauge
//!
//! The gauge combines coulomb counting with open circuit voltage sampling. The driver
//! keeps a checksummed copy of its own state in the chip's battery-backed RAM, so that
//! after a host restart it can tell a warm restore from a battery swap.
//!
//! Typical use is [`Stc3115::activate`] once, then [`Stc3115::tick`] every few seconds.

// Must come first, the logging macros are textually scoped
pub(crate) mod fmt;

pub mod config;
pub mod crc;
pub mod filter;
pub mod interface;
pub mod measurement;
pub mod memory;
pub mod registers;

mod lifecycle;

#[cfg(test)]
mod fake;

use byteorder::{ByteOrder, LittleEndian};

pub use config::{ChipConfig, ConfigError, GaugeConfig, VoltageMode};
pub use interface::{I2cInterface, RegisterInterface};
pub use lifecycle::TickOutcome;
pub use measurement::BatteryMeasurement;
pub use memory::{LifecycleState, PersistedState};
pub use registers::{ControlFlags, ModeFlags, StatusFlags};

use registers::{chip, regs};

/// Driver error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The bus transaction failed
    Transport(E),
    /// Something answered, but it is not an STC3115. Holds the ID that was read
    ChipIdMismatch(u8),
    InvalidConfiguration(ConfigError),
}

impl<E> From<ConfigError> for Error<E> {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfiguration(e)
    }
}

/// Gauge handle
pub struct Stc3115<T> {
    interface: T,
    config: ChipConfig,
    ram: PersistedState,
    battery_present: bool,
    remaining_time: i32,
    last_measurement: Option<BatteryMeasurement>,
}

impl<I> Stc3115<I2cInterface<I>> {
    /// Creates the driver for a gauge on an I2C bus at the default address
    pub fn new_i2c(i2c: I, config: &GaugeConfig) -> Result<Self, ConfigError> {
        Self::new(I2cInterface::with_default_address(i2c), config)
    }
}

impl<T> Stc3115<T> {
    /// Creates the driver instance. Nothing is sent to the chip until [`Self::activate`]
    pub fn new(interface: T, config: &GaugeConfig) -> Result<Self, ConfigError> {
        let config = ChipConfig::derive(config)?;

        debug!(
            "cc gain {}, vm gain {}, relax current {}",
            config.cc_gain,
            config.vm_gain,
            config.relaxation_current
        );

        Ok(Self {
            interface,
            config,
            ram: PersistedState::default(),
            battery_present: false,
            remaining_time: -1,
            last_measurement: None,
        })
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// Lifecycle state as of the last successful save
    pub fn state(&self) -> LifecycleState {
        self.ram.state
    }

    /// Copy of the RAM block as of the last successful save
    pub fn persisted(&self) -> &PersistedState {
        &self.ram
    }

    pub fn battery_present(&self) -> bool {
        self.battery_present
    }

    /// Result of the last completed tick
    pub fn last_measurement(&self) -> Option<&BatteryMeasurement> {
        self.last_measurement.as_ref()
    }

    /// Gives the interface back
    pub fn release(self) -> T {
        self.interface
    }
}

impl<T> Stc3115<T>
where
    T: RegisterInterface,
{
    async fn read_byte(&mut self, register: u8) -> Result<u8, Error<T::Error>> {
        self.interface
            .read_byte(register)
            .await
            .map_err(Error::Transport)
    }

    async fn read_bytes(&mut self, register: u8, buffer: &mut [u8]) -> Result<(), Error<T::Error>> {
        self.interface
            .read_bytes(register, buffer)
            .await
            .map_err(Error::Transport)
    }

    async fn read_word(&mut self, register: u8) -> Result<u16, Error<T::Error>> {
        let mut response = [0, 0];
        self.read_bytes(register, &mut response).await?;

        Ok(LittleEndian::read_u16(&response))
    }

    async fn write_byte(&mut self, register: u8, value: u8) -> Result<(), Error<T::Error>> {
        self.interface
            .write_byte(register, value)
            .await
            .map_err(Error::Transport)
    }

    async fn write_word(&mut self, register: u8, value: u16) -> Result<(), Error<T::Error>> {
        self.interface
            .write_word(register, value)
            .await
            .map_err(Error::Transport)
    }

    async fn write_bytes(&mut self, register: u8, values: &[u8]) -> Result<(), Error<T::Error>> {
        self.interface
            .write_bytes(register, values)
            .await
            .map_err(Error::Transport)
    }

    /// Reads the ID register
    pub async fn chip_id(&mut self) -> Result<u8, Error<T::Error>> {
        self.read_byte(regs::ID).await
    }

    /// Checks the chip ID, then reads the mode and control registers as one word
    pub async fn status(&mut self) -> Result<StatusFlags, Error<T::Error>> {
        let id = self.chip_id().await?;

        if id != chip::ID {
            warn!("unexpected chip id {}", id);
            return Err(Error::ChipIdMismatch(id));
        }

        let raw = self.read_word(regs::MODE).await?;
        Ok(StatusFlags::from(raw))
    }

    /// Reads the battery voltage in millivolts
    pub async fn voltage(&mut self) -> Result<i32, Error<T::Error>> {
        let raw = self.read_word(regs::VOLTAGE).await?;
        Ok(measurement::voltage_from_raw(raw, &self.config))
    }

    /// Reads the battery current in milliamps, negative while discharging
    pub async fn current(&mut self) -> Result<i32, Error<T::Error>> {
        let raw = self.read_word(regs::CURRENT).await?;
        Ok(measurement::current_from_raw(raw, &self.config))
    }

    /// Reads the die temperature in tenths of a degree
    pub async fn temperature(&mut self) -> Result<i32, Error<T::Error>> {
        let raw = self.read_byte(regs::TEMPERATURE).await?;
        Ok(measurement::temperature_from_raw(raw))
    }

    /// Number of conversions since the last gauge start
    pub async fn conversion_counter(&mut self) -> Result<u16, Error<T::Error>> {
        self.read_word(regs::COUNTER).await
    }

    /// Reads and decodes all measurement registers at once. No lifecycle side effects,
    /// the derived fields are left at their defaults
    pub async fn read_battery_data(&mut self) -> Result<BatteryMeasurement, Error<T::Error>> {
        let mut raw = [0; chip::MEASUREMENT_SIZE];
        self.read_bytes(regs::MODE, &mut raw).await?;

        Ok(BatteryMeasurement::decode(&raw, &self.config))
    }

    /// Pending SOC / voltage alarms
    pub async fn alarm_flags(&mut self) -> Result<ControlFlags, Error<T::Error>> {
        let raw = self.read_byte(regs::CTRL).await?;
        Ok(ControlFlags::from_bits_truncate(raw) & (ControlFlags::ALM_SOC | ControlFlags::ALM_VOLT))
    }

    /// Acknowledges pending alarms and releases the ALM pin
    pub async fn clear_alarms(&mut self) -> Result<(), Error<T::Error>> {
        let raw = self.read_byte(regs::CTRL).await?;

        // Writing PORDET or GG_RST back would reset the gauge
        let keep = ControlFlags::from_bits_truncate(raw)
            - (ControlFlags::ALM_SOC
                | ControlFlags::ALM_VOLT
                | ControlFlags::PORDET
                | ControlFlags::GG_RST);

        self.write_byte(regs::CTRL, keep.bits()).await
    }
}
