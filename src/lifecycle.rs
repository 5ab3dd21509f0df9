//! Start, periodic update and shutdown of the gauge.
//!
//! On every start the driver has to decide whether the chip still tracks the same
//! battery. A valid RAM block and no power-fail flags mean it does, and the coulomb
//! counter SOC saved in RAM is restored. Anything else starts from a fresh OCV sample.

use crate::filter;
use crate::interface::RegisterInterface;
use crate::measurement::{self, BatteryMeasurement};
use crate::memory::{LifecycleState, PersistedState};
use crate::registers::{chip, regs, ModeFlags, StatusFlags};
use crate::{Error, Stc3115};

/// Result of a completed [`Stc3115::tick`]
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    Measured(BatteryMeasurement),
    /// Battery removed or undervoltage. The gauge was reset and starts over on the next tick
    BatteryFault,
}

impl<T> Stc3115<T>
where
    T: RegisterInterface,
{
    /// Pushes the configuration to the chip and starts the gauge
    async fn apply_parameters(&mut self, ram: &PersistedState) -> Result<(), Error<T::Error>> {
        // The algorithm parameters can only change while the gauge is halted
        self.write_byte(regs::MODE, chip::MODE_STANDBY).await?;

        let mut offsets = [0; chip::OCVTAB_SIZE];
        for (raw, offset) in offsets.iter_mut().zip(self.config.ocv_offsets) {
            *raw = offset as u8;
        }
        self.write_bytes(regs::OCVTAB, &offsets).await?;

        if self.config.alarm_soc != 0 {
            let value = self.config.alarm_soc_register();
            self.write_byte(regs::ALARM_SOC, value).await?;
        }

        if self.config.alarm_voltage != 0 {
            let value = self.config.alarm_voltage_register();
            self.write_byte(regs::ALARM_VOLTAGE, value).await?;
        }

        if self.config.sense_resistor != 0 {
            let value = self.config.current_threshold_register();
            self.write_byte(regs::CURRENT_THRES, value).await?;
        }

        if ram.cc_gain != 0 {
            self.write_word(regs::CC_CNF, ram.cc_gain).await?;
        }

        if ram.vm_gain != 0 {
            self.write_word(regs::VM_CNF, ram.vm_gain).await?;
        }

        self.write_byte(regs::CTRL, chip::CTRL_CLEAR).await?;

        let mut mode = ModeFlags::GG_RUN;
        mode.set(ModeFlags::VMODE, self.config.is_voltage_mode());
        mode.set(ModeFlags::ALM_ENA, self.config.alarm_enabled);

        debug!("starting gauge, mode {}", mode.bits());
        self.write_byte(regs::MODE, mode.bits()).await
    }

    /// Starts tracking from the open circuit voltage, dropping any history
    async fn cold_start(&mut self, ram: &PersistedState) -> Result<(), Error<T::Error>> {
        self.status().await?;

        let ocv = self.read_word(regs::OCV).await?;

        if measurement::sign_extend(ocv, 14) < self.config.empty_ocv_floor() {
            info!("cold start, battery empty (ocv {})", ocv);

            self.write_word(regs::SOC, 0).await?;
            self.apply_parameters(ram).await
        } else {
            info!("cold start (ocv {})", ocv);

            self.apply_parameters(ram).await?;
            // Rewriting the sample makes the chip recompute SOC with the new parameters
            self.write_word(regs::OCV, ocv).await
        }
    }

    /// Resumes tracking from the SOC saved in RAM
    async fn warm_restore(&mut self, ram: &PersistedState) -> Result<(), Error<T::Error>> {
        self.status().await?;

        info!("warm restore (hrsoc {})", ram.high_resolution_soc);

        self.apply_parameters(ram).await?;
        self.write_word(regs::SOC, ram.high_resolution_soc).await
    }

    /// Starts the gauge. Call once after power-up, before the first [`Self::tick`].
    ///
    /// Nothing is written unless the chip answers with the right ID. Past that point the
    /// state is saved as [`LifecycleState::Init`] even if starting the gauge failed;
    /// the start error takes precedence over a save error.
    pub async fn activate(&mut self) -> Result<(), Error<T::Error>> {
        let status = self.status().await?;
        let mut ram = self.load_state().await?;

        let started = if !ram.is_valid() {
            warn!("gauge RAM invalid, reinitializing");

            ram = PersistedState::initialize(&self.config);
            self.cold_start(&ram).await
        } else if status.intersects(StatusFlags::POWER_FAIL) {
            info!("power failure detected");
            self.cold_start(&ram).await
        } else {
            self.warm_restore(&ram).await
        };

        if matches!(started, Err(Error::ChipIdMismatch(_))) {
            return started;
        }

        ram.state = LifecycleState::Init;
        ram.reseal();

        let saved = self.save_state(&ram).await;
        if saved.is_ok() {
            self.ram = ram;
        }

        started.and(saved)
    }

    /// Periodic update: supervises the gauge, restarts it when needed and returns
    /// fresh readings. The RAM block is only saved when the whole update went through.
    ///
    /// [`Error::ChipIdMismatch`] means the gauge is absent; nothing changed and the next
    /// tick can simply try again.
    pub async fn tick(&mut self) -> Result<TickOutcome, Error<T::Error>> {
        let status = self.status().await?;
        let mut ram = self.load_state().await?;

        if !ram.is_valid() {
            warn!("gauge RAM invalid, reinitializing");

            ram = PersistedState::initialize(&self.config);
            ram.state = LifecycleState::Init;
        }

        if status.contains(StatusFlags::BATFAIL) {
            warn!("battery failure, resetting gauge");

            self.reset_from(ram).await?;
            return Ok(TickOutcome::BatteryFault);
        }

        if !status.contains(StatusFlags::GG_RUN) {
            info!("gauge halted");

            match ram.state {
                LifecycleState::Running | LifecycleState::PoweredDown => {
                    self.warm_restore(&ram).await?
                }
                _ => self.cold_start(&ram).await?,
            }

            ram.state = LifecycleState::Init;
        }

        let mut measurement = self.read_battery_data().await?;
        let mut battery_present = self.battery_present;

        if ram.state == LifecycleState::Init
            && measurement.conversion_counter > chip::SETTLE_CONVERSIONS
        {
            info!("gauge running");

            ram.state = LifecycleState::Running;
            battery_present = true;
        }

        measurement.battery_present = battery_present;

        let forced_soc = filter::apply(
            &mut measurement,
            ram.state,
            &self.config,
            self.remaining_time,
        );

        if let Some(hrsoc) = forced_soc {
            debug!("end of charge, holding soc at {}", hrsoc);

            self.write_word(regs::SOC, hrsoc).await?;
            measurement.high_resolution_soc = hrsoc;
        }

        ram.high_resolution_soc = measurement.high_resolution_soc;
        ram.soc = ((measurement.soc + 5) / 10) as i8;
        ram.reseal();

        self.save_state(&ram).await?;

        self.ram = ram;
        self.battery_present = battery_present;
        self.remaining_time = measurement.remaining_time;
        self.last_measurement = Some(measurement.clone());

        Ok(TickOutcome::Measured(measurement))
    }

    /// Invalidates the RAM block and issues a soft power-on reset. The reset is sent
    /// even if saving the block failed; that error is returned afterwards.
    pub async fn reset(&mut self) -> Result<(), Error<T::Error>> {
        self.reset_from(self.ram).await
    }

    async fn reset_from(&mut self, mut ram: PersistedState) -> Result<(), Error<T::Error>> {
        info!("resetting gauge");

        self.battery_present = false;
        self.remaining_time = -1;

        ram.invalidate();
        let saved = self.save_state(&ram).await;
        if saved.is_ok() {
            self.ram = ram;
        }

        self.write_byte(regs::CTRL, chip::CTRL_SOFT_POR).await?;

        saved
    }

    /// Records the shutdown in RAM and halts the gauge. The next [`Self::activate`]
    /// restores the saved SOC unless the battery went away in between
    pub async fn power_down(&mut self) -> Result<(), Error<T::Error>> {
        let mut ram = self.load_state().await?;

        ram.state = LifecycleState::PoweredDown;
        ram.reseal();

        self.save_state(&ram).await?;
        self.ram = ram;

        info!("powering down gauge");

        self.write_byte(regs::CTRL, chip::CTRL_RELEASE).await?;
        self.write_byte(regs::MODE, 0).await
    }

    /// Same as [`Self::power_down`]
    pub async fn stop(&mut self) -> Result<(), Error<T::Error>> {
        self.power_down().await
    }
}
