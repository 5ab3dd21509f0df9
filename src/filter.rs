//! Turns decoded readings into what the application shows: SOC derated near the
//! cutoff voltage, remaining charge and a smoothed time-to-empty estimate

use crate::config::ChipConfig;
use crate::measurement::BatteryMeasurement;
use crate::memory::LifecycleState;
use crate::registers::chip;

/// Above the cutoff voltage by less than this, SOC is scaled down towards zero
pub const VOLTAGE_SECURITY_RANGE: i32 = 200;

/// Reported while the readings are not trusted yet, 25.0°C
pub const PLACEHOLDER_TEMPERATURE: i32 = 250;

/// Charging SOC is held here until the charger stops, 99.0%
const END_OF_CHARGE_SOC: i32 = 990;

fn charge_value(config: &ChipConfig, soc: i32) -> i32 {
    let soc = soc.clamp(0, chip::MAX_SOC) as i64;
    (config.nominal_capacity as i64 * soc / chip::MAX_SOC as i64) as i32
}

/// Minutes to empty, smoothed over the previous estimate. Divides by the discharge
/// magnitude, so `current` must be negative for a result
fn remaining_time(previous: i32, charge: i32, current: i32) -> i32 {
    if current >= 0 {
        return -1;
    }

    let estimate = (previous * 4 + charge / -current * 60) / 5;

    if estimate < 0 {
        -1
    } else {
        estimate
    }
}

/// Post-processes `measurement` in place. Returns the high resolution SOC that must be
/// written back to the chip, if the end-of-charge correction kicked in
pub fn apply(
    measurement: &mut BatteryMeasurement,
    state: LifecycleState,
    config: &ChipConfig,
    previous_remaining_time: i32,
) -> Option<u16> {
    let mut forced_soc = None;

    if state != LifecycleState::Running {
        measurement.charge_value = charge_value(config, measurement.soc);
        measurement.current = 0;
        measurement.temperature = PLACEHOLDER_TEMPERATURE;
        measurement.remaining_time = -1;
    } else {
        let cutoff = config.cutoff_voltage;

        if measurement.voltage < cutoff {
            measurement.soc = 0;
        } else if measurement.voltage < cutoff + VOLTAGE_SECURITY_RANGE {
            measurement.soc =
                measurement.soc * (measurement.voltage - cutoff) / VOLTAGE_SECURITY_RANGE;
        }

        measurement.charge_value = charge_value(config, measurement.soc);

        if config.is_voltage_mode() {
            measurement.current = 0;
            measurement.remaining_time = -1;
        } else {
            if measurement.current > config.end_of_charge_current
                && measurement.soc > END_OF_CHARGE_SOC
            {
                measurement.soc = END_OF_CHARGE_SOC;
                forced_soc = Some((END_OF_CHARGE_SOC / 10 * chip::HRSOC_PER_PERCENT) as u16);
            }

            measurement.remaining_time = remaining_time(
                previous_remaining_time,
                measurement.charge_value,
                measurement.current,
            );
        }
    }

    measurement.soc = measurement.soc.clamp(0, chip::MAX_SOC);

    forced_soc
}
