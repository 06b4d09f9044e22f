//! The `-o` register options.

use std::io::Write;

use anyhow::{Context, Result};
use embedded_hal::{delay::DelayNs, i2c::I2c};
use log::{debug, warn};
use mcp7940n::{ControlFlags, FlagUpdate, Mcp7940n};

use crate::{clock, BusError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RtcOption {
    /// Calibrate, enable the battery and the oscillator, then set the
    /// RTC from the computer clock.
    Init,
    BatteryEnable,
    BatteryDisable,
    BatterySetting,
    Calibrate,
    ClearNvram,
    Control,
    OscillatorEnable,
    OscillatorDisable,
    OscillatorSetting,
    OscillatorStatus,
    PowerFailStatus,
    ClearPowerFail,
}

const OPTIONS: [RtcOption; 13] = [
    RtcOption::Init,
    RtcOption::BatteryEnable,
    RtcOption::BatteryDisable,
    RtcOption::BatterySetting,
    RtcOption::Calibrate,
    RtcOption::ClearNvram,
    RtcOption::Control,
    RtcOption::OscillatorEnable,
    RtcOption::OscillatorDisable,
    RtcOption::OscillatorSetting,
    RtcOption::OscillatorStatus,
    RtcOption::PowerFailStatus,
    RtcOption::ClearPowerFail,
];

fn enabled(value: bool) -> &'static str {
    if value {
        "Enabled"
    } else {
        "Disabled"
    }
}

impl RtcOption {
    pub fn name(self) -> &'static str {
        match self {
            RtcOption::Init => "init",
            RtcOption::BatteryEnable => "bat",
            RtcOption::BatteryDisable => "nobat",
            RtcOption::BatterySetting => "batset",
            RtcOption::Calibrate => "cal",
            RtcOption::ClearNvram => "clrnvram",
            RtcOption::Control => "control",
            RtcOption::OscillatorEnable => "osc",
            RtcOption::OscillatorDisable => "noosc",
            RtcOption::OscillatorSetting => "oscset",
            RtcOption::OscillatorStatus => "oscstat",
            RtcOption::PowerFailStatus => "pwrstat",
            RtcOption::ClearPowerFail => "clrpwr",
        }
    }

    /// Look an option up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        OPTIONS
            .into_iter()
            .find(|option| option.name().eq_ignore_ascii_case(name))
    }

    pub fn run<I2C, E, D>(self, rtc: &mut Mcp7940n<I2C, D>, out: &mut impl Write) -> Result<()>
    where
        I2C: I2c<Error = E>,
        E: BusError,
        D: DelayNs,
    {
        debug!("running option {}", self.name());

        match self {
            RtcOption::Init => {
                init(rtc, out).context("Initialization failed!")?;
                writeln!(out, "Initialization successful.")?;
            }
            RtcOption::BatteryEnable | RtcOption::BatteryDisable => {
                let enable = self == RtcOption::BatteryEnable;
                let update = rtc
                    .set_battery_enabled(enable)
                    .context("Unable to update the Battery Enable (VBATEN) bit")?;
                if update == FlagUpdate::AlreadySet {
                    writeln!(
                        out,
                        "The Battery Enable (VBATEN) bit was already set to {}.",
                        enabled(enable)
                    )?;
                }
            }
            RtcOption::BatterySetting => {
                let battery = rtc
                    .battery_enabled()
                    .context("Unable to read the Battery Enable (VBATEN) bit")?;
                writeln!(out, "Battery Enable bit is {}.", enabled(battery))?;
            }
            RtcOption::Calibrate => {
                rtc.calibrate().context("Unable to set the trim value")?;
            }
            RtcOption::ClearNvram => {
                rtc.clear_nvram().context("Unable to clear the NVRAM")?;
            }
            RtcOption::Control => {
                let control = rtc
                    .control()
                    .context("Unable to read the control register")?;
                let bit = |flag| u8::from(control.flags.contains(flag));

                let rows = [
                    ("Square Wave Clock Output Frequency Select:", control.square_wave_frequency),
                    ("Coarse Trim Enable:", bit(ControlFlags::COARSE_TRIM_ENABLE)),
                    ("External Oscillator Input:", bit(ControlFlags::EXTERNAL_OSCILLATOR)),
                    ("Alarm 0 Module Enable:", bit(ControlFlags::ALARM_0_ENABLE)),
                    ("Alarm 1 Module Enable:", bit(ControlFlags::ALARM_1_ENABLE)),
                    ("Square Wave Output Enable:", bit(ControlFlags::SQUARE_WAVE_ENABLE)),
                    (
                        "Logic Level for General Purpose Output:",
                        bit(ControlFlags::GENERAL_PURPOSE_OUTPUT),
                    ),
                ];
                for (label, value) in rows {
                    writeln!(out, "{:<43}{}", label, value)?;
                }
            }
            RtcOption::OscillatorEnable | RtcOption::OscillatorDisable => {
                let enable = self == RtcOption::OscillatorEnable;
                let update = rtc
                    .set_oscillator_enabled(enable)
                    .context("Unable to update the Oscillator Start (ST) bit")?;
                if update == FlagUpdate::AlreadySet {
                    writeln!(
                        out,
                        "The Oscillator Start (ST) bit was already set to {}.",
                        enabled(enable)
                    )?;
                }
            }
            RtcOption::OscillatorSetting => {
                let oscillator = rtc
                    .oscillator_enabled()
                    .context("Unable to read the Oscillator Start (ST) bit")?;
                writeln!(out, "Oscillator is {}.", enabled(oscillator))?;
            }
            RtcOption::OscillatorStatus => {
                let running = rtc
                    .oscillator_running()
                    .context("Unable to read the Oscillator Status (OSCRUN) bit")?;
                if running {
                    writeln!(out, "Oscillator is enabled and running.")?;
                } else {
                    writeln!(out, "Oscillator has stopped or been disabled.")?;
                }
            }
            RtcOption::PowerFailStatus => {
                let failed = rtc
                    .power_failed()
                    .context("Unable to read the Power Fail Status (PWRFAIL) bit")?;
                writeln!(out, "Power Fail Status bit is {}.", enabled(failed))?;
            }
            RtcOption::ClearPowerFail => {
                let update = rtc
                    .clear_power_failed()
                    .context("Unable to clear the Power Fail Status (PWRFAIL) bit")?;
                if update == FlagUpdate::AlreadySet {
                    writeln!(out, "The Power Fail Status (PWRFAIL) bit is not set.")?;
                }
            }
        }

        Ok(())
    }
}

fn init<I2C, E, D>(rtc: &mut Mcp7940n<I2C, D>, out: &mut impl Write) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    RtcOption::Calibrate.run(rtc, out)?;
    RtcOption::BatteryEnable.run(rtc, out)?;
    RtcOption::OscillatorEnable.run(rtc, out)?;
    clock::set_rtc_from_host(rtc)
}

/// Run a comma separated list of options in order. Unknown names are
/// skipped, a failing option stops the rest.
pub fn process<I2C, E, D>(
    rtc: &mut Mcp7940n<I2C, D>,
    out: &mut impl Write,
    options: &str,
) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    for name in options.split(',').filter(|name| !name.is_empty()) {
        match RtcOption::from_name(name) {
            Some(option) => option.run(rtc, out)?,
            None => warn!(
                "Invalid option {} specified, ignoring and continuing processing!",
                name
            ),
        }
    }

    Ok(())
}
