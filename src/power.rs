use std::io::Write;

use anyhow::{Context, Result};
use embedded_hal::{delay::DelayNs, i2c::I2c};
use mcp7940n::Mcp7940n;

use crate::BusError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerEvent {
    /// The main supply was lost.
    Down,
    /// The main supply came back.
    Up,
}

impl PowerEvent {
    fn name(self) -> &'static str {
        match self {
            PowerEvent::Down => "power down",
            PowerEvent::Up => "power up",
        }
    }
}

/// Print when the last power event happened, if the RTC recorded one.
pub fn show<I2C, E, D>(
    rtc: &mut Mcp7940n<I2C, D>,
    out: &mut impl Write,
    event: PowerEvent,
) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    let timestamp = match event {
        PowerEvent::Down => rtc.power_down_timestamp(),
        PowerEvent::Up => rtc.power_up_timestamp(),
    }
    .with_context(|| format!("Unable to read the {} date/time", event.name()))?;

    match timestamp {
        Some(timestamp) => writeln!(out, "{}", timestamp)?,
        None => writeln!(
            out,
            "No {} date/time information available (PWRFAIL bit is cleared).",
            event.name()
        )?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };
    use mcp7940n::DEFAULT_ADDRESS;

    fn show_event(expectations: &[I2cTransaction], event: PowerEvent) -> String {
        let mut i2c = I2cMock::new(expectations);
        let mut rtc = Mcp7940n::new(DEFAULT_ADDRESS, i2c.clone(), NoopDelay);
        let mut out = Vec::new();

        show(&mut rtc, &mut out, event).unwrap();
        i2c.done();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn nothing_to_show_without_power_fail() {
        let out = show_event(
            &[I2cTransaction::write_read(DEFAULT_ADDRESS, vec![0x03], vec![0x28 | 0x04])],
            PowerEvent::Up,
        );
        assert_eq!(
            out,
            "No power up date/time information available (PWRFAIL bit is cleared).\n"
        );
    }

    #[test]
    fn shows_the_power_down_time() {
        // Sunday 15 Dec 05:30, weekday stored as 1 in the top bits
        let out = show_event(
            &[
                I2cTransaction::write_read(DEFAULT_ADDRESS, vec![0x03], vec![0x38 | 0x01]),
                I2cTransaction::write_read(DEFAULT_ADDRESS, vec![0x18], vec![0x30, 0x05, 0x15, 0x32]),
            ],
            PowerEvent::Down,
        );
        assert_eq!(out, "Sun Dec 15 05:30 UTC\n");
    }
}
