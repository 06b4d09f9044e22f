use anyhow::{Context, Result};
use log::debug;
use mcp7940n::Mcp7940n;
use rppal::{hal::Delay, i2c::I2c};

pub type Rtc = Mcp7940n<I2c, Delay>;

/// Open the I2C bus and check that the RTC answers at `address`. Without a
/// bus number the one wired to the GPIO header of this Pi model is used.
pub fn open(bus: Option<u8>, address: u8) -> Result<Rtc> {
    let i2c = match bus {
        Some(bus) => I2c::with_bus(bus).with_context(|| format!("Unable to open I2C bus {}", bus))?,
        None => I2c::new().context("Unable to open the I2C bus")?,
    };
    debug!(
        "opened I2C bus {} at {} Hz",
        i2c.bus(),
        i2c.clock_speed().unwrap_or_default()
    );

    let mut rtc = Mcp7940n::new(address, i2c, Delay::new());
    rtc.probe()
        .with_context(|| format!("No RTC answering at address {:#04x}", address))?;

    Ok(rtc)
}
