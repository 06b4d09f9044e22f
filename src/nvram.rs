use std::io::Write;

use anyhow::{Context, Result};
use embedded_hal::{delay::DelayNs, i2c::I2c};
use mcp7940n::Mcp7940n;

use crate::BusError;

/// Print the NVRAM as text, up to the first NUL.
pub fn show<I2C, E, D>(rtc: &mut Mcp7940n<I2C, D>, out: &mut impl Write) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    let contents = rtc.read_nvram().context("Unable to read the NVRAM")?;
    let len = contents
        .iter()
        .position(|&byte| byte == 0)
        .unwrap_or(contents.len());

    writeln!(out, "{}", String::from_utf8_lossy(&contents[..len]))?;
    Ok(())
}

/// Replace the whole NVRAM with `text`, cut to fit.
pub fn write<I2C, E, D>(rtc: &mut Mcp7940n<I2C, D>, text: &str) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    rtc.write_nvram(text.as_bytes())
        .context("Unable to write the NVRAM")
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::{
        delay::NoopDelay,
        i2c::{Mock as I2cMock, Transaction as I2cTransaction},
    };
    use mcp7940n::{DEFAULT_ADDRESS, NVRAM_SIZE};

    #[test]
    fn shows_text_up_to_the_first_nul() {
        let mut contents = vec![0xAA; NVRAM_SIZE];
        contents[..11].copy_from_slice(b"hello\xFFworld");
        contents[12] = 0;

        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            DEFAULT_ADDRESS,
            vec![0x20],
            contents,
        )]);
        let mut rtc = Mcp7940n::new(DEFAULT_ADDRESS, i2c.clone(), NoopDelay);
        let mut out = Vec::new();

        show(&mut rtc, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\u{FFFD}world\u{FFFD}\n");
        i2c.done();
    }

    #[test]
    fn full_nvram_without_nul_is_shown_whole() {
        let mut i2c = I2cMock::new(&[I2cTransaction::write_read(
            DEFAULT_ADDRESS,
            vec![0x20],
            vec![b'x'; NVRAM_SIZE],
        )]);
        let mut rtc = Mcp7940n::new(DEFAULT_ADDRESS, i2c.clone(), NoopDelay);
        let mut out = Vec::new();

        show(&mut rtc, &mut out).unwrap();
        assert_eq!(out.len(), NVRAM_SIZE + 1);
        i2c.done();
    }
}
