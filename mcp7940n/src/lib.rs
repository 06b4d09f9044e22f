#![cfg_attr(not(test), no_std)]

mod datetime;
mod register;
mod sequencer;
mod timespec;

use core::fmt;

use bitflags::Flags;
use embedded_hal::{delay::DelayNs, i2c::I2c};
use log::{debug, trace};

pub use datetime::{
    decode_datetime, decode_timestamp, encode_datetime, month_name, weekday_name, Control,
    ControlFlags, DateTime, HourFlags, MonthFlags, SecondsFlags, Timestamp, WeekdayFlags,
    CENTURY_BASE, DATETIME_SIZE, TIMESTAMP_SIZE,
};
pub use sequencer::SetTimeState;
pub use timespec::{TimeSpec, TimeSpecError};

/// Address of the PiFace Real Time Clock.
pub const DEFAULT_ADDRESS: u8 = 0x6f;

/// Size of the battery-backed SRAM.
pub const NVRAM_SIZE: usize = 64;

// Positive trim of 0x47 as used by the PiFace Linux driver.
const CALIBRATION_TRIM: u8 = 0x47;

// Largest payload of a single write, enough for the whole NVRAM.
const MAX_WRITE_SIZE: usize = NVRAM_SIZE;

/// A date/time field, used to report which one was out of range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Century,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Century => "century",
            Field::Year => "year",
            Field::Month => "month",
            Field::Day => "day",
            Field::Hour => "hour",
            Field::Minute => "minute",
            Field::Second => "second",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Error<E> {
    Bus(E),
    /// The time string doesn't match `[[[[[cc]yy]mm]dd]HH]MM[.ss]`.
    Format,
    Range(Field),
    /// OSCRUN stayed set after clearing ST.
    OscillatorStillRunning,
    /// OSCRUN stayed clear after setting ST.
    OscillatorNotResumed,
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Error::Bus(e) => write!(f, "Bus error: {}", e),
            Error::Format => write!(f, "Illegal date format, must be [[[[[cc]yy]mm]dd]HH]MM[.ss]"),
            Error::Range(field) => write!(f, "The {} is out of range", field),
            Error::OscillatorStillRunning => write!(
                f,
                "OSCRUN status bit is still set on the RTC, so date/time cannot be updated"
            ),
            Error::OscillatorNotResumed => write!(
                f,
                "OSCRUN status bit is still clear on the RTC, even after enabling oscillator input"
            ),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for Error<E> {}

impl<E> From<TimeSpecError> for Error<E> {
    fn from(error: TimeSpecError) -> Self {
        match error {
            TimeSpecError::Format => Error::Format,
            TimeSpecError::Range(field) => Error::Range(field),
        }
    }
}

/// Outcome of a flag update. Updating a flag to the value it already has
/// doesn't touch the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagUpdate {
    Updated,
    AlreadySet,
}

/// Driver for the Microchip MCP7940N real-time clock.
///
/// Access must be exclusive: every register access is an offset write
/// followed by data, and interleaving another transaction in between would
/// move the register pointer.
pub struct Mcp7940n<I2C, D> {
    address: u8,
    i2c: I2C,
    delay: D,
}

impl<I2C: I2c<Error = E>, E, D: DelayNs> Mcp7940n<I2C, D> {
    pub fn new(address: u8, i2c: I2C, delay: D) -> Self {
        Mcp7940n {
            address,
            i2c,
            delay,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    // Bus transport

    /// Check that something acknowledges at our address with a zero length read.
    pub fn probe(&mut self) -> Result<(), Error<E>> {
        debug!("probing for device at {:#04x}", self.address);
        self.read_registers(register::RTCSEC, &mut [])
    }

    /// Read `buf.len()` registers starting at `offset` in one write-read
    /// transaction, so the register pointer can't be reset in between.
    pub fn read_registers(&mut self, offset: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        debug!("read {} byte(s) at {:#04x}", buf.len(), offset);
        self.i2c
            .write_read(self.address, &[offset], buf)
            .map_err(Error::Bus)?;
        trace!("read {:02x?}", buf);
        Ok(())
    }

    /// Write `data` to consecutive registers starting at `offset`.
    /// The offset is sent in the same write as the data.
    ///
    /// # Panics
    ///
    /// If `data` is longer than the NVRAM, the largest block on the device.
    pub fn write_registers(&mut self, offset: u8, data: &[u8]) -> Result<(), Error<E>> {
        assert!(data.len() <= MAX_WRITE_SIZE);
        debug!("write {} byte(s) at {:#04x}", data.len(), offset);
        trace!("write {:02x?}", data);

        let mut buf: [u8; MAX_WRITE_SIZE + 1] = [0; MAX_WRITE_SIZE + 1];
        buf[0] = offset;
        buf[1..=data.len()].copy_from_slice(data);

        self.i2c
            .write(self.address, &buf[..=data.len()])
            .map_err(Error::Bus)
    }

    fn read_u8(&mut self, offset: u8) -> Result<u8, Error<E>> {
        let mut data: [u8; 1] = [0; 1];
        self.read_registers(offset, &mut data)?;
        Ok(data[0])
    }

    fn write_u8(&mut self, offset: u8, value: u8) -> Result<(), Error<E>> {
        self.write_registers(offset, &[value])
    }

    fn read_flag<F: Flags<Bits = u8>>(&mut self, offset: u8, flag: F) -> Result<bool, Error<E>> {
        let flags = F::from_bits_retain(self.read_u8(offset)?);
        Ok(flags.contains(flag))
    }

    /// Read-modify-write a single flag without touching the other bits of
    /// its register.
    fn update_flag<F: Flags<Bits = u8> + Copy>(
        &mut self,
        offset: u8,
        flag: F,
        value: bool,
    ) -> Result<FlagUpdate, Error<E>> {
        let mut flags = F::from_bits_retain(self.read_u8(offset)?);
        if flags.contains(flag) == value {
            return Ok(FlagUpdate::AlreadySet);
        }

        flags.set(flag, value);
        self.write_u8(offset, flags.bits())?;
        Ok(FlagUpdate::Updated)
    }

    // Date and time

    pub fn datetime(&mut self) -> Result<DateTime, Error<E>> {
        let mut registers = [0; DATETIME_SIZE];
        self.read_registers(register::RTCSEC, &mut registers)?;
        Ok(decode_datetime(&registers))
    }

    // Flags
    //
    // VBATEN and PWRFAIL share RTCWKDAY with the weekday counter, so a write
    // racing a midnight rollover can put back the previous weekday. The
    // oscillator isn't stopped around these writes.

    /// VBATEN
    pub fn battery_enabled(&mut self) -> Result<bool, Error<E>> {
        self.read_flag(register::RTCWKDAY, WeekdayFlags::BATTERY_ENABLE)
    }

    pub fn set_battery_enabled(&mut self, enable: bool) -> Result<FlagUpdate, Error<E>> {
        self.update_flag(register::RTCWKDAY, WeekdayFlags::BATTERY_ENABLE, enable)
    }

    /// ST, the oscillator start command. See [Self::oscillator_running] for
    /// whether it actually runs.
    pub fn oscillator_enabled(&mut self) -> Result<bool, Error<E>> {
        self.read_flag(register::RTCSEC, SecondsFlags::START_OSCILLATOR)
    }

    pub fn set_oscillator_enabled(&mut self, enable: bool) -> Result<FlagUpdate, Error<E>> {
        self.update_flag(register::RTCSEC, SecondsFlags::START_OSCILLATOR, enable)
    }

    /// OSCRUN
    pub fn oscillator_running(&mut self) -> Result<bool, Error<E>> {
        self.read_flag(register::RTCWKDAY, WeekdayFlags::OSCILLATOR_RUNNING)
    }

    /// PWRFAIL
    pub fn power_failed(&mut self) -> Result<bool, Error<E>> {
        self.read_flag(register::RTCWKDAY, WeekdayFlags::POWER_FAIL)
    }

    /// Clear PWRFAIL, which also resets both power event timestamps.
    pub fn clear_power_failed(&mut self) -> Result<FlagUpdate, Error<E>> {
        self.update_flag(register::RTCWKDAY, WeekdayFlags::POWER_FAIL, false)
    }

    // Configuration

    /// Write the fixed digital trim value to OSCTRIM.
    pub fn calibrate(&mut self) -> Result<(), Error<E>> {
        self.write_u8(register::OSCTRIM, CALIBRATION_TRIM)
    }

    pub fn control(&mut self) -> Result<Control, Error<E>> {
        let control = self.read_u8(register::CONTROL)?;
        Ok(Control::from_register(control))
    }

    // NVRAM

    pub fn read_nvram(&mut self) -> Result<[u8; NVRAM_SIZE], Error<E>> {
        let mut buf = [0; NVRAM_SIZE];
        self.read_registers(register::NVRAM, &mut buf)?;
        Ok(buf)
    }

    /// Write `data` to the NVRAM. Longer input is truncated, shorter input is
    /// padded with zeros so the whole NVRAM is always rewritten.
    pub fn write_nvram(&mut self, data: &[u8]) -> Result<(), Error<E>> {
        let mut buf = [0; NVRAM_SIZE];
        let len = data.len().min(NVRAM_SIZE);
        buf[..len].copy_from_slice(&data[..len]);
        self.write_registers(register::NVRAM, &buf)
    }

    pub fn clear_nvram(&mut self) -> Result<(), Error<E>> {
        self.write_nvram(&[])
    }

    // Power events

    /// When the main supply was lost, or [None] if PWRFAIL is clear and the
    /// timestamp registers hold nothing meaningful.
    pub fn power_down_timestamp(&mut self) -> Result<Option<Timestamp>, Error<E>> {
        self.power_timestamp(register::PWRDN)
    }

    /// When the main supply came back, or [None] if PWRFAIL is clear.
    pub fn power_up_timestamp(&mut self) -> Result<Option<Timestamp>, Error<E>> {
        self.power_timestamp(register::PWRUP)
    }

    fn power_timestamp(&mut self, offset: u8) -> Result<Option<Timestamp>, Error<E>> {
        if !self.power_failed()? {
            return Ok(None);
        }

        let mut registers = [0; TIMESTAMP_SIZE];
        self.read_registers(offset, &mut registers)?;
        Ok(Some(decode_timestamp(&registers)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    pub(crate) const ADDRESS: u8 = DEFAULT_ADDRESS;

    pub(crate) struct CountingDelay {
        pub ns: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += u64::from(ns);
        }
    }

    pub(crate) fn rtc(
        expectations: &[I2cTransaction],
    ) -> (Mcp7940n<I2cMock, CountingDelay>, I2cMock) {
        let i2c = I2cMock::new(expectations);
        (
            Mcp7940n::new(ADDRESS, i2c.clone(), CountingDelay { ns: 0 }),
            i2c,
        )
    }

    #[test]
    fn probe_is_a_zero_length_read() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(ADDRESS, vec![0x00], vec![])]);
        rtc.probe().unwrap();
        i2c.done();
    }

    #[test]
    fn probe_reports_a_missing_device() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], vec![]).with_error(ErrorKind::Other)
        ]);
        assert!(matches!(rtc.probe(), Err(Error::Bus(ErrorKind::Other))));
        i2c.done();
    }

    #[test]
    fn write_prepends_the_offset() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write(ADDRESS, vec![0x08, 0x47])]);
        rtc.calibrate().unwrap();
        i2c.done();
    }

    #[test]
    #[should_panic]
    fn write_longer_than_the_nvram_panics() {
        let (mut rtc, _i2c) = rtc(&[]);
        let _ = rtc.write_registers(register::NVRAM, &[0; NVRAM_SIZE + 1]);
    }

    #[test]
    fn write_of_a_whole_nvram_fits() {
        let mut expected = vec![0x20];
        expected.extend_from_slice(&[0x5A; NVRAM_SIZE]);

        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write(ADDRESS, expected)]);
        rtc.write_registers(register::NVRAM, &[0x5A; NVRAM_SIZE]).unwrap();
        i2c.done();
    }

    #[test]
    fn setting_battery_to_its_current_value_does_not_write() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(
            ADDRESS,
            vec![0x03],
            vec![0x20 | 0x08 | 0x02],
        )]);
        assert_eq!(rtc.set_battery_enabled(true).unwrap(), FlagUpdate::AlreadySet);
        i2c.done();
    }

    #[test]
    fn setting_battery_keeps_the_other_bits() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x20 | 0x10 | 0x05]),
            I2cTransaction::write(ADDRESS, vec![0x03, 0x20 | 0x10 | 0x08 | 0x05]),
        ]);
        assert_eq!(rtc.set_battery_enabled(true).unwrap(), FlagUpdate::Updated);
        i2c.done();
    }

    #[test]
    fn disabling_the_oscillator_clears_only_st() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], vec![0x80 | 0x37]),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x37]),
        ]);
        assert_eq!(rtc.set_oscillator_enabled(false).unwrap(), FlagUpdate::Updated);
        i2c.done();
    }

    #[test]
    fn oscillator_setting_and_status_are_separate_bits() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], vec![0x80]),
            I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x01]),
        ]);
        assert!(rtc.oscillator_enabled().unwrap());
        assert!(!rtc.oscillator_running().unwrap());
        i2c.done();
    }

    #[test]
    fn clearing_a_clear_power_fail_flag_does_not_write() {
        let (mut rtc, mut i2c) =
            rtc(&[I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x28 | 0x01])]);
        assert_eq!(rtc.clear_power_failed().unwrap(), FlagUpdate::AlreadySet);
        i2c.done();
    }

    #[test]
    fn clears_the_power_fail_flag() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x38 | 0x01]),
            I2cTransaction::write(ADDRESS, vec![0x03, 0x28 | 0x01]),
        ]);
        assert_eq!(rtc.clear_power_failed().unwrap(), FlagUpdate::Updated);
        i2c.done();
    }

    #[test]
    fn nvram_write_truncates_long_input() {
        let input: Vec<u8> = (0..70).collect();
        let mut expected = vec![0x20];
        expected.extend(0..64);

        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write(ADDRESS, expected)]);
        rtc.write_nvram(&input).unwrap();
        i2c.done();
    }

    #[test]
    fn nvram_write_pads_short_input() {
        let mut expected = vec![0x20];
        expected.extend_from_slice(b"0123456789");
        expected.extend_from_slice(&[0; 54]);

        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write(ADDRESS, expected)]);
        rtc.write_nvram(b"0123456789").unwrap();
        i2c.done();
    }

    #[test]
    fn nvram_clear_writes_zeros() {
        let mut expected = vec![0x20];
        expected.extend_from_slice(&[0; NVRAM_SIZE]);

        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write(ADDRESS, expected)]);
        rtc.clear_nvram().unwrap();
        i2c.done();
    }

    #[test]
    fn nvram_read_returns_raw_bytes() {
        let mut contents = vec![0xFF; NVRAM_SIZE];
        contents[..3].copy_from_slice(b"a\0b");

        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(
            ADDRESS,
            vec![0x20],
            contents.clone(),
        )]);
        assert_eq!(rtc.read_nvram().unwrap().to_vec(), contents);
        i2c.done();
    }

    #[test]
    fn no_power_timestamp_without_power_fail() {
        let (mut rtc, mut i2c) =
            rtc(&[I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x28])]);
        assert_eq!(rtc.power_down_timestamp().unwrap(), None);
        i2c.done();
    }

    #[test]
    fn reads_the_power_up_timestamp() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x03], vec![0x38]),
            I2cTransaction::write_read(ADDRESS, vec![0x1C], vec![0x45, 0x21, 0x31, 0xD2]),
        ]);
        assert_eq!(
            rtc.power_up_timestamp().unwrap(),
            Some(Timestamp {
                weekday: 5,
                month: 12,
                day: 31,
                hour: 21,
                minute: 45,
            })
        );
        i2c.done();
    }

    #[test]
    fn reads_the_datetime_block() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(
            ADDRESS,
            vec![0x00],
            vec![0x80 | 0x00, 0x30, 0x05, 0x28 | 0x07, 0x15, 0x12, 0x01],
        )]);
        let datetime = rtc.datetime().unwrap();
        assert_eq!((datetime.year, datetime.month, datetime.day), (2001, 12, 15));
        assert_eq!((datetime.hour, datetime.minute, datetime.second), (5, 30, 0));
        i2c.done();
    }
}
