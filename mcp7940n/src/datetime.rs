use core::fmt;

use bitflags::bitflags;
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::Field;

/// Length of the live date/time block starting at RTCSEC.
pub const DATETIME_SIZE: usize = 7;
/// Length of each power-down/power-up timestamp block.
pub const TIMESTAMP_SIZE: usize = 4;

/// The device keeps a two digit year with no century register.
pub const CENTURY_BASE: u16 = 2000;

// Masks for the BCD digits of each register, excluding flag bits.
const SECONDS_MASK: u8 = 0b0111_1111;
const MINUTES_MASK: u8 = 0b0111_1111;
const HOUR_24_MASK: u8 = 0b0011_1111;
const HOUR_12_MASK: u8 = 0b0001_1111;
const WEEKDAY_MASK: u8 = 0b0000_0111;
const DATE_MASK: u8 = 0b0011_1111;
const MONTH_MASK: u8 = 0b0001_1111;
const SQUARE_WAVE_FREQUENCY_MASK: u8 = 0b0000_0011;

// The timestamp month register carries the weekday in its top three bits.
const TIMESTAMP_WEEKDAY_SHIFT: u8 = 5;

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn dec_to_bcd(n: u8) -> u8 {
    (n / 10 * 16) + (n % 10)
}

pub(crate) fn bcd_to_dec(n: u8) -> u8 {
    (n / 16 * 10) + (n % 16)
}

bitflags! {
    /// Bits of RTCSEC outside the BCD seconds.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SecondsFlags: u8 {
        /// ST, set by software to run the oscillator.
        const START_OSCILLATOR = 0b1000_0000;
    }

    /// Mode bits of RTCHOUR and of the timestamp hour registers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct HourFlags: u8 {
        const TWELVE_HOUR = 0b0100_0000;
        /// Only meaningful in 12 hour mode, where it overlaps the 24 hour tens digit.
        const PM          = 0b0010_0000;
    }

    /// Bits of RTCWKDAY outside the weekday counter.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct WeekdayFlags: u8 {
        /// OSCRUN, set by the hardware while the oscillator is actually running.
        const OSCILLATOR_RUNNING = 0b0010_0000;
        /// PWRFAIL, latched on power loss. Can only be cleared.
        const POWER_FAIL         = 0b0001_0000;
        /// VBATEN, switch over to the backup battery on power loss.
        const BATTERY_ENABLE     = 0b0000_1000;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MonthFlags: u8 {
        /// LPYR, read-only.
        const LEAP_YEAR = 0b0010_0000;
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ControlFlags: u8 {
        const GENERAL_PURPOSE_OUTPUT = 0b1000_0000;
        const SQUARE_WAVE_ENABLE     = 0b0100_0000;
        const ALARM_1_ENABLE         = 0b0010_0000;
        const ALARM_0_ENABLE         = 0b0001_0000;
        const EXTERNAL_OSCILLATOR    = 0b0000_1000;
        const COARSE_TRIM_ENABLE     = 0b0000_0100;
    }
}

/// A calendar date and time as kept by the clock, always in 24 hour form.
///
/// `month` is 1-12, `weekday` is 0-6 starting on Sunday. Values decoded from
/// the device are not range checked, a corrupt register shows up as an
/// out-of-range field rather than an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub weekday: u8,
}

/// Snapshot of the clock taken on a power event. The device records
/// neither seconds nor year.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timestamp {
    pub weekday: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

/// Decoded CONTROL register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Control {
    /// SQWFS, selects the square wave output frequency.
    pub square_wave_frequency: u8,
    pub flags: ControlFlags,
}

impl Control {
    pub fn from_register(byte: u8) -> Self {
        Control {
            square_wave_frequency: byte & SQUARE_WAVE_FREQUENCY_MASK,
            flags: ControlFlags::from_bits_truncate(byte),
        }
    }
}

fn decode_hour(byte: u8) -> u8 {
    let flags = HourFlags::from_bits_truncate(byte);

    if flags.contains(HourFlags::TWELVE_HOUR) {
        let hour = bcd_to_dec(byte & HOUR_12_MASK);
        // 12 AM is midnight and 12 PM is noon
        match (hour, flags.contains(HourFlags::PM)) {
            (12, false) => 0,
            (12, true) => 12,
            (hour, true) => hour + 12,
            (hour, false) => hour,
        }
    } else {
        bcd_to_dec(byte & HOUR_24_MASK)
    }
}

/// Weekdays are stored 1-7 on the device.
fn decode_weekday(stored: u8) -> u8 {
    stored.saturating_sub(1)
}

/// Unpack the 7 registers starting at RTCSEC.
pub fn decode_datetime(registers: &[u8; DATETIME_SIZE]) -> DateTime {
    DateTime {
        second: bcd_to_dec(registers[0] & SECONDS_MASK),
        minute: bcd_to_dec(registers[1] & MINUTES_MASK),
        hour: decode_hour(registers[2]),
        weekday: decode_weekday(registers[3] & WEEKDAY_MASK),
        day: bcd_to_dec(registers[4] & DATE_MASK),
        month: bcd_to_dec(registers[5] & MONTH_MASK),
        year: CENTURY_BASE + u16::from(bcd_to_dec(registers[6])),
    }
}

/// Pack `datetime` into the 7 registers starting at RTCSEC.
///
/// The flag bits of `current` (ST, VBATEN, PWRFAIL, OSCRUN, LPYR) are carried
/// over unchanged. The hour is always written in 24 hour mode and the century
/// is dropped.
pub fn encode_datetime(
    datetime: &DateTime,
    current: &[u8; DATETIME_SIZE],
) -> [u8; DATETIME_SIZE] {
    let seconds_flags = SecondsFlags::from_bits_truncate(current[0]);
    let weekday_flags = current[3] & !WEEKDAY_MASK;
    let month_flags = MonthFlags::from_bits_truncate(current[5]);

    [
        seconds_flags.bits() | dec_to_bcd(datetime.second),
        dec_to_bcd(datetime.minute),
        dec_to_bcd(datetime.hour),
        weekday_flags | ((datetime.weekday + 1) & WEEKDAY_MASK),
        dec_to_bcd(datetime.day),
        month_flags.bits() | dec_to_bcd(datetime.month),
        dec_to_bcd((datetime.year % 100) as u8),
    ]
}

/// Unpack a power-down or power-up timestamp block.
pub fn decode_timestamp(registers: &[u8; TIMESTAMP_SIZE]) -> Timestamp {
    Timestamp {
        minute: bcd_to_dec(registers[0] & MINUTES_MASK),
        hour: decode_hour(registers[1]),
        day: bcd_to_dec(registers[2] & DATE_MASK),
        month: bcd_to_dec(registers[3] & MONTH_MASK),
        weekday: decode_weekday(registers[3] >> TIMESTAMP_WEEKDAY_SHIFT),
    }
}

pub fn weekday_name(weekday: u8) -> &'static str {
    WEEKDAY_NAMES.get(usize::from(weekday)).unwrap_or(&"???")
}

pub fn month_name(month: u8) -> &'static str {
    usize::from(month)
        .checked_sub(1)
        .and_then(|i| MONTH_NAMES.get(i))
        .unwrap_or(&"???")
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {:02}:{:02} UTC",
            weekday_name(self.weekday),
            month_name(self.month),
            self.day,
            self.hour,
            self.minute
        )
    }
}

impl From<PrimitiveDateTime> for DateTime {
    fn from(datetime: PrimitiveDateTime) -> Self {
        DateTime {
            // Years the device can't hold are rejected before encoding
            year: u16::try_from(datetime.year()).unwrap_or(0),
            month: datetime.month() as u8,
            day: datetime.day(),
            hour: datetime.hour(),
            minute: datetime.minute(),
            second: datetime.second(),
            weekday: datetime.weekday().number_days_from_sunday(),
        }
    }
}

impl TryFrom<DateTime> for PrimitiveDateTime {
    type Error = Field;

    /// Fails with the first field that doesn't form a real calendar date.
    /// The stored weekday is ignored.
    fn try_from(datetime: DateTime) -> Result<Self, Field> {
        let month = Month::try_from(datetime.month).map_err(|_| Field::Month)?;
        let date = Date::from_calendar_date(i32::from(datetime.year), month, datetime.day)
            .map_err(|_| Field::Day)?;

        if datetime.hour > 23 {
            return Err(Field::Hour);
        }
        if datetime.minute > 59 {
            return Err(Field::Minute);
        }
        let time = Time::from_hms(datetime.hour, datetime.minute, datetime.second)
            .map_err(|_| Field::Second)?;

        Ok(PrimitiveDateTime::new(date, time))
    }
}

#[test]
fn test_bcd_to_dec() {
    assert_eq!(bcd_to_dec(dec_to_bcd(59)), 59);
    assert_eq!(dec_to_bcd(59), 0x59);
    assert_eq!(bcd_to_dec(0x23), 23);
}
