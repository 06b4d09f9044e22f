//! Partial date/time strings of the form `[[[[[cc]yy]mm]dd]HH]MM[.ss]`, as
//! accepted by `date(1)`. Fields left out are taken from a base time.

use core::{fmt, ops::RangeInclusive};

use time::{Date, Duration, Month, PrimitiveDateTime, Time};

use crate::{Field, CENTURY_BASE};

/// Digit pairs in the order they appear, the rightmost is always the minute.
const FIELDS: [Field; 6] = [
    Field::Century,
    Field::Year,
    Field::Month,
    Field::Day,
    Field::Hour,
    Field::Minute,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSpecError {
    /// Wrong length, a missing `.ss` or a non-digit.
    Format,
    Range(Field),
}

impl fmt::Display for TimeSpecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpecError::Format => {
                write!(f, "Illegal date format, must be [[[[[cc]yy]mm]dd]HH]MM[.ss]")
            }
            TimeSpecError::Range(field) => write!(f, "The {} is out of range", field),
        }
    }
}

impl core::error::Error for TimeSpecError {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeSpec {
    pub century: Option<u8>,
    pub year: Option<u8>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: u8,
    pub second: Option<u8>,
}

fn field_range(field: Field) -> RangeInclusive<u8> {
    match field {
        // Only years the device can hold
        Field::Century => 20..=20,
        Field::Year => 0..=99,
        Field::Month => 1..=12,
        Field::Day => 1..=31,
        Field::Hour => 0..=23,
        Field::Minute | Field::Second => 0..=59,
    }
}

fn parse_pair(pair: &[u8], field: Field) -> Result<u8, TimeSpecError> {
    let value = match pair {
        [tens @ b'0'..=b'9', ones @ b'0'..=b'9'] => (tens - b'0') * 10 + (ones - b'0'),
        _ => return Err(TimeSpecError::Format),
    };

    if field_range(field).contains(&value) {
        Ok(value)
    } else {
        Err(TimeSpecError::Range(field))
    }
}

impl TimeSpec {
    /// Check the string's shape and each field's range. Fields are checked
    /// from the left, so the leftmost bad field is the one reported.
    pub fn parse(input: &str) -> Result<Self, TimeSpecError> {
        let (digits, seconds) = match input.split_once('.') {
            Some((digits, seconds)) => (digits.as_bytes(), Some(seconds.as_bytes())),
            None => (input.as_bytes(), None),
        };

        let pairs = digits.len() / 2;
        if digits.len() % 2 != 0 || pairs == 0 || pairs > FIELDS.len() {
            return Err(TimeSpecError::Format);
        }

        let mut spec = TimeSpec::default();
        let fields = FIELDS[FIELDS.len() - pairs..].iter().copied();
        let seconds = seconds.map(|pair| (Field::Second, pair));

        for (field, pair) in fields.zip(digits.chunks_exact(2)).chain(seconds) {
            let value = parse_pair(pair, field)?;
            match field {
                Field::Century => spec.century = Some(value),
                Field::Year => spec.year = Some(value),
                Field::Month => spec.month = Some(value),
                Field::Day => spec.day = Some(value),
                Field::Hour => spec.hour = Some(value),
                Field::Minute => spec.minute = value,
                Field::Second => spec.second = Some(value),
            }
        }

        Ok(spec)
    }

    /// Fill the missing fields from `base` and normalize the result.
    ///
    /// A day past the end of the month rolls over into the next one. Seconds
    /// default to zero.
    pub fn resolve(&self, base: PrimitiveDateTime) -> Result<PrimitiveDateTime, TimeSpecError> {
        let year = match (self.century, self.year) {
            (Some(century), Some(year)) => i32::from(century) * 100 + i32::from(year),
            (_, Some(year)) => i32::from(CENTURY_BASE) + i32::from(year),
            _ => base.year(),
        };
        let month = match self.month {
            Some(month) => {
                Month::try_from(month).map_err(|_| TimeSpecError::Range(Field::Month))?
            }
            None => base.month(),
        };
        let day = self.day.unwrap_or(base.day());
        let hour = self.hour.unwrap_or(base.hour());

        let time = Time::from_hms(hour, self.minute, self.second.unwrap_or(0))
            .map_err(|_| TimeSpecError::Range(Field::Hour))?;
        let date = Date::from_calendar_date(year, month, 1)
            .map_err(|_| TimeSpecError::Range(Field::Year))?
            .checked_add(Duration::days(i64::from(day) - 1))
            .ok_or(TimeSpecError::Range(Field::Day))?;

        Ok(PrimitiveDateTime::new(date, time))
    }
}
