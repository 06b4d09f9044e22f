//! Moving the date/time between the RTC, the computer clock and the user.
//! The RTC always keeps UTC.

use std::io::{self, Write};

use anyhow::{anyhow, Context, Result};
use embedded_hal::{delay::DelayNs, i2c::I2c};
use log::{debug, warn};
use mcp7940n::{DateTime, Mcp7940n, TimeSpec};
use time::{
    format_description::BorrowedFormatItem, macros::format_description, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

use crate::BusError;

/// Same layout as ctime(3), without the trailing newline.
const CTIME_FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
);

/// What date(1) takes as input, `CCYYMMDDhhmm.ss`.
const DATE_INPUT_FORMAT: &[BorrowedFormatItem<'_>] =
    format_description!("[year][month][day][hour][minute].[second]");

/// Offset of the local time zone at a given instant.
pub type Zone = fn(OffsetDateTime) -> UtcOffset;

/// The host's local time zone, or UTC if it can't be determined.
pub fn local_zone(at: OffsetDateTime) -> UtcOffset {
    UtcOffset::local_offset_at(at).unwrap_or_else(|_| {
        warn!("Unable to determine the local time zone, using UTC");
        UtcOffset::UTC
    })
}

fn to_primitive(datetime: OffsetDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(datetime.date(), datetime.time())
}

/// Place a local wall clock time on the timeline. The offset is first
/// guessed and then looked up again at the instant the guess gives, so a
/// time near a DST switch gets the offset in force at that time.
fn local_to_utc(local: PrimitiveDateTime, zone: Zone) -> OffsetDateTime {
    let guess = local.assume_offset(zone(local.assume_utc()));
    local.assume_offset(zone(guess)).to_offset(UtcOffset::UTC)
}

/// Seconds since the epoch as `T`, which is 32 bits wide on some targets.
fn epoch_seconds<T: TryFrom<i64>>(datetime: OffsetDateTime) -> Result<T> {
    T::try_from(datetime.unix_timestamp())
        .map_err(|_| anyhow!("{} is past what the computer clock can represent", datetime))
}

/// Read the RTC and check that it holds a real date.
pub fn rtc_time<I2C, E, D>(rtc: &mut Mcp7940n<I2C, D>) -> Result<OffsetDateTime>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    let datetime = rtc
        .datetime()
        .context("Unable to read current date/time from real time clock")?;

    let datetime = PrimitiveDateTime::try_from(datetime)
        .map_err(|field| anyhow!("The RTC holds an invalid date/time, the {} is out of range", field))?;
    Ok(datetime.assume_utc())
}

/// Copy the computer clock to the RTC.
pub fn set_rtc_from_host<I2C, E, D>(rtc: &mut Mcp7940n<I2C, D>) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    let now = OffsetDateTime::now_utc();
    debug!("setting the RTC to {}", now);

    rtc.set_datetime(&DateTime::from(to_primitive(now)))
        .context("Unable to set the RTC from the computer clock")
}

/// Set the RTC from a local time string. Fields left out of `spec` are
/// taken from the time currently on the RTC.
pub fn set_rtc_from_spec<I2C, E, D>(
    rtc: &mut Mcp7940n<I2C, D>,
    spec: &TimeSpec,
    zone: Zone,
) -> Result<()>
where
    I2C: I2c<Error = E>,
    E: BusError,
    D: DelayNs,
{
    rtc.set_datetime_with(|current| {
        let base = match PrimitiveDateTime::try_from(*current) {
            Ok(current) => current.assume_utc(),
            Err(field) => {
                warn!(
                    "The RTC {} is out of range, taking missing fields from the computer clock",
                    field
                );
                OffsetDateTime::now_utc()
            }
        };
        let base = base.to_offset(zone(base));

        let local = spec.resolve(to_primitive(base))?;
        let utc = local_to_utc(local, zone);
        debug!("{} local is {} UTC", local, utc);

        Ok(DateTime::from(to_primitive(utc)))
    })
    .context("Unable to set the RTC date/time")
}

/// Print the RTC time, either like ctime(3) in local time or as UTC
/// input for date(1).
pub fn show_time(
    out: &mut impl Write,
    datetime: OffsetDateTime,
    date_input: bool,
    zone: Zone,
) -> Result<()> {
    let text = if date_input {
        datetime.to_offset(UtcOffset::UTC).format(DATE_INPUT_FORMAT)?
    } else {
        datetime.to_offset(zone(datetime)).format(CTIME_FORMAT)?
    };

    writeln!(out, "{}", text)?;
    Ok(())
}

/// Set the computer clock, which needs root.
pub fn set_host_clock(datetime: OffsetDateTime) -> Result<()> {
    let tv = libc::timeval {
        tv_sec: epoch_seconds(datetime).context("Unable to set the computer clock")?,
        tv_usec: 0,
    };

    // SAFETY: `tv` outlives the call and a null timezone is accepted.
    let ret = unsafe { libc::settimeofday(&tv, std::ptr::null()) };
    if ret < 0 {
        return Err(io::Error::last_os_error())
            .context("Call to settimeofday failed, unable to set the computer clock");
    }

    debug!("computer clock set to {}", datetime);
    Ok(())
}
