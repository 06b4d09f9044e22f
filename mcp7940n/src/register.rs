#![allow(dead_code)]

/// Seconds, BCD, plus the oscillator start bit (ST)
pub const RTCSEC: u8 = 0x00;
/// Minutes, BCD
pub const RTCMIN: u8 = 0x01;
/// Hours, BCD, 12/24 hour mode dependent
pub const RTCHOUR: u8 = 0x02;
/// Weekday 1-7 plus the VBATEN, PWRFAIL and OSCRUN flags
pub const RTCWKDAY: u8 = 0x03;
/// Day of month, BCD
pub const RTCDATE: u8 = 0x04;
/// Month, BCD, plus the read-only leap year flag
pub const RTCMTH: u8 = 0x05;
/// Two digit year, BCD
pub const RTCYEAR: u8 = 0x06;

/// Square wave, alarm enable and trim mode bits
pub const CONTROL: u8 = 0x07;
/// Digital trim value with sign bit
pub const OSCTRIM: u8 = 0x08;

/// Power-down timestamp, 4 bytes: minute, hour, date, weekday+month
pub const PWRDN: u8 = 0x18;
/// Power-up timestamp, same layout as PWRDN
pub const PWRUP: u8 = 0x1C;

/// Start of the battery-backed SRAM
pub const NVRAM: u8 = 0x20;
