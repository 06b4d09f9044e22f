mod clock;
mod device;
mod nvram;
mod options;
mod power;

use std::{
    fmt,
    io::{self, Write},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use mcp7940n::{TimeSpec, TimeSpecError};

use crate::power::PowerEvent;

/// Anything a bus error needs to be carried by `anyhow`.
pub trait BusError: fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T: fmt::Debug + fmt::Display + Send + Sync + 'static> BusError for T {}

/// Set or get the current date/time from the PiFace RTC, or get or set options.
///
/// Options that can corrupt the RTC if used incorrectly: bat, nobat, osc, noosc.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// 7-bit address of the RTC on the bus
    #[arg(short = 'b', value_name = "ADDRESS", default_value = "0x6f", value_parser = parse_address)]
    address: u8,

    /// I2C bus to use (picked from the Pi model without)
    #[arg(short = 'i', value_name = "0|1", value_parser = clap::value_parser!(u8).range(0..=1))]
    bus: Option<u8>,

    /// Set the real time clock from the computer clock
    #[arg(short = 'c')]
    from_host: bool,

    /// Output the date/time as input to the date command
    #[arg(short = 'd')]
    date_input: bool,

    /// Set the computer clock from the RTC
    #[arg(short = 's')]
    set_host: bool,

    /// Print the time that the power was turned off at or failed
    #[arg(short = 'p')]
    power_down: bool,

    /// Print the time that the power was turned on or restored
    #[arg(short = 'u')]
    power_up: bool,

    /// Read the contents of the NVRAM
    #[arg(short = 'r')]
    read_nvram: bool,

    /// Write to the NVRAM
    #[arg(short = 'w', value_name = "TEXT")]
    write_nvram: Option<String>,

    /// Comma separated RTC options: init, bat, nobat, batset, cal, clrnvram,
    /// control, osc, noosc, oscset, oscstat, pwrstat, clrpwr
    #[arg(short = 'o', value_name = "OPTION,...")]
    options: Option<String>,

    /// New date/time in local time
    #[arg(value_name = "[[[[[cc]yy]mm]dd]HH]MM[.ss]")]
    time: Option<String>,
}

/// The one thing an invocation does.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    ShowPowerEvent(PowerEvent),
    ReadNvram,
    WriteNvram(&'a str),
    Options(&'a str),
    SetFromHost,
    SetFromTime(TimeSpec),
    Show,
}

impl Args {
    /// `-p`, `-u`, `-r`, `-w` and `-o` each win over everything after them.
    /// `-c` wins over a time string, which is then not parsed at all.
    fn command(&self) -> Result<Command<'_>, TimeSpecError> {
        let command = if self.power_down {
            Command::ShowPowerEvent(PowerEvent::Down)
        } else if self.power_up {
            Command::ShowPowerEvent(PowerEvent::Up)
        } else if self.read_nvram {
            Command::ReadNvram
        } else if let Some(text) = &self.write_nvram {
            Command::WriteNvram(text)
        } else if let Some(list) = &self.options {
            Command::Options(list)
        } else if self.from_host {
            Command::SetFromHost
        } else if let Some(time) = &self.time {
            Command::SetFromTime(TimeSpec::parse(time)?)
        } else {
            Command::Show
        };

        Ok(command)
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_address(arg: &str) -> Result<u8> {
    let address = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => arg.parse(),
    }
    .with_context(|| format!("Invalid address {}", arg))?;

    if address >= 0x80 {
        bail!("Address {:#04x} is not a 7-bit address", address);
    }
    Ok(address)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    log::debug!("{:?}", args);

    // A bad time string is reported before touching the bus
    let command = args.command()?;

    let mut rtc = device::open(args.bus, args.address)?;
    let mut out = io::stdout().lock();

    match command {
        Command::ShowPowerEvent(event) => power::show(&mut rtc, &mut out, event)?,
        Command::ReadNvram => nvram::show(&mut rtc, &mut out)?,
        Command::WriteNvram(text) => nvram::write(&mut rtc, text)?,
        Command::Options(list) => options::process(&mut rtc, &mut out, list)?,
        Command::SetFromHost => clock::set_rtc_from_host(&mut rtc)?,
        Command::SetFromTime(spec) => {
            clock::set_rtc_from_spec(&mut rtc, &spec, clock::local_zone)?
        }
        Command::Show => {
            let now = clock::rtc_time(&mut rtc)?;
            if args.set_host {
                clock::set_host_clock(now)?;
            }
            clock::show_time(&mut out, now, args.date_input, clock::local_zone)?;
        }
    }

    out.flush()?;
    Ok(())
}
