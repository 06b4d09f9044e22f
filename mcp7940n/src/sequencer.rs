use embedded_hal::{delay::DelayNs, i2c::I2c};
use log::debug;

use crate::{
    datetime::{decode_datetime, encode_datetime, SecondsFlags, DATETIME_SIZE},
    register, DateTime, Error, Field, Mcp7940n, CENTURY_BASE,
};

const OSCILLATOR_POLL_ATTEMPTS: u8 = 5;

// OSCRUN follows ST within 32 oscillator cycles, just under 1ms at 32.768kHz.
const OSCILLATOR_POLL_DELAY_US: u32 = 1000;

/// Steps of a date/time update. The date/time registers are only written
/// while the oscillator is confirmed stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetTimeState {
    Idle,
    OscillatorStopping,
    OscillatorStopped,
    RegistersWritten,
    OscillatorStarting,
    OscillatorStarted,
    Failed,
}

impl SetTimeState {
    fn advance(&mut self, next: SetTimeState) {
        debug!("set time: {:?} -> {:?}", self, next);
        *self = next;
    }
}

impl<I2C: I2c<Error = E>, E, D: DelayNs> Mcp7940n<I2C, D> {
    /// Stop the oscillator, write `datetime` and start it again.
    pub fn set_datetime(&mut self, datetime: &DateTime) -> Result<(), Error<E>> {
        self.set_datetime_with(|_| Ok(*datetime))
    }

    /// Like [Self::set_datetime], with the new value computed from the time
    /// currently on the clock. `target` runs before anything is written.
    ///
    /// A bus error or timeout aborts the update where it is. Whatever was
    /// already written stays written, which can leave the oscillator stopped.
    pub fn set_datetime_with<F>(&mut self, target: F) -> Result<(), Error<E>>
    where
        F: FnOnce(&DateTime) -> Result<DateTime, Error<E>>,
    {
        let mut state = SetTimeState::Idle;
        let result = self.run_set_datetime(&mut state, target);
        if result.is_err() {
            state.advance(SetTimeState::Failed);
        }
        result
    }

    fn run_set_datetime<F>(&mut self, state: &mut SetTimeState, target: F) -> Result<(), Error<E>>
    where
        F: FnOnce(&DateTime) -> Result<DateTime, Error<E>>,
    {
        // The current block carries flags that have to survive the update
        let mut registers = [0; DATETIME_SIZE];
        self.read_registers(register::RTCSEC, &mut registers)?;

        let datetime = target(&decode_datetime(&registers))?;
        if !(CENTURY_BASE..CENTURY_BASE + 100).contains(&datetime.year) {
            return Err(Error::Range(Field::Year));
        }

        registers = encode_datetime(&datetime, &registers);
        registers[0] = with_start_bit(registers[0], false);
        self.write_registers(register::RTCSEC, &registers[..1])?;
        state.advance(SetTimeState::OscillatorStopping);

        if !self.wait_for_oscillator(false)? {
            return Err(Error::OscillatorStillRunning);
        }
        state.advance(SetTimeState::OscillatorStopped);

        self.write_registers(register::RTCSEC, &registers)?;
        state.advance(SetTimeState::RegistersWritten);

        registers[0] = with_start_bit(registers[0], true);
        self.write_registers(register::RTCSEC, &registers[..1])?;
        state.advance(SetTimeState::OscillatorStarting);

        if !self.wait_for_oscillator(true)? {
            return Err(Error::OscillatorNotResumed);
        }
        state.advance(SetTimeState::OscillatorStarted);

        Ok(())
    }

    /// Poll OSCRUN until it reads `running`, returns false if it never did.
    fn wait_for_oscillator(&mut self, running: bool) -> Result<bool, Error<E>> {
        for _ in 0..OSCILLATOR_POLL_ATTEMPTS {
            self.delay.delay_us(OSCILLATOR_POLL_DELAY_US);
            if self.oscillator_running()? == running {
                return Ok(true);
            }
        }

        Ok(false)
    }
}

fn with_start_bit(seconds: u8, start: bool) -> u8 {
    let mut flags = SecondsFlags::from_bits_retain(seconds);
    flags.set(SecondsFlags::START_OSCILLATOR, start);
    flags.bits()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{rtc, ADDRESS};
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::Transaction as I2cTransaction;

    // 26 Oct 2026 13:22:11 with ST, OSCRUN and VBATEN set
    const CURRENT: [u8; DATETIME_SIZE] = [0x80 | 0x11, 0x22, 0x13, 0x28 | 0x03, 0x26, 0x10, 0x26];
    // Saturday 15 Dec 2001 05:30:00, ST cleared, flags kept
    const TARGET: [u8; DATETIME_SIZE] = [0x00, 0x30, 0x05, 0x28 | 0x07, 0x15, 0x12, 0x01];

    const RUNNING: u8 = 0x28 | 0x03;
    const STOPPED: u8 = 0x08 | 0x03;

    fn target() -> DateTime {
        DateTime {
            year: 2001,
            month: 12,
            day: 15,
            hour: 5,
            minute: 30,
            second: 0,
            weekday: 6,
        }
    }

    fn write_block() -> I2cTransaction {
        let mut data = vec![0x00];
        data.extend_from_slice(&TARGET);
        I2cTransaction::write(ADDRESS, data)
    }

    fn poll(weekday: u8) -> I2cTransaction {
        I2cTransaction::write_read(ADDRESS, vec![0x03], vec![weekday])
    }

    #[test]
    fn stops_writes_and_restarts_the_oscillator() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], CURRENT.to_vec()),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x00]),
            poll(RUNNING),
            poll(STOPPED),
            write_block(),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x80]),
            poll(RUNNING),
        ]);

        rtc.set_datetime(&target()).unwrap();

        let (_, delay) = rtc.release();
        assert_eq!(delay.ns, 3 * 1_000_000);
        i2c.done();
    }

    #[test]
    fn never_writes_the_time_while_the_oscillator_runs() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], CURRENT.to_vec()),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x00]),
            poll(RUNNING),
            poll(RUNNING),
            poll(RUNNING),
            poll(RUNNING),
            poll(RUNNING),
        ]);

        assert!(matches!(
            rtc.set_datetime(&target()),
            Err(Error::OscillatorStillRunning)
        ));

        let (_, delay) = rtc.release();
        assert_eq!(delay.ns, 5 * 1_000_000);
        i2c.done();
    }

    #[test]
    fn reports_an_oscillator_that_does_not_resume() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], CURRENT.to_vec()),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x00]),
            poll(STOPPED),
            write_block(),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x80]),
            poll(STOPPED),
            poll(STOPPED),
            poll(STOPPED),
            poll(STOPPED),
            poll(STOPPED),
        ]);

        assert!(matches!(
            rtc.set_datetime(&target()),
            Err(Error::OscillatorNotResumed)
        ));
        i2c.done();
    }

    #[test]
    fn bus_error_aborts_the_remaining_steps() {
        let (mut rtc, mut i2c) = rtc(&[
            I2cTransaction::write_read(ADDRESS, vec![0x00], CURRENT.to_vec()),
            I2cTransaction::write(ADDRESS, vec![0x00, 0x00]),
            poll(STOPPED),
            write_block().with_error(ErrorKind::Other),
        ]);

        assert!(matches!(
            rtc.set_datetime(&target()),
            Err(Error::Bus(ErrorKind::Other))
        ));
        i2c.done();
    }

    #[test]
    fn rejects_years_the_device_cannot_hold() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(
            ADDRESS,
            vec![0x00],
            CURRENT.to_vec(),
        )]);

        let mut datetime = target();
        datetime.year = 2100;
        assert!(matches!(
            rtc.set_datetime(&datetime),
            Err(Error::Range(Field::Year))
        ));
        i2c.done();
    }

    #[test]
    fn target_sees_the_current_time_and_can_abort() {
        let (mut rtc, mut i2c) = rtc(&[I2cTransaction::write_read(
            ADDRESS,
            vec![0x00],
            CURRENT.to_vec(),
        )]);

        let result = rtc.set_datetime_with(|current| {
            assert_eq!((current.year, current.month, current.day), (2026, 10, 26));
            assert_eq!((current.hour, current.minute, current.second), (13, 22, 11));
            Err(Error::Format)
        });
        assert!(matches!(result, Err(Error::Format)));
        i2c.done();
    }
}
