use core::time::Duration;

use embedded_hal::timer::CountDown;

/// Busy-waits on `check` until it returns `Ok(true)` or `timeout` passes on
/// `timer`. Returns `Ok(false)` on timeout.
///
/// Checks at least once, even with a zero timeout.
pub fn poll_until<C, F, E>(timer: &mut C, timeout: Duration, mut check: F) -> Result<bool, E>
where
    C: CountDown,
    C::Time: From<Duration>,
    F: FnMut() -> Result<bool, E>,
{
    timer.start(timeout);

    loop {
        if check()? {
            return Ok(true);
        }

        match timer.wait() {
            Err(nb::Error::WouldBlock) => continue,
            // The error type is uninhabited; a fired timer is our only exit.
            _ => return Ok(false),
        }
    }
}
