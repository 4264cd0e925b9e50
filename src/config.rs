use fugit::MillisDurationU32;

use crate::ipd::ResponseMode;

/// Size of the scratch window used for AT replies and for lexing `+IPD`
/// frame lines and HTTP headers.
pub const WINDOW_SIZE: usize = 2048;

/// Size of the buffer a socket read collects a whole response into before
/// handing it out in caller-sized pieces.
pub const RX_BUFFER_SIZE: usize = 4096;

/// Longest AT command line, not counting the trailing `\r\n`.
pub const MAX_COMMAND_LEN: usize = 256;

/// Largest payload the firmware takes in a single `AT+CIPSEND`.
pub const MAX_SEND_LEN: usize = 2048;

/// Timing and parsing knobs for [`Rtl8720dn`](../struct.Rtl8720dn.html).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Sleep between polls that return no data.
    pub poll_interval: MillisDurationU32,
    /// How long an AT command may go without any reply bytes.
    pub command_timeout: MillisDurationU32,
    /// How long a socket read may go without progress.
    pub receive_timeout: MillisDurationU32,
    /// How long to wait for the `ready` banner after a reset.
    pub boot_timeout: MillisDurationU32,
    pub response_mode: ResponseMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval: MillisDurationU32::from_ticks(5),
            command_timeout: MillisDurationU32::from_ticks(30_000),
            receive_timeout: MillisDurationU32::from_ticks(30_000),
            boot_timeout: MillisDurationU32::from_ticks(1_000),
            response_mode: ResponseMode::Http,
        }
    }
}
