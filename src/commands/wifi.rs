use embedded_hal::blocking::delay::DelayMs;
use fugit::MillisDurationU32;

use crate::transport::ByteTransport;
use crate::util::ascii::{find, parse_ipv4};
use crate::{Error, Rtl8720dn};

const STATION_IP_PREFIX: &[u8] = b"+CIPSTA:ip:";

/// Wi-Fi modes accepted by `AT+CWMODE`.
#[repr(u8)]
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum WifiMode {
    Off = 0,
    Station = 1,
    SoftAp = 2,
    StationAndSoftAp = 3,
}

impl<T, D> Rtl8720dn<T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    /// Checks that the co-processor answers a bare `AT` within a second.
    pub fn is_connected(&mut self) -> bool {
        if self.send_command(b"AT").is_err() {
            return false;
        }

        self.wait_response(MillisDurationU32::from_ticks(1_000))
            .is_ok()
    }

    /// Returns the `AT+GMR` reply: the AT, SDK and firmware versions, one per
    /// line.
    pub fn firmware_version(&mut self) -> Result<&[u8], Error<T::Error>> {
        let reply = self.command(format_args!("AT+GMR"))?;

        Ok(trim_reply(reply, b"AT+GMR"))
    }

    pub fn set_wifi_mode(&mut self, mode: WifiMode) -> Result<(), Error<T::Error>> {
        self.command(format_args!("AT+CWMODE={}", mode as u8))
            .map(|_| ())
    }

    /// Puts the co-processor in station mode, which it needs to join a
    /// network.
    pub fn set_station_mode(&mut self) -> Result<(), Error<T::Error>> {
        self.set_wifi_mode(WifiMode::Station)
    }

    /// Joins a Wi-Fi network.
    ///
    /// The firmware only answers once it has an IP address or has given up,
    /// so this waits up to the configured command timeout.
    pub fn wifi_connect(&mut self, ssid: &str, password: &str) -> Result<(), Error<T::Error>> {
        log::info!("wifi: joining {}", ssid);

        self.command(format_args!("AT+CWJAP=\"{}\",\"{}\"", ssid, password))
            .map(|_| ())
    }

    pub fn wifi_disconnect(&mut self) -> Result<(), Error<T::Error>> {
        self.command(format_args!("AT+CWQAP")).map(|_| ())
    }

    /// Returns the IPv4 address the station got from the network.
    pub fn station_ip(&mut self) -> Result<[u8; 4], Error<T::Error>> {
        let reply = self.command(format_args!("AT+CIPSTA?"))?;

        parse_station_ip(reply).ok_or(Error::UnexpectedResponse)
    }
}

/// Finds `+CIPSTA:ip:"a.b.c.d"` in a reply.
fn parse_station_ip(reply: &[u8]) -> Option<[u8; 4]> {
    let start = find(reply, STATION_IP_PREFIX)? + STATION_IP_PREFIX.len();
    let line = &reply[start..];
    let end = find(line, b"\r\n").unwrap_or(line.len());

    parse_ipv4(&line[..end])
}

/// Strips the echoed command and the trailing `OK` from a reply.
fn trim_reply<'a>(reply: &'a [u8], echo: &[u8]) -> &'a [u8] {
    let mut reply = reply;

    if reply.starts_with(echo) {
        reply = &reply[echo.len()..];
    }

    if let Some(ok) = find(reply, b"\r\nOK") {
        reply = &reply[..ok];
    }

    let start = reply
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(reply.len());
    let end = reply
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);

    &reply[start..end]
}
