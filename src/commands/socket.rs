use core::cmp::min;

use embedded_hal::blocking::delay::DelayMs;

use crate::config::MAX_SEND_LEN;
use crate::transport::{ByteTransport, Poller};
use crate::util::ascii::contains;
use crate::{Error, Rtl8720dn};

/// The one link we open. Frames for it arrive as `+IPD,0,...`.
pub const LINK_ID: u8 = 0;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl<T, D> Rtl8720dn<T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    /// Opens a connection to `host`, which may be a name or a dotted IP.
    ///
    /// The connection closes when the returned
    /// [`ConnectedSocket`](struct.ConnectedSocket.html) is dropped.
    pub fn connect(
        &mut self,
        protocol: Protocol,
        host: &str,
        port: u16,
    ) -> Result<ConnectedSocket<'_, T, D>, Error<T::Error>> {
        self.rx.clear();

        log::info!("socket: {} to {}:{}", protocol.as_str(), host, port);
        self.command(format_args!(
            "AT+CIPSTART={},\"{}\",\"{}\",{}",
            LINK_ID,
            protocol.as_str(),
            host,
            port
        ))?;

        Ok(ConnectedSocket::new(self))
    }

    pub fn socket_close(&mut self) -> Result<(), Error<T::Error>> {
        self.rx.clear();

        self.command(format_args!("AT+CIPCLOSE={}", LINK_ID))
            .map(|_| ())
    }

    /// Sends up to [`MAX_SEND_LEN`](config/constant.MAX_SEND_LEN.html) bytes
    /// of `bytes` and returns how many went out.
    ///
    /// The peer's answer is read with
    /// [`socket_read`](#method.socket_read).
    pub fn socket_write(&mut self, bytes: &[u8]) -> Result<usize, Error<T::Error>> {
        let len = min(bytes.len(), MAX_SEND_LEN);
        if len == 0 {
            return Ok(0);
        }

        let prompted = {
            let reply = self.command(format_args!("AT+CIPSEND={},{}", LINK_ID, len))?;
            contains(reply, b">")
        };

        // The OK usually comes on its own and the prompt right after.
        if !prompted {
            let timeout = self.config.command_timeout;
            self.wait_response(timeout)?;
        }

        self.write_all(&bytes[..len])?;

        let timeout = self.config.command_timeout;
        match self.wait_response(timeout) {
            Ok(reply) if contains(reply, b"\nSEND OK") => {}
            Ok(_) | Err(Error::ErrorResponse) => return Err(Error::SendFailed),
            Err(err) => return Err(err),
        }

        log::debug!("socket: sent {} bytes", len);
        self.rx.response_expected = true;

        Ok(len)
    }

    /// Reads the peer's data into `buf`.
    ///
    /// A whole response is collected into an internal buffer first, then
    /// handed out in `buf`-sized pieces on this and the following calls.
    /// Returns `WouldBlock` when nothing is buffered, no reply is expected and
    /// the co-processor has nothing for us.
    pub fn socket_read(&mut self, buf: &mut [u8]) -> Result<usize, nb::Error<Error<T::Error>>> {
        if !self.rx.is_empty() {
            return Ok(self.rx.read(buf));
        }

        if !self.rx.response_expected
            && self.scratch.pending.is_empty()
            && !self.transport.data_ready()
        {
            return Err(nb::Error::WouldBlock);
        }

        self.rx.response_expected = false;

        let mut poller = Poller::new(
            &mut self.transport,
            &mut self.delay,
            self.config.receive_timeout,
            self.config.poll_interval,
        );

        let len = self
            .scratch
            .parse_response(&mut poller, self.config.response_mode, &mut self.rx.buf, ())
            .map_err(|err| nb::Error::Other(Error::from(err)))?;

        self.rx.start = 0;
        self.rx.end = len;

        Ok(self.rx.read(buf))
    }
}

/// An open connection. Closes itself when dropped.
pub struct ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    wifi: &'a mut Rtl8720dn<T, D>,
}

impl<'a, T, D> ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    pub fn new(wifi: &'a mut Rtl8720dn<T, D>) -> Self {
        ConnectedSocket { wifi }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, nb::Error<Error<T::Error>>> {
        self.wifi.socket_read(buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error<T::Error>> {
        self.wifi.socket_write(buf)
    }

    /// Writes all of `buf`, in as many sends as it takes.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<(), Error<T::Error>> {
        while !buf.is_empty() {
            let sent = self.write(buf)?;
            buf = &buf[sent..];
        }

        Ok(())
    }
}

impl<'a, T, D> Drop for ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    fn drop(&mut self) {
        self.wifi.socket_close().ok();
    }
}

impl<'a, T, D> core::fmt::Write for ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        match self.write_all(s.as_bytes()) {
            Ok(_) => Ok(()),
            Err(_) => Err(core::fmt::Error),
        }
    }
}

#[cfg(feature = "genio-traits")]
impl<'a, T, D> genio::Read for ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    type ReadError = nb::Error<Error<T::Error>>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::ReadError> {
        self.read(buf)
    }
}

#[cfg(feature = "genio-traits")]
impl<'a, T, D> genio::Write for ConnectedSocket<'a, T, D>
where
    T: ByteTransport,
    D: DelayMs<u32>,
{
    type WriteError = Error<T::Error>;
    type FlushError = void::Void;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::WriteError> {
        self.write(buf)
    }

    fn flush(&mut self) -> Result<(), Self::FlushError> {
        Ok(())
    }

    fn size_hint(&mut self, _: usize) {}

    fn uses_size_hint(&self) -> bool {
        false
    }
}
