use core::cmp::min;
use core::time::Duration;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_hal::spi::FullDuplex;
use embedded_hal::timer::CountDown;

use super::ByteTransport;
use crate::util::spi_ext::SpiExt;
use crate::util::timeout::poll_until;

/// Host wants to start a transfer.
const TAG_PRE: u8 = 0x55;
/// Co-processor acknowledges a transfer.
const TAG_ACK: u8 = 0xBE;
/// Host writes to the co-processor.
const TAG_WR: u8 = 0x80;
/// Host reads from the co-processor.
const TAG_RD: u8 = 0x00;
const TAG_DUMMY: u8 = 0xFF;

const STATUS_OK: u8 = 0x00;

/// The co-processor can be slow between our header and its ACK on reads.
const READ_ACK_ATTEMPTS: usize = 100;

const DIRECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Which side the SYNC pin says may drive the next phase of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// SYNC high: the co-processor is listening.
    HostToDevice,
    /// SYNC low: the co-processor is about to answer.
    DeviceToHost,
}

#[derive(Debug)]
pub enum SpiTransportError<SpiError> {
    Spi(SpiError),
    /// Could not drive the CS pin. Really won’t happen unless the pin is on a
    /// GPIO expander or something.
    ChipSelectPinError,
    /// Could not read the SYNC pin.
    SyncPinError,
    /// The SYNC pin did not switch direction within 5s.
    DirectionTimeout,
    /// The co-processor never acknowledged the transfer. Holds the last byte
    /// it sent instead.
    NoAck(u8),
    /// The co-processor acknowledged but reported a status other than OK.
    DeviceStatus(u8),
    /// The co-processor sent more bytes than we asked for. Holds how many it
    /// sent. They have been clocked off the bus, but only the requested ones
    /// were kept.
    Overrun(usize),
}

impl<SpiError> SpiTransportError<SpiError> {
    fn spi(err: SpiError) -> Self {
        SpiTransportError::Spi(err)
    }
}

/// [`ByteTransport`](trait.ByteTransport.html) over the RTL8720DN’s SPI AT
/// interface, as wired on the Seeed Wio Terminal.
///
/// Every transfer is a header phase (`PRE`, `RD`/`WR`, 16-bit length) with
/// CS held low, then a reply phase in which the co-processor ACKs, reports a
/// status byte and the number of bytes it will actually move, then the data
/// phase. The SYNC pin tells us whose turn it is between phases, and the data
/// ready pin goes high while the co-processor has bytes for us.
///
/// You’ll need:
///
/// * A [`FullDuplex`](embedded_hal::spi::FullDuplex) SPI instance
/// * The CS [`OutputPin`](embedded_hal::digital::v2::OutputPin)
/// * The SYNC [`InputPin`](embedded_hal::digital::v2::InputPin)
/// * The data ready [`InputPin`](embedded_hal::digital::v2::InputPin)
/// * A [`CountDown`](embedded_hal::timer::CountDown) for direction timeouts
///
/// It’s your responsibility to make sure that no other chips are selected on
/// the bus.
pub struct SpiTransport<Spi, CsPin, SyncPin, ReadyPin, Timer> {
    spi: Spi,
    cs: CsPin,
    sync: SyncPin,
    ready: ReadyPin,
    timer: Timer,
}

impl<Spi, SpiError, CsPin, SyncPin, ReadyPin, Timer> SpiTransport<Spi, CsPin, SyncPin, ReadyPin, Timer>
where
    Spi: FullDuplex<u8, Error = SpiError> + embedded_hal::blocking::spi::Write<u8, Error = SpiError>,
    SpiError: core::fmt::Debug,
    CsPin: OutputPin,
    SyncPin: InputPin,
    ReadyPin: InputPin,
    Timer: CountDown,
    Timer::Time: From<Duration>,
{
    /// Drives the CS pin high (deselected) and takes ownership of the bus.
    pub fn new(
        spi: Spi,
        mut cs: CsPin,
        sync: SyncPin,
        ready: ReadyPin,
        timer: Timer,
    ) -> Result<Self, SpiTransportError<SpiError>> {
        cs.set_high()
            .map_err(|_| SpiTransportError::ChipSelectPinError)?;

        Ok(SpiTransport {
            spi,
            cs,
            sync,
            ready,
            timer,
        })
    }

    /// Gives back the bus, pins and timer.
    pub fn free(self) -> (Spi, CsPin, SyncPin, ReadyPin, Timer) {
        (self.spi, self.cs, self.sync, self.ready, self.timer)
    }

    fn select(&mut self) -> Result<Selected<'_, Spi, CsPin>, SpiTransportError<SpiError>> {
        self.cs
            .set_low()
            .map_err(|_| SpiTransportError::ChipSelectPinError)?;

        Ok(Selected {
            spi: &mut self.spi,
            cs: &mut self.cs,
        })
    }

    /// Blocks until SYNC indicates `direction`.
    fn wait_for(&mut self, direction: Direction) -> Result<(), SpiTransportError<SpiError>> {
        let want_high = direction == Direction::HostToDevice;
        let sync = &self.sync;

        let reached = poll_until(&mut self.timer, DIRECTION_TIMEOUT, || {
            sync.is_high()
                .map(|high| high == want_high)
                .map_err(|_| SpiTransportError::SyncPinError)
        })?;

        if reached {
            Ok(())
        } else {
            Err(SpiTransportError::DirectionTimeout)
        }
    }

    /// Header phase: announces a read or write of up to `len` bytes.
    fn send_header(&mut self, tag: u8, len: u16) -> Result<(), SpiTransportError<SpiError>> {
        let mut spi = self.select()?;

        spi.transfer_byte(TAG_PRE).map_err(SpiTransportError::spi)?;
        spi.transfer_byte(tag).map_err(SpiTransportError::spi)?;
        spi.transfer_u16(len).map_err(SpiTransportError::spi)?;

        Ok(())
    }

    /// Reads the ACK and status bytes that open the reply phase, followed by
    /// the number of bytes the co-processor is going to move.
    fn receive_reply_len(
        spi: &mut Spi,
        ack_attempts: usize,
    ) -> Result<usize, SpiTransportError<SpiError>> {
        let mut last = TAG_DUMMY;

        for _ in 0..ack_attempts {
            last = spi.transfer_byte(TAG_DUMMY).map_err(SpiTransportError::spi)?;
            if last == TAG_ACK {
                break;
            }
        }

        if last != TAG_ACK {
            return Err(SpiTransportError::NoAck(last));
        }

        let status = spi.transfer_byte(TAG_DUMMY).map_err(SpiTransportError::spi)?;
        if status != STATUS_OK {
            return Err(SpiTransportError::DeviceStatus(status));
        }

        let len = spi
            .transfer_u16(u16::from_be_bytes([TAG_DUMMY, TAG_DUMMY]))
            .map_err(SpiTransportError::spi)?;

        Ok(len as usize)
    }
}

impl<Spi, SpiError, CsPin, SyncPin, ReadyPin, Timer> ByteTransport
    for SpiTransport<Spi, CsPin, SyncPin, ReadyPin, Timer>
where
    Spi: FullDuplex<u8, Error = SpiError> + embedded_hal::blocking::spi::Write<u8, Error = SpiError>,
    SpiError: core::fmt::Debug,
    CsPin: OutputPin,
    SyncPin: InputPin,
    ReadyPin: InputPin,
    Timer: CountDown,
    Timer::Time: From<Duration>,
{
    type Error = SpiTransportError<SpiError>;

    fn poll(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.data_ready() {
            return Ok(0);
        }

        let request = min(buf.len(), u16::MAX as usize);

        self.wait_for(Direction::HostToDevice)?;
        self.send_header(TAG_RD, request as u16)?;
        self.wait_for(Direction::DeviceToHost)?;

        let mut spi = self.select()?;
        let len = Self::receive_reply_len(&mut spi, READ_ACK_ATTEMPTS)?;

        // Extra bytes still have to come off the bus before we can report
        // them.
        let keep = min(len, request);
        for b in buf[..keep].iter_mut() {
            *b = spi.transfer_byte(TAG_DUMMY).map_err(SpiTransportError::spi)?;
        }
        for _ in keep..len {
            spi.transfer_byte(TAG_DUMMY).map_err(SpiTransportError::spi)?;
        }

        if len > request {
            log::warn!("spi: asked for {} bytes, co-processor sent {}", request, len);
            return Err(SpiTransportError::Overrun(len));
        }

        log::trace!("spi: read {} bytes", keep);

        Ok(keep)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let offered = min(buf.len(), u16::MAX as usize);

        self.wait_for(Direction::HostToDevice)?;
        self.send_header(TAG_WR, offered as u16)?;
        self.wait_for(Direction::DeviceToHost)?;

        let accepted = {
            let mut spi = self.select()?;
            min(Self::receive_reply_len(&mut spi, 1)?, offered)
        };

        // The data phase still works if SYNC is late here, so only note it.
        if let Err(err) = self.wait_for(Direction::HostToDevice) {
            log::warn!("spi: co-processor slow before data phase: {:?}", err);
        }

        if accepted > 0 {
            let mut spi = self.select()?;
            spi.write(&buf[..accepted])
                .map_err(SpiTransportError::spi)?;
        }

        log::trace!("spi: wrote {} of {} bytes", accepted, buf.len());

        Ok(accepted)
    }

    fn data_ready(&mut self) -> bool {
        self.ready.is_high().unwrap_or(false)
    }
}

/// The bus with CS held low. Deselects when it goes out of scope, so every
/// early return through `?` still releases the co-processor.
struct Selected<'a, Spi, CsPin: OutputPin> {
    spi: &'a mut Spi,
    cs: &'a mut CsPin,
}

impl<'a, Spi, CsPin: OutputPin> Drop for Selected<'a, Spi, CsPin> {
    fn drop(&mut self) {
        // Nowhere to report this from a destructor; the next select() will
        // fail on the same pin anyway.
        self.cs.set_high().ok();
    }
}

impl<'a, Spi, CsPin: OutputPin> core::ops::Deref for Selected<'a, Spi, CsPin> {
    type Target = Spi;

    fn deref(&self) -> &Self::Target {
        self.spi
    }
}

impl<'a, Spi, CsPin: OutputPin> core::ops::DerefMut for Selected<'a, Spi, CsPin> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.spi
    }
}
