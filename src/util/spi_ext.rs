use embedded_hal::spi::FullDuplex;
use nb::block;

pub trait SpiExt: FullDuplex<u8> {
    /// Clocks `byte` out and returns the byte the co-processor clocked back at
    /// the same time, since all SPI communication is full-duplex.
    fn transfer_byte(&mut self, byte: u8) -> Result<u8, Self::Error> {
        block!(self.send(byte)).and_then(|_| block!(self.read()))
    }

    /// Same as `transfer_byte` for a big-endian 16-bit word. The AT link
    /// sends every length this way.
    fn transfer_u16(&mut self, word: u16) -> Result<u16, Self::Error> {
        let [hi, lo] = word.to_be_bytes();

        Ok(u16::from_be_bytes([
            self.transfer_byte(hi)?,
            self.transfer_byte(lo)?,
        ]))
    }
}

impl<S: FullDuplex<u8>> SpiExt for S {}
