pub mod ascii;
pub mod spi_ext;
pub mod timeout;
