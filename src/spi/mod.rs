//! SPI transport
//!
//! The SX128x talks SPI mode 0, 8-bit words, MSB first, at up to 8 MHz. NSS is
//! driven as a plain GPIO so that every exchange is framed by this crate rather
//! than by the SPI controller:
//!
//! 1. Take the external bus lock, if one is installed
//! 2. Assert NSS
//! 3. Clock the full-duplex exchange
//! 4. Deassert NSS, whatever the outcome of step 3
//! 5. Release the lock
//!
//! The lock is the only thing keeping two threads (or two radios sharing one
//! bus) from interleaving their frames.

mod gate;
mod transport;

pub use gate::*;
pub use transport::*;

/// Clock control on top of an `embedded-hal` SPI bus
pub trait SpiClock: embedded_hal::spi::ErrorType {
    /// Changes the bus clock for subsequent transfers.
    fn set_speed_hz(&mut self, hz: u32) -> Result<(), Self::Error>;
}
