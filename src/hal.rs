//! Primitive operations consumed by the SX128x chip driver
//!
//! The chip driver owns the radio state machine (commands, packet and modulation
//! parameters, timing). It touches hardware only through [`RadioHal`], calling it
//! synchronously from whichever thread drives the radio.
//!
//! Line operations are single-step level sets: they never fail across this
//! boundary, and a host error is logged and otherwise ignored so the driver's
//! sequencing is never cut short halfway through.

use crate::Result;

/// GPIO function named by the chip driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpioPinFunction {
    Busy,
    Reset,
    Dio1,
    Dio2,
    Dio3,
}

/// Hardware access used by the chip driver
pub trait RadioHal {
    /// Level of a GPIO function. Only BUSY is backed by a line; every other
    /// function reads as low.
    fn gpio_read(&mut self, pin: GpioPinFunction) -> bool;

    /// Drives a GPIO function. Only NRESET is backed by a line; writes to every
    /// other function are accepted and ignored.
    fn gpio_write(&mut self, pin: GpioPinFunction, high: bool);

    /// Full-duplex exchange of `out.len()` bytes into `input`.
    fn spi_transfer(&mut self, out: &[u8], input: &mut [u8]) -> Result<()>;

    /// Called before the radio enters TX: raises TXEN if wired.
    fn pre_tx(&mut self);

    /// Called after TX completes: lowers TXEN if wired.
    fn post_tx(&mut self);

    /// Called before the radio enters RX: raises RXEN if wired.
    fn pre_rx(&mut self);

    /// Called after RX completes: lowers RXEN if wired.
    fn post_rx(&mut self);
}
