use embedded_hal::{
    digital::{OutputPin, PinState},
    spi::SpiBus,
};

use super::{gate::Gate, ExternalLock, SpiClock};
use crate::{Error, Result};

/// Level that asserts the chip-select line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipSelectPolarity {
    /// NSS driven high for the duration of a frame
    #[default]
    ActiveHigh,
    /// NSS driven low for the duration of a frame
    ActiveLow,
}

impl ChipSelectPolarity {
    pub const fn asserted(self) -> PinState {
        match self {
            Self::ActiveHigh => PinState::High,
            Self::ActiveLow => PinState::Low,
        }
    }

    pub const fn deasserted(self) -> PinState {
        match self {
            Self::ActiveHigh => PinState::Low,
            Self::ActiveLow => PinState::High,
        }
    }

    /// Level NSS rests at between frames (true = high)
    pub const fn idle_level(self) -> bool {
        matches!(self, Self::ActiveLow)
    }
}

/// SPI bus plus the chip-select line framing every exchange on it
pub struct SpiTransport<B, CS> {
    bus: B,
    cs: CS,
    polarity: ChipSelectPolarity,
    gate: Gate,
    speed_hz: u32,
}

impl<B, CS> SpiTransport<B, CS>
where
    B: SpiBus + SpiClock,
    CS: OutputPin,
{
    /// Wraps an opened bus and applies the initial clock.
    pub fn new(mut bus: B, cs: CS, polarity: ChipSelectPolarity, speed_hz: u32) -> Result<Self> {
        if speed_hz == 0 {
            return Err(Error::InvalidSpeed);
        }
        bus.set_speed_hz(speed_hz).map_err(Error::spi)?;

        Ok(Self {
            bus,
            cs,
            polarity,
            gate: Gate::default(),
            speed_hz,
        })
    }

    /// Current bus clock
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Changes the bus clock; may be called at any time.
    pub fn set_speed_hz(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidSpeed);
        }
        self.bus.set_speed_hz(hz).map_err(Error::spi)?;
        self.speed_hz = hz;
        log::debug!("spi clock set to {hz} Hz");
        Ok(())
    }

    /// Installs the lock held around every subsequent transfer.
    ///
    /// # Errors
    /// [`Error::LockAlreadySet`] when a different lock is already installed
    pub fn set_external_lock(&mut self, lock: ExternalLock) -> Result<()> {
        self.gate.install(lock)
    }

    /// Full-duplex exchange returning one received byte per byte sent.
    pub fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>> {
        let mut input = vec![0; out.len()];
        self.transfer_into(out, &mut input)?;
        Ok(input)
    }

    /// Full-duplex exchange into a caller buffer of the same length.
    ///
    /// NSS is asserted just before the exchange and deasserted right after it,
    /// also when the exchange fails. An empty exchange still strobes NSS but
    /// leaves the bus idle.
    ///
    /// # Errors
    /// * [`Error::LengthMismatch`] - buffers differ in length; no line is touched
    /// * [`Error::Spi`] - the bus reported a failure
    /// * [`Error::Gpio`] - NSS could not be driven
    pub fn transfer_into(&mut self, out: &[u8], input: &mut [u8]) -> Result<()> {
        if out.len() != input.len() {
            return Err(Error::LengthMismatch {
                out: out.len(),
                input: input.len(),
            });
        }

        let _bus = self.gate.enter();
        let frame = Frame::open(&mut self.cs, self.polarity)?;

        let exchanged = if out.is_empty() {
            Ok(())
        } else {
            self.bus
                .transfer(input, out)
                .and_then(|()| self.bus.flush())
                .map_err(Error::spi)
        };

        let closed = frame.close();
        exchanged.and(closed)
    }
}

/// NSS held asserted; deasserted by `close` or, on unwind, by drop
struct Frame<'a, CS: OutputPin> {
    cs: &'a mut CS,
    polarity: ChipSelectPolarity,
    open: bool,
}

impl<'a, CS: OutputPin> Frame<'a, CS> {
    fn open(cs: &'a mut CS, polarity: ChipSelectPolarity) -> Result<Self> {
        cs.set_state(polarity.asserted()).map_err(Error::gpio)?;
        Ok(Self {
            cs,
            polarity,
            open: true,
        })
    }

    fn close(mut self) -> Result<()> {
        self.open = false;
        self.cs
            .set_state(self.polarity.deasserted())
            .map_err(Error::gpio)
    }
}

impl<CS: OutputPin> Drop for Frame<'_, CS> {
    fn drop(&mut self) {
        if self.open && self.cs.set_state(self.polarity.deasserted()).is_err() {
            log::error!("failed to release NSS");
        }
    }
}
