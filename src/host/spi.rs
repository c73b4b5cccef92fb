use std::{io, path::Path};

use embedded_hal::spi::{ErrorType, Phase, Polarity, SpiBus};
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};

use crate::{config::SpiConfig, spi::SpiClock, Error, HostError, Result};

/// SPI bus behind a spidev node
///
/// Always 8-bit words. Transfers of unequal length are padded with zeros on
/// the way out.
pub struct SpidevBus {
    spi: Spidev,
}

impl SpidevBus {
    pub fn open(path: impl AsRef<Path>, config: &SpiConfig) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |e: io::Error| Error::Open {
            path: path.display().to_string(),
            source: e.into(),
        };

        let mut spi = Spidev::open(path).map_err(open_error)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.speed_hz)
            .mode(mode_flags(config))
            .build();
        spi.configure(&options).map_err(open_error)?;

        log::debug!("opened {} at {} Hz", path.display(), config.speed_hz);
        Ok(Self { spi })
    }

    fn exchange(&mut self, read: &mut [u8], write: &[u8]) -> io::Result<()> {
        let mut transfer = SpidevTransfer::read_write(write, read);
        self.spi.transfer(&mut transfer)
    }
}

fn mode_flags(config: &SpiConfig) -> SpiModeFlags {
    let mut flags = SpiModeFlags::SPI_MODE_0;
    if config.mode.polarity == Polarity::IdleHigh {
        flags |= SpiModeFlags::SPI_CPOL;
    }
    if config.mode.phase == Phase::CaptureOnSecondTransition {
        flags |= SpiModeFlags::SPI_CPHA;
    }
    if !config.controller_chip_select {
        flags |= SpiModeFlags::SPI_NO_CS;
    }
    flags
}

impl ErrorType for SpidevBus {
    type Error = HostError;
}

impl SpiBus for SpidevBus {
    fn read(&mut self, words: &mut [u8]) -> core::result::Result<(), HostError> {
        let out = vec![0; words.len()];
        Ok(self.exchange(words, &out)?)
    }

    fn write(&mut self, words: &[u8]) -> core::result::Result<(), HostError> {
        let mut sink = vec![0; words.len()];
        Ok(self.exchange(&mut sink, words)?)
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> core::result::Result<(), HostError> {
        if read.len() == write.len() {
            return Ok(self.exchange(read, write)?);
        }

        let len = read.len().max(write.len());
        let mut out = write.to_vec();
        out.resize(len, 0);
        let mut input = vec![0; len];
        self.exchange(&mut input, &out)?;
        read.copy_from_slice(&input[..read.len()]);
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> core::result::Result<(), HostError> {
        let out = words.to_vec();
        Ok(self.exchange(words, &out)?)
    }

    fn flush(&mut self) -> core::result::Result<(), HostError> {
        Ok(())
    }
}

impl SpiClock for SpidevBus {
    fn set_speed_hz(&mut self, hz: u32) -> core::result::Result<(), HostError> {
        let options = SpidevOptions::new().max_speed_hz(hz).build();
        Ok(self.spi.configure(&options)?)
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::spi::{MODE_0, MODE_3};

    use super::*;

    #[test]
    fn sx128x_mode_disables_controller_chip_select() {
        let flags = mode_flags(&SpiConfig::default());
        assert_eq!(flags, SpiModeFlags::SPI_MODE_0 | SpiModeFlags::SPI_NO_CS);
    }

    #[test]
    fn polarity_and_phase_map_to_mode_bits() {
        let config = SpiConfig {
            mode: MODE_3,
            controller_chip_select: true,
            ..SpiConfig::default()
        };
        assert_eq!(mode_flags(&config), SpiModeFlags::SPI_MODE_3);

        let config = SpiConfig {
            mode: MODE_0,
            controller_chip_select: true,
            ..SpiConfig::default()
        };
        assert_eq!(mode_flags(&config), SpiModeFlags::SPI_MODE_0);
    }

    #[test]
    fn missing_node_is_an_open_error() {
        let err = SpidevBus::open("/dev/spidev-does-not-exist", &SpiConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Open { .. }));
    }
}
