//! Construction parameters
//!
//! The bridge reads no files or environment: everything it needs is supplied by the
//! caller through these records when the device is opened.
//!
//! # Example
//! ```
//! use sx128x_linux::config::PinConfig;
//!
//! // busy, tx_en, rx_en, nrst, dio1, dio2, dio3, nss
//! let pins = PinConfig::from_raw(27, 17, 5, 22, -1, -1, 4, 6).unwrap();
//! assert_eq!(pins.dio3, Some(4));
//! assert_eq!(pins.dio1, None);
//! ```

use std::time::Duration;

use embedded_hal::spi::{Mode, MODE_0};

use crate::{
    irq::IrqLine,
    lines::LineRole,
    spi::{ChipSelectPolarity, ExternalLock},
    Error, Result,
};

/// Default SPI clock, the fastest the SX128x accepts
pub const DEFAULT_SPI_SPEED_HZ: u32 = 8_000_000;

/// Default interval at which the interrupt listener re-checks its stop flag
pub const DEFAULT_IRQ_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Host GPIO line offsets for every logical pin role
///
/// Optional roles are `None` when not wired. The record is validated on
/// construction and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    /// BUSY input
    pub busy: u32,
    /// TX enable output for an external PA
    pub tx_en: Option<u32>,
    /// RX enable output for an external LNA
    pub rx_en: Option<u32>,
    /// NRESET output
    pub nrst: u32,
    /// DIO1 interrupt input
    pub dio1: Option<u32>,
    /// DIO2 interrupt input
    pub dio2: Option<u32>,
    /// DIO3 interrupt input
    pub dio3: Option<u32>,
    /// NSS (chip-select) output
    pub nss: u32,
}

impl PinConfig {
    /// Builds a pin record from the conventional integer form.
    ///
    /// Any negative value marks an optional pin as absent. Required pins (busy,
    /// nrst, nss) must be non-negative.
    ///
    /// # Errors
    /// * [`Error::InvalidPin`] - a required pin is negative
    /// * [`Error::DuplicateLine`] - two roles share a line
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        busy: i32,
        tx_en: i32,
        rx_en: i32,
        nrst: i32,
        dio1: i32,
        dio2: i32,
        dio3: i32,
        nss: i32,
    ) -> Result<Self> {
        let required =
            |role, value: i32| u32::try_from(value).map_err(|_| Error::InvalidPin { role });
        let optional = |value: i32| u32::try_from(value).ok();

        let pins = Self {
            busy: required(LineRole::Busy, busy)?,
            tx_en: optional(tx_en),
            rx_en: optional(rx_en),
            nrst: required(LineRole::Reset, nrst)?,
            dio1: optional(dio1),
            dio2: optional(dio2),
            dio3: optional(dio3),
            nss: required(LineRole::ChipSelect, nss)?,
        };
        pins.validate()?;
        Ok(pins)
    }

    /// Checks that no two roles name the same physical line.
    pub fn validate(&self) -> Result<()> {
        let assigned = self.assignments();
        for (i, &(first, line)) in assigned.iter().enumerate() {
            if let Some(&(second, _)) = assigned[i + 1..].iter().find(|(_, other)| *other == line) {
                return Err(Error::DuplicateLine {
                    line,
                    first,
                    second,
                });
            }
        }
        Ok(())
    }

    /// Every present role with its line, in acquisition order.
    pub fn assignments(&self) -> Vec<(LineRole, u32)> {
        [
            (LineRole::Busy, Some(self.busy)),
            (LineRole::ChipSelect, Some(self.nss)),
            (LineRole::Reset, Some(self.nrst)),
            (LineRole::TxEnable, self.tx_en),
            (LineRole::RxEnable, self.rx_en),
            (LineRole::Dio1, self.dio1),
            (LineRole::Dio2, self.dio2),
            (LineRole::Dio3, self.dio3),
        ]
        .into_iter()
        .filter_map(|(role, line)| line.map(|line| (role, line)))
        .collect()
    }

    /// The configured interrupt lines with their offsets.
    pub fn irq_assignments(&self) -> Vec<(IrqLine, u32)> {
        [
            (IrqLine::Dio1, self.dio1),
            (IrqLine::Dio2, self.dio2),
            (IrqLine::Dio3, self.dio3),
        ]
        .into_iter()
        .filter_map(|(irq, line)| line.map(|line| (irq, line)))
        .collect()
    }
}

/// SPI bus settings applied when the transport is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    /// Clock polarity and phase
    pub mode: Mode,
    /// Initial clock frequency
    pub speed_hz: u32,
    /// Let the SPI controller drive its own chip-select. When false the
    /// controller's CS is disabled and NSS is strobed as a GPIO.
    pub controller_chip_select: bool,
    /// Level that asserts NSS
    pub chip_select: ChipSelectPolarity,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            mode: MODE_0,
            speed_hz: DEFAULT_SPI_SPEED_HZ,
            controller_chip_select: false,
            chip_select: ChipSelectPolarity::ActiveHigh,
        }
    }
}

/// Everything needed to open a device on a Linux host
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// spidev node, e.g. `/dev/spidev0.0`
    pub spi_path: String,
    /// GPIO controller index, opened as `/dev/gpiochip{N}`
    pub gpio_chip: u32,
    /// Line assignments
    pub pins: PinConfig,
    /// SPI bus settings
    pub spi: SpiConfig,
    /// Lock shared with other users of the same SPI bus
    pub external_lock: Option<ExternalLock>,
    /// Stop-flag poll interval of the interrupt listener
    pub irq_poll_interval: Duration,
}

impl DeviceConfig {
    pub fn new(spi_path: impl Into<String>, gpio_chip: u32, pins: PinConfig) -> Self {
        Self {
            spi_path: spi_path.into(),
            gpio_chip,
            pins,
            spi: SpiConfig::default(),
            external_lock: None,
            irq_poll_interval: DEFAULT_IRQ_POLL_INTERVAL,
        }
    }

    pub fn with_spi(mut self, spi: SpiConfig) -> Self {
        self.spi = spi;
        self
    }

    pub fn with_external_lock(mut self, lock: ExternalLock) -> Self {
        self.external_lock = Some(lock);
        self
    }

    pub fn with_irq_poll_interval(mut self, interval: Duration) -> Self {
        self.irq_poll_interval = interval;
        self
    }

    /// Path of the GPIO character device
    pub fn gpio_chip_path(&self) -> String {
        format!("/dev/gpiochip{}", self.gpio_chip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_optional_pins_are_absent() {
        let pins = PinConfig::from_raw(27, -1, -7, 22, -1, -1, -1, 6).unwrap();
        assert_eq!(pins.tx_en, None);
        assert_eq!(pins.rx_en, None);
        assert!(pins.irq_assignments().is_empty());
        assert_eq!(
            pins.assignments(),
            vec![
                (LineRole::Busy, 27),
                (LineRole::ChipSelect, 6),
                (LineRole::Reset, 22)
            ]
        );
    }

    #[test]
    fn required_pins_must_be_present() {
        let err = PinConfig::from_raw(-1, 17, 5, 22, -1, -1, -1, 6).unwrap_err();
        assert!(matches!(err, Error::InvalidPin { role: LineRole::Busy }));

        let err = PinConfig::from_raw(27, 17, 5, 22, -1, -1, -1, -1).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPin {
                role: LineRole::ChipSelect
            }
        ));
    }

    #[test]
    fn shared_lines_are_rejected() {
        let err = PinConfig::from_raw(27, 17, 5, 22, 17, -1, -1, 6).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateLine {
                line: 17,
                first: LineRole::TxEnable,
                second: LineRole::Dio1
            }
        ));
    }

    #[test]
    fn irq_assignments_keep_dio_order() {
        let pins = PinConfig::from_raw(27, 17, 5, 22, 23, -1, 4, 6).unwrap();
        assert_eq!(
            pins.irq_assignments(),
            vec![(IrqLine::Dio1, 23), (IrqLine::Dio3, 4)]
        );
    }

    #[test]
    fn spi_defaults_match_sx128x_wiring() {
        let spi = SpiConfig::default();
        assert_eq!(spi.mode, MODE_0);
        assert_eq!(spi.speed_hz, 8_000_000);
        assert!(!spi.controller_chip_select);
        assert_eq!(spi.chip_select, ChipSelectPolarity::ActiveHigh);
    }

    #[test]
    fn gpio_chip_path_uses_index() {
        let pins = PinConfig::from_raw(27, -1, -1, 22, -1, -1, -1, 6).unwrap();
        let config = DeviceConfig::new("/dev/spidev0.0", 1, pins);
        assert_eq!(config.gpio_chip_path(), "/dev/gpiochip1");
        assert!(config.external_lock.is_none());
    }
}
