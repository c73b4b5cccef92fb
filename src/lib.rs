//! SX128x Linux HAL bridge
//!
//! This crate connects a Semtech SX1280/SX1281 2.4 GHz transceiver to a Linux host:
//! its SPI bus through spidev, its control and interrupt lines through the GPIO
//! character device, and its interrupt processing through a dedicated thread.
//!
//! The radio protocol itself (commands, packet and modulation parameters, timing)
//! belongs to the chip driver. This crate only provides the hardware primitives the
//! chip driver calls, through the [`RadioHal`] trait.
//!
//! # Features
//! - Ownership of BUSY, NSS, NRESET, optional TXEN/RXEN and up to three DIO lines
//! - Full-duplex SPI transfers framed by a GPIO-driven chip-select
//! - Optional lock shared with other users of the same SPI bus
//! - Interrupt listener thread at a real-time priority, delivering rising edges to
//!   a hook or to a bounded channel
//!
//! # Architecture
//! The crate is organized into several modules:
//!
//! - [`device`]: The [`Device`] tying everything together
//!   - Implements [`RadioHal`] for the chip driver
//!   - Exposes SPI clock, bus lock and interrupt listener controls
//!
//! - [`lines`]: GPIO line ownership ([`lines::LineRegistry`])
//! - [`spi`]: Chip-select framed transfers ([`spi::SpiTransport`]) and the external
//!   bus lock ([`spi::ExternalLock`])
//! - [`irq`]: The interrupt listener ([`irq::IrqDispatcher`])
//! - [`hal`]: The primitive operations consumed by the chip driver
//! - [`config`]: Construction parameters
//! - `host`: spidev and GPIO character device backends (feature `linux`, default)
//! - `mock`: In-memory doubles of the host (feature `mock`)
//!
//! # Usage
//! 1. Describe the wiring with a [`config::PinConfig`]
//! 2. Open the [`Device`] with a [`config::DeviceConfig`]
//! 3. If another device shares the SPI bus, install a common [`spi::ExternalLock`]
//! 4. Start the interrupt listener
//! 5. Hand the device to the chip driver as its [`RadioHal`]
//! 6. Stop the interrupt listener before dropping the device
//!
//! # Important Notes
//! - The external lock protects SPI transfers only, not GPIO accesses
//! - Without a lock, transfers from two threads may interleave their frames
//! - Stopping the listener waits for the hook to return
//!
//! # Example
//! ```no_run
//! use sx128x_linux::{
//!     config::{DeviceConfig, PinConfig},
//!     hal::GpioPinFunction,
//!     spi::ExternalLock,
//!     Device, Error, RadioHal,
//! };
//!
//! fn open_radio(lock: ExternalLock) -> Result<(), Error> {
//!     let pins = PinConfig::from_raw(27, 17, 5, 22, -1, -1, 4, 6)?;
//!     let config = DeviceConfig::new("/dev/spidev0.0", 0, pins).with_external_lock(lock);
//!     let mut radio = Device::open(&config)?;
//!
//!     // Pulse NRESET
//!     radio.gpio_write(GpioPinFunction::Reset, false);
//!     radio.gpio_write(GpioPinFunction::Reset, true);
//!     while radio.gpio_read(GpioPinFunction::Busy) {}
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
mod error;
pub mod hal;
#[cfg(feature = "linux")]
pub mod host;
pub mod irq;
pub mod lines;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod spi;

pub use device::Device;
#[cfg(feature = "linux")]
pub use device::LinuxDevice;
pub use error::{Error, HostError, Result};
pub use hal::RadioHal;
