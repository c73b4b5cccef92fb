//! Error types
//!
//! Every fallible operation in this crate returns [`Error`]. Errors coming from the
//! host (the kernel SPI and GPIO interfaces) are wrapped in [`HostError`], which also
//! implements the `embedded-hal` error traits so host buses and pins can be used
//! through the generic transport and registry.

use std::io;

use thiserror::Error;

use crate::lines::LineRole;

/// Result alias used throughout the crate
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by the bridge
#[derive(Error, Debug)]
pub enum Error {
    /// A required pin was given the "absent" sentinel
    #[error("required pin {role:?} has no line assigned")]
    InvalidPin { role: LineRole },

    /// Two roles name the same physical line
    #[error("line {line} is assigned to both {first:?} and {second:?}")]
    DuplicateLine {
        line: u32,
        first: LineRole,
        second: LineRole,
    },

    /// A GPIO line could not be claimed at construction
    #[error("failed to acquire {role:?} line")]
    Acquire {
        role: LineRole,
        #[source]
        source: HostError,
    },

    /// The SPI device node or GPIO chip could not be opened
    #[error("failed to open {path}")]
    Open {
        path: String,
        #[source]
        source: HostError,
    },

    /// The SPI exchange failed; chip-select has already been released
    #[error("SPI transfer failed: {0:?}")]
    Spi(embedded_hal::spi::ErrorKind),

    /// Waiting for interrupt edges failed
    #[error("edge event wait failed")]
    Edge(#[source] HostError),

    /// A GPIO level read or write failed
    #[error("GPIO access failed: {0:?}")]
    Gpio(embedded_hal::digital::ErrorKind),

    /// A zero clock frequency was requested
    #[error("SPI clock speed must be non-zero")]
    InvalidSpeed,

    /// Output and input buffers of a transfer differ in length
    #[error("transfer buffers differ in length (out {out}, in {input})")]
    LengthMismatch { out: usize, input: usize },

    /// The role is not usable in the requested direction
    #[error("{role:?} line cannot be used in this direction")]
    WrongDirection { role: LineRole },

    /// The role's line is owned elsewhere
    #[error("{role:?} line is not accessible through the line registry")]
    LineUnavailable { role: LineRole },

    /// A different external lock is already installed
    #[error("an external bus lock is already installed")]
    LockAlreadySet,

    /// The interrupt handler is already running
    #[error("interrupt handler is already running")]
    AlreadyRunning,

    /// The interrupt handler is not running
    #[error("interrupt handler is not running")]
    NotRunning,

    /// The listener thread did not exit in time
    #[error("interrupt listener did not stop within the timeout")]
    StopTimeout,

    /// The listener thread terminated on an edge source error
    #[error("interrupt listener failed: {0}")]
    Listener(String),

    /// The listener thread could not be spawned
    #[error("failed to spawn interrupt listener thread")]
    Spawn(#[source] io::Error),
}

impl Error {
    pub(crate) fn spi<E: embedded_hal::spi::Error>(err: E) -> Self {
        log::error!("spi: {err:?}");
        Self::Spi(err.kind())
    }

    pub(crate) fn gpio<E: embedded_hal::digital::Error>(err: E) -> Self {
        log::error!("gpio: {err:?}");
        Self::Gpio(err.kind())
    }
}

/// Error reported by the Linux host interfaces
#[derive(Error, Debug)]
pub enum HostError {
    /// spidev or poll(2) failure
    #[error(transparent)]
    Io(#[from] io::Error),

    /// GPIO character device failure
    #[cfg(feature = "linux")]
    #[error(transparent)]
    Cdev(#[from] gpio_cdev::Error),

    /// Failure reported by a test double
    #[cfg(any(test, feature = "mock"))]
    #[error("{0}")]
    Simulated(&'static str),
}

impl embedded_hal::spi::Error for HostError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_hal::digital::Error for HostError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_errors_map_to_other_kind() {
        let err = Error::spi(HostError::Simulated("bus fault"));
        assert!(matches!(err, Error::Spi(embedded_hal::spi::ErrorKind::Other)));

        let err = Error::gpio(HostError::Simulated("line fault"));
        assert!(matches!(
            err,
            Error::Gpio(embedded_hal::digital::ErrorKind::Other)
        ));
    }

    #[test]
    fn acquire_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Acquire {
            role: LineRole::Busy,
            source: HostError::Simulated("line busy"),
        };
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("line busy"));
    }
}
