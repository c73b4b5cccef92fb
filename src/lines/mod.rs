//! GPIO line ownership
//!
//! The SX128x is wired to the host through a handful of GPIO lines:
//! - BUSY (input): high while the radio processes a command
//! - NSS (output): frames every SPI exchange
//! - NRESET (output): holds the radio in reset while low
//! - TXEN/RXEN (outputs, optional): gate an external RF front-end
//! - DIO1..3 (inputs, optional): interrupt lines
//!
//! A [`GpioProvider`] hands out pins for these roles; the [`LineRegistry`] claims
//! them all when the device is built and owns them until it is dropped.

mod registry;

pub use registry::*;

use crate::{irq::{EdgeSource, IrqLine}, Result};

/// Logical function of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineRole {
    Busy,
    ChipSelect,
    Reset,
    TxEnable,
    RxEnable,
    Dio1,
    Dio2,
    Dio3,
}

impl LineRole {
    /// Consumer label reported to the kernel
    pub const fn label(self) -> &'static str {
        match self {
            Self::Busy => "SX128x BUSY",
            Self::ChipSelect => "SX128x NSS",
            Self::Reset => "SX128x NRESET",
            Self::TxEnable => "SX128x TXEN",
            Self::RxEnable => "SX128x RXEN",
            Self::Dio1 => "SX128x DIO1",
            Self::Dio2 => "SX128x DIO2",
            Self::Dio3 => "SX128x DIO3",
        }
    }

    /// Whether the host reads this line
    pub const fn is_input(self) -> bool {
        matches!(self, Self::Busy | Self::Dio1 | Self::Dio2 | Self::Dio3)
    }
}

/// Source of GPIO lines on the host
///
/// Implementations report acquisition failures as [`crate::Error::Acquire`]
/// naming the role that could not be claimed.
pub trait GpioProvider {
    /// Pin handed out for input roles
    type Input: embedded_hal::digital::InputPin + Send;
    /// Pin handed out for output roles
    type Output: embedded_hal::digital::OutputPin + Send;
    /// Edge event source over the interrupt lines
    type Edges: EdgeSource;

    /// Claims `line` as an input.
    fn request_input(&mut self, role: LineRole, line: u32) -> Result<Self::Input>;

    /// Claims `line` as an output driven to `initial` (true = high).
    fn request_output(&mut self, role: LineRole, line: u32, initial: bool)
        -> Result<Self::Output>;

    /// Claims the interrupt lines as rising-edge event inputs.
    ///
    /// Called exactly once, possibly with an empty slice.
    fn request_edges(&mut self, lines: &[(IrqLine, u32)]) -> Result<Self::Edges>;
}
