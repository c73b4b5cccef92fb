//! Interrupt delivery
//!
//! The SX128x raises its DIO lines when an IRQ status bit mapped to them is set.
//! The host sees these as GPIO edges. An [`EdgeSource`] reports edges on the
//! configured DIO lines and the [`IrqDispatcher`] runs a dedicated listener thread
//! that turns every rising edge into an [`IrqEvent`] for a single processing hook.
//!
//! The hook does not learn which IRQ caused the edge: the chip driver reads the
//! IRQ status register over SPI to find out. Several DIO lines therefore share
//! one hook.

mod dispatcher;
mod sched;

pub use dispatcher::*;

use std::time::Duration;

use bitflags::bitflags;

use crate::{lines::LineRole, Result};

bitflags! {
    /// Set of DIO lines registered for interrupts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IrqLines: u8 {
        const DIO1 = 1 << 0;
        const DIO2 = 1 << 1;
        const DIO3 = 1 << 2;
    }
}

/// One interrupt-capable DIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqLine {
    Dio1,
    Dio2,
    Dio3,
}

impl IrqLine {
    pub const fn flag(self) -> IrqLines {
        match self {
            Self::Dio1 => IrqLines::DIO1,
            Self::Dio2 => IrqLines::DIO2,
            Self::Dio3 => IrqLines::DIO3,
        }
    }

    pub const fn role(self) -> LineRole {
        match self {
            Self::Dio1 => LineRole::Dio1,
            Self::Dio2 => LineRole::Dio2,
            Self::Dio3 => LineRole::Dio3,
        }
    }
}

/// Direction of a level transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Edge {
    Rising,
    Falling,
}

/// Edge reported by an [`EdgeSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    pub line: IrqLine,
    pub edge: Edge,
    /// Kernel timestamp of the edge, in nanoseconds
    pub timestamp_ns: u64,
}

/// Token delivered to the processing hook for every rising edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqEvent {
    pub line: IrqLine,
    pub timestamp_ns: u64,
}

/// Blocking source of GPIO edge events
pub trait EdgeSource: Send + 'static {
    /// Lines this source reports on
    fn lines(&self) -> IrqLines;

    /// Waits up to `timeout` for the next edge.
    ///
    /// Returns `Ok(None)` when the timeout elapses with no edge. Edges must be
    /// returned in the order they occurred.
    fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>>;
}
