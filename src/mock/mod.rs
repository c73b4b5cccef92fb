//! In-memory host doubles
//!
//! [`MockChip`] stands in for a GPIO controller and hands out [`MockPin`]s,
//! [`MockEdges`] and [`MockBus`]es that all share one state. Every level written
//! and every byte clocked is appended to a single [`Trace`] log so tests can check
//! ordering across the GPIO and SPI sides.

mod edges;
mod gpio;
mod spi;

pub use edges::*;
pub use gpio::*;
pub use spi::*;

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::lines::LineRole;

/// Observable host activity, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trace {
    /// An output line was driven
    Level { line: u32, high: bool },
    /// A full-duplex exchange clocked these bytes out
    Transfer { out: Vec<u8> },
    /// The bus clock changed
    Speed(u32),
}

#[derive(Debug, Default)]
struct HostState {
    levels: HashMap<u32, bool>,
    claimed: Vec<(LineRole, u32)>,
    failing: HashSet<u32>,
    edge_lines: Vec<u32>,
    trace: Vec<Trace>,
    speed_hz: u32,
    fail_next_transfer: bool,
    reply: Option<Vec<u8>>,
    transfer_delay: Duration,
}

impl HostState {
    fn release(&mut self, line: u32) {
        self.claimed.retain(|&(_, claimed)| claimed != line);
        self.edge_lines.retain(|&edge| edge != line);
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Shared(Arc<Mutex<HostState>>);

impl Shared {
    fn get(&self) -> MutexGuard<'_, HostState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
