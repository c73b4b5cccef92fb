use std::{sync::mpsc, time::Duration};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use super::{edges::Injected, EdgeInjector, MockBus, MockEdges, Shared, Trace};
use crate::{
    irq::{IrqLine, IrqLines},
    lines::{GpioProvider, LineRole},
    Error, HostError, Result,
};

/// Mock GPIO controller
///
/// Lines are free unless marked with [`fail_line`](Self::fail_line) or already
/// claimed. Levels of unclaimed or input lines are set with
/// [`set_level`](Self::set_level).
#[derive(Debug)]
pub struct MockChip {
    state: Shared,
    injector: EdgeInjector,
    pending: Option<mpsc::Receiver<Injected>>,
}

impl Default for MockChip {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChip {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            state: Shared::default(),
            injector: EdgeInjector { tx },
            pending: Some(rx),
        }
    }

    /// SPI bus sharing this chip's trace
    pub fn bus(&self) -> MockBus {
        MockBus {
            state: self.state.clone(),
        }
    }

    /// Handle feeding the edge source returned by `request_edges`
    pub fn injector(&self) -> EdgeInjector {
        self.injector.clone()
    }

    /// Makes every later request for `line` fail.
    pub fn fail_line(&mut self, line: u32) {
        self.state.get().failing.insert(line);
    }

    /// Undoes every [`fail_line`](Self::fail_line).
    pub fn clear_failures(&mut self) {
        self.state.get().failing.clear();
    }

    pub fn set_level(&self, line: u32, high: bool) {
        self.state.get().levels.insert(line, high);
    }

    pub fn level(&self, line: u32) -> bool {
        self.state.get().levels.get(&line).copied().unwrap_or(false)
    }

    pub fn trace(&self) -> Vec<Trace> {
        self.state.get().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.state.get().trace.clear();
    }

    /// Roles currently claimed, including interrupt lines
    pub fn requested(&self) -> Vec<(LineRole, u32)> {
        self.state.get().claimed.clone()
    }

    /// Lines registered for edge events
    pub fn edge_lines(&self) -> Vec<u32> {
        self.state.get().edge_lines.clone()
    }

    /// Makes the next bus transfer fail.
    pub fn fail_next_transfer(&self) {
        self.state.get().fail_next_transfer = true;
    }

    /// Bytes returned by the next bus transfer instead of the inverted output.
    pub fn respond_with(&self, reply: &[u8]) {
        self.state.get().reply = Some(reply.to_vec());
    }

    /// Time every bus transfer takes.
    pub fn set_transfer_delay(&self, delay: Duration) {
        self.state.get().transfer_delay = delay;
    }

    /// Last clock applied to any bus of this chip
    pub fn speed_hz(&self) -> u32 {
        self.state.get().speed_hz
    }

    fn claim(&self, role: LineRole, line: u32) -> Result<()> {
        let mut state = self.state.get();
        let refusal = if state.failing.contains(&line) {
            Some("line unavailable")
        } else if state.claimed.iter().any(|&(_, claimed)| claimed == line) {
            Some("line already requested")
        } else {
            None
        };

        match refusal {
            Some(reason) => Err(Error::Acquire {
                role,
                source: HostError::Simulated(reason),
            }),
            None => {
                state.claimed.push((role, line));
                Ok(())
            }
        }
    }

    fn pin(&self, line: u32) -> MockPin {
        MockPin {
            line,
            state: self.state.clone(),
        }
    }
}

impl GpioProvider for MockChip {
    type Input = MockPin;
    type Output = MockPin;
    type Edges = MockEdges;

    fn request_input(&mut self, role: LineRole, line: u32) -> Result<MockPin> {
        self.claim(role, line)?;
        Ok(self.pin(line))
    }

    fn request_output(&mut self, role: LineRole, line: u32, initial: bool) -> Result<MockPin> {
        self.claim(role, line)?;
        self.set_level(line, initial);
        Ok(self.pin(line))
    }

    fn request_edges(&mut self, lines: &[(IrqLine, u32)]) -> Result<MockEdges> {
        let rx = match self.pending.take() {
            Some(rx) => rx,
            None => {
                let (tx, rx) = mpsc::channel();
                self.injector = EdgeInjector { tx };
                rx
            }
        };
        // lines claimed so far go back to the chip if a later claim fails
        let mut edges = MockEdges {
            lines: IrqLines::empty(),
            rx,
            claims: Some((self.state.clone(), Vec::with_capacity(lines.len()))),
        };

        for &(irq, line) in lines {
            self.claim(irq.role(), line)?;
            self.state.get().edge_lines.push(line);
            if let Some((_, claimed)) = &mut edges.claims {
                claimed.push(line);
            }
            edges.lines |= irq.flag();
        }
        Ok(edges)
    }
}

/// Mock GPIO line, usable as input or output
///
/// Dropping the pin releases its line.
#[derive(Debug)]
pub struct MockPin {
    line: u32,
    state: Shared,
}

impl Drop for MockPin {
    fn drop(&mut self) {
        self.state.get().release(self.line);
    }
}

impl ErrorType for MockPin {
    type Error = HostError;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> core::result::Result<bool, HostError> {
        Ok(self.state.get().levels.get(&self.line).copied().unwrap_or(false))
    }

    fn is_low(&mut self) -> core::result::Result<bool, HostError> {
        self.is_high().map(|high| !high)
    }
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> core::result::Result<(), HostError> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), HostError> {
        self.drive(true);
        Ok(())
    }
}

impl MockPin {
    fn drive(&self, high: bool) {
        let mut state = self.state.get();
        state.levels.insert(self.line, high);
        state.trace.push(Trace::Level {
            line: self.line,
            high,
        });
    }
}
