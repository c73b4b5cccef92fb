use std::{
    collections::VecDeque,
    io,
    os::unix::io::AsRawFd,
    path::Path,
    thread,
    time::Duration,
};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use gpio_cdev::{
    Chip, EventRequestFlags, EventType, LineEventHandle, LineHandle, LineRequestFlags,
};

use crate::{
    irq::{Edge, EdgeEvent, EdgeSource, IrqLine, IrqLines},
    lines::{GpioProvider, LineRole},
    Error, HostError, Result,
};

/// GPIO controller opened through its character device
pub struct CdevChip {
    chip: Chip,
}

impl CdevChip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let chip = Chip::new(path).map_err(|e| Error::Open {
            path: path.display().to_string(),
            source: e.into(),
        })?;
        log::debug!("opened {} ({} lines)", path.display(), chip.num_lines());
        Ok(Self { chip })
    }

    fn request(
        &mut self,
        role: LineRole,
        line: u32,
        flags: LineRequestFlags,
        initial: u8,
    ) -> core::result::Result<LineHandle, gpio_cdev::Error> {
        self.chip.get_line(line)?.request(flags, initial, role.label())
    }
}

impl GpioProvider for CdevChip {
    type Input = CdevPin;
    type Output = CdevPin;
    type Edges = CdevEdges;

    fn request_input(&mut self, role: LineRole, line: u32) -> Result<CdevPin> {
        self.request(role, line, LineRequestFlags::INPUT, 0)
            .map(CdevPin)
            .map_err(|e| Error::Acquire {
                role,
                source: e.into(),
            })
    }

    fn request_output(&mut self, role: LineRole, line: u32, initial: bool) -> Result<CdevPin> {
        self.request(role, line, LineRequestFlags::OUTPUT, u8::from(initial))
            .map(CdevPin)
            .map_err(|e| Error::Acquire {
                role,
                source: e.into(),
            })
    }

    fn request_edges(&mut self, lines: &[(IrqLine, u32)]) -> Result<CdevEdges> {
        let mut handles = Vec::with_capacity(lines.len());
        for &(irq, line) in lines {
            let role = irq.role();
            let handle = self
                .chip
                .get_line(line)
                .and_then(|l| {
                    l.events(
                        LineRequestFlags::INPUT,
                        EventRequestFlags::RISING_EDGE,
                        role.label(),
                    )
                })
                .map_err(|e| Error::Acquire {
                    role,
                    source: e.into(),
                })?;
            handles.push((irq, handle));
        }

        Ok(CdevEdges {
            handles,
            pending: VecDeque::new(),
        })
    }
}

/// Requested GPIO line
pub struct CdevPin(LineHandle);

impl ErrorType for CdevPin {
    type Error = HostError;
}

impl InputPin for CdevPin {
    fn is_high(&mut self) -> core::result::Result<bool, HostError> {
        Ok(self.0.get_value()? != 0)
    }

    fn is_low(&mut self) -> core::result::Result<bool, HostError> {
        self.is_high().map(|high| !high)
    }
}

impl OutputPin for CdevPin {
    fn set_low(&mut self) -> core::result::Result<(), HostError> {
        Ok(self.0.set_value(0)?)
    }

    fn set_high(&mut self) -> core::result::Result<(), HostError> {
        Ok(self.0.set_value(1)?)
    }
}

/// Edge events of the DIO lines, multiplexed with `poll(2)`
pub struct CdevEdges {
    handles: Vec<(IrqLine, LineEventHandle)>,
    pending: VecDeque<EdgeEvent>,
}

impl CdevEdges {
    /// Waits up to `timeout` for any line, then drains every line that is
    /// ready into `pending`, ordered by kernel timestamp.
    fn poll(&mut self, timeout: Duration) -> Result<()> {
        let first = self.read_ready(poll_timeout_ms(timeout))?;
        if first.is_empty() {
            return Ok(());
        }

        let batch = drain_ordered(first, || self.read_ready(0))?;
        self.pending.extend(batch);
        Ok(())
    }

    /// One `poll(2)` round: reads one event from every ready line.
    fn read_ready(&mut self, timeout_ms: libc::c_int) -> Result<Vec<EdgeEvent>> {
        let mut fds: Vec<libc::pollfd> = self
            .handles
            .iter()
            .map(|(_, handle)| libc::pollfd {
                fd: handle.as_raw_fd(),
                events: libc::POLLIN | libc::POLLPRI,
                revents: 0,
            })
            .collect();

        // SAFETY: fds is a live, correctly sized array of pollfd for the whole call.
        let ready =
            unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(Error::Edge(err.into()));
        }

        let mut round = Vec::new();
        for (fd, (line, handle)) in fds.iter().zip(self.handles.iter_mut()) {
            if fd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                return Err(Error::Edge(HostError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("event line {line:?} reported poll error"),
                ))));
            }
            if fd.revents & (libc::POLLIN | libc::POLLPRI) == 0 {
                continue;
            }

            let event = handle.get_event().map_err(|e| Error::Edge(e.into()))?;
            round.push(EdgeEvent {
                line: *line,
                edge: match event.event_type() {
                    EventType::RisingEdge => Edge::Rising,
                    EventType::FallingEdge => Edge::Falling,
                },
                timestamp_ns: event.timestamp(),
            });
        }
        Ok(round)
    }
}

/// Rounds of draining after the first wakeup, bounding the time spent under an
/// edge storm.
const MAX_DRAIN_ROUNDS: usize = 64;

/// Collects `first` and the rounds returned by `next` until a round comes back
/// empty, then orders everything by timestamp.
///
/// A line with several queued events yields one per round, so sorting a single
/// round would put its later events behind younger edges of other lines.
fn drain_ordered<F>(first: Vec<EdgeEvent>, mut next: F) -> Result<Vec<EdgeEvent>>
where
    F: FnMut() -> Result<Vec<EdgeEvent>>,
{
    let mut batch = first;
    for _ in 0..MAX_DRAIN_ROUNDS {
        let round = next()?;
        if round.is_empty() {
            break;
        }
        batch.extend(round);
    }
    batch.sort_by_key(|event| event.timestamp_ns);
    Ok(batch)
}

/// `poll(2)` timeout in whole milliseconds, rounded up so a short non-zero
/// interval never turns into a busy loop.
fn poll_timeout_ms(timeout: Duration) -> libc::c_int {
    let ms = timeout.as_nanos().div_ceil(1_000_000);
    libc::c_int::try_from(ms).unwrap_or(libc::c_int::MAX)
}

impl EdgeSource for CdevEdges {
    fn lines(&self) -> IrqLines {
        self.handles
            .iter()
            .fold(IrqLines::empty(), |acc, (line, _)| acc | line.flag())
    }

    fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>> {
        if self.pending.is_empty() {
            if self.handles.is_empty() {
                thread::sleep(timeout);
                return Ok(None);
            }
            self.poll(timeout)?;
        }
        Ok(self.pending.pop_front())
    }
}
