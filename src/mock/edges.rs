use std::{
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use super::Shared;
use crate::{
    irq::{Edge, EdgeEvent, EdgeSource, IrqLine, IrqLines},
    Error, HostError, Result,
};

pub(crate) type Injected = core::result::Result<EdgeEvent, &'static str>;

/// Mock edge source fed by an [`EdgeInjector`]
///
/// Sources handed out by a [`MockChip`](super::MockChip) give their lines back
/// to the chip when dropped.
#[derive(Debug)]
pub struct MockEdges {
    pub(crate) lines: IrqLines,
    pub(crate) rx: Receiver<Injected>,
    pub(crate) claims: Option<(Shared, Vec<u32>)>,
}

impl MockEdges {
    pub fn new(lines: IrqLines) -> (Self, EdgeInjector) {
        let (tx, rx) = mpsc::channel();
        let edges = Self {
            lines,
            rx,
            claims: None,
        };
        (edges, EdgeInjector { tx })
    }
}

impl Drop for MockEdges {
    fn drop(&mut self) {
        if let Some((state, lines)) = &self.claims {
            let mut state = state.get();
            for &line in lines {
                state.release(line);
            }
        }
    }
}

impl EdgeSource for MockEdges {
    fn lines(&self) -> IrqLines {
        self.lines
    }

    fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(reason)) => Err(Error::Edge(HostError::Simulated(reason))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

/// Simulates edges on the lines of a [`MockEdges`]
#[derive(Debug, Clone)]
pub struct EdgeInjector {
    pub(crate) tx: Sender<Injected>,
}

impl EdgeInjector {
    pub fn edge(&self, line: IrqLine, edge: Edge, timestamp_ns: u64) {
        // the source may already be gone; nothing to deliver then
        let _ = self.tx.send(Ok(EdgeEvent {
            line,
            edge,
            timestamp_ns,
        }));
    }

    /// Low-to-high then high-to-low pulse.
    pub fn pulse(&self, line: IrqLine, timestamp_ns: u64) {
        self.edge(line, Edge::Rising, timestamp_ns);
        self.edge(line, Edge::Falling, timestamp_ns + 1);
    }

    /// Makes the next wait fail.
    pub fn fail(&self, reason: &'static str) {
        let _ = self.tx.send(Err(reason));
    }
}
