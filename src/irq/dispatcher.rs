use std::{
    io,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use super::{sched, Edge, EdgeSource, IrqEvent, IrqLines};
use crate::{config::DEFAULT_IRQ_POLL_INTERVAL, Error, Result};

const THREAD_NAME: &str = "sx128x-irq";

/// Lifecycle of the interrupt listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatcherState {
    /// Never started
    Idle,
    /// Listener thread alive
    Running,
    /// Listener thread joined
    Stopped,
}

/// Runs the interrupt listener thread over an [`EdgeSource`]
///
/// The listener waits on the source, and for every rising edge calls the hook
/// once, synchronously, in the order the source reports edges. Falling edges are
/// dropped. The wait is bounded by the poll interval so the thread notices a
/// stop request even when no edge ever arrives.
///
/// If the source fails, the listener logs the error and exits; the failure is
/// returned by the next [`stop`](Self::stop).
pub struct IrqDispatcher<S> {
    source: Option<S>,
    lines: IrqLines,
    state: DispatcherState,
    poll_interval: Duration,
    worker: Option<Worker<S>>,
    dropped: Arc<AtomicU64>,
}

type Body<S> = Box<dyn FnOnce() -> Option<Exit<S>> + Send + 'static>;

struct Worker<S> {
    stop: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    exited: Receiver<()>,
    handle: JoinHandle<Option<Exit<S>>>,
}

struct Exit<S> {
    source: S,
    failure: Option<String>,
}

impl<S: EdgeSource> IrqDispatcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            lines: source.lines(),
            source: Some(source),
            state: DispatcherState::Idle,
            poll_interval: DEFAULT_IRQ_POLL_INTERVAL,
            worker: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    /// Lines the listener reports on
    pub fn lines(&self) -> IrqLines {
        self.lines
    }

    /// Whether the listener has exited on a source error and awaits `stop`
    pub fn is_faulted(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.failed.load(Ordering::Acquire))
    }

    /// Events discarded because the channel from
    /// [`start_channel`](Self::start_channel) was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Spawns the listener thread.
    ///
    /// With `priority` set, the thread moves itself to `SCHED_RR` at that
    /// priority first; if the host refuses (usually for lack of privileges) it
    /// keeps running at the inherited policy.
    ///
    /// # Errors
    /// * [`Error::AlreadyRunning`] - a listener is alive
    /// * [`Error::Spawn`] - the thread could not be created
    pub fn start<F>(&mut self, priority: Option<i32>, hook: F) -> Result<()>
    where
        F: FnMut(IrqEvent) + Send + 'static,
    {
        self.launch(priority, hook, |body| {
            thread::Builder::new().name(THREAD_NAME.into()).spawn(body)
        })
    }

    fn launch<F, Sp>(&mut self, priority: Option<i32>, mut hook: F, spawn: Sp) -> Result<()>
    where
        F: FnMut(IrqEvent) + Send + 'static,
        Sp: FnOnce(Body<S>) -> io::Result<JoinHandle<Option<Exit<S>>>>,
    {
        if self.state == DispatcherState::Running {
            return Err(Error::AlreadyRunning);
        }
        let source = self
            .source
            .take()
            .ok_or_else(|| Error::Listener("edge source was lost by a panicked listener".into()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited) = mpsc::channel::<()>();
        // the source only moves to the thread once it exists
        let (source_tx, source_rx) = mpsc::channel::<S>();
        let poll_interval = self.poll_interval;

        let thread_stop = stop.clone();
        let thread_failed = failed.clone();
        let spawned = spawn(Box::new(move || {
            // dropped on every exit path, unwinding included
            let _exited = exited_tx;
            let mut source = source_rx.recv().ok()?;

            if let Some(priority) = priority {
                match sched::set_realtime_priority(priority) {
                    Ok(()) => log::debug!("irq listener running at SCHED_RR {priority}"),
                    Err(e) => log::warn!("irq listener keeps default scheduling: {e}"),
                }
            }

            let failure = listen(&mut source, &thread_stop, poll_interval, &mut hook)
                .err()
                .map(|e| {
                    log::error!("irq listener terminated: {e}");
                    thread_failed.store(true, Ordering::Release);
                    e.to_string()
                });

            Some(Exit { source, failure })
        }));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.source = Some(source);
                return Err(Error::Spawn(e));
            }
        };
        if let Err(mpsc::SendError(source)) = source_tx.send(source) {
            self.source = Some(source);
        }

        self.worker = Some(Worker {
            stop,
            failed,
            exited,
            handle,
        });
        self.state = DispatcherState::Running;
        log::debug!("irq listener started on {:?}", self.lines);
        Ok(())
    }

    /// Starts the listener with a bounded event channel as the hook.
    ///
    /// The returned receiver is drained by whoever owns the chip driver. When the
    /// channel is full, new events are discarded and counted in
    /// [`dropped_events`](Self::dropped_events).
    pub fn start_channel(
        &mut self,
        priority: Option<i32>,
        capacity: usize,
    ) -> Result<Receiver<IrqEvent>> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let dropped = self.dropped.clone();
        self.start(priority, move |event| post(&tx, &dropped, event))?;
        Ok(rx)
    }

    /// Stops the listener and waits for it to exit.
    ///
    /// # Errors
    /// * [`Error::NotRunning`] - no listener was started
    /// * [`Error::Listener`] - the listener had terminated on a source error or
    ///   panicked in the hook
    pub fn stop(&mut self) -> Result<()> {
        let worker = self.worker.take().ok_or(Error::NotRunning)?;
        worker.stop.store(true, Ordering::Release);
        self.join(worker)
    }

    /// Like [`stop`](Self::stop), giving up after `timeout`.
    ///
    /// On [`Error::StopTimeout`] the listener is still registered as running and
    /// a later stop may join it.
    pub fn stop_timeout(&mut self, timeout: Duration) -> Result<()> {
        let worker = self.worker.as_ref().ok_or(Error::NotRunning)?;
        worker.stop.store(true, Ordering::Release);

        match worker.exited.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("irq listener still running after {timeout:?}");
                Err(Error::StopTimeout)
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.worker.take() {
                Some(worker) => self.join(worker),
                None => Err(Error::NotRunning),
            },
        }
    }

    fn join(&mut self, worker: Worker<S>) -> Result<()> {
        self.state = DispatcherState::Stopped;
        let exit = worker
            .handle
            .join()
            .map_err(|_| Error::Listener("listener thread panicked".into()))?
            .ok_or_else(|| Error::Listener("listener exited without its edge source".into()))?;

        self.source = Some(exit.source);
        log::debug!("irq listener stopped");
        match exit.failure {
            Some(failure) => Err(Error::Listener(failure)),
            None => Ok(()),
        }
    }
}

impl<S> Drop for IrqDispatcher<S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            if worker.handle.join().is_err() {
                log::warn!("irq listener panicked");
            }
        }
    }
}

fn listen<S, F>(source: &mut S, stop: &AtomicBool, poll: Duration, hook: &mut F) -> Result<()>
where
    S: EdgeSource,
    F: FnMut(IrqEvent),
{
    while !stop.load(Ordering::Acquire) {
        let Some(event) = source.wait(poll)? else {
            continue;
        };

        match event.edge {
            Edge::Rising => {
                log::trace!("rising edge on {:?} at {}ns", event.line, event.timestamp_ns);
                hook(IrqEvent {
                    line: event.line,
                    timestamp_ns: event.timestamp_ns,
                });
            }
            Edge::Falling => log::trace!("ignoring falling edge on {:?}", event.line),
        }
    }
    Ok(())
}

fn post(tx: &SyncSender<IrqEvent>, dropped: &AtomicU64, event: IrqEvent) {
    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            log::warn!("irq channel full, dropping {event:?}");
        }
        Err(TrySendError::Disconnected(event)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("irq receiver gone, dropping {event:?}");
        }
    }
}
