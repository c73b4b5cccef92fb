//! SX128x host device
//!
//! This module ties the line registry, the SPI transport and the interrupt
//! dispatcher into one [`Device`], which implements [`RadioHal`] for the chip
//! driver and exposes the controls the application needs:
//! - Changing the SPI clock
//! - Installing a lock shared with other users of the SPI bus
//! - Starting and stopping the interrupt listener
//!
//! # Example
//! ```no_run
//! use sx128x_linux::{config::{DeviceConfig, PinConfig}, Device, RadioHal};
//!
//! # fn main() -> Result<(), sx128x_linux::Error> {
//! // busy, tx_en, rx_en, nrst, dio1, dio2, dio3, nss
//! let pins = PinConfig::from_raw(27, 17, 5, 22, -1, -1, 4, 6)?;
//! let mut radio = Device::open(&DeviceConfig::new("/dev/spidev0.0", 0, pins))?;
//!
//! radio.set_spi_speed(8_000_000)?;
//! let events = radio.start_irq_channel(Some(50), 16)?;
//!
//! // GetStatus
//! let mut status = [0u8; 1];
//! radio.spi_transfer(&[0xC0], &mut status)?;
//!
//! for event in events.iter().take(1) {
//!     println!("{event:?}");
//! }
//! radio.stop_irq_handler()?;
//! # Ok(())
//! # }
//! ```

use std::{sync::mpsc::Receiver, time::Duration};

use embedded_hal::spi::SpiBus;

#[cfg(feature = "linux")]
use crate::{
    config::DeviceConfig,
    host::{CdevChip, SpidevBus},
};
use crate::{
    config::{PinConfig, SpiConfig},
    hal::{GpioPinFunction, RadioHal},
    irq::{DispatcherState, IrqDispatcher, IrqEvent, IrqLines},
    lines::{AcquiredLines, GpioProvider, LineRegistry, LineRole},
    spi::{ExternalLock, SpiClock, SpiTransport},
    Result,
};

/// One SX128x wired to a host
///
/// Owns every line and the SPI bus of the radio for its whole lifetime. Dropping
/// the device stops a running interrupt listener and releases the lines.
pub struct Device<P: GpioProvider, B> {
    pins: PinConfig,
    lines: LineRegistry<P::Input, P::Output>,
    spi: SpiTransport<B, P::Output>,
    irq: IrqDispatcher<P::Edges>,
}

/// Device on the Linux GPIO character device and spidev
#[cfg(feature = "linux")]
pub type LinuxDevice = Device<CdevChip, SpidevBus>;

#[cfg(feature = "linux")]
impl Device<CdevChip, SpidevBus> {
    /// Opens the SPI node and GPIO chip named in `config` and claims every line.
    ///
    /// # Errors
    /// * [`Error::Open`](crate::Error::Open) - the SPI node or GPIO chip cannot be opened
    /// * [`Error::Acquire`](crate::Error::Acquire) - a line cannot be claimed
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let mut chip = CdevChip::open(config.gpio_chip_path())?;
        let bus = SpidevBus::open(&config.spi_path, &config.spi)?;

        let mut device = Self::new(&mut chip, bus, config.pins, &config.spi)?
            .with_irq_poll_interval(config.irq_poll_interval);
        if let Some(lock) = &config.external_lock {
            device.set_external_lock(lock.clone())?;
        }
        Ok(device)
    }
}

impl<P, B> Device<P, B>
where
    P: GpioProvider,
    B: SpiBus + SpiClock,
{
    /// Claims the lines of `pins` from `provider` and takes over `bus`.
    ///
    /// # Arguments
    /// * `provider` - Source of the GPIO lines
    /// * `bus` - Opened SPI bus
    /// * `pins` - Line assignments
    /// * `spi` - Initial clock and chip-select polarity
    ///
    /// # Errors
    /// Any line that cannot be claimed fails the whole construction.
    pub fn new(provider: &mut P, bus: B, pins: PinConfig, spi: &SpiConfig) -> Result<Self> {
        let AcquiredLines {
            registry,
            chip_select,
            edges,
        } = LineRegistry::acquire(provider, &pins, spi.chip_select.idle_level())?;

        let transport = SpiTransport::new(bus, chip_select, spi.chip_select, spi.speed_hz)?;

        log::info!(
            "sx128x ready: busy={} nss={} nrst={} txen={:?} rxen={:?} irq={:?} spi={}Hz",
            pins.busy,
            pins.nss,
            pins.nrst,
            pins.tx_en,
            pins.rx_en,
            registry.irq_lines(),
            spi.speed_hz,
        );

        Ok(Self {
            pins,
            lines: registry,
            spi: transport,
            irq: IrqDispatcher::new(edges),
        })
    }

    /// Sets how often the interrupt listener checks for a stop request.
    pub fn with_irq_poll_interval(mut self, interval: Duration) -> Self {
        self.irq = self.irq.with_poll_interval(interval);
        self
    }

    /// Installs `lock` at construction time.
    pub fn with_external_lock(mut self, lock: ExternalLock) -> Result<Self> {
        self.set_external_lock(lock)?;
        Ok(self)
    }

    /// Line assignments the device was built with
    pub fn pins(&self) -> &PinConfig {
        &self.pins
    }

    /// Roles claimed at construction
    pub fn active_lines(&self) -> &[LineRole] {
        self.lines.active_lines()
    }

    /// Interrupt lines registered for edge events
    pub fn irq_lines(&self) -> IrqLines {
        self.lines.irq_lines()
    }

    /// Changes the SPI clock.
    pub fn set_spi_speed(&mut self, hz: u32) -> Result<()> {
        self.spi.set_speed_hz(hz)
    }

    pub fn spi_speed(&self) -> u32 {
        self.spi.speed_hz()
    }

    /// Installs the lock held around every SPI transfer from now on.
    ///
    /// Share the same lock with every other user of the physical bus. The same
    /// lock may be installed again; a different one is refused.
    ///
    /// # Errors
    /// [`Error::LockAlreadySet`](crate::Error::LockAlreadySet)
    pub fn set_external_lock(&mut self, lock: ExternalLock) -> Result<()> {
        self.spi.set_external_lock(lock)
    }

    /// Full-duplex exchange returning one byte per byte sent.
    pub fn transfer(&mut self, out: &[u8]) -> Result<Vec<u8>> {
        self.spi.transfer(out)
    }

    /// Starts the interrupt listener calling `hook` for every rising edge.
    ///
    /// The hook runs on the listener thread. A hook that needs this device must
    /// reach it through shared ownership, and must not be blocked on it while the
    /// owner calls [`stop_irq_handler`](Self::stop_irq_handler); the channel form
    /// ([`start_irq_channel`](Self::start_irq_channel)) avoids the problem.
    ///
    /// # Arguments
    /// * `priority` - `SCHED_RR` priority of the listener, or `None` to inherit
    /// * `hook` - Interrupt processing entry point of the chip driver
    pub fn start_irq_handler<F>(&mut self, priority: Option<i32>, hook: F) -> Result<()>
    where
        F: FnMut(IrqEvent) + Send + 'static,
    {
        self.irq.start(priority, hook)
    }

    /// Starts the interrupt listener posting events to a bounded channel.
    pub fn start_irq_channel(
        &mut self,
        priority: Option<i32>,
        capacity: usize,
    ) -> Result<Receiver<IrqEvent>> {
        self.irq.start_channel(priority, capacity)
    }

    /// Stops the interrupt listener, blocking until it has exited.
    pub fn stop_irq_handler(&mut self) -> Result<()> {
        self.irq.stop()
    }

    /// Stops the interrupt listener, waiting at most `timeout`.
    pub fn stop_irq_handler_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.irq.stop_timeout(timeout)
    }

    pub fn irq_state(&self) -> DispatcherState {
        self.irq.state()
    }

    /// Events lost to a full interrupt channel
    pub fn dropped_irq_events(&self) -> u64 {
        self.irq.dropped_events()
    }

    fn drive(&mut self, role: LineRole, high: bool) {
        if let Err(e) = self.lines.write(role, high) {
            log::warn!("failed to drive {role:?} {}: {e}", if high { "high" } else { "low" });
        }
    }
}

impl<P, B> RadioHal for Device<P, B>
where
    P: GpioProvider,
    B: SpiBus + SpiClock,
{
    fn gpio_read(&mut self, pin: GpioPinFunction) -> bool {
        match pin {
            GpioPinFunction::Busy => self.lines.read(LineRole::Busy).unwrap_or_else(|e| {
                log::warn!("failed to read BUSY: {e}");
                false
            }),
            _ => false,
        }
    }

    fn gpio_write(&mut self, pin: GpioPinFunction, high: bool) {
        if pin == GpioPinFunction::Reset {
            self.drive(LineRole::Reset, high);
        }
    }

    fn spi_transfer(&mut self, out: &[u8], input: &mut [u8]) -> Result<()> {
        self.spi.transfer_into(out, input)
    }

    fn pre_tx(&mut self) {
        self.drive(LineRole::TxEnable, true);
    }

    fn post_tx(&mut self) {
        self.drive(LineRole::TxEnable, false);
    }

    fn pre_rx(&mut self) {
        self.drive(LineRole::RxEnable, true);
    }

    fn post_rx(&mut self) {
        self.drive(LineRole::RxEnable, false);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        irq::{Edge, IrqLine},
        mock::{MockBus, MockChip, Trace},
        Error,
    };

    type TestDevice = Device<MockChip, MockBus>;

    const BUSY: u32 = 27;
    const TX_EN: u32 = 17;
    const RX_EN: u32 = 5;
    const NRST: u32 = 22;
    const NSS: u32 = 6;

    fn open(dio3: i32, tx_en: i32, rx_en: i32) -> (TestDevice, MockChip) {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut chip = MockChip::new();
        let pins = PinConfig::from_raw(
            BUSY as i32,
            tx_en,
            rx_en,
            NRST as i32,
            -1,
            -1,
            dio3,
            NSS as i32,
        )
        .unwrap();
        let bus = chip.bus();
        let device = Device::new(&mut chip, bus, pins, &SpiConfig::default())
            .unwrap()
            .with_irq_poll_interval(Duration::from_millis(10));
        chip.clear_trace();
        (device, chip)
    }

    #[test]
    fn reference_wiring() {
        let (device, chip) = open(-1, TX_EN as i32, RX_EN as i32);

        assert_eq!(
            device.active_lines(),
            &[
                LineRole::Busy,
                LineRole::ChipSelect,
                LineRole::Reset,
                LineRole::TxEnable,
                LineRole::RxEnable
            ]
        );
        assert_eq!(device.pins().busy, BUSY);
        assert!(device.irq_lines().is_empty());
        assert!(chip.edge_lines().is_empty());
        assert_eq!(device.spi_speed(), 8_000_000);
        assert_eq!(device.irq_state(), DispatcherState::Idle);
    }

    #[test]
    fn construction_fails_when_a_line_is_taken() {
        let mut chip = MockChip::new();
        chip.fail_line(NSS);
        let pins = PinConfig::from_raw(27, 17, 5, 22, -1, -1, -1, 6).unwrap();
        let bus = chip.bus();

        let err = Device::new(&mut chip, bus, pins, &SpiConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Acquire {
                role: LineRole::ChipSelect,
                ..
            }
        ));
    }

    #[test]
    fn lines_are_released_with_the_device() {
        let mut chip = MockChip::new();
        let pins = PinConfig::from_raw(27, 17, 5, 22, -1, -1, 4, 6).unwrap();

        let zero_clock = SpiConfig {
            speed_hz: 0,
            ..SpiConfig::default()
        };
        let bus = chip.bus();
        assert!(matches!(
            Device::new(&mut chip, bus, pins, &zero_clock),
            Err(Error::InvalidSpeed)
        ));
        assert!(chip.requested().is_empty());

        let bus = chip.bus();
        let mut device = Device::new(&mut chip, bus, pins, &SpiConfig::default())
            .unwrap()
            .with_irq_poll_interval(Duration::from_millis(10));
        assert_eq!(chip.requested().len(), 6);
        let _events = device.start_irq_channel(None, 4).unwrap();
        drop(device);
        assert!(chip.requested().is_empty());

        let bus = chip.bus();
        let device = Device::new(&mut chip, bus, pins, &SpiConfig::default()).unwrap();
        assert_eq!(device.irq_lines(), IrqLines::DIO3);
        assert_eq!(chip.requested().len(), 6);
    }

    #[test]
    fn busy_and_reset_without_enables() {
        let (mut device, chip) = open(-1, -1, -1);

        chip.set_level(BUSY, true);
        assert!(device.gpio_read(GpioPinFunction::Busy));
        chip.set_level(BUSY, false);
        assert!(!device.gpio_read(GpioPinFunction::Busy));

        device.gpio_write(GpioPinFunction::Reset, false);
        device.gpio_write(GpioPinFunction::Reset, true);
        device.pre_tx();
        device.post_tx();
        device.pre_rx();
        device.post_rx();

        assert_eq!(
            chip.trace(),
            vec![
                Trace::Level { line: NRST, high: false },
                Trace::Level { line: NRST, high: true },
            ]
        );
    }

    #[test]
    fn unsupported_functions_have_defaults() {
        let (mut device, chip) = open(4, -1, -1);
        chip.set_level(4, true);

        assert!(!device.gpio_read(GpioPinFunction::Reset));
        assert!(!device.gpio_read(GpioPinFunction::Dio3));
        device.gpio_write(GpioPinFunction::Busy, true);
        device.gpio_write(GpioPinFunction::Dio1, true);
        assert!(chip.trace().is_empty());
    }

    #[test]
    fn tx_and_rx_strobes_touch_only_their_line() {
        let (mut device, chip) = open(-1, TX_EN as i32, RX_EN as i32);

        device.pre_tx();
        device.post_tx();
        assert_eq!(
            chip.trace(),
            vec![
                Trace::Level { line: TX_EN, high: true },
                Trace::Level { line: TX_EN, high: false },
            ]
        );

        chip.clear_trace();
        device.pre_rx();
        device.post_rx();
        assert_eq!(
            chip.trace(),
            vec![
                Trace::Level { line: RX_EN, high: true },
                Trace::Level { line: RX_EN, high: false },
            ]
        );
    }

    #[test]
    fn hal_transfer_is_framed() {
        let (mut device, chip) = open(-1, -1, -1);
        chip.respond_with(&[0x00, 0x5A]);

        let mut input = [0u8; 2];
        device.spi_transfer(&[0x15, 0x00], &mut input).unwrap();

        assert_eq!(input, [0x00, 0x5A]);
        assert_eq!(
            chip.trace(),
            vec![
                Trace::Level { line: NSS, high: true },
                Trace::Transfer {
                    out: vec![0x15, 0x00]
                },
                Trace::Level { line: NSS, high: false },
            ]
        );
    }

    #[test]
    fn transfer_error_propagates_after_release() {
        let (mut device, chip) = open(-1, -1, -1);
        chip.fail_next_transfer();

        let mut input = [0u8; 1];
        assert!(matches!(
            device.spi_transfer(&[0xC0], &mut input),
            Err(Error::Spi(_))
        ));
        assert!(!chip.level(NSS));
    }

    #[test]
    fn speed_and_lock_controls() {
        let (mut device, chip) = open(-1, -1, -1);

        device.set_spi_speed(4_000_000).unwrap();
        assert_eq!(chip.speed_hz(), 4_000_000);

        let lock = ExternalLock::new();
        device.set_external_lock(lock.clone()).unwrap();
        device.set_external_lock(lock).unwrap();
        assert!(matches!(
            device.set_external_lock(ExternalLock::new()),
            Err(Error::LockAlreadySet)
        ));
    }

    #[test]
    fn lock_can_be_supplied_at_construction() {
        let (device, _chip) = open(-1, -1, -1);
        let lock = ExternalLock::new();
        let mut device = device.with_external_lock(lock.clone()).unwrap();

        let held = lock.lock();
        drop(held);
        assert!(device.transfer(&[0x01]).is_ok());
    }

    #[test]
    fn irq_channel_drives_status_reads_on_owner_thread() {
        let (mut device, chip) = open(4, -1, -1);
        assert_eq!(device.irq_lines(), IrqLines::DIO3);

        let events = device.start_irq_channel(None, 8).unwrap();
        assert_eq!(device.irq_state(), DispatcherState::Running);

        let injector = chip.injector();
        injector.pulse(IrqLine::Dio3, 100);
        injector.edge(IrqLine::Dio3, Edge::Falling, 200);
        injector.pulse(IrqLine::Dio3, 300);

        let first = events.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.timestamp_ns, 100);
        assert_eq!(second.timestamp_ns, 300);

        // GetIrqStatus
        let status = device.transfer(&[0x15, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(status.len(), 4);

        device.stop_irq_handler().unwrap();
        assert!(events.try_recv().is_err());
        assert_eq!(device.dropped_irq_events(), 0);
        assert_eq!(device.irq_state(), DispatcherState::Stopped);
    }

    #[test]
    fn irq_hook_runs_per_rising_edge() {
        let (mut device, chip) = open(4, -1, -1);
        let (tx, rx) = std::sync::mpsc::channel();
        device
            .start_irq_handler(None, move |event| tx.send(event).unwrap())
            .unwrap();

        chip.injector().pulse(IrqLine::Dio3, 7);
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.line, IrqLine::Dio3);

        device
            .stop_irq_handler_timeout(Duration::from_secs(2))
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
