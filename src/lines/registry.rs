use embedded_hal::digital::{InputPin, OutputPin, PinState};

use super::{GpioProvider, LineRole};
use crate::{config::PinConfig, irq::IrqLines, Error, Result};

/// Owner of every non-SPI GPIO line of one radio
///
/// Built by [`LineRegistry::acquire`], which also hands back the chip-select
/// pin (owned by the SPI transport from then on) and the interrupt edge source.
pub struct LineRegistry<I, O> {
    busy: I,
    reset: O,
    tx_enable: Option<O>,
    rx_enable: Option<O>,
    irq_lines: IrqLines,
    active: Vec<LineRole>,
}

/// Result of claiming every line of a [`PinConfig`]
pub struct AcquiredLines<P: GpioProvider> {
    pub registry: LineRegistry<P::Input, P::Output>,
    pub chip_select: P::Output,
    pub edges: P::Edges,
}

impl<I, O> LineRegistry<I, O>
where
    I: InputPin,
    O: OutputPin,
{
    /// Claims every configured line from `provider`.
    ///
    /// NSS starts at `chip_select_idle`, NRESET high (released) and both
    /// enables low. Absent optional lines are not requested.
    ///
    /// # Errors
    /// The first line that cannot be claimed aborts the whole acquisition; lines
    /// claimed before it are dropped, and so released, on return.
    pub fn acquire<P>(
        provider: &mut P,
        pins: &PinConfig,
        chip_select_idle: bool,
    ) -> Result<AcquiredLines<P>>
    where
        P: GpioProvider<Input = I, Output = O>,
    {
        pins.validate()?;
        let mut active = Vec::with_capacity(5);

        let busy = provider.request_input(LineRole::Busy, pins.busy)?;
        active.push(LineRole::Busy);

        let chip_select =
            provider.request_output(LineRole::ChipSelect, pins.nss, chip_select_idle)?;
        active.push(LineRole::ChipSelect);

        let reset = provider.request_output(LineRole::Reset, pins.nrst, true)?;
        active.push(LineRole::Reset);

        let tx_enable = pins
            .tx_en
            .map(|line| provider.request_output(LineRole::TxEnable, line, false))
            .transpose()?;
        if tx_enable.is_some() {
            active.push(LineRole::TxEnable);
        }

        let rx_enable = pins
            .rx_en
            .map(|line| provider.request_output(LineRole::RxEnable, line, false))
            .transpose()?;
        if rx_enable.is_some() {
            active.push(LineRole::RxEnable);
        }

        let irq = pins.irq_assignments();
        let edges = provider.request_edges(&irq)?;
        let irq_lines = irq
            .iter()
            .fold(IrqLines::empty(), |acc, (line, _)| acc | line.flag());

        log::debug!("acquired lines {active:?}, interrupts {irq_lines:?}");

        Ok(AcquiredLines {
            registry: Self {
                busy,
                reset,
                tx_enable,
                rx_enable,
                irq_lines,
                active,
            },
            chip_select,
            edges,
        })
    }

    /// Reads the level of an input role.
    ///
    /// # Errors
    /// * [`Error::WrongDirection`] - `role` is an output
    /// * [`Error::LineUnavailable`] - `role` is an interrupt line, owned by the
    ///   edge source
    /// * [`Error::Gpio`] - the host read failed
    pub fn read(&mut self, role: LineRole) -> Result<bool> {
        if !role.is_input() {
            return Err(Error::WrongDirection { role });
        }
        match role {
            LineRole::Busy => self.busy.is_high().map_err(Error::gpio),
            _ => Err(Error::LineUnavailable { role }),
        }
    }

    /// Drives an output role. Writing an absent optional line does nothing.
    ///
    /// # Errors
    /// * [`Error::WrongDirection`] - `role` is an input
    /// * [`Error::LineUnavailable`] - `role` is NSS, owned by the SPI transport
    /// * [`Error::Gpio`] - the host write failed
    pub fn write(&mut self, role: LineRole, high: bool) -> Result<()> {
        if role.is_input() {
            return Err(Error::WrongDirection { role });
        }
        let pin = match role {
            LineRole::Reset => Some(&mut self.reset),
            LineRole::TxEnable => self.tx_enable.as_mut(),
            LineRole::RxEnable => self.rx_enable.as_mut(),
            _ => return Err(Error::LineUnavailable { role }),
        };

        match pin {
            Some(pin) => pin.set_state(PinState::from(high)).map_err(Error::gpio),
            None => Ok(()),
        }
    }

    /// Roles claimed at construction, in acquisition order
    pub fn active_lines(&self) -> &[LineRole] {
        &self.active
    }

    /// Interrupt lines registered for edge events
    pub fn irq_lines(&self) -> IrqLines {
        self.irq_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChip, MockPin, Trace};

    type Registry = LineRegistry<MockPin, MockPin>;

    fn pins(raw: [i32; 8]) -> PinConfig {
        let [busy, tx_en, rx_en, nrst, dio1, dio2, dio3, nss] = raw;
        PinConfig::from_raw(busy, tx_en, rx_en, nrst, dio1, dio2, dio3, nss).unwrap()
    }

    #[test]
    fn reference_wiring_claims_five_lines_and_no_interrupts() {
        let mut chip = MockChip::new();
        let acquired =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, -1, 6]), false).unwrap();

        assert_eq!(
            acquired.registry.active_lines(),
            &[
                LineRole::Busy,
                LineRole::ChipSelect,
                LineRole::Reset,
                LineRole::TxEnable,
                LineRole::RxEnable
            ]
        );
        assert!(acquired.registry.irq_lines().is_empty());
        assert_eq!(chip.requested().len(), 5);
    }

    #[test]
    fn dio3_is_registered_for_edges() {
        let mut chip = MockChip::new();
        let acquired =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, 4, 6]), false).unwrap();
        assert_eq!(acquired.registry.irq_lines(), IrqLines::DIO3);
        assert_eq!(chip.edge_lines(), vec![4]);
    }

    #[test]
    fn initial_levels() {
        let mut chip = MockChip::new();
        Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, -1, 6]), false).unwrap();

        assert!(!chip.level(6));
        assert!(chip.level(22));
        assert!(!chip.level(17));
        assert!(!chip.level(5));
    }

    #[test]
    fn failed_line_aborts_acquisition() {
        let mut chip = MockChip::new();
        chip.fail_line(22);
        let err = Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, -1, 6]), false)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Acquire {
                role: LineRole::Reset,
                ..
            }
        ));
        assert!(chip.requested().is_empty());

        chip.clear_failures();
        let acquired =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, -1, 6]), false).unwrap();
        assert_eq!(acquired.registry.active_lines().len(), 5);
    }

    #[test]
    fn dropping_the_registry_releases_its_lines() {
        let mut chip = MockChip::new();
        let acquired =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, 4, 6]), false).unwrap();
        assert_eq!(chip.requested().len(), 6);

        drop(acquired);
        assert!(chip.requested().is_empty());
        assert!(chip.edge_lines().is_empty());
    }

    #[test]
    fn absent_enables_are_silent_noops() {
        let mut chip = MockChip::new();
        let mut registry =
            Registry::acquire(&mut chip, &pins([27, -1, -1, 22, -1, -1, -1, 6]), false)
                .unwrap()
                .registry;
        chip.clear_trace();

        registry.write(LineRole::TxEnable, true).unwrap();
        registry.write(LineRole::RxEnable, true).unwrap();
        assert!(chip.trace().is_empty());
        assert!(!registry.active_lines().contains(&LineRole::TxEnable));
    }

    #[test]
    fn busy_and_reset_do_not_touch_enables() {
        let mut chip = MockChip::new();
        let mut registry =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, -1, -1, -1, 6]), false)
                .unwrap()
                .registry;
        chip.clear_trace();

        chip.set_level(27, true);
        assert!(registry.read(LineRole::Busy).unwrap());
        registry.write(LineRole::Reset, false).unwrap();

        assert_eq!(chip.trace(), vec![Trace::Level { line: 22, high: false }]);
    }

    #[test]
    fn direction_is_enforced() {
        let mut chip = MockChip::new();
        let mut registry =
            Registry::acquire(&mut chip, &pins([27, 17, 5, 22, 23, -1, -1, 6]), false)
                .unwrap()
                .registry;

        assert!(matches!(
            registry.read(LineRole::Reset),
            Err(Error::WrongDirection { .. })
        ));
        assert!(matches!(
            registry.write(LineRole::Busy, true),
            Err(Error::WrongDirection { .. })
        ));
        assert!(matches!(
            registry.write(LineRole::ChipSelect, true),
            Err(Error::LineUnavailable { .. })
        ));
        assert!(matches!(
            registry.read(LineRole::Dio1),
            Err(Error::LineUnavailable { .. })
        ));
    }
}
