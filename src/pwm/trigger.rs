//! Event trigger: turns a time-base counter event into an ADC start-of-conversion pulse.

use super::{Count, Error, PwmController};

/// ADC start-of-conversion output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Soc {
    A,
    B,
}

/// Time-base counter event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// TBCTR = 0.
    CtrZero,
    /// TBCTR = TBPRD.
    CtrPrd,
    /// TBCTR = CMPA while counting up.
    CtruCmpa,
    /// TBCTR = CMPA while counting down.
    CtrdCmpa,
    CtruCmpb,
    CtrdCmpb,
}

impl Event {
    /// ETSEL.SOCxSEL code, if the counter passes this event in `count` mode.
    fn select(self, count: Count) -> Option<u16> {
        use Count::*;
        match (self, count) {
            (Self::CtrZero, _) => Some(1),
            (Self::CtrPrd, _) => Some(2),
            (Self::CtruCmpa, Up | UpDown) => Some(4),
            (Self::CtrdCmpa, Down | UpDown) => Some(5),
            (Self::CtruCmpb, Up | UpDown) => Some(6),
            (Self::CtrdCmpb, Down | UpDown) => Some(7),
            _ => None,
        }
    }
}

pub trait EventTrigger {
    /// Routes `event` to `soc`, firing on every occurrence. An event the counting mode
    /// can't produce leaves `soc` disabled.
    fn set_event(&mut self, soc: Soc, event: Event) -> Result<(), Error>;

    /// Disables `soc`.
    fn reset_event(&mut self, soc: Soc);
}

/// The event-trigger submodule of one controller.
pub struct TriggerUnit<'c, 'a> {
    pwm: &'c mut PwmController<'a>,
}

impl<'a> PwmController<'a> {
    /// Every module on this device can trigger the ADC.
    pub fn is_triggered(&self) -> bool {
        true
    }

    pub fn event_trigger(&mut self) -> TriggerUnit<'_, 'a> {
        TriggerUnit { pwm: self }
    }
}

impl EventTrigger for TriggerUnit<'_, '_> {
    fn set_event(&mut self, soc: Soc, event: Event) -> Result<(), Error> {
        self.reset_event(soc);
        let sel = event.select(self.pwm.count).ok_or(Error::UnsupportedEvent)?;

        let regs = self.pwm.regs;
        match soc {
            Soc::A => {
                regs.etsel.set_socasel(sel);
                regs.etps.set_socaprd(1);
                regs.etsel.set_socaen(1);
            }
            Soc::B => {
                regs.etsel.set_socbsel(sel);
                regs.etps.set_socbprd(1);
                regs.etsel.set_socben(1);
            }
        }
        Ok(())
    }

    fn reset_event(&mut self, soc: Soc) {
        let etsel = &self.pwm.regs.etsel;
        match soc {
            Soc::A => {
                etsel.set_socaen(0);
                etsel.set_socasel(0);
            }
            Soc::B => {
                etsel.set_socben(0);
                etsel.set_socbsel(0);
            }
        }
    }
}
