//! Single-bit switches inside control registers.
//!
//! Dead-band keys, the chopper enable, the phase-load enable and the module interrupt
//! enable are all one bit each. `Toggle` gives them one interface whose `disable` reports
//! the previous state, so callers can write
//!
//! ```ignore
//! let was = key.disable();
//! // reconfigure
//! key.enable(was);
//! ```
//!
//! without branching: `enable(false)` leaves the bit alone.

use crate::regs::Reg;

/// One bit in a 16-bit control register. Several toggles may share a register; each
/// read-modify-write runs inside a critical section.
#[derive(Clone, Copy)]
pub struct Toggle<'a> {
    reg: Option<&'a Reg<u16>>,
    bit: u8,
}

impl<'a> Toggle<'a> {
    pub(crate) fn new(reg: &'a Reg<u16>, bit: u8) -> Self {
        Self {
            reg: Some(reg),
            bit: bit & 0xf,
        }
    }

    /// A key that is bound to nothing, handed out for invalid channel indices. It always
    /// reads as disabled and ignores `enable`.
    pub(crate) fn illegal() -> Self {
        Self { reg: None, bit: 0 }
    }

    /// Clears the bit and returns whether it was set.
    pub fn disable(&self) -> bool {
        match self.reg {
            Some(reg) => critical_section::with(|_| {
                let was = reg.bit(self.bit);
                reg.set_bit(self.bit, false);
                was
            }),
            None => false,
        }
    }

    /// Sets the bit if `status` is true. `enable(false)` does nothing.
    pub fn enable(&self, status: bool) {
        if !status {
            return;
        }
        if let Some(reg) = self.reg {
            critical_section::with(|_| reg.set_bit(self.bit, true));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reg.map_or(false, |reg| reg.bit(self.bit))
    }

    /// Bit position within the register.
    pub fn bit(&self) -> Option<u8> {
        self.reg.map(|_| self.bit)
    }
}

#[cfg(feature = "embedded-hal")]
#[cfg_attr(docsrs, doc(cfg(feature = "embedded-hal")))]
impl embedded_hal::digital::v2::OutputPin for Toggle<'_> {
    type Error = void::Void;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.disable();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.enable(true);
        Ok(())
    }
}

#[cfg(feature = "embedded-hal")]
#[cfg_attr(docsrs, doc(cfg(feature = "embedded-hal")))]
impl embedded_hal::digital::v2::StatefulOutputPin for Toggle<'_> {
    fn is_set_high(&self) -> Result<bool, Self::Error> {
        Ok(self.is_enabled())
    }

    fn is_set_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.is_enabled())
    }
}
