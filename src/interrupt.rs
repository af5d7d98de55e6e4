//! Interrupt plumbing between drivers and the application's vector table.
//!
//! Drivers don't know how the application routes its PIE vectors, so they take an
//! `Interrupt` handle for enabling and masking their line, and expose their handler body
//! through `InterruptTask` for the application to call from the vector.

use crate::toggle::Toggle;

/// One maskable interrupt line.
pub trait Interrupt {
    /// Masks the line and returns whether it was enabled.
    fn disable(&mut self) -> bool;

    /// Unmasks the line if `status` is true. `enable(false)` does nothing, so the result of
    /// `disable` can be passed straight back.
    fn enable(&mut self, status: bool);
}

/// An interrupt handler body.
pub trait InterruptTask {
    fn handler(&mut self);
}

impl Interrupt for Toggle<'_> {
    fn disable(&mut self) -> bool {
        Toggle::disable(self)
    }

    fn enable(&mut self, status: bool) {
        Toggle::enable(self, status)
    }
}

/// A line that is always available, for hosts and tests without a PIE.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoInterrupt {
    enabled: bool,
}

impl NoInterrupt {
    pub const fn new() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Interrupt for NoInterrupt {
    fn disable(&mut self) -> bool {
        core::mem::replace(&mut self.enabled, false)
    }

    fn enable(&mut self, status: bool) {
        if status {
            self.enabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::Reg;

    fn mask_and_restore<I: Interrupt>(line: &mut I) -> bool {
        let was = line.disable();
        line.enable(was);
        was
    }

    #[test]
    fn toggle_as_interrupt_line() {
        let reg = Reg::new(0u16);
        let mut line = Toggle::new(&reg, 3);
        assert!(!mask_and_restore(&mut line));
        assert_eq!(reg.read(), 0);

        Interrupt::enable(&mut line, true);
        assert!(mask_and_restore(&mut line));
        assert_eq!(reg.read(), 1 << 3);
    }

    #[test]
    fn no_interrupt() {
        let mut line = NoInterrupt::new();
        line.enable(false);
        assert!(!line.is_enabled());
        line.enable(true);
        assert!(line.disable());
        assert!(!line.is_enabled());
    }
}
