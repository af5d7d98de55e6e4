//! Dead-band generator: rising and falling edge delays, and the DBCTL switches that route
//! and invert the delayed signals.

use super::PwmController;
use crate::toggle::Toggle;

/// Widest delay the 10-bit DBRED/DBFED fields hold, in TBCLK ticks.
const MAX_DELAY: u16 = 0x3ff;

// DBCTL bit positions, indexed by channel.
const OUT_MODE_BITS: [u8; 2] = [1, 0];
const POLSEL_BITS: [u8; 2] = [2, 3];
const IN_MODE_BITS: [u8; 2] = [4, 5];

pub trait DeadBand {
    /// Rising-edge delay, in ns. Negative or NaN values are ignored.
    fn set_rising_delay(&mut self, ns: f32);

    /// The requested delay if `set`, else the programmed tick count converted back to ns.
    fn rising_delay(&self, set: bool) -> f32;

    /// Falling-edge delay, in ns. Negative or NaN values are ignored.
    fn set_falling_delay(&mut self, ns: f32);

    fn falling_delay(&self, set: bool) -> f32;

    /// Source selection for the delay of `channel` (DBCTL.IN_MODE).
    fn input(&self, channel: usize) -> Toggle<'_>;

    /// Output routing through the delay of `channel` (DBCTL.OUT_MODE).
    fn output(&self, channel: usize) -> Toggle<'_>;

    /// Inversion of the delayed `channel` (DBCTL.POLSEL).
    fn polarity(&self, channel: usize) -> Toggle<'_>;
}

/// The dead-band submodule of one controller.
pub struct DeadBandUnit<'c, 'a> {
    pwm: &'c mut PwmController<'a>,
}

impl<'a> PwmController<'a> {
    /// Every module on this device has a dead-band generator.
    pub fn is_dead_banded(&self) -> bool {
        true
    }

    pub fn dead_band(&mut self) -> DeadBandUnit<'_, 'a> {
        DeadBandUnit { pwm: self }
    }
}

impl DeadBandUnit<'_, '_> {
    fn ticks(&self, ns: f32) -> u16 {
        let ticks = ns / self.pwm.tick_ns() + 0.5;
        (ticks as u16).min(MAX_DELAY)
    }

    fn key(&self, bits: &[u8; 2], channel: usize) -> Toggle<'_> {
        match bits.get(channel) {
            Some(&bit) => Toggle::new(self.pwm.regs.dbctl.as_reg(), bit),
            None => Toggle::illegal(),
        }
    }
}

impl DeadBand for DeadBandUnit<'_, '_> {
    fn set_rising_delay(&mut self, ns: f32) {
        if ns.is_nan() || ns < 0. {
            return;
        }
        let ticks = self.ticks(ns);
        self.pwm.regs.dbred.set_del(ticks);
        self.pwm.dead_band.rising = ns;
    }

    fn rising_delay(&self, set: bool) -> f32 {
        if set {
            self.pwm.dead_band.rising
        } else {
            self.pwm.regs.dbred.del() as f32 * self.pwm.tick_ns()
        }
    }

    fn set_falling_delay(&mut self, ns: f32) {
        if ns.is_nan() || ns < 0. {
            return;
        }
        let ticks = self.ticks(ns);
        self.pwm.regs.dbfed.set_del(ticks);
        self.pwm.dead_band.falling = ns;
    }

    fn falling_delay(&self, set: bool) -> f32 {
        if set {
            self.pwm.dead_band.falling
        } else {
            self.pwm.regs.dbfed.del() as f32 * self.pwm.tick_ns()
        }
    }

    fn input(&self, channel: usize) -> Toggle<'_> {
        self.key(&IN_MODE_BITS, channel)
    }

    fn output(&self, channel: usize) -> Toggle<'_> {
        self.key(&OUT_MODE_BITS, channel)
    }

    fn polarity(&self, channel: usize) -> Toggle<'_> {
        self.key(&POLSEL_BITS, channel)
    }
}
