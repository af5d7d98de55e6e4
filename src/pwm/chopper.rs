//! PWM chopper: modulates both outputs with a high-frequency carrier, for driving pulse
//! transformers. Carrier frequency, duty and the width of the first pulse only take a
//! handful of discrete values each.

use super::PwmController;
use crate::toggle::Toggle;

// PCCTL
const CHPEN_BIT: u8 = 0;

/// Lower `(duty + 0.5)` bounds of duty codes 1 to 6.
const DUTY_THRESHOLDS: [i32; 6] = [18, 31, 43, 56, 68, 80];

const DUTY_BUCKETS: [f32; 7] = [12.5, 25., 37.5, 50., 62.5, 75., 87.5];

/// Largest OSHTWTH code.
const MAX_FIRST_PULSE: u16 = 0xf;

pub trait Chopper {
    /// Carrier frequency, in Hz. Quantized to SYSCLKOUT / 8 / n, n = 1..8.
    fn set_frequency(&mut self, frequency: u32);

    /// The request if `set`, else the carrier frequency the register yields.
    fn frequency(&self, set: bool) -> Option<u32>;

    /// Carrier duty, in percent. Quantized to 12.5 % steps between 12.5 and 87.5.
    /// Values outside 0..=100 are ignored.
    fn set_duty(&mut self, duty: f32);

    fn duty(&self, set: bool) -> Option<f32>;

    /// Width of the first, wider pulse, in ns. Quantized to multiples of 8 SYSCLKOUT
    /// periods, 1 to 16 of them.
    fn set_first_pulse(&mut self, time: u32);

    fn first_pulse(&self, set: bool) -> Option<u32>;

    /// Chopping enable, PCCTL.CHPEN.
    fn chopping(&self) -> Toggle<'_>;
}

/// The chopper submodule of one controller.
pub struct ChopperUnit<'c, 'a> {
    pwm: &'c mut PwmController<'a>,
}

impl<'a> PwmController<'a> {
    /// Every module on this device has a chopper.
    pub fn is_chopped(&self) -> bool {
        true
    }

    pub fn chopper(&mut self) -> ChopperUnit<'_, 'a> {
        ChopperUnit { pwm: self }
    }
}

fn duty_code(duty: f32) -> u16 {
    let v = (duty + 0.5) as i32;
    DUTY_THRESHOLDS.iter().filter(|&&t| v >= t).count() as u16
}

impl ChopperUnit<'_, '_> {
    fn sysclk(&self) -> u32 {
        self.pwm.driver.sysclk()
    }

    /// One OSHTWTH step, in ns.
    fn pulse_unit(&self) -> u32 {
        8_000 / (self.sysclk() / 1_000_000).max(1)
    }
}

impl Chopper for ChopperUnit<'_, '_> {
    fn set_frequency(&mut self, frequency: u32) {
        if frequency == 0 {
            return;
        }
        let div = self.sysclk() / 8 / frequency;
        let code = div.clamp(1, 8) - 1;
        self.pwm.regs.pcctl.set_chpfreq(code as u16);
        self.pwm.chopper.frequency = Some(frequency);
    }

    fn frequency(&self, set: bool) -> Option<u32> {
        if set {
            return self.pwm.chopper.frequency;
        }
        let code = self.pwm.regs.pcctl.chpfreq() as u32;
        Some(self.sysclk() / 8 / (code + 1))
    }

    fn set_duty(&mut self, duty: f32) {
        if !(0.0..=100.0).contains(&duty) {
            return;
        }
        self.pwm.regs.pcctl.set_chpduty(duty_code(duty));
        self.pwm.chopper.duty = Some(duty);
    }

    fn duty(&self, set: bool) -> Option<f32> {
        if set {
            return self.pwm.chopper.duty;
        }
        DUTY_BUCKETS
            .get(self.pwm.regs.pcctl.chpduty() as usize)
            .copied()
    }

    fn set_first_pulse(&mut self, time: u32) {
        let mult = time / self.pulse_unit();
        let code = match mult {
            0 => 0,
            m if m > 16 => MAX_FIRST_PULSE,
            m => (m - 1) as u16,
        };
        self.pwm.regs.pcctl.set_oshtwth(code);
        self.pwm.chopper.first_pulse = Some(time);
    }

    fn first_pulse(&self, set: bool) -> Option<u32> {
        if set {
            return self.pwm.chopper.first_pulse;
        }
        let code = self.pwm.regs.pcctl.oshtwth() as u32;
        Some((code + 1) * self.pulse_unit())
    }

    fn chopping(&self) -> Toggle<'_> {
        Toggle::new(self.pwm.regs.pcctl.as_reg(), CHPEN_BIT)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{clocked_sys, frames};
    use super::super::PwmDriver;
    use super::*;

    #[test]
    fn duty_buckets() {
        assert_eq!(duty_code(0.), 0);
        assert_eq!(duty_code(17.4), 0);
        // Halfway between 12.5 and 25 lands in the 25 % bucket.
        assert_eq!(duty_code(18.5), 1);
        assert_eq!(duty_code(50.), 3);
        assert_eq!(duty_code(55.4), 3);
        assert_eq!(duty_code(55.5), 4);
        assert_eq!(duty_code(87.5), 6);
        assert_eq!(duty_code(100.), 6);
    }

    #[test]
    fn carrier() {
        let sys = clocked_sys();
        let pwm = frames();
        let driver = PwmDriver::new(&sys, pwm.each_ref(), 30_000_000).unwrap();
        let mut ctl = PwmController::new(&driver, 0, 150_000_000, Default::default()).unwrap();
        assert!(ctl.is_chopped());
        let mut chopper = ctl.chopper();

        assert_eq!(chopper.frequency(true), None);
        assert_eq!(chopper.duty(true), None);

        // 150 MHz / 8 / 3
        chopper.set_frequency(6_250_000);
        assert_eq!(pwm[0].pcctl.chpfreq(), 2);
        assert_eq!(chopper.frequency(false), Some(6_250_000));
        chopper.set_frequency(100_000);
        assert_eq!(pwm[0].pcctl.chpfreq(), 7);
        assert_eq!(chopper.frequency(true), Some(100_000));
        assert_eq!(chopper.frequency(false), Some(2_343_750));
        chopper.set_frequency(0);
        assert_eq!(chopper.frequency(true), Some(100_000));

        chopper.set_duty(50.);
        assert_eq!(chopper.duty(false), Some(50.));
        chopper.set_duty(18.5);
        assert_eq!(chopper.duty(false), Some(25.));
        assert_eq!(chopper.duty(true), Some(18.5));
        chopper.set_duty(101.);
        assert_eq!(chopper.duty(true), Some(18.5));

        assert!(!chopper.chopping().is_enabled());
        chopper.chopping().enable(true);
        assert_eq!(pwm[0].pcctl.chpen(), 1);
    }

    #[test]
    fn first_pulse() {
        let sys = clocked_sys();
        let pwm = frames();
        let driver = PwmDriver::new(&sys, pwm.each_ref(), 30_000_000).unwrap();
        let mut ctl = PwmController::new(&driver, 0, 150_000_000, Default::default()).unwrap();
        let mut chopper = ctl.chopper();

        // 8 / 150 MHz is 53 ns.
        chopper.set_first_pulse(160);
        assert_eq!(pwm[0].pcctl.oshtwth(), 2);
        assert_eq!(chopper.first_pulse(false), Some(159));
        assert_eq!(chopper.first_pulse(true), Some(160));

        chopper.set_first_pulse(10);
        assert_eq!(pwm[0].pcctl.oshtwth(), 0);
        chopper.set_first_pulse(10_000);
        assert_eq!(pwm[0].pcctl.oshtwth(), 0xf);
        assert_eq!(chopper.first_pulse(false), Some(16 * 53));
    }
}
