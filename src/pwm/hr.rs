//! High-resolution PWM on channel A, through the micro-edge positioner (MEP).
//!
//! The MEP scale factor (MEP steps per TBCLK period) drifts with temperature and voltage,
//! so it comes from a calibration routine supplied by the application, usually a wrapper
//! around the vendor SFO library.

use super::{Error, PwmController, Snapshot};

/// Largest believable MEP scale factor.
pub const MAX_MEP: u16 = 310;

/// High-resolution mode needs at least this SYSCLKOUT.
const HR_MIN_SYSCLK: u32 = 60_000_000;

/// Calibration attempts before giving up.
const CALIBRATION_POLLS: u32 = 1_000;

/// An MEP calibration routine.
pub trait MepCalibration {
    /// Advances calibration of module `index` (zero-based). `hr_active` says whether the
    /// module is already running in high-resolution mode. Returns `WouldBlock` until a
    /// scale factor is available.
    fn calibrate(&mut self, index: usize, hr_active: bool) -> nb::Result<u16, ()>;
}

pub(crate) fn valid_mep(mep: u16) -> Option<u16> {
    (1..=MAX_MEP).contains(&mep).then_some(mep)
}

impl PwmController<'_> {
    /// Calibrates the MEP and switches CMPAHR on, controlling the rising edge of
    /// channel A. Fails when TBCLK isn't SYSCLKOUT or SYSCLKOUT is below 60 MHz.
    pub fn enable_high_resolution<C: MepCalibration>(
        &mut self,
        calibration: &mut C,
    ) -> Result<(), Error> {
        let sysclk = self.driver.sysclk();
        if self.tbclk != sysclk || sysclk < HR_MIN_SYSCLK {
            return Err(Error::HighResolutionUnavailable);
        }
        self.update_mep(calibration)?;

        let hrcnfg = &self.regs.hrcnfg;
        hrcnfg.write(0);
        // Duty control on the rising edge, shadow loaded at CTR = 0.
        hrcnfg.set_ctlmode(0);
        hrcnfg.set_edgmode(1);
        hrcnfg.set_hrload(0);
        self.high_resolution = true;
        self.program();
        debug!("ePWM{} high resolution on", self.index() + 1);
        Ok(())
    }

    pub fn disable_high_resolution(&mut self) {
        self.regs.tbphshr.write(0);
        self.regs.cmpahr.write(0);
        self.regs.hrcnfg.set_edgmode(0);
        self.high_resolution = false;
    }

    pub fn is_high_resolution(&self) -> bool {
        self.high_resolution
    }

    /// Re-runs calibration, e.g. periodically from the background loop, and refreshes the
    /// MEP extension of the current task.
    pub fn update_mep<C: MepCalibration>(&mut self, calibration: &mut C) -> Result<u16, Error> {
        let index = self.index();
        for _ in 0..CALIBRATION_POLLS {
            match calibration.calibrate(index, self.high_resolution) {
                Ok(mep) => {
                    let mep = valid_mep(mep).ok_or_else(|| {
                        error!("ePWM{}: MEP scale factor {} rejected", index + 1, mep);
                        Error::Calibration
                    })?;
                    self.driver.set_mep(index, mep, true);
                    self.program();
                    return Ok(mep);
                }
                Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
                Err(nb::Error::Other(())) => return Err(Error::Calibration),
            }
        }
        error!("ePWM{}: MEP calibration timed out", index + 1);
        Err(Error::Calibration)
    }

    /// CMPAHR for channel A of `task`: the fractional compare count scaled to MEP steps.
    pub(super) fn hr_extension(&self, task: &Snapshot) -> Option<u16> {
        let mep = self.driver.scale_factor()? as f32;
        let count = self.tbclk.div_ceil(task.frequency.max(1)) as f32;
        let value = task.duty[0] * count / 100.;
        let fraction = value - (value as u32) as f32;
        let ext = fraction * mep + 1.5;
        Some(ext.min(u8::MAX as f32) as u16)
    }
}
