//! Clock derivation: the CPU clock from the PLL state, PLL programming, and the integer
//! prescaler chains that bring SYSCLKOUT down to peripheral clocks.
//!
//! All frequencies are in Hz. Prescalers only have discrete steps, so every derivation
//! returns the clock actually achieved. Use that value for timing math, not the request.

use crate::regs::SysRegisters;

/// Highest allowed PLL output (VCOCLK), in Hz.
pub const VCO_MAX: u32 = 300_000_000;

/// Largest PLLCR multiplier; higher values are reserved.
pub const PLL_MUL_MAX: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// No prescaler setting reaches the requested clock: it is zero, above the source, or
    /// below the slowest achievable rate.
    NoDivider,
    /// The oscillator is off.
    OscillatorOff,
    /// The PLL is off while PLLCR requests a multiplier.
    PllMisconfigured,
    /// PLLSTS.DIVSEL holds a reserved value.
    InvalidDivSel,
    /// The requested multiplier is reserved, or would overdrive the VCO.
    PllOutOfRange,
    /// The missing-clock detector has tripped.
    MissingClock,
    /// The PLL didn't report lock in time.
    PllLockTimeout,
}

/// Time-base clock prescale (TBCTL.CLKDIV): powers of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Clkdiv {
    Div1 = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
}

impl Clkdiv {
    pub const ALL: [Self; 8] = [
        Self::Div1,
        Self::Div2,
        Self::Div4,
        Self::Div8,
        Self::Div16,
        Self::Div32,
        Self::Div64,
        Self::Div128,
    ];

    pub fn divisor(self) -> u32 {
        1 << (self as u32)
    }

    pub fn bits(self) -> u16 {
        self as u16
    }
}

/// High-speed prescale: TBCTL.HSPCLKDIV on the ePWM, and the system HISPCP register that
/// feeds the ADC. Both use the same encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HspClkDiv {
    Div1 = 0,
    Div2 = 1,
    Div4 = 2,
    Div6 = 3,
    Div8 = 4,
    Div10 = 5,
    Div12 = 6,
    Div14 = 7,
}

impl HspClkDiv {
    pub const ALL: [Self; 8] = [
        Self::Div1,
        Self::Div2,
        Self::Div4,
        Self::Div6,
        Self::Div8,
        Self::Div10,
        Self::Div12,
        Self::Div14,
    ];

    pub fn divisor(self) -> u32 {
        match self {
            Self::Div1 => 1,
            other => 2 * other as u32,
        }
    }

    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Picks the largest setting whose divisor doesn't exceed `ratio`. Ratios of 14 and
    /// above all map to `Div14`. Returns `None` for a ratio of zero.
    pub fn from_ratio(ratio: u32) -> Option<Self> {
        Some(match ratio {
            0 => return None,
            1 => Self::Div1,
            2..=3 => Self::Div2,
            4..=5 => Self::Div4,
            6..=7 => Self::Div6,
            8..=9 => Self::Div8,
            10..=11 => Self::Div10,
            12..=13 => Self::Div12,
            _ => Self::Div14,
        })
    }
}

/// A two-stage prescaler chain, CLKDIV followed by HSPCLKDIV, and the clock it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockDivider {
    pub clkdiv: Clkdiv,
    pub hspclkdiv: HspClkDiv,
    /// The achieved clock, in Hz.
    pub clock: u32,
}

impl ClockDivider {
    /// Finds the chain giving the fastest clock that doesn't exceed `target`. Among equal
    /// results the smallest CLKDIV wins.
    pub fn derive(source: u32, target: u32) -> Result<Self, ClockError> {
        if target == 0 || target > source {
            return Err(ClockError::NoDivider);
        }

        let mut best: Option<Self> = None;
        for clkdiv in Clkdiv::ALL {
            for hspclkdiv in HspClkDiv::ALL {
                let clock = source / (clkdiv.divisor() * hspclkdiv.divisor());
                if clock == 0 || clock > target {
                    continue;
                }
                if best.map_or(true, |b| clock > b.clock) {
                    best = Some(Self {
                        clkdiv,
                        hspclkdiv,
                        clock,
                    });
                }
            }
        }

        best.ok_or(ClockError::NoDivider)
    }
}

/// Computes SYSCLKOUT from the oscillator clock and the current PLL state.
pub fn cpu_clock(sys: &SysRegisters, source: u32) -> Result<u32, ClockError> {
    if sys.pllsts.oscoff() == 1 {
        return Err(ClockError::OscillatorOff);
    }
    let div = sys.pllcr.div() as u32;
    if sys.pllsts.plloff() == 1 && div > 0 {
        return Err(ClockError::PllMisconfigured);
    }

    let m = if div != 0 { div } else { 1 };
    let d = match sys.pllsts.divsel() {
        0 | 1 => 4,
        2 => 2,
        _ => return Err(ClockError::InvalidDivSel),
    };

    match source / d * m {
        0 => Err(ClockError::NoDivider),
        sysclk => Ok(sysclk),
    }
}

/// Phase-locked loop.
pub struct Pll;

impl Pll {
    /// Programs the PLL so SYSCLKOUT approaches `cpu` from an oscillator at `source`, and
    /// returns the resulting CPU clock. Waits at most `max_polls` status reads for lock.
    pub fn init(
        sys: &SysRegisters,
        source: u32,
        cpu: u32,
        max_polls: u32,
    ) -> Result<u32, ClockError> {
        if source == 0 {
            return Err(ClockError::NoDivider);
        }
        let mul = cpu.saturating_mul(2) / source;
        if mul == 0 || mul > PLL_MUL_MAX || source.saturating_mul(mul) > VCO_MAX {
            return Err(ClockError::PllOutOfRange);
        }
        if sys.pllsts.oscoff() == 1 {
            return Err(ClockError::OscillatorOff);
        }
        if sys.pllsts.plloff() == 1 && sys.pllcr.div() > 0 {
            return Err(ClockError::PllMisconfigured);
        }
        if sys.pllsts.mclksts() == 1 {
            return Err(ClockError::MissingClock);
        }

        // DIVSEL must be /4 while the multiplier changes.
        if sys.pllsts.divsel() != 0 {
            sys.pllsts.set_divsel(0);
        }
        sys.pllsts.set_mclkoff(1);
        sys.pllcr.set_div(mul as u16);

        let mut locked = false;
        for _ in 0..max_polls {
            if sys.pllsts.plllocks() == 1 {
                locked = true;
                break;
            }
            core::hint::spin_loop();
        }
        sys.pllsts.set_mclkoff(0);
        if !locked {
            error!("PLL did not lock");
            return Err(ClockError::PllLockTimeout);
        }

        sys.pllsts.set_divsel(2);
        let sysclk = source / 2 * mul;
        debug!("PLL locked: SYSCLKOUT {} Hz", sysclk);
        Ok(sysclk)
    }
}

/// Busy-waits for roughly `cycles` CPU cycles.
pub(crate) fn delay(cycles: u32) {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "arm", target_os = "none"))] {
            cortex_m::asm::delay(cycles);
        } else {
            for _ in 0..cycles.min(1_000) {
                core::hint::spin_loop();
            }
        }
    }
}
