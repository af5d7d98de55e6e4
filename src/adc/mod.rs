//! 12-bit ADC with its conversion sequencer.
//!
//! `AdcDriver` reads the system clock and guards the single ADC instance. `AdcController`
//! powers the analog core, sets the ADC clock and the sampling mode, and hands out the
//! `SequenceController` that binds a sample ring (`AdcTask`) and fills it from the sequencer
//! interrupt, usually paced by an ePWM start-of-conversion trigger.

use crate::{
    clocks::{self, ClockError, HspClkDiv},
    interrupt::Interrupt,
    regs::{AdcRegisters, SysRegisters},
    registry::{LockError, Registry, Slot},
};

mod sequence;
mod task;

pub use sequence::SequenceController;
pub use task::{AdcTask, BlockView, SampleBuffer, ILLEGAL_SAMPLE};

/// Sequencers handed out by one controller. The cascaded sequencer is the only one used.
pub const SEQUENCES: usize = 1;

/// Conversion result width, in bits.
pub const RESOLUTION: u32 = 12;

/// Result registers.
pub const RESULTS: usize = 16;

/// Largest ADCCLKPS code.
const MAX_ADCCLKPS: u32 = 0xf;

// ADCTRL3.ADCBGRFDN: bandgap and reference powered.
const BANDGAP_REFERENCE_ON: u16 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The ADC clock can't be derived, or the system clock is unusable.
    Clock(ClockError),
    /// The ADC or its sequencer is owned elsewhere, or the index is invalid.
    Lock(LockError),
    /// Too few or too many channels for the sampling mode.
    InvalidChannelCount,
    /// A channel code the sampling mode can't convert.
    InvalidChannel,
    /// The task's results per channel don't match the sampling mode.
    InvalidResultCount,
    /// A task is already bound to the sequencer.
    AlreadyBound,
    /// No task is bound.
    NoTask,
    /// No block was filled in time.
    Timeout,
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

impl From<LockError> for Error {
    fn from(e: LockError) -> Self {
        Self::Lock(e)
    }
}

/// Sampling mode, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// One 16-slot sequencer converting one input at a time.
    Sequential,
    /// One 16-slot sequencer sampling an A and a B input together per slot.
    SimultaneousCascaded,
    /// Two 8-slot sequencers, A inputs on the first and B inputs on the second, sampled in
    /// simultaneous pairs.
    SimultaneousDual,
}

impl Mode {
    /// Results each listed channel contributes per sequence.
    pub fn results_per_channel(self) -> usize {
        match self {
            Self::SimultaneousCascaded => 2,
            _ => 1,
        }
    }
}

/// What the producer does when every block of the ring is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Overflow {
    /// Give up the oldest full block and overwrite it.
    #[default]
    DropOldest,
    /// Discard the incoming sequence.
    DropNewest,
}

/// Start-of-conversion source for the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    /// ePWM SOCA.
    PwmSocA,
    /// ePWM SOCB.
    PwmSocB,
}

/// Input codes in sequential mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelSequential {
    A0 = 0,
    A1 = 1,
    A2 = 2,
    A3 = 3,
    A4 = 4,
    A5 = 5,
    A6 = 6,
    A7 = 7,
    B0 = 8,
    B1 = 9,
    B2 = 10,
    B3 = 11,
    B4 = 12,
    B5 = 13,
    B6 = 14,
    B7 = 15,
}

/// Input pair codes in simultaneous modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelSimultaneous {
    A0B0 = 0,
    A1B1 = 1,
    A2B2 = 2,
    A3B3 = 3,
    A4B4 = 4,
    A5B5 = 5,
    A6B6 = 6,
    A7B7 = 7,
}

impl From<ChannelSequential> for u8 {
    fn from(c: ChannelSequential) -> Self {
        c as u8
    }
}

impl From<ChannelSimultaneous> for u8 {
    fn from(c: ChannelSimultaneous) -> Self {
        c as u8
    }
}

/// Configuration applied at construction.
#[derive(Clone, Copy)]
pub struct AdcConfig {
    pub mode: Mode,
    pub overflow: Overflow,
    /// Acquisition window, ADCTRL1.ACQ_PS. The S/H window is `acquisition_window + 1`
    /// ADC clocks.
    pub acquisition_window: u8,
    /// CPU cycles to wait for the analog core to power up.
    pub power_up_cycles: u32,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            mode: Mode::SimultaneousCascaded,
            overflow: Overflow::DropOldest,
            acquisition_window: 0,
            // 5 ms at 150 MHz.
            power_up_cycles: 750_000,
        }
    }
}

/// The ADC clock chain: HISPCP, then ADCCLKPS.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdcClock {
    pub hispcp: HspClkDiv,
    pub adcclkps: u16,
    /// Achieved ADCCLK, in Hz.
    pub clock: u32,
}

impl AdcClock {
    /// Finds the chain for the fastest ADCCLK not above `target`, over every HISPCP and
    /// ADCCLKPS pair (`/2k`, or `/1` for 0). Among equal results the smallest ADCCLKPS, then
    /// the smallest HISPCP, wins.
    pub fn derive(sysclk: u32, target: u32) -> Result<Self, ClockError> {
        if target == 0 || target > sysclk {
            return Err(ClockError::NoDivider);
        }

        let mut best: Option<Self> = None;
        for k in 0..=MAX_ADCCLKPS {
            for hispcp in HspClkDiv::ALL {
                let hspclk = sysclk / hispcp.divisor();
                let clock = if k == 0 { hspclk } else { hspclk / (2 * k) };
                if clock == 0 || clock > target {
                    continue;
                }
                if best.map_or(true, |b| clock > b.clock) {
                    best = Some(Self {
                        hispcp,
                        adcclkps: k as u16,
                        clock,
                    });
                }
            }
        }

        best.ok_or(ClockError::NoDivider)
    }
}

/// State shared by the ADC.
pub struct AdcDriver<'a> {
    sys: &'a SysRegisters,
    regs: &'a AdcRegisters,
    sysclk: u32,
    registry: Registry<1>,
}

impl<'a> AdcDriver<'a> {
    pub fn new(
        sys: &'a SysRegisters,
        regs: &'a AdcRegisters,
        source_clock: u32,
    ) -> Result<Self, Error> {
        let sysclk = clocks::cpu_clock(sys, source_clock)?;
        Ok(Self {
            sys,
            regs,
            sysclk,
            registry: Registry::new(),
        })
    }

    pub fn sysclk(&self) -> u32 {
        self.sysclk
    }

    pub fn is_locked(&self) -> bool {
        self.registry.is_locked(0)
    }
}

/// Owner of the ADC.
pub struct AdcController<'a> {
    driver: &'a AdcDriver<'a>,
    _slot: Slot<'a, 1>,
    sequences: Registry<SEQUENCES>,
    cfg: AdcConfig,
    clock: AdcClock,
}

impl<'a> AdcController<'a> {
    /// Powers up the ADC with an ADCCLK as close to `clock` as the prescalers allow without
    /// exceeding it.
    pub fn new(driver: &'a AdcDriver<'a>, clock: u32, cfg: AdcConfig) -> Result<Self, Error> {
        let slot = driver.registry.acquire(0)?;
        let adc_clock = AdcClock::derive(driver.sysclk, clock)?;
        let (sys, regs) = (driver.sys, driver.regs);

        critical_section::with(|_| {
            sys.pclkcr0.set_adcenclk(1);
            sys.hispcp.set_hspclk(adc_clock.hispcp.bits());
        });

        regs.adctrl1.set_susmod(0);
        regs.adctrl3.set_adcbgrfdn(BANDGAP_REFERENCE_ON);
        regs.adctrl3.set_adcpwdn(1);
        clocks::delay(cfg.power_up_cycles);

        regs.adctrl3.set_adcclkps(adc_clock.adcclkps);
        regs.adctrl1.set_cps(0);
        regs.adctrl1.set_acq_ps(cfg.acquisition_window as u16);

        let (smode, casc) = match cfg.mode {
            Mode::Sequential => (0, 1),
            Mode::SimultaneousCascaded => (1, 1),
            Mode::SimultaneousDual => (1, 0),
        };
        regs.adctrl3.set_smode_sel(smode);
        regs.adctrl1.set_seq_casc(casc);

        debug!("ADC up, ADCCLK {} Hz ({:?})", adc_clock.clock, cfg.mode);

        Ok(Self {
            driver,
            _slot: slot,
            sequences: Registry::new(),
            cfg,
            clock: adc_clock,
        })
    }

    /// Claims sequencer `index`, which signals completion on `interrupt`.
    pub fn sequence<I: Interrupt>(
        &self,
        index: usize,
        interrupt: I,
    ) -> Result<SequenceController<'_, I>, Error> {
        let slot = self.sequences.acquire(index)?;
        Ok(SequenceController::new(
            self.driver.regs,
            self.cfg.mode,
            self.cfg.overflow,
            interrupt,
            slot,
        ))
    }

    /// Conversion result width, in bits.
    pub fn resolution(&self) -> u32 {
        RESOLUTION
    }

    /// The achieved ADCCLK, in Hz.
    pub fn clock_frequency(&self) -> u32 {
        self.clock.clock
    }

    pub fn clock(&self) -> AdcClock {
        self.clock
    }

    pub fn mode(&self) -> Mode {
        self.cfg.mode
    }

    pub fn sequences_number(&self) -> usize {
        SEQUENCES
    }
}

impl Drop for AdcController<'_> {
    fn drop(&mut self) {
        let regs = self.driver.regs;
        regs.adctrl3.set_adcpwdn(0);
        regs.adctrl3.set_adcbgrfdn(0);
        critical_section::with(|_| self.driver.sys.pclkcr0.set_adcenclk(0));
        debug!("ADC released");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn clocked_sys() -> SysRegisters {
        let sys = SysRegisters::new();
        sys.pllcr.set_div(10);
        sys.pllsts.set_divsel(2);
        sys
    }

    #[test]
    fn clock_chain() {
        let c = AdcClock::derive(150_000_000, 25_000_000).unwrap();
        assert_eq!((c.hispcp, c.adcclkps, c.clock), (HspClkDiv::Div6, 0, 25_000_000));

        let c = AdcClock::derive(150_000_000, 12_500_000).unwrap();
        assert_eq!((c.hispcp, c.adcclkps, c.clock), (HspClkDiv::Div12, 0, 12_500_000));

        // HSPCLK / 26 from a /6 HISPCP beats anything the /14 setting can reach.
        let c = AdcClock::derive(150_000_000, 1_000_000).unwrap();
        assert_eq!((c.hispcp, c.adcclkps, c.clock), (HspClkDiv::Div6, 13, 961_538));

        // Nothing in the table lands closer to the target.
        for target in [1_000_000, 3_300_000, 7_000_000, 20_000_000] {
            let c = AdcClock::derive(150_000_000, target).unwrap();
            assert!(c.clock <= target);
            for hispcp in HspClkDiv::ALL {
                let hspclk = 150_000_000 / hispcp.divisor();
                for k in 0..=MAX_ADCCLKPS {
                    let clock = if k == 0 { hspclk } else { hspclk / (2 * k) };
                    assert!(clock > target || clock <= c.clock);
                }
            }
        }

        assert_eq!(AdcClock::derive(150_000_000, 0), Err(ClockError::NoDivider));
        assert_eq!(
            AdcClock::derive(150_000_000, 200_000_000),
            Err(ClockError::NoDivider)
        );
        // Below HSPCLK / 30.
        assert_eq!(AdcClock::derive(150_000_000, 300_000), Err(ClockError::NoDivider));
    }

    #[test]
    fn power_up_and_down() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let cfg = AdcConfig {
            acquisition_window: 3,
            power_up_cycles: 0,
            ..Default::default()
        };
        let adc = AdcController::new(&driver, 12_500_000, cfg).unwrap();

        assert_eq!(adc.clock_frequency(), 12_500_000);
        assert_eq!(adc.resolution(), 12);
        assert_eq!(adc.mode(), Mode::SimultaneousCascaded);
        assert_eq!(adc.sequences_number(), 1);
        assert_eq!(sys.pclkcr0.adcenclk(), 1);
        assert_eq!(sys.hispcp.hspclk(), HspClkDiv::Div12.bits());
        assert_eq!(regs.adctrl3.adcbgrfdn(), 3);
        assert_eq!(regs.adctrl3.adcpwdn(), 1);
        assert_eq!(regs.adctrl3.smode_sel(), 1);
        assert_eq!(regs.adctrl1.seq_casc(), 1);
        assert_eq!(regs.adctrl1.acq_ps(), 3);

        assert_eq!(
            AdcController::new(&driver, 12_500_000, cfg).err(),
            Some(Error::Lock(LockError::InUse))
        );

        drop(adc);
        assert!(!driver.is_locked());
        assert_eq!(sys.pclkcr0.adcenclk(), 0);
        assert_eq!(regs.adctrl3.adcpwdn(), 0);
        assert_eq!(regs.adctrl3.adcbgrfdn(), 0);
    }

    #[test]
    fn mode_selection() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        for (mode, smode, casc) in [
            (Mode::Sequential, 0, 1),
            (Mode::SimultaneousDual, 1, 0),
        ] {
            let cfg = AdcConfig {
                mode,
                power_up_cycles: 0,
                ..Default::default()
            };
            let adc = AdcController::new(&driver, 25_000_000, cfg).unwrap();
            assert_eq!(regs.adctrl3.smode_sel(), smode);
            assert_eq!(regs.adctrl1.seq_casc(), casc);
            assert_eq!(adc.mode(), mode);
        }
    }
}
