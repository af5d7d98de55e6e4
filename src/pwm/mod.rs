//! Enhanced PWM (ePWM). Each module drives two outputs (A and B) from one time-base
//! counter, with dead-band, chopper, event-trigger and high-resolution submodules.
//!
//! `PwmDriver` owns what all modules share: the system clock, the ownership table and the
//! MEP calibration table. A `PwmController` owns one module from construction until drop.
//! Submodules are reached through narrowed handles (`dead_band()`, `chopper()`,
//! `event_trigger()`), each implementing its capability trait.

use core::cell::Cell;

use critical_section::Mutex;
use num_traits::float::Float;

use crate::{
    clocks::{self, ClockDivider, ClockError},
    regs::{Aqctl, PwmRegisters, SysRegisters},
    registry::{LockError, Registry, Slot},
    toggle::Toggle,
};

mod chopper;
mod deadband;
mod hr;
mod trigger;

pub use chopper::{Chopper, ChopperUnit};
pub use deadband::{DeadBand, DeadBandUnit};
pub use hr::{MepCalibration, MAX_MEP};
pub use trigger::{Event, EventTrigger, Soc, TriggerUnit};

/// Number of ePWM modules.
pub const PWM_MODULES: usize = 6;

/// Outputs per module.
pub const CHANNELS: usize = 2;

const CTRMODE_FREEZE: u16 = 3;

const AQ_CLEAR: u16 = 1;
const AQ_SET: u16 = 2;

// AQCSFRC: continuous force low, or no force.
#[cfg(feature = "embedded-hal")]
const FORCE_LOW: u16 = 1;
#[cfg(feature = "embedded-hal")]
const FORCE_OFF: u16 = 0;

// TBCTL
const PHSEN_BIT: u8 = 2;
// ETSEL
const INTEN_BIT: u8 = 3;

const NS_PER_S: f32 = 1_000_000_000.;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The time-base clock can't be derived, or the system clock is unusable.
    Clock(ClockError),
    /// The module index is invalid, or the module is owned elsewhere.
    Lock(LockError),
    /// The task has more duty entries than the module has outputs.
    TooManyChannels,
    /// The task frequency is outside `min_frequency()..=max_frequency()`.
    FrequencyOutOfRange,
    /// A duty is outside 0..=100 %.
    DutyOutOfRange,
    InvalidChannel,
    /// The counter event can't be produced in this counting mode.
    UnsupportedEvent,
    /// No task has been set.
    NoTask,
    /// High-resolution mode needs TBCLK = SYSCLKOUT and SYSCLKOUT of at least 60 MHz.
    HighResolutionUnavailable,
    /// The MEP calibration routine failed or returned an out-of-range scale factor.
    Calibration,
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

/// Time-base counting mode, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Count {
    /// Count up from 0 to TBPRD, then reset.
    Up,
    /// Count down from TBPRD to 0, then reload.
    Down,
    /// Count up to TBPRD and back down; one signal period is two traversals.
    UpDown,
}

impl Count {
    fn ctrmode(self) -> u16 {
        match self {
            Self::Up => 0,
            Self::Down => 1,
            Self::UpDown => 2,
        }
    }

    /// Highest signal frequency this mode can produce from `tbclk`.
    pub fn max_frequency(self, tbclk: u32) -> u32 {
        match self {
            Self::UpDown => tbclk / 2,
            _ => tbclk,
        }
    }

    /// Lowest signal frequency that still fits the 16-bit period register.
    pub fn min_frequency(self, tbclk: u32) -> u32 {
        match self {
            Self::UpDown => tbclk / 0xffff / 2 + 1,
            _ => tbclk / 0xffff + 1,
        }
    }

    /// TBPRD for a signal at `frequency`.
    pub fn period(self, tbclk: u32, frequency: u32) -> u16 {
        let count = tbclk.div_ceil(frequency.max(1));
        let period = match self {
            Self::UpDown => count / 2,
            _ => count.saturating_sub(1),
        };
        cast::u16(period).unwrap_or(u16::MAX)
    }

    /// CMPx giving `duty` percent high time against `period`.
    pub fn compare(self, period: u16, duty: f32) -> u16 {
        let prd = period as f32;
        let cmp = match self {
            Self::Up => prd * (100. - duty) / 100.,
            Self::Down => (prd + 1.) * duty / 100.,
            Self::UpDown => prd * (100. - duty) / 100. + 0.5,
        };
        // Float-to-int `as` truncates and saturates.
        cmp as u16
    }

    /// Signal frequency produced by `period`.
    pub fn signal_frequency(self, tbclk: u32, period: u16) -> u32 {
        let prd = period as u32;
        match self {
            Self::UpDown if prd == 0 => 0,
            Self::UpDown => tbclk / (2 * prd),
            _ => tbclk / (prd + 1),
        }
    }

    /// Duty percentage produced by `compare` against `period`.
    pub fn duty(self, period: u16, compare: u16) -> f32 {
        let prd = period as f32;
        let cmp = compare as f32;
        match self {
            Self::Down => cmp * 100. / (prd + 1.),
            _ if period == 0 => 0.,
            _ => (prd - cmp) * 100. / prd,
        }
    }

    /// Programs both action-qualifier registers for this mode.
    fn qualify(self, aq: &[Aqctl; CHANNELS]) {
        let [a, b] = aq;
        a.write(0);
        b.write(0);
        match self {
            Self::Up => {
                a.set_cau(AQ_SET);
                a.set_prd(AQ_CLEAR);
                b.set_cbu(AQ_SET);
                b.set_prd(AQ_CLEAR);
            }
            Self::Down => {
                a.set_cad(AQ_SET);
                a.set_prd(AQ_CLEAR);
                b.set_cbd(AQ_SET);
                b.set_prd(AQ_CLEAR);
            }
            Self::UpDown => {
                a.set_cau(AQ_SET);
                a.set_cad(AQ_CLEAR);
                b.set_cbu(AQ_SET);
                b.set_cbd(AQ_CLEAR);
            }
        }
    }
}

/// Source of the module's sync-out pulse (TBCTL.SYNCOSEL).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SyncOut {
    /// Pass the sync-in pulse through.
    Input = 0,
    /// Counter equals zero.
    Period = 1,
    /// Counter equals CMPB.
    Edge = 2,
    Disable = 3,
}

impl SyncOut {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0 => Self::Input,
            1 => Self::Period,
            2 => Self::Edge,
            _ => Self::Disable,
        }
    }
}

/// Counter behavior on an emulation halt (TBCTL.FREE_SOFT).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FreeSoft {
    StopImmediately = 0,
    StopAfterCycle = 1,
    FreeRun = 2,
}

/// One output of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    A = 0,
    B = 1,
}

/// Controller lifecycle. A failed construction never yields a controller, so there is no
/// uninitialized state to represent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Configured, counter frozen, never started.
    Constructed,
    Running,
    /// Counter frozen by `stop`. Registers are kept and `start` resumes.
    Stopped,
}

/// Configuration applied at construction.
#[derive(Clone, Copy)]
pub struct PwmConfig {
    pub count: Count,
    pub sync: SyncOut,
    pub free_soft: FreeSoft,
    /// Leave the module interrupt (ETSEL.INTEN) enabled.
    pub interrupt: bool,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            count: Count::UpDown,
            sync: SyncOut::Input,
            free_soft: FreeSoft::FreeRun,
            interrupt: false,
        }
    }
}

/// A waveform request: signal frequency in Hz and high time per output, in percent.
/// Outputs past `N` are driven at 0 %.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PwmTask<const N: usize> {
    pub frequency: u32,
    pub duty: [f32; N],
}

impl<const N: usize> PwmTask<N> {
    pub const fn new(frequency: u32, duty: [f32; N]) -> Self {
        Self { frequency, duty }
    }
}

#[derive(Clone, Copy)]
struct Snapshot {
    frequency: u32,
    duty: [f32; CHANNELS],
}

#[derive(Clone, Copy, Default)]
struct DeadBandSettings {
    rising: f32,
    falling: f32,
}

#[derive(Clone, Copy, Default)]
struct ChopperSettings {
    frequency: Option<u32>,
    duty: Option<f32>,
    first_pulse: Option<u32>,
}

/// State shared by all ePWM modules.
pub struct PwmDriver<'a> {
    sys: &'a SysRegisters,
    modules: [&'a PwmRegisters; PWM_MODULES],
    sysclk: u32,
    registry: Registry<PWM_MODULES>,
    /// MEP scale factors. Entry 0 is the latest good value, entry `n + 1` belongs to
    /// module `n`.
    mep: Mutex<Cell<[u16; PWM_MODULES + 1]>>,
}

impl<'a> PwmDriver<'a> {
    /// Reads SYSCLKOUT from the PLL state, given the oscillator frequency.
    pub fn new(
        sys: &'a SysRegisters,
        modules: [&'a PwmRegisters; PWM_MODULES],
        source_clock: u32,
    ) -> Result<Self, Error> {
        let sysclk = clocks::cpu_clock(sys, source_clock)?;
        debug!("ePWM driver up, SYSCLKOUT {} Hz", sysclk);
        Ok(Self {
            sys,
            modules,
            sysclk,
            registry: Registry::new(),
            mep: Mutex::new(Cell::new([0; PWM_MODULES + 1])),
        })
    }

    /// SYSCLKOUT, in Hz.
    pub fn sysclk(&self) -> u32 {
        self.sysclk
    }

    /// Whether module `index` currently has an owner.
    pub fn is_locked(&self, index: usize) -> bool {
        self.registry.is_locked(index)
    }

    /// The latest valid MEP scale factor, if a calibration has succeeded.
    pub fn scale_factor(&self) -> Option<u16> {
        let mep = critical_section::with(|cs| self.mep.borrow(cs).get()[0]);
        hr::valid_mep(mep)
    }

    /// Scale factor recorded for module `index`.
    pub fn module_scale_factor(&self, index: usize) -> Option<u16> {
        if index >= PWM_MODULES {
            return None;
        }
        let mep = critical_section::with(|cs| self.mep.borrow(cs).get()[index + 1]);
        hr::valid_mep(mep)
    }

    fn set_mep(&self, index: usize, value: u16, seed: bool) {
        critical_section::with(|cs| {
            let cell = self.mep.borrow(cs);
            let mut table = cell.get();
            table[index + 1] = value;
            if seed {
                table[0] = value;
            }
            cell.set(table);
        });
    }

    fn clock_enable(&self, index: usize, enable: bool) {
        critical_section::with(|_| self.sys.pclkcr1.as_reg().set_bit(index as u8, enable));
    }
}

/// Owner of one ePWM module.
pub struct PwmController<'a> {
    driver: &'a PwmDriver<'a>,
    regs: &'a PwmRegisters,
    // Released after `drop` has gated the module clock.
    slot: Slot<'a, PWM_MODULES>,
    count: Count,
    tbclk: u32,
    state: State,
    task: Option<Snapshot>,
    dead_band: DeadBandSettings,
    chopper: ChopperSettings,
    phase: u32,
    high_resolution: bool,
}

impl<'a> PwmController<'a> {
    /// Claims module `index` (zero-based) and configures its time-base for the fastest
    /// TBCLK not above `clock`. The counter stays frozen until `start`.
    pub fn new(
        driver: &'a PwmDriver<'a>,
        index: usize,
        clock: u32,
        cfg: PwmConfig,
    ) -> Result<Self, Error> {
        let slot = driver.registry.acquire(index)?;
        let divider = ClockDivider::derive(driver.sysclk, clock)?;
        let regs = driver.modules[index];
        let sys = driver.sys;

        driver.clock_enable(index, true);

        let tbctl = &regs.tbctl;
        tbctl.set_ctrmode(CTRMODE_FREEZE);
        tbctl.set_clkdiv(divider.clkdiv.bits());
        tbctl.set_hspclkdiv(divider.hspclkdiv.bits());
        tbctl.set_syncosel(cfg.sync as u16);
        tbctl.set_free_soft(cfg.free_soft as u16);
        tbctl.set_prdld(0);
        tbctl.set_phsen(1);
        regs.tbctr.write(0);
        regs.tbphs.write(0);

        // Compares load from their shadows at CTR = 0.
        regs.cmpctl.set_shdwamode(0);
        regs.cmpctl.set_shdwbmode(0);
        regs.cmpctl.set_loadamode(0);
        regs.cmpctl.set_loadbmode(0);

        critical_section::with(|_| {
            sys.pclkcr0.set_tbclksync(0);
            cfg.count.qualify(&regs.aqctl);
            sys.pclkcr0.set_tbclksync(1);
        });

        regs.etsel.set_inten(cfg.interrupt as u16);

        debug!(
            "ePWM{} acquired, TBCLK {} Hz ({:?})",
            index + 1,
            divider.clock,
            cfg.count
        );

        Ok(Self {
            driver,
            regs,
            slot,
            count: cfg.count,
            tbclk: divider.clock,
            state: State::Constructed,
            task: None,
            dead_band: DeadBandSettings::default(),
            chopper: ChopperSettings::default(),
            phase: 0,
            high_resolution: false,
        })
    }

    /// Validates and stores `task`, then programs period and compares. The counter mode is
    /// left alone: a frozen counter stays frozen until `start`.
    pub fn set_task<const N: usize>(&mut self, task: &PwmTask<N>) -> Result<(), Error> {
        self.check(task)?;
        let mut duty = [0.; CHANNELS];
        duty[..N].copy_from_slice(&task.duty);
        self.task = Some(Snapshot {
            frequency: task.frequency,
            duty,
        });
        self.program();
        Ok(())
    }

    /// Starts, or resumes, the counter with the stored task.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.task.is_none() {
            return Err(Error::NoTask);
        }
        self.program();
        self.regs.tbctl.set_ctrmode(self.count.ctrmode());
        self.state = State::Running;
        debug!("ePWM{} running", self.index() + 1);
        Ok(())
    }

    /// Stores `task` and starts the counter.
    pub fn start_with<const N: usize>(&mut self, task: &PwmTask<N>) -> Result<(), Error> {
        self.set_task(task)?;
        self.start()
    }

    /// Freezes the counter. Registers keep their contents.
    pub fn stop(&mut self) {
        self.regs.tbctl.set_ctrmode(CTRMODE_FREEZE);
        if self.state == State::Running {
            self.state = State::Stopped;
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Whether `task` would be accepted by `set_task`.
    pub fn is_task<const N: usize>(&self, task: &PwmTask<N>) -> bool {
        self.check(task).is_ok()
    }

    fn check<const N: usize>(&self, task: &PwmTask<N>) -> Result<(), Error> {
        if N > CHANNELS {
            return Err(Error::TooManyChannels);
        }
        if task.frequency < self.min_frequency() || task.frequency > self.max_frequency() {
            warn!("ePWM{}: {} Hz out of range", self.index() + 1, task.frequency);
            return Err(Error::FrequencyOutOfRange);
        }
        // NaN fails `contains` too.
        if task.duty.iter().any(|d| !(0.0..=100.0).contains(d)) {
            return Err(Error::DutyOutOfRange);
        }
        Ok(())
    }

    /// Writes the stored task with the module interrupt masked, so the counter can't load
    /// a half-written period/compare pair.
    fn program(&self) {
        let Some(task) = self.task else {
            return;
        };
        let period = self.count.period(self.tbclk, task.frequency);
        let compare = task.duty.map(|d| self.count.compare(period, d));

        let key = self.interrupt_key();
        let was = key.disable();
        self.regs.tbprd.write(period);
        for (reg, cmp) in self.regs.cmp.iter().zip(compare) {
            reg.write(cmp);
        }
        if self.high_resolution {
            if let Some(ext) = self.hr_extension(&task) {
                self.regs.cmpahr.set_cmpahr(ext);
            }
        }
        key.enable(was);
    }

    /// Signal frequency in Hz: the request if `set`, else what the period register yields.
    pub fn signal_frequency(&self, set: bool) -> Result<u32, Error> {
        let task = self.task.ok_or(Error::NoTask)?;
        Ok(if set {
            task.frequency
        } else {
            self.count.signal_frequency(self.tbclk, self.regs.tbprd.read())
        })
    }

    /// Duty of `channel` in percent: the request if `set`, else what the registers yield.
    pub fn duty(&self, channel: usize, set: bool) -> Result<f32, Error> {
        if channel >= CHANNELS {
            return Err(Error::InvalidChannel);
        }
        let task = self.task.ok_or(Error::NoTask)?;
        Ok(if set {
            task.duty[channel]
        } else {
            self.count
                .duty(self.regs.tbprd.read(), self.regs.cmp[channel].read())
        })
    }

    /// Effective duty resolution of `channel`, in bits. Channel A gains the MEP scale
    /// factor while high-resolution mode is on.
    pub fn resolution(&self, channel: usize) -> Result<f32, Error> {
        if channel >= CHANNELS {
            return Err(Error::InvalidChannel);
        }
        let task = self.task.ok_or(Error::NoTask)?;
        let mut steps = self.tbclk as f32 / task.frequency as f32;
        if self.high_resolution && channel == 0 {
            if let Some(mep) = self.driver.scale_factor() {
                steps *= mep as f32;
            }
        }
        Ok(Float::log2(steps))
    }

    pub fn max_frequency(&self) -> u32 {
        self.count.max_frequency(self.tbclk)
    }

    pub fn min_frequency(&self) -> u32 {
        self.count.min_frequency(self.tbclk)
    }

    /// The achieved TBCLK, in Hz.
    pub fn clock_frequency(&self) -> u32 {
        self.tbclk
    }

    /// Zero-based module index.
    pub fn index(&self) -> usize {
        self.slot.index()
    }

    pub fn channels_number(&self) -> usize {
        CHANNELS
    }

    pub fn count_policy(&self) -> Count {
        self.count
    }

    /// The module's own interrupt enable, ETSEL.INTEN.
    pub fn interrupt_key(&self) -> Toggle<'_> {
        Toggle::new(self.regs.etsel.as_reg(), INTEN_BIT)
    }

    pub fn set_synchronization(&mut self, sync: SyncOut) {
        self.regs.tbctl.set_syncosel(sync as u16);
    }

    pub fn synchronization(&self) -> SyncOut {
        SyncOut::from_bits(self.regs.tbctl.syncosel())
    }

    pub fn is_synchronizing(&self) -> bool {
        self.synchronization() == SyncOut::Input
    }

    /// Issues a software sync pulse. Returns false, doing nothing, unless sync-out passes
    /// sync-in through.
    pub fn synchronize(&mut self) -> bool {
        if !self.is_synchronizing() {
            return false;
        }
        self.regs.tbctl.set_swfsync(1);
        true
    }

    /// Phase offset loaded on sync, in ns. Ignored while high-resolution mode is on.
    pub fn set_phase(&mut self, ns: u32) {
        if self.high_resolution {
            return;
        }
        let ticks = ns as f32 / self.tick_ns() + 0.5;
        self.regs.tbphs.write(ticks.min(u16::MAX as f32) as u16);
        self.phase = ns;
    }

    /// Phase in ns: the request if `set`, else the register converted back.
    pub fn phase(&self, set: bool) -> u32 {
        if set {
            self.phase
        } else {
            (self.regs.tbphs.read() as f32 * self.tick_ns() + 0.5) as u32
        }
    }

    /// TBCTL.PHSEN: load TBPHS into the counter on sync.
    pub fn phase_key(&self) -> Toggle<'_> {
        Toggle::new(self.regs.tbctl.as_reg(), PHSEN_BIT)
    }

    /// Count direction after a sync. Only `Up` and `Down` apply.
    pub fn set_phase_direction(&mut self, direction: Count) {
        match direction {
            Count::Down => self.regs.tbctl.set_phsdir(0),
            Count::Up => self.regs.tbctl.set_phsdir(1),
            Count::UpDown => (),
        }
    }

    pub fn phase_direction(&self) -> Count {
        match self.regs.tbctl.phsdir() {
            0 => Count::Down,
            _ => Count::Up,
        }
    }

    /// One TBCLK period, in ns.
    fn tick_ns(&self) -> f32 {
        NS_PER_S / self.tbclk as f32
    }
}

impl Drop for PwmController<'_> {
    fn drop(&mut self) {
        let index = self.index();
        self.driver.set_mep(index, 0, false);
        self.disable_high_resolution();
        self.regs.tbctl.set_ctrmode(CTRMODE_FREEZE);
        self.driver.clock_enable(index, false);
        debug!("ePWM{} released", index + 1);
    }
}

/// `Time` is a frequency in Hz, as in the other HALs built on this trait: `get_period` and
/// `set_period` read and write the signal frequency, not a duration. `set_duty` does
/// nothing until a task is set.
#[cfg(feature = "embedded-hal")]
#[cfg_attr(docsrs, doc(cfg(feature = "embedded-hal")))]
impl embedded_hal::Pwm for PwmController<'_> {
    type Channel = Channel;
    /// Signal frequency in Hz. Not a period.
    type Time = u32;
    /// Percent high time.
    type Duty = f32;

    fn disable(&mut self, channel: Self::Channel) {
        match channel {
            Channel::A => self.regs.aqcsfrc.set_csfa(FORCE_LOW),
            Channel::B => self.regs.aqcsfrc.set_csfb(FORCE_LOW),
        }
    }

    fn enable(&mut self, channel: Self::Channel) {
        match channel {
            Channel::A => self.regs.aqcsfrc.set_csfa(FORCE_OFF),
            Channel::B => self.regs.aqcsfrc.set_csfb(FORCE_OFF),
        }
    }

    fn get_period(&self) -> Self::Time {
        self.signal_frequency(true).unwrap_or(0)
    }

    fn get_duty(&self, channel: Self::Channel) -> Self::Duty {
        self.duty(channel as usize, true).unwrap_or(0.)
    }

    fn get_max_duty(&self) -> Self::Duty {
        100.
    }

    fn set_duty(&mut self, channel: Self::Channel, duty: Self::Duty) {
        let Some(mut task) = self.task else {
            return;
        };
        task.duty[channel as usize] = duty;
        if self.set_task(&PwmTask::new(task.frequency, task.duty)).is_err() {
            warn!("ePWM{}: duty {} rejected", self.index() + 1, duty);
        }
    }

    fn set_period<P>(&mut self, period: P)
    where
        P: Into<Self::Time>,
    {
        let duty = self.task.map_or([0.; CHANNELS], |t| t.duty);
        let frequency = period.into();
        if self.set_task(&PwmTask::new(frequency, duty)).is_err() {
            warn!("ePWM{}: {} Hz rejected", self.index() + 1, frequency);
        }
    }
}
