//! This library provides high-level access to the ePWM and ADC peripherals of F2833x-class
//! motor-control DSCs: clock dividers, PWM generation with dead band, chopping, sync,
//! high-resolution edges and ADC triggering, and an interrupt-driven ADC sequencer that
//! fills a ring of sample blocks.
//!
//! Peripherals are reached through the register frames in [`regs`]; on the target, `steal`
//! them at their hardware addresses. Drivers hold the state shared by all modules of a
//! peripheral, and controllers own one module each:
//!
//! ```ignore
//! let sysclk = Pll::init(sys, 30_000_000, 150_000_000, 10_000)?;
//! let pwm = PwmDriver::new(sys, frames, 30_000_000)?;
//! let mut ctl = PwmController::new(&pwm, 0, sysclk, PwmConfig::default())?;
//! ctl.set_task(&PwmTask::new(20_000, [50., 50.]))?;
//! ctl.start()?;
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod adc;
pub mod clocks;
pub mod interrupt;
pub mod pwm;
pub mod registry;
pub mod regs;
pub mod toggle;

// Re-exported so the global helper macros resolve without the application naming it.
pub use critical_section;

/// Syntax helper for getting global variables of the form `Mutex<RefCell<Option>>>` from an interrupt-free
/// context - eg in interrupt handlers. Does nothing if the global isn't set yet.
///
/// Example: `access_global!(SEQUENCE, sequence, cs, { sequence.on_interrupt() })`
#[macro_export]
macro_rules! access_global {
    ($NAME_GLOBAL:ident, $name_local:ident, $cs:expr, $body:block) => {
        if let Some($name_local) = $NAME_GLOBAL.borrow($cs).borrow_mut().as_mut() $body
    };
}

/// Syntax helper for setting global variables of the form `Mutex<RefCell<Option>>>`.
/// eg for a controller shared between `main` and its interrupt handler, which can't be
/// built before the peripherals are set up.
///
/// Example: `make_globals!(
///     (SEQUENCE, SequenceController<'static, Toggle<'static>>),
///     (PWM, PwmController<'static>),
/// )`
#[macro_export]
macro_rules! make_globals {
    ($(($NAME:ident, $type:ty)),+ $(,)?) => {
        $(
            static $NAME: $crate::critical_section::Mutex<::core::cell::RefCell<Option<$type>>> =
                $crate::critical_section::Mutex::new(::core::cell::RefCell::new(None));
        )+
    };
}

/// Syntax helper for setting global variables of the form `Mutex<Cell<>>>`.
/// eg in interrupt handlers. Ideal for copy-type variables.
///
/// Example: `make_simple_globals!(
///     (DUTY, f32, 50.),
///     (BLOCKS_SEEN, u32, 0),
/// )`
#[macro_export]
macro_rules! make_simple_globals {
    ($(($NAME:ident, $type:ty, $val:expr)),+ $(,)?) => {
        $(
            static $NAME: $crate::critical_section::Mutex<::core::cell::Cell<$type>> =
                $crate::critical_section::Mutex::new(::core::cell::Cell::new($val));
        )+
    };
}

/// In the prelude, we export helper macros and the submodule traits.
pub mod prelude {
    pub use crate::{
        access_global,
        adc::SampleBuffer,
        interrupt::{Interrupt, InterruptTask},
        make_globals, make_simple_globals,
        pwm::{Chopper, DeadBand, EventTrigger, MepCalibration},
    };
}
