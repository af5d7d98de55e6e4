//! A motor-control loop on RAM-backed register frames: the PLL brings SYSCLKOUT up, ePWM1
//! paces the ADC through SOCA, and the sequencer interrupt fills a sample ring that the
//! background loop drains.

use dsc_hal::{
    adc::{AdcConfig, AdcController, AdcDriver, AdcTask, Mode, SequenceController, Trigger},
    clocks::{cpu_clock, Pll},
    interrupt::NoInterrupt,
    prelude::*,
    pwm::{
        Count, Event, PwmConfig, PwmController, PwmDriver, PwmTask, Soc, State, PWM_MODULES,
    },
    regs::{AdcRegisters, PwmRegisters, SysRegisters},
};

static SYS: SysRegisters = SysRegisters::new();
static ADC: AdcRegisters = AdcRegisters::new();
// Two blocks of two sequences, two simultaneous pairs with an A and a B result each.
static SAMPLES: AdcTask<2, 2, 2, 2> = AdcTask::new([0, 1]);

make_globals!((SEQUENCE, SequenceController<'static, NoInterrupt>));
make_simple_globals!((SEQUENCES_SEEN, u32, 0));

/// The ADCINT vector.
fn adc_isr() {
    critical_section::with(|cs| {
        access_global!(SEQUENCE, sequence, cs, {
            sequence.handler();
        });
        let seen = SEQUENCES_SEEN.borrow(cs);
        seen.set(seen.get() + 1);
    });
}

/// What the converter leaves in RESULT0..3 for sequence `n`.
fn convert(n: u16) {
    for (i, reg) in ADC.adcresult.iter().take(4).enumerate() {
        reg.write((100 * n + i as u16) << 4);
    }
}

/// Steps until MEP calibration settles.
struct Sfo {
    steps: u32,
}

impl MepCalibration for Sfo {
    fn calibrate(&mut self, _index: usize, _hr_active: bool) -> nb::Result<u16, ()> {
        if self.steps == 0 {
            Ok(62)
        } else {
            self.steps -= 1;
            Err(nb::Error::WouldBlock)
        }
    }
}

#[test]
fn pwm_paced_sampling() {
    SYS.pllsts.set_plllocks(1);
    let sysclk = Pll::init(&SYS, 30_000_000, 150_000_000, 100).unwrap();
    assert_eq!(sysclk, 150_000_000);

    let frames = [const { PwmRegisters::new() }; PWM_MODULES];
    let pwm = PwmDriver::new(&SYS, frames.each_ref(), 30_000_000).unwrap();
    let mut inverter = PwmController::new(&pwm, 0, sysclk, PwmConfig::default()).unwrap();
    inverter.set_task(&PwmTask::new(20_000, [50., 50.])).unwrap();
    inverter.dead_band().set_rising_delay(500.);
    inverter.dead_band().set_falling_delay(500.);
    inverter
        .event_trigger()
        .set_event(Soc::A, Event::CtrZero)
        .unwrap();
    inverter.enable_high_resolution(&mut Sfo { steps: 3 }).unwrap();
    inverter.start().unwrap();

    assert_eq!(inverter.state(), State::Running);
    assert_eq!(inverter.count_policy(), Count::UpDown);
    assert_eq!(frames[0].tbprd.read(), 3750);
    assert_eq!(frames[0].cmp[0].read(), 1875);
    assert_eq!(frames[0].dbred.del(), 75);
    assert_eq!(frames[0].etsel.socasel(), 1);
    assert_eq!(frames[0].etsel.socaen(), 1);
    assert_eq!(pwm.scale_factor(), Some(62));
    assert!(inverter.is_high_resolution());

    let adc_driver: &'static AdcDriver<'static> =
        Box::leak(Box::new(AdcDriver::new(&SYS, &ADC, 30_000_000).unwrap()));
    let cfg = AdcConfig {
        mode: Mode::SimultaneousCascaded,
        power_up_cycles: 0,
        ..Default::default()
    };
    let adc: &'static AdcController<'static> =
        Box::leak(Box::new(AdcController::new(adc_driver, 12_500_000, cfg).unwrap()));
    assert_eq!(adc.clock_frequency(), 12_500_000);

    let mut sequence = adc.sequence(0, NoInterrupt::new()).unwrap();
    sequence.set_task(&SAMPLES).unwrap();
    sequence.set_trigger(Trigger::PwmSocA);
    assert_eq!(ADC.adctrl2.epwm_soca_seq1(), 1);
    critical_section::with(|cs| SEQUENCE.borrow(cs).replace(Some(sequence)));

    // Six SOCA pulses; the loop drains after every second one.
    let mut drained = Vec::new();
    for n in 0..6 {
        convert(n);
        adc_isr();
        while let Some(index) = SAMPLES.full_index() {
            let block = SAMPLES.block(index).to_array();
            assert!(SAMPLES.set_full_is_free(index));
            drained.push(block);
        }
    }

    assert_eq!(critical_section::with(|cs| SEQUENCES_SEEN.borrow(cs).get()), 6);
    assert_eq!(drained.len(), 3);
    assert_eq!(SAMPLES.dropped(), 0);
    // Sequence 3 went to the second block, as the second sequence there.
    assert_eq!(drained[1][1], [[300, 301], [302, 303]]);
    assert_eq!(drained[2][0][1], [402, 403]);

    inverter.stop();
    assert_eq!(inverter.state(), State::Stopped);
    assert_eq!(cpu_clock(&SYS, 30_000_000), Ok(150_000_000));
}

#[test]
fn modules_are_released_on_drop() {
    let sys = SysRegisters::new();
    sys.pllcr.set_div(10);
    sys.pllsts.set_divsel(2);

    let frames = [const { PwmRegisters::new() }; PWM_MODULES];
    let pwm = PwmDriver::new(&sys, frames.each_ref(), 30_000_000).unwrap();
    let cfg = PwmConfig {
        count: Count::Up,
        ..Default::default()
    };
    {
        let mut leg = PwmController::new(&pwm, 2, 75_000_000, cfg).unwrap();
        leg.start_with(&PwmTask::new(10_000, [25.])).unwrap();
        assert!(pwm.is_locked(2));
        assert!(PwmController::new(&pwm, 2, 75_000_000, cfg).is_err());
    }
    assert!(!pwm.is_locked(2));
    assert_eq!(frames[2].tbctl.ctrmode(), 3);

    let adc_regs = AdcRegisters::new();
    let adc = AdcDriver::new(&sys, &adc_regs, 30_000_000).unwrap();
    let cfg = AdcConfig {
        mode: Mode::Sequential,
        power_up_cycles: 0,
        ..Default::default()
    };
    {
        let controller = AdcController::new(&adc, 25_000_000, cfg).unwrap();
        assert!(adc.is_locked());
        let samples = AdcTask::<1, 1, 1, 1>::new([15]);
        let mut sequence = controller.sequence(0, NoInterrupt::new()).unwrap();
        sequence.set_task(&samples).unwrap();
        sequence.trigger().unwrap();
        assert_eq!(adc_regs.adctrl2.soc_seq1(), 1);
    }
    assert!(!adc.is_locked());
    assert_eq!(adc_regs.adctrl3.adcpwdn(), 0);
}
