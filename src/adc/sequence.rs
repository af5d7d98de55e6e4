//! The conversion sequencer and its interrupt handler.

use super::{Error, Mode, Overflow, SampleBuffer, Trigger, RESULTS};
use crate::{
    interrupt::{Interrupt, InterruptTask},
    regs::AdcRegisters,
    registry::Slot,
};

/// Channel codes in sequential mode.
const SEQUENTIAL_CHANNELS: u8 = 16;
/// Pair codes in simultaneous modes.
const PAIRS: u8 = 8;

/// Fills a bound `SampleBuffer` from the sequencer interrupt.
///
/// Call `on_interrupt` (or `InterruptTask::handler`) from the SEQ1 vector. Each call copies
/// one sequence worth of results into the free block; after `sequences_number()` calls the
/// block is published as full.
pub struct SequenceController<'a, I: Interrupt> {
    regs: &'a AdcRegisters,
    mode: Mode,
    overflow: Overflow,
    interrupt: I,
    task: Option<&'a dyn SampleBuffer>,
    sample_number: usize,
    sequences_left: usize,
    block: usize,
    dropped: u32,
    _slot: Slot<'a, { super::SEQUENCES }>,
}

impl<'a, I: Interrupt> SequenceController<'a, I> {
    pub(super) fn new(
        regs: &'a AdcRegisters,
        mode: Mode,
        overflow: Overflow,
        interrupt: I,
        slot: Slot<'a, { super::SEQUENCES }>,
    ) -> Self {
        Self {
            regs,
            mode,
            overflow,
            interrupt,
            task: None,
            sample_number: 0,
            sequences_left: 0,
            block: 0,
            dropped: 0,
            _slot: slot,
        }
    }

    /// Binds `task`, programs the channel selection and enables the sequencer interrupt.
    /// A sequencer binds once; a second call fails with `AlreadyBound`.
    pub fn set_task(&mut self, task: &'a dyn SampleBuffer) -> Result<(), Error> {
        if self.task.is_some() {
            return Err(Error::AlreadyBound);
        }
        let channels = task.channels();
        self.check(channels, task.results_number())?;
        if task.sequences_number() == 0 {
            return Err(Error::InvalidResultCount);
        }

        let regs = self.regs;
        match self.mode {
            Mode::SimultaneousDual => {
                let pairs = channels.len() / 2;
                for (i, pair) in channels.chunks_exact(2).enumerate() {
                    regs.adcchselseq[(i >> 2) & 1].set_conv(i, pair[0] as u16);
                    regs.adcchselseq[((i >> 2) & 1) + 2].set_conv(i, pair[1] as u16);
                }
                regs.adcmaxconv.set_max_conv1(pairs as u16 - 1);
                regs.adcmaxconv.set_max_conv2(pairs as u16 - 1);
            }
            _ => {
                for (i, &channel) in channels.iter().enumerate() {
                    regs.adcchselseq[i >> 2].set_conv(i, channel as u16);
                }
                regs.adcmaxconv.set_max_conv1(channels.len() as u16 - 1);
            }
        }

        self.sample_number = channels.len() * task.results_number();
        self.sequences_left = 0;
        self.task = Some(task);

        regs.adctrl2.set_rst_seq1(1);
        regs.adctrl2.set_int_ena_seq1(1);
        self.interrupt.enable(true);
        debug!(
            "ADC sequence bound: {} channels, {} samples per sequence",
            channels.len(),
            self.sample_number
        );
        Ok(())
    }

    fn check(&self, channels: &[u8], results: usize) -> Result<(), Error> {
        let n = channels.len();
        let (count_ok, channel_ok) = match self.mode {
            Mode::Sequential => (
                (1..=SEQUENTIAL_CHANNELS as usize).contains(&n),
                channels.iter().all(|&c| c < SEQUENTIAL_CHANNELS),
            ),
            Mode::SimultaneousCascaded => (
                (1..=PAIRS as usize).contains(&n),
                channels.iter().all(|&c| c < PAIRS),
            ),
            Mode::SimultaneousDual => (
                n > 0 && n % 2 == 0 && n <= RESULTS,
                channels
                    .chunks_exact(2)
                    .all(|p| p[0] < PAIRS && (PAIRS..SEQUENTIAL_CHANNELS).contains(&p[1])),
            ),
        };
        if !count_ok {
            return Err(Error::InvalidChannelCount);
        }
        if !channel_ok {
            return Err(Error::InvalidChannel);
        }
        if results != self.mode.results_per_channel() {
            return Err(Error::InvalidResultCount);
        }
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.task.is_some()
    }

    /// Results copied per interrupt.
    pub fn sample_number(&self) -> usize {
        self.sample_number
    }

    /// Sequences discarded under `DropNewest`. Blocks reclaimed under `DropOldest` are
    /// counted by the ring itself.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Starts the sequencer on `trigger`.
    pub fn set_trigger(&mut self, trigger: Trigger) {
        self.route(trigger, 1);
    }

    pub fn reset_trigger(&mut self, trigger: Trigger) {
        self.route(trigger, 0);
    }

    fn route(&self, trigger: Trigger, value: u16) {
        let adctrl2 = &self.regs.adctrl2;
        match (trigger, self.mode) {
            (Trigger::PwmSocA, _) => adctrl2.set_epwm_soca_seq1(value),
            (Trigger::PwmSocB, Mode::SimultaneousDual) => adctrl2.set_epwm_socb_seq2(value),
            (Trigger::PwmSocB, _) => adctrl2.set_epwm_socb_seq(value),
        }
    }

    /// Starts one sequence from software.
    pub fn trigger(&mut self) -> Result<(), Error> {
        if self.task.is_none() {
            return Err(Error::NoTask);
        }
        self.regs.adctrl2.set_soc_seq1(1);
        Ok(())
    }

    /// Oldest full block of the bound task. Reading it ends with
    /// `SampleBuffer::set_full_is_free(index)`.
    pub fn poll(&self) -> nb::Result<usize, Error> {
        let task = self.task.ok_or(nb::Error::Other(Error::NoTask))?;
        task.full_index().ok_or(nb::Error::WouldBlock)
    }

    /// Polls at most `max_polls` times for a full block.
    pub fn wait(&self, max_polls: u32) -> Result<usize, Error> {
        for _ in 0..max_polls {
            match self.poll() {
                Ok(index) => return Ok(index),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
            }
        }
        error!("ADC: no full block after {} polls", max_polls);
        Err(Error::Timeout)
    }

    /// Sequence-complete interrupt body.
    pub fn on_interrupt(&mut self) {
        let Some(task) = self.task else {
            return;
        };

        if self.sequences_left == 0 {
            match self.claim_block(task) {
                Some(block) => {
                    self.block = block;
                    self.sequences_left = task.sequences_number();
                }
                None => {
                    self.dropped += 1;
                    warn!("ADC ring full, sequence dropped");
                    self.rearm();
                    return;
                }
            }
        }

        let sequence = task.sequences_number() - self.sequences_left;
        for i in 0..self.sample_number {
            task.store(self.block, sequence, i, self.regs.result(i) as i32);
        }
        self.sequences_left -= 1;
        if self.sequences_left == 0 {
            task.set_free_is_full();
        }

        self.rearm();
    }

    fn claim_block(&self, task: &dyn SampleBuffer) -> Option<usize> {
        if let Some(block) = task.free_index() {
            return Some(block);
        }
        match self.overflow {
            Overflow::DropOldest if task.reclaim_oldest() => {
                warn!("ADC ring full, oldest block dropped");
                task.free_index()
            }
            _ => None,
        }
    }

    /// Returns the sequencer to CONV00 and acknowledges the interrupt.
    fn rearm(&self) {
        self.regs.adctrl2.set_rst_seq1(1);
        self.regs.adcst.set_int_seq1_clr(1);
    }
}

impl<I: Interrupt> InterruptTask for SequenceController<'_, I> {
    fn handler(&mut self) {
        self.on_interrupt();
    }
}

impl<I: Interrupt> Drop for SequenceController<'_, I> {
    fn drop(&mut self) {
        self.interrupt.disable();
        self.regs.adctrl2.set_int_ena_seq1(0);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::clocked_sys;
    use super::super::{AdcConfig, AdcController, AdcDriver, AdcTask, Overflow};
    use super::*;
    use crate::interrupt::NoInterrupt;
    use crate::registry::LockError;

    fn config(mode: Mode, overflow: Overflow) -> AdcConfig {
        AdcConfig {
            mode,
            overflow,
            power_up_cycles: 0,
            ..Default::default()
        }
    }

    /// Puts `base + i` into RESULTi, left-justified like the converter does.
    fn convert(regs: &AdcRegisters, base: u16) {
        for (i, reg) in regs.adcresult.iter().enumerate() {
            reg.write((base + i as u16) << 4);
        }
    }

    #[test]
    fn two_blocks_of_four_sequences() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::SimultaneousCascaded, Overflow::DropOldest),
        )
        .unwrap();
        let task = AdcTask::<2, 4, 1, 2>::new([3]);
        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        seq.set_task(&task).unwrap();
        assert_eq!(seq.sample_number(), 2);
        assert_eq!(regs.adcchselseq[0].conv0(), 3);
        assert_eq!(regs.adcmaxconv.max_conv1(), 0);
        assert_eq!(regs.adctrl2.int_ena_seq1(), 1);

        for s in 0..4 {
            assert_eq!(task.full_index(), None);
            convert(&regs, 100 * s);
            seq.handler();
            assert_eq!(regs.adcst.int_seq1_clr(), 1);
        }
        assert_eq!(task.full_index(), Some(0));
        assert_eq!(task.free_index(), Some(1));
        let block = task.block(0);
        assert_eq!(block.get(0, 0, 0), 0);
        assert_eq!(block.get(0, 0, 1), 1);
        assert_eq!(block.get(3, 0, 0), 300);
        assert_eq!(block.get(3, 0, 1), 301);

        assert!(task.set_full_is_free(0));
        assert_eq!(task.full_index(), None);
        // The producer has moved on to block 1, it doesn't return to block 0.
        assert_eq!(task.free_index(), Some(1));
        assert_eq!(seq.wait(10), Err(Error::Timeout));
    }

    #[test]
    fn drop_oldest_overwrites_block_zero() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::Sequential, Overflow::DropOldest),
        )
        .unwrap();
        let task = AdcTask::<2, 1, 2, 1>::new([0, 9]);
        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        seq.set_task(&task).unwrap();
        assert_eq!(regs.adcchselseq[0].conv1(), 9);
        assert_eq!(regs.adcmaxconv.max_conv1(), 1);

        for base in [10, 20, 30] {
            convert(&regs, base);
            seq.on_interrupt();
        }
        assert_eq!(task.dropped(), 1);
        assert_eq!(task.block(0).to_array(), [[[30], [31]]]);
        // Block 1 is now the oldest.
        assert_eq!(seq.wait(1), Ok(1));
        assert_eq!(task.block(1).get(0, 0, 0), 20);
    }

    #[test]
    fn oldest_block_reclaimed_while_read() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::Sequential, Overflow::DropOldest),
        )
        .unwrap();
        let task = AdcTask::<2, 1, 1, 1>::new([2]);
        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        seq.set_task(&task).unwrap();

        for base in [10, 20] {
            convert(&regs, base);
            seq.on_interrupt();
        }
        let reading = seq.wait(1).unwrap();
        assert_eq!(reading, 0);

        // An overrun lands while the control loop still holds block 0.
        convert(&regs, 30);
        seq.on_interrupt();
        assert!(!task.set_full_is_free(reading));
        assert_eq!(task.dropped(), 1);

        let mut delivered = Vec::new();
        while let Ok(index) = seq.wait(1) {
            let value = task.block(index).get(0, 0, 0);
            assert!(task.set_full_is_free(index));
            delivered.push(value);
        }
        assert_eq!(delivered, [20, 30]);
    }

    #[test]
    fn drop_newest_keeps_stored_blocks() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::Sequential, Overflow::DropNewest),
        )
        .unwrap();
        let task = AdcTask::<2, 1, 1, 1>::new([4]);
        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        seq.set_task(&task).unwrap();

        for base in [10, 20, 30, 40] {
            convert(&regs, base);
            seq.on_interrupt();
        }
        assert_eq!(seq.dropped(), 2);
        assert_eq!(task.dropped(), 0);
        assert_eq!(task.block(0).get(0, 0, 0), 10);
        assert_eq!(task.block(1).get(0, 0, 0), 20);

        // Room again: the next sequence lands in the freed block.
        assert!(task.set_full_is_free(0));
        convert(&regs, 50);
        seq.on_interrupt();
        assert_eq!(task.block(0).get(0, 0, 0), 50);
    }

    #[test]
    fn binding_rules() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::SimultaneousCascaded, Overflow::DropOldest),
        )
        .unwrap();

        let too_many = AdcTask::<1, 1, 9, 2>::new([0; 9]);
        let bad_channel = AdcTask::<1, 1, 1, 2>::new([8]);
        let one_result = AdcTask::<1, 1, 1, 1>::new([0]);
        let good = AdcTask::<1, 1, 8, 2>::new([0, 1, 2, 3, 4, 5, 6, 7]);

        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        assert_eq!(
            adc.sequence(0, NoInterrupt::new()).err(),
            Some(Error::Lock(LockError::InUse))
        );
        assert_eq!(seq.trigger(), Err(Error::NoTask));
        assert_eq!(seq.poll(), Err(nb::Error::Other(Error::NoTask)));
        seq.on_interrupt();

        assert_eq!(seq.set_task(&too_many), Err(Error::InvalidChannelCount));
        assert_eq!(seq.set_task(&bad_channel), Err(Error::InvalidChannel));
        assert_eq!(seq.set_task(&one_result), Err(Error::InvalidResultCount));
        assert!(!seq.is_bound());

        seq.set_task(&good).unwrap();
        assert_eq!(seq.set_task(&good), Err(Error::AlreadyBound));
        assert_eq!(regs.adcchselseq[1].conv3(), 7);
        assert_eq!(regs.adcmaxconv.max_conv1(), 7);
        assert_eq!(seq.sample_number(), 16);

        seq.trigger().unwrap();
        assert_eq!(regs.adctrl2.soc_seq1(), 1);
    }

    #[test]
    fn dual_sequencer_layout() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::SimultaneousDual, Overflow::DropOldest),
        )
        .unwrap();
        let odd = AdcTask::<1, 1, 3, 1>::new([0, 8, 1]);
        let crossed = AdcTask::<1, 1, 2, 1>::new([8, 0]);
        let task = AdcTask::<1, 1, 10, 1>::new([0, 8, 1, 9, 2, 10, 3, 11, 4, 12]);

        let mut seq = adc.sequence(0, NoInterrupt::new()).unwrap();
        assert_eq!(seq.set_task(&odd), Err(Error::InvalidChannelCount));
        assert_eq!(seq.set_task(&crossed), Err(Error::InvalidChannel));
        seq.set_task(&task).unwrap();

        assert_eq!(regs.adcchselseq[0].conv3(), 3);
        assert_eq!(regs.adcchselseq[1].conv0(), 4);
        assert_eq!(regs.adcchselseq[2].conv0(), 8);
        assert_eq!(regs.adcchselseq[3].conv0(), 12);
        assert_eq!(regs.adcmaxconv.max_conv1(), 4);
        assert_eq!(regs.adcmaxconv.max_conv2(), 4);

        seq.set_trigger(Trigger::PwmSocB);
        assert_eq!(regs.adctrl2.epwm_socb_seq2(), 1);
        assert_eq!(regs.adctrl2.epwm_socb_seq(), 0);
        seq.reset_trigger(Trigger::PwmSocB);
        assert_eq!(regs.adctrl2.epwm_socb_seq2(), 0);
    }

    #[test]
    fn interrupt_line_follows_binding() {
        let sys = clocked_sys();
        let regs = AdcRegisters::new();
        let driver = AdcDriver::new(&sys, &regs, 30_000_000).unwrap();
        let adc = AdcController::new(
            &driver,
            12_500_000,
            config(Mode::SimultaneousCascaded, Overflow::DropOldest),
        )
        .unwrap();
        let task = AdcTask::<2, 1, 1, 2>::new([0]);
        let line = crate::regs::Reg::new(0u16);
        {
            let mut seq = adc
                .sequence(0, crate::toggle::Toggle::new(&line, 4))
                .unwrap();
            assert_eq!(line.read(), 0);
            seq.set_task(&task).unwrap();
            assert_eq!(line.read(), 1 << 4);

            seq.set_trigger(Trigger::PwmSocA);
            assert_eq!(regs.adctrl2.epwm_soca_seq1(), 1);
            seq.set_trigger(Trigger::PwmSocB);
            assert_eq!(regs.adctrl2.epwm_socb_seq(), 1);
        }
        assert_eq!(line.read(), 0);
        assert_eq!(regs.adctrl2.int_ena_seq1(), 0);
        // The sequencer can be claimed again.
        assert!(adc.sequence(0, NoInterrupt::new()).is_ok());
    }
}
