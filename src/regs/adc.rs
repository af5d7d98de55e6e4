//! ADC register frame.

use super::{register, Field, Reg};

register! {
    Adctrl1 {
        seq_casc: 4, 1;
        seq_ovrd: 5, 1;
        cont_run: 6, 1;
        cps: 7, 1;
        acq_ps: 8, 4;
        susmod: 12, 2;
        reset: 14, 1;
    }
}

register! {
    Adctrl2 {
        epwm_socb_seq2: 0, 1;
        int_mod_seq2: 2, 1;
        int_ena_seq2: 3, 1;
        soc_seq2: 5, 1;
        rst_seq2: 6, 1;
        ext_soc_seq1: 7, 1;
        epwm_soca_seq1: 8, 1;
        int_mod_seq1: 10, 1;
        int_ena_seq1: 11, 1;
        soc_seq1: 13, 1;
        rst_seq1: 14, 1;
        epwm_socb_seq: 15, 1;
    }
}

register! {
    Adcmaxconv {
        max_conv1: 0, 4;
        max_conv2: 4, 3;
    }
}

register! {
    /// Channel select for four conversion slots.
    Adcchselseq {
        conv0: 0, 4;
        conv1: 4, 4;
        conv2: 8, 4;
        conv3: 12, 4;
    }
}

impl Adcchselseq {
    /// Sets the input of conversion slot `slot` (0..=3) of this register.
    pub fn set_conv(&self, slot: usize, channel: u16) {
        let field = Field::new(((slot & 0x3) * 4) as u8, 4);
        self.as_reg().set_field(field, channel);
    }
}

register! {
    Adctrl3 {
        smode_sel: 0, 1;
        adcclkps: 1, 4;
        adcpwdn: 5, 1;
        adcbgrfdn: 6, 2;
    }
}

register! {
    Adcst {
        int_seq1: 0, 1;
        int_seq2: 1, 1;
        seq1_bsy: 2, 1;
        seq2_bsy: 3, 1;
        int_seq1_clr: 4, 1;
        int_seq2_clr: 5, 1;
        eos_buf1: 6, 1;
        eos_buf2: 7, 1;
    }
}

/// The ADC module.
#[repr(C)]
pub struct AdcRegisters {
    pub adctrl1: Adctrl1,
    pub adctrl2: Adctrl2,
    pub adcmaxconv: Adcmaxconv,
    /// ADCCHSELSEQ1..4.
    pub adcchselseq: [Adcchselseq; 4],
    pub adcasesqsr: Reg<u16>,
    /// Conversion results, 12 bits left-justified.
    pub adcresult: [Reg<u16>; 16],
    pub adctrl3: Adctrl3,
    pub adcst: Adcst,
    _reserved0: [Reg<u16>; 2],
    pub adcrefsel: Reg<u16>,
    pub adcofftrim: Reg<u16>,
}

impl AdcRegisters {
    pub const BASE: usize = 0x7100;

    pub const fn new() -> Self {
        Self {
            adctrl1: Adctrl1::new(),
            adctrl2: Adctrl2::new(),
            adcmaxconv: Adcmaxconv::new(),
            adcchselseq: [
                Adcchselseq::new(),
                Adcchselseq::new(),
                Adcchselseq::new(),
                Adcchselseq::new(),
            ],
            adcasesqsr: Reg::new(0),
            adcresult: [const { Reg::new(0) }; 16],
            adctrl3: Adctrl3::new(),
            adcst: Adcst::new(),
            _reserved0: [Reg::new(0), Reg::new(0)],
            adcrefsel: Reg::new(0),
            adcofftrim: Reg::new(0),
        }
    }

    /// Returns the ADC register frame.
    ///
    /// # Safety
    /// The caller must be running on the target, and must make sure the block is not
    /// handed out twice.
    pub unsafe fn steal() -> &'static Self {
        &*(Self::BASE as *const Self)
    }

    /// Conversion result `index`: the 12-bit code ADCRESULTn holds in bits 15:4, shifted
    /// down to 0..=4095.
    #[inline(always)]
    pub fn result(&self, index: usize) -> u16 {
        self.adcresult[index].read() >> 4
    }
}
