//! ePWM module register frame.

use super::{register, Reg};

register! {
    /// Time-base control.
    Tbctl {
        /// 0 up, 1 down, 2 up-down, 3 freeze.
        ctrmode: 0, 2;
        phsen: 2, 1;
        /// 0 shadow, 1 immediate.
        prdld: 3, 1;
        syncosel: 4, 2;
        swfsync: 6, 1;
        hspclkdiv: 7, 3;
        clkdiv: 10, 3;
        /// 0 count down after sync, 1 count up after sync.
        phsdir: 13, 1;
        free_soft: 14, 2;
    }
}

register! {
    /// High-resolution phase extension.
    Tbphshr {
        tbphsh: 8, 8;
    }
}

register! {
    /// Counter-compare control.
    Cmpctl {
        loadamode: 0, 2;
        loadbmode: 2, 2;
        shdwamode: 4, 1;
        shdwbmode: 6, 1;
        shdwafull: 8, 1;
        shdwbfull: 9, 1;
    }
}

register! {
    /// High-resolution compare A extension.
    Cmpahr {
        cmpahr: 8, 8;
    }
}

register! {
    /// Action-qualifier control for one output.
    Aqctl {
        zro: 0, 2;
        prd: 2, 2;
        cau: 4, 2;
        cad: 6, 2;
        cbu: 8, 2;
        cbd: 10, 2;
    }
}

register! {
    /// Action-qualifier continuous software force.
    Aqcsfrc {
        csfa: 0, 2;
        csfb: 2, 2;
    }
}

register! {
    /// Dead-band generator control.
    Dbctl {
        out_mode: 0, 2;
        polsel: 2, 2;
        in_mode: 4, 2;
    }
}

register! {
    /// Dead-band rising-edge delay, in TBCLK ticks.
    Dbred {
        del: 0, 10;
    }
}

register! {
    /// Dead-band falling-edge delay, in TBCLK ticks.
    Dbfed {
        del: 0, 10;
    }
}

register! {
    /// Event-trigger selection.
    Etsel {
        intsel: 0, 3;
        inten: 3, 1;
        socasel: 8, 3;
        socaen: 11, 1;
        socbsel: 12, 3;
        socben: 15, 1;
    }
}

register! {
    /// Event-trigger prescale.
    Etps {
        intprd: 0, 2;
        intcnt: 2, 2;
        socaprd: 8, 2;
        socacnt: 10, 2;
        socbprd: 12, 2;
        socbcnt: 14, 2;
    }
}

register! {
    /// PWM-chopper control.
    Pcctl {
        chpen: 0, 1;
        oshtwth: 1, 4;
        chpfreq: 5, 3;
        chpduty: 8, 3;
    }
}

register! {
    /// HRPWM configuration.
    Hrcnfg {
        edgmode: 0, 2;
        ctlmode: 2, 1;
        hrload: 3, 1;
    }
}

/// One ePWM module.
#[repr(C)]
pub struct PwmRegisters {
    pub tbctl: Tbctl,
    pub tbsts: Reg<u16>,
    pub tbphshr: Tbphshr,
    pub tbphs: Reg<u16>,
    pub tbctr: Reg<u16>,
    pub tbprd: Reg<u16>,
    _reserved0: Reg<u16>,
    pub cmpctl: Cmpctl,
    pub cmpahr: Cmpahr,
    /// CMPA, CMPB.
    pub cmp: [Reg<u16>; 2],
    /// AQCTLA, AQCTLB.
    pub aqctl: [Aqctl; 2],
    pub aqsfrc: Reg<u16>,
    pub aqcsfrc: Aqcsfrc,
    pub dbctl: Dbctl,
    pub dbred: Dbred,
    pub dbfed: Dbfed,
    // Trip-zone submodule, unused.
    _reserved1: [Reg<u16>; 7],
    pub etsel: Etsel,
    pub etps: Etps,
    pub etflg: Reg<u16>,
    pub etclr: Reg<u16>,
    pub etfrc: Reg<u16>,
    pub pcctl: Pcctl,
    _reserved2: Reg<u16>,
    pub hrcnfg: Hrcnfg,
}

impl PwmRegisters {
    /// Word address of ePWM1; the others follow at `STRIDE` intervals.
    pub const BASE: usize = 0x6800;
    pub const STRIDE: usize = 0x40;

    /// A register frame with every register cleared, for use outside the peripheral space.
    pub const fn new() -> Self {
        Self {
            tbctl: Tbctl::new(),
            tbsts: Reg::new(0),
            tbphshr: Tbphshr::new(),
            tbphs: Reg::new(0),
            tbctr: Reg::new(0),
            tbprd: Reg::new(0),
            _reserved0: Reg::new(0),
            cmpctl: Cmpctl::new(),
            cmpahr: Cmpahr::new(),
            cmp: [Reg::new(0), Reg::new(0)],
            aqctl: [Aqctl::new(), Aqctl::new()],
            aqsfrc: Reg::new(0),
            aqcsfrc: Aqcsfrc::new(),
            dbctl: Dbctl::new(),
            dbred: Dbred::new(),
            dbfed: Dbfed::new(),
            _reserved1: [const { Reg::new(0) }; 7],
            etsel: Etsel::new(),
            etps: Etps::new(),
            etflg: Reg::new(0),
            etclr: Reg::new(0),
            etfrc: Reg::new(0),
            pcctl: Pcctl::new(),
            _reserved2: Reg::new(0),
            hrcnfg: Hrcnfg::new(),
        }
    }

    /// Returns the register frame of ePWM module `index` (zero-based).
    ///
    /// # Safety
    /// The caller must be running on the target, and must make sure the module is not
    /// handed out twice.
    pub unsafe fn steal(index: usize) -> &'static Self {
        &*((Self::BASE + Self::STRIDE * index) as *const Self)
    }
}
