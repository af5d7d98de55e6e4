//! System control registers: PLL and peripheral clocking.

use super::{register, Reg};

register! {
    /// PLL status.
    Pllsts {
        plllocks: 0, 1;
        plloff: 2, 1;
        mclksts: 3, 1;
        mclkclr: 4, 1;
        oscoff: 5, 1;
        mclkoff: 6, 1;
        divsel: 7, 2;
    }
}

register! {
    /// PLL multiplier.
    Pllcr {
        div: 0, 4;
    }
}

register! {
    /// High-speed peripheral clock prescaler.
    Hispcp {
        hspclk: 0, 3;
    }
}

register! {
    Pclkcr0 {
        tbclksync: 2, 1;
        adcenclk: 3, 1;
    }
}

register! {
    /// One clock-enable bit per ePWM module, ePWM1 at bit 0.
    Pclkcr1 {
        epwm1enclk: 0, 1;
        epwm2enclk: 1, 1;
        epwm3enclk: 2, 1;
        epwm4enclk: 3, 1;
        epwm5enclk: 4, 1;
        epwm6enclk: 5, 1;
    }
}

/// System control block.
#[repr(C)]
pub struct SysRegisters {
    pub xclk: Reg<u16>,
    pub pllsts: Pllsts,
    _reserved0: [Reg<u16>; 8],
    pub hispcp: Hispcp,
    pub lospcp: Reg<u16>,
    pub pclkcr0: Pclkcr0,
    pub pclkcr1: Pclkcr1,
    pub lpmcr0: Reg<u16>,
    _reserved1: Reg<u16>,
    pub pclkcr3: Reg<u16>,
    pub pllcr: Pllcr,
}

impl SysRegisters {
    pub const BASE: usize = 0x7010;

    pub const fn new() -> Self {
        Self {
            xclk: Reg::new(0),
            pllsts: Pllsts::new(),
            _reserved0: [const { Reg::new(0) }; 8],
            hispcp: Hispcp::new(),
            lospcp: Reg::new(0),
            pclkcr0: Pclkcr0::new(),
            pclkcr1: Pclkcr1::new(),
            lpmcr0: Reg::new(0),
            _reserved1: Reg::new(0),
            pclkcr3: Reg::new(0),
            pllcr: Pllcr::new(),
        }
    }

    /// Returns the system control block.
    ///
    /// # Safety
    /// The caller must be running on the target.
    pub unsafe fn steal() -> &'static Self {
        &*(Self::BASE as *const Self)
    }
}
