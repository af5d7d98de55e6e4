//! Memory-mapped register access for the ePWM, ADC and system-control blocks.
//!
//! Each block is a `#[repr(C)]` struct of 16-bit volatile cells laid out like the F2833x
//! peripheral frames, so a `&'static` reference to the block at its hardware address gives
//! structured access. Blocks can also be created in RAM with `new()`, which is what the
//! unit tests do.

use core::cell::UnsafeCell;
use core::ptr;

/// A volatile register cell.
#[repr(transparent)]
pub struct Reg<T: Copy> {
    value: UnsafeCell<T>,
}

// Registers are shared between the foreground loop and interrupt handlers; every access
// is a single volatile load or store.
unsafe impl<T: Copy + Send> Sync for Reg<T> {}

impl<T: Copy> Reg<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    #[inline(always)]
    pub fn read(&self) -> T {
        unsafe { ptr::read_volatile(self.value.get()) }
    }

    #[inline(always)]
    pub fn write(&self, value: T) {
        unsafe { ptr::write_volatile(self.value.get(), value) }
    }

    /// Read-modify-write. Not atomic; callers that share the register serialize around it.
    #[inline(always)]
    pub fn modify<F: FnOnce(T) -> T>(&self, f: F) {
        self.write(f(self.read()));
    }
}

/// A bit field inside a 16-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub shift: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    #[inline(always)]
    pub const fn mask(self) -> u16 {
        (((1u32 << self.width) - 1) << self.shift) as u16
    }
}

impl Reg<u16> {
    #[inline(always)]
    pub fn field(&self, field: Field) -> u16 {
        (self.read() & field.mask()) >> field.shift
    }

    /// Writes `value` into `field`, discarding bits that don't fit.
    #[inline(always)]
    pub fn set_field(&self, field: Field, value: u16) {
        let mask = field.mask();
        self.modify(|r| (r & !mask) | ((value << field.shift) & mask));
    }

    #[inline(always)]
    pub fn bit(&self, n: u8) -> bool {
        self.read() & (1 << n) != 0
    }

    #[inline(always)]
    pub fn set_bit(&self, n: u8, value: bool) {
        if value {
            self.modify(|r| r | (1 << n));
        } else {
            self.modify(|r| r & !(1 << n));
        }
    }
}

/// Declares a 16-bit register type with one getter, setter and `Field` constant per bit field.
macro_rules! register {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident: $shift:literal, $width:literal; )*
        }
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        pub struct $name(crate::regs::Reg<u16>);

        #[allow(dead_code)]
        impl $name {
            pub const fn new() -> Self {
                Self(crate::regs::Reg::new(0))
            }

            /// The underlying cell, for whole-register and single-bit access.
            #[inline(always)]
            pub fn as_reg(&self) -> &crate::regs::Reg<u16> {
                &self.0
            }

            #[inline(always)]
            pub fn read(&self) -> u16 {
                self.0.read()
            }

            #[inline(always)]
            pub fn write(&self, value: u16) {
                self.0.write(value)
            }

            paste::paste! {
                $(
                    $(#[$fmeta])*
                    pub const [<$field:upper>]: crate::regs::Field =
                        crate::regs::Field::new($shift, $width);

                    $(#[$fmeta])*
                    #[inline(always)]
                    pub fn $field(&self) -> u16 {
                        self.0.field(Self::[<$field:upper>])
                    }

                    $(#[$fmeta])*
                    #[inline(always)]
                    pub fn [<set_ $field>](&self, value: u16) {
                        self.0.set_field(Self::[<$field:upper>], value)
                    }
                )*
            }
        }
    };
}

pub(crate) use register;

mod adc;
mod pwm;
mod sys;

pub use adc::*;
pub use pwm::*;
pub use sys::*;
