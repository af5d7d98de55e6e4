//! Ownership table for physical peripheral instances.
//!
//! A driver holds one `Registry` sized to the number of modules it manages. Controllers
//! acquire a `Slot` for their module index at construction, and the slot releases the
//! module when dropped, so each physical module has at most one owner at a time.

use core::cell::Cell;

use critical_section::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockError {
    /// The index is past the number of modules.
    InvalidIndex,
    /// Another controller owns the module.
    InUse,
}

pub struct Registry<const N: usize> {
    locked: Mutex<Cell<[bool; N]>>,
}

impl<const N: usize> Registry<N> {
    pub const fn new() -> Self {
        Self {
            locked: Mutex::new(Cell::new([false; N])),
        }
    }

    /// Number of module slots.
    pub const fn len(&self) -> usize {
        N
    }

    /// Claims module `index`.
    pub fn acquire(&self, index: usize) -> Result<Slot<'_, N>, LockError> {
        if index >= N {
            return Err(LockError::InvalidIndex);
        }
        critical_section::with(|cs| {
            let cell = self.locked.borrow(cs);
            let mut locked = cell.get();
            if locked[index] {
                return Err(LockError::InUse);
            }
            locked[index] = true;
            cell.set(locked);
            Ok(Slot {
                registry: self,
                index,
            })
        })
    }

    pub fn is_locked(&self, index: usize) -> bool {
        index < N && critical_section::with(|cs| self.locked.borrow(cs).get()[index])
    }

    fn release(&self, index: usize) {
        critical_section::with(|cs| {
            let cell = self.locked.borrow(cs);
            let mut locked = cell.get();
            locked[index] = false;
            cell.set(locked);
        });
    }
}

impl<const N: usize> Default for Registry<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of ownership of one module. Releases it on drop.
pub struct Slot<'r, const N: usize> {
    registry: &'r Registry<N>,
    index: usize,
}

impl<const N: usize> Slot<'_, N> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<const N: usize> Drop for Slot<'_, N> {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}
