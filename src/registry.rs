//! Interrupt-vector dispatch table.
//!
//! Vector entry points are free functions with no instance context, so a
//! board crate registers each driver instance here once and forwards every
//! USART vector to [`InstanceRegistry::dispatch`].

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::platform::InterruptVector;
use crate::usart::Usart;

const MAX_INSTANCES: usize = 8;

/// The registry has no room for another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegistryFull;

/// Maps interrupt vectors to registered driver instances.
///
/// Usually a single `static` shared between the board crate's vector
/// handlers and its bring-up code.
pub struct InstanceRegistry {
    table: Mutex<RefCell<Vec<(InterruptVector, &'static Usart<'static>), MAX_INSTANCES>>>,
}

impl InstanceRegistry {
    /// An empty registry, usable in a `static`.
    pub const fn new() -> Self {
        InstanceRegistry {
            table: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Registers `usart` under its interrupt vector, replacing an earlier
    /// registration of the same vector.
    pub fn register(&self, usart: &'static Usart<'static>) -> Result<(), RegistryFull> {
        let vector = usart.interrupt_vector();
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            if let Some(entry) = table.iter_mut().find(|(v, _)| *v == vector) {
                entry.1 = usart;
                return Ok(());
            }
            table.push((vector, usart)).map_err(|_| RegistryFull)
        })
    }

    /// Runs the interrupt handler of the instance registered under
    /// `vector`. Returns whether an instance was found.
    pub fn dispatch(&self, vector: InterruptVector) -> bool {
        let usart = critical_section::with(|cs| {
            self.table
                .borrow_ref(cs)
                .iter()
                .find(|(v, _)| *v == vector)
                .map(|(_, u)| *u)
        });
        match usart {
            Some(usart) => {
                usart.handle_interrupt();
                true
            }
            None => false,
        }
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
