//! Virtual GPIO device
//!
//! A pure stateful mock: 16 pins with modes, levels and registered
//! interrupt handlers. Pin indices out of range are programmer errors and
//! panic.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Configured direction of a GPIO pin
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PinMode {
    /// High-impedance input
    Input,
    /// Driven output
    Output,
    /// Input with pull-up
    InputPullup,
    /// Input with pull-down
    InputPulldown,
}

struct GpioInner {
    modes: [PinMode; VirtualGpio::PIN_COUNT],
    states: [bool; VirtualGpio::PIN_COUNT],
    interrupts: FxHashMap<u8, Box<dyn FnMut() + Send>>,
}

/// Virtual GPIO bank
pub struct VirtualGpio {
    inner: Mutex<GpioInner>,
}

impl VirtualGpio {
    /// Number of pins in the bank
    pub const PIN_COUNT: usize = 16;

    /// Create a bank with every pin as a low input
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GpioInner {
                modes: [PinMode::Input; Self::PIN_COUNT],
                states: [false; Self::PIN_COUNT],
                interrupts: FxHashMap::default(),
            }),
        }
    }

    fn check_pin(pin: u8) {
        assert!(
            (pin as usize) < Self::PIN_COUNT,
            "pin number {pin} out of range"
        );
    }

    /// Configure a pin's direction
    pub fn set_pin_mode(&self, pin: u8, mode: PinMode) {
        Self::check_pin(pin);
        self.inner.lock().modes[pin as usize] = mode;
    }

    /// Get a pin's configured direction
    pub fn pin_mode(&self, pin: u8) -> PinMode {
        Self::check_pin(pin);
        self.inner.lock().modes[pin as usize]
    }

    /// Drive an output pin. Writes to non-output pins are ignored with a
    /// warning.
    pub fn write_pin(&self, pin: u8, value: bool) {
        Self::check_pin(pin);
        let mut inner = self.inner.lock();
        if inner.modes[pin as usize] != PinMode::Output {
            eprintln!("gpio: ignoring write to non-output pin {pin}");
            return;
        }
        inner.states[pin as usize] = value;
    }

    /// Read a pin's level
    pub fn read_pin(&self, pin: u8) -> bool {
        Self::check_pin(pin);
        self.inner.lock().states[pin as usize]
    }

    /// Register an interrupt handler for a pin, replacing any previous one
    pub fn register_interrupt<F>(&self, pin: u8, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        Self::check_pin(pin);
        self.inner.lock().interrupts.insert(pin, Box::new(handler));
    }

    /// Fire the interrupt handler registered for a pin, if any.
    ///
    /// Returns `true` when a handler ran.
    pub fn raise_interrupt(&self, pin: u8) -> bool {
        Self::check_pin(pin);
        let mut inner = self.inner.lock();
        match inner.interrupts.get_mut(&pin) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl Default for VirtualGpio {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_pins_start_low_input() {
        let gpio = VirtualGpio::new();
        for pin in 0..VirtualGpio::PIN_COUNT as u8 {
            assert_eq!(gpio.pin_mode(pin), PinMode::Input);
            assert!(!gpio.read_pin(pin));
        }
    }

    #[test]
    fn test_write_output_pin() {
        let gpio = VirtualGpio::new();
        gpio.set_pin_mode(5, PinMode::Output);
        gpio.write_pin(5, true);
        assert!(gpio.read_pin(5));
        gpio.write_pin(5, false);
        assert!(!gpio.read_pin(5));
    }

    #[test]
    fn test_write_to_input_pin_ignored() {
        let gpio = VirtualGpio::new();
        gpio.write_pin(3, true);
        assert!(!gpio.read_pin(3));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_pin_out_of_range_panics() {
        let gpio = VirtualGpio::new();
        gpio.read_pin(16);
    }

    #[test]
    fn test_interrupt_handler_fires() {
        let gpio = VirtualGpio::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        gpio.register_interrupt(2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(gpio.raise_interrupt(2));
        assert!(gpio.raise_interrupt(2));
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        assert!(!gpio.raise_interrupt(3));
    }
}
