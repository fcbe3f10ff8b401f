//! Virtual hardware stubs
//!
//! Pure stateful mocks with no scheduling semantics: a GPIO bank, a polled
//! timer and a UART, collected behind the [`Hal`] aggregate. The HAL is an
//! explicitly owned value; create one at startup and share it as needed.

mod gpio;
mod timer;
mod uart;

pub use gpio::{PinMode, VirtualGpio};
pub use timer::{TimerMode, VirtualTimer};
pub use uart::{BaudRate, VirtualUart};

/// Aggregate owner of the virtual devices
pub struct Hal {
    gpio: VirtualGpio,
    timer: VirtualTimer,
    uart: VirtualUart,
}

impl Hal {
    /// Create a HAL with all devices in their reset state
    pub fn new() -> Self {
        Self {
            gpio: VirtualGpio::new(),
            timer: VirtualTimer::new(),
            uart: VirtualUart::new(),
        }
    }

    /// The GPIO bank
    pub fn gpio(&self) -> &VirtualGpio {
        &self.gpio
    }

    /// The timer
    pub fn timer(&self) -> &VirtualTimer {
        &self.timer
    }

    /// The UART
    pub fn uart(&self) -> &VirtualUart {
        &self.uart
    }
}

impl Default for Hal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hal_owns_devices() {
        let hal = Hal::new();
        hal.gpio().set_pin_mode(0, PinMode::Output);
        hal.gpio().write_pin(0, true);
        assert!(hal.gpio().read_pin(0));

        hal.uart().transmit("boot");
        assert_eq!(hal.uart().transmitted(), vec!["boot"]);

        assert!(!hal.timer().is_running());
    }
}
