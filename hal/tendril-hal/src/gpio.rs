//! GPIO pin abstractions
//!
//! Digital pins used by the kernel: the status LED output and the
//! factory-reset button input.

/// Digital output pin
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Toggle the pin state
    fn toggle(&mut self) {
        if self.is_set_high() {
            self.set_low();
        } else {
            self.set_high();
        }
    }

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently set high
    fn is_set_high(&self) -> bool;
}

/// Digital input pin
pub trait InputPin {
    /// Check if the pin reads high (logic 1)
    fn is_high(&self) -> bool;

    /// Check if the pin reads low (logic 0)
    fn is_low(&self) -> bool {
        !self.is_high()
    }
}

/// Input pin that can suspend until its level changes
///
/// Backed by an edge interrupt on real hardware, so waiting never polls.
pub trait EdgeInput: InputPin {
    /// Wait for the next rising or falling edge
    fn wait_for_any_edge(&mut self) -> impl core::future::Future<Output = ()>;
}
