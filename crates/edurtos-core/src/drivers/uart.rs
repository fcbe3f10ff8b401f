//! Virtual UART device
//!
//! Transmitted frames land in an inspectable log; received data is fed in
//! through `inject_rx` and drained with `receive`.

use parking_lot::Mutex;

/// Serial baud rate
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BaudRate {
    Baud9600,
    Baud19200,
    Baud38400,
    Baud57600,
    Baud115200,
}

struct UartInner {
    baud_rate: BaudRate,
    tx_log: Vec<String>,
    rx_buffer: String,
}

/// Virtual UART
pub struct VirtualUart {
    inner: Mutex<UartInner>,
}

impl VirtualUart {
    /// Create a UART at 115200 baud with empty buffers
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(UartInner {
                baud_rate: BaudRate::Baud115200,
                tx_log: Vec::new(),
                rx_buffer: String::new(),
            }),
        }
    }

    /// Set the baud rate
    pub fn configure(&self, baud_rate: BaudRate) {
        self.inner.lock().baud_rate = baud_rate;
    }

    /// Get the configured baud rate
    pub fn baud_rate(&self) -> BaudRate {
        self.inner.lock().baud_rate
    }

    /// Transmit a frame (appended to the transmit log)
    pub fn transmit(&self, data: &str) {
        self.inner.lock().tx_log.push(data.to_string());
    }

    /// Snapshot of every transmitted frame, oldest first
    pub fn transmitted(&self) -> Vec<String> {
        self.inner.lock().tx_log.clone()
    }

    /// Feed data into the receive buffer
    pub fn inject_rx(&self, data: &str) {
        self.inner.lock().rx_buffer.push_str(data);
    }

    /// Drain and return the receive buffer
    pub fn receive(&self) -> String {
        std::mem::take(&mut self.inner.lock().rx_buffer)
    }

    /// Whether the receive buffer holds data
    pub fn has_data(&self) -> bool {
        !self.inner.lock().rx_buffer.is_empty()
    }
}

impl Default for VirtualUart {
    fn default() -> Self {
        Self::new()
    }
}
