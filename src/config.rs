/// Electronic signature of the 25xx1024
pub const SIGNATURE_25XX1024: u8 = 0x29;

/// Runtime configuration of an EEPROM array
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Signature every chip must answer to the scan with
    pub signature: u8,

    /// Delay between two status register polls
    pub poll_interval_ms: u32,

    /// Maximum time waited for a write or erase to complete, `None` waits forever
    pub ready_timeout_ms: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signature: SIGNATURE_25XX1024,
            poll_interval_ms: 1,
            ready_timeout_ms: Some(100),
        }
    }
}

impl Config {
    pub const fn with_signature(mut self, signature: u8) -> Self {
        self.signature = signature;
        self
    }

    pub const fn with_poll_interval_ms(mut self, poll_interval_ms: u32) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub const fn with_ready_timeout_ms(mut self, ready_timeout_ms: Option<u32>) -> Self {
        self.ready_timeout_ms = ready_timeout_ms;
        self
    }
}
