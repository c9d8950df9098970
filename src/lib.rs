#![cfg_attr(not(test), no_std)]
//! This is a platform agnostic library for the Microchip 25xx1024 SPI EEPROM using [embedded-hal](https://github.com/rust-embedded/embedded-hal).
//!
//! Any number of chips sharing one SPI bus, each with its own chip select line, are seen as a single
//! contiguous array of bytes. Writes are split on the 256 bytes pages of the chips and each burst waits
//! for the chip to be ready before the next one starts. The array can also be used as a block device
//! of 512 bytes sectors.
//!
//! Supported chips:
//! * [25AA1024/25LC1024](https://ww1.microchip.com/downloads/en/DeviceDoc/22064D.pdf)
//!
//! Chips of the same family with another size can be used through [`blocking::EepromArray`] directly,
//! setting the size as a const generic and the expected signature in the [`config::Config`].

pub mod address;
pub mod asynchronous;
pub mod block;
pub mod blocking;
mod command;
pub mod config;
pub mod error;
pub mod register;

use crate::{config::Config, error::Error, register::StatusRegister};

/// Size of a write page, a single write burst never crosses a page
pub const PAGE_SIZE: u32 = 0x100;

/// Size of a 25xx1024 in bytes
pub const CHIP_SIZE_25XX1024: u32 = 0x02_0000;

pub(crate) fn check_length<S, P>(range: &core::ops::Range<u32>, len: usize) -> Result<(), Error<S, P>> {
    if (range.end - range.start) as usize != len {
        return Err(Error::LengthMismatch);
    }
    Ok(())
}

/// Bookkeeping of the status polling done after a write or an erase
pub(crate) struct ReadyPoll {
    interval_ms: u32,
    timeout_ms: Option<u32>,
    waited_ms: u32,
}

impl ReadyPoll {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            interval_ms: config.poll_interval_ms,
            timeout_ms: config.ready_timeout_ms,
            waited_ms: 0,
        }
    }

    pub(crate) fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    /// `Ok(true)` once the chip is idle, `Ok(false)` if it should be polled again after
    /// [`Self::interval_ms`].
    pub(crate) fn check<S, P>(&mut self, status: StatusRegister) -> Result<bool, Error<S, P>> {
        if status.is_protected() {
            #[cfg(feature = "defmt")]
            defmt::error!("Block protection enabled: {:?}", status);
            return Err(Error::Protected(status));
        }
        if !status.wip_bit {
            return Ok(true);
        }
        if let Some(timeout) = self.timeout_ms {
            if self.waited_ms >= timeout {
                #[cfg(feature = "defmt")]
                defmt::error!("Chip still busy after {=u32}ms", self.waited_ms);
                return Err(Error::Timeout);
            }
        }
        // A zero interval still counts as a millisecond so the timeout is reached
        self.waited_ms = self.waited_ms.saturating_add(self.interval_ms.max(1));
        Ok(false)
    }
}
