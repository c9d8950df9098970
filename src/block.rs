//! Fixed size sector access, the way a filesystem sees the array.

use crate::error::Error;

/// Size of a sector in bytes
pub const SECTOR_SIZE: usize = 512;

/// [`BlockDevice::ioctl`] operation returning the number of sectors
pub const IOCTL_SECTOR_COUNT: u8 = 4;

/// [`BlockDevice::ioctl`] operation returning the size of a sector
pub const IOCTL_SECTOR_SIZE: u8 = 5;

/// A storage accessed by whole sectors
pub trait BlockDevice {
    type Error;

    /// Read `buf.len() / SECTOR_SIZE` sectors starting at `block`
    fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `buf.len() / SECTOR_SIZE` sectors starting at `block`
    fn write_blocks(&mut self, block: u32, buf: &[u8]) -> Result<(), Self::Error>;

    /// Number of sectors of the device
    fn block_count(&self) -> u32;

    fn block_size(&self) -> usize {
        SECTOR_SIZE
    }

    /// Capability query, `None` for an unknown operation
    fn ioctl(&self, op: u8) -> Option<u32> {
        ioctl(op, self.block_count())
    }
}

pub(crate) fn ioctl(op: u8, block_count: u32) -> Option<u32> {
    match op {
        IOCTL_SECTOR_COUNT => Some(block_count),
        IOCTL_SECTOR_SIZE => Some(SECTOR_SIZE as u32),
        _ => None,
    }
}

/// Address of the first byte of `block`, checking the buffer holds whole sectors
pub(crate) fn block_addr<S, P>(block: u32, len: usize) -> Result<u32, Error<S, P>> {
    if len % SECTOR_SIZE != 0 {
        return Err(Error::NotAligned);
    }
    block
        .checked_mul(SECTOR_SIZE as u32)
        .ok_or(Error::OutOfBounds)
}

pub(crate) const fn block_count(capacity: u32) -> u32 {
    capacity / SECTOR_SIZE as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ram {
        blocks: u32,
    }

    impl BlockDevice for Ram {
        type Error = ();

        fn read_blocks(&mut self, _block: u32, _buf: &mut [u8]) -> Result<(), ()> {
            Ok(())
        }

        fn write_blocks(&mut self, _block: u32, _buf: &[u8]) -> Result<(), ()> {
            Ok(())
        }

        fn block_count(&self) -> u32 {
            self.blocks
        }
    }

    #[test]
    fn ioctl() {
        let ram = Ram { blocks: 256 };
        assert_eq!(ram.ioctl(IOCTL_SECTOR_COUNT), Some(256));
        assert_eq!(ram.ioctl(IOCTL_SECTOR_SIZE), Some(512));
        assert_eq!(ram.ioctl(1), None);
    }

    #[test]
    fn addr() {
        assert_eq!(block_addr::<(), ()>(2, 512), Ok(1024));
        assert_eq!(block_addr::<(), ()>(0, 0), Ok(0));
        assert_eq!(block_addr::<(), ()>(2, 100), Err(Error::NotAligned));
        assert_eq!(block_addr::<(), ()>(u32::MAX, 512), Err(Error::OutOfBounds));
        assert_eq!(block_count(0x4_0000), 512);
    }
}
